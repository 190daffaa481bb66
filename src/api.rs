//! HTTP client for the SIRAC backend.
//!
//! Two endpoints are used:
//!
//! | Call | Endpoint | Body |
//! |------|----------|------|
//! | [`ApiClient::login`] | `POST /api/v1/auth/login` | JSON `{email, password, device_name}` |
//! | [`ApiClient::submit_partner`] | `POST /api/v1/parceiros/` | `multipart/form-data` |
//!
//! Every call is sent exactly once. Timeouts map to
//! [`OnboardingError::Timeout`], other transport failures to
//! [`OnboardingError::Network`], and non-2xx answers to
//! [`OnboardingError::Server`] carrying the backend's own message.

use crate::config::ClientConfig;
use crate::error::OnboardingError;
use crate::model::{json_scalar_to_string, AuthenticatedUser, SubmissionReceipt};
use crate::pipeline::assemble::SubmissionRequest;
use crate::session::TokenProvider;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const LOGIN_PATH: &str = "/api/v1/auth/login";
pub const PARTNERS_PATH: &str = "/api/v1/parceiros/";

/// Registration id reported when a 2xx response carries none.
pub const UNKNOWN_REGISTRATION_ID: &str = "N/A";

/// Successful login.
#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub access_token: SecretString,
    pub user: AuthenticatedUser,
}

#[derive(Deserialize)]
struct RawLogin {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: AuthenticatedUser,
}

/// Backend client with the bearer token injected through [`TokenProvider`].
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
    tokens: Arc<dyn TokenProvider>,
}

impl ApiClient {
    /// Build a client for `base_url` with the configured timeout.
    pub fn new(
        config: &ClientConfig,
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, OnboardingError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OnboardingError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange credentials for a bearer token.
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
        device_name: &str,
    ) -> Result<LoginResponse, OnboardingError> {
        let url = self.url(LOGIN_PATH);
        info!("Logging in as {}", email);

        let body = json!({
            "email": email.trim(),
            "password": password.expose_secret(),
            "device_name": device_name,
        });
        let request = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body);

        let (status, text) = self.send(&url, request).await?;
        let raw: RawLogin = serde_json::from_str(&text).map_err(|e| OnboardingError::Server {
            status,
            message: format!("Unexpected login response: {e}"),
        })?;
        let token = raw
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| OnboardingError::Server {
                status,
                message: "Login response did not include an access token".into(),
            })?;

        Ok(LoginResponse {
            access_token: SecretString::from(token),
            user: raw.user,
        })
    }

    /// Send the assembled partner registration. One POST, no retry.
    ///
    /// # Errors
    /// [`OnboardingError::Unauthenticated`] when no token is available; the
    /// request is not sent.
    pub async fn submit_partner(
        &self,
        request: SubmissionRequest,
    ) -> Result<SubmissionReceipt, OnboardingError> {
        let token = self.tokens.token().ok_or(OnboardingError::Unauthenticated)?;
        let url = self.url(PARTNERS_PATH);

        info!(
            "Submitting registration ({} parts, {} files)",
            request.parts().len(),
            request.file_count()
        );
        let form = request.into_form().await?;
        let builder = self
            .http
            .post(&url)
            .bearer_auth(token.expose_secret())
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form);

        let (status, text) = self.send(&url, builder).await?;
        let raw: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        let registration_id = extract_registration_id(&raw);
        info!("Registration accepted: id={} (HTTP {})", registration_id, status);

        Ok(SubmissionReceipt {
            registration_id,
            status,
            raw,
        })
    }

    /// Send once; return `(status, body)` for 2xx, map everything else.
    async fn send(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<(u16, String), OnboardingError> {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(url, e))?;
        debug!("{} → HTTP {} ({} bytes)", url, status.as_u16(), text.len());

        if status.is_success() {
            Ok((status.as_u16(), text))
        } else {
            Err(OnboardingError::Server {
                status: status.as_u16(),
                message: extract_error_message(status.as_u16(), &text),
            })
        }
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> OnboardingError {
        if e.is_timeout() {
            OnboardingError::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            OnboardingError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

// ── Response parsing ─────────────────────────────────────────────────────

/// Human-readable message from an error body.
///
/// Looks at `error`, then `message`, then the first entry of `errors`
/// (object or array), then the raw body text, then `HTTP <status>`.
pub fn extract_error_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let named = ["error", "message"]
            .iter()
            .find_map(|k| value.get(*k).and_then(first_text));
        if let Some(msg) = named {
            return msg;
        }
        let from_errors = match value.get("errors") {
            Some(Value::Object(map)) => map.values().next().and_then(first_text),
            Some(Value::Array(items)) => items.first().and_then(first_text),
            _ => None,
        };
        if let Some(msg) = from_errors {
            return msg;
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        trimmed.to_string()
    }
}

/// First usable string inside a message-ish value.
fn first_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_text),
        Value::Object(map) => map.get("message").and_then(first_text),
        _ => None,
    }
}

/// `parceiro.id`, else top-level `id`, else [`UNKNOWN_REGISTRATION_ID`].
pub fn extract_registration_id(body: &Value) -> String {
    body.pointer("/parceiro/id")
        .and_then(json_scalar_to_string)
        .or_else(|| body.get("id").and_then(json_scalar_to_string))
        .unwrap_or_else(|| UNKNOWN_REGISTRATION_ID.to_string())
}
