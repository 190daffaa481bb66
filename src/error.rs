//! Error types for the sirac-onboarding library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`OnboardingError`] — **Fatal for the action**: the step the user
//!   triggered cannot complete (invalid form, backend rejected the record,
//!   host unreachable). Returned as `Err(OnboardingError)`; the wizard stays
//!   where it was and the user may retry by hand.
//!
//! * [`ConversionError`] — **Non-fatal**: a picked image could not be turned
//!   into a PDF. The normaliser reports it through the
//!   [`crate::notify::AlertSink`] and falls back to the original file, so the
//!   flow continues.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All action-level errors returned by the onboarding library.
#[derive(Debug, Error)]
pub enum OnboardingError {
    // ── Client-side validation ────────────────────────────────────────────
    /// One or more form fields failed required/schema checks.
    #[error("{0}")]
    Validation(ValidationErrors),

    // ── Transport ─────────────────────────────────────────────────────────
    /// Host unreachable, TLS failure, connection reset.
    #[error("Could not reach the server at '{url}': {reason}\nCheck your connection and try again.")]
    Network { url: String, reason: String },

    /// The request exceeded the configured timeout.
    #[error("The server did not answer within {secs}s ('{url}').\nTry again.")]
    Timeout { url: String, secs: u64 },

    // ── Backend ───────────────────────────────────────────────────────────
    /// Non-2xx response. `message` is the server's own text when it sent one.
    #[error("{message}")]
    Server { status: u16, message: String },

    /// An authenticated call was attempted without a stored token.
    #[error("Not logged in. Run the login step first.")]
    Unauthenticated,

    // ── Documents ─────────────────────────────────────────────────────────
    /// Image → PDF rendering failed (strict entry points only).
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// A picked URI could not be resolved to a readable local file.
    #[error("Document not found: '{uri}'")]
    DocumentNotFound { uri: String },

    // ── Wizard ────────────────────────────────────────────────────────────
    /// The action is not available on the current step.
    #[error("Cannot {action} from the {from} step")]
    InvalidTransition { from: String, action: String },

    // ── Local state ───────────────────────────────────────────────────────
    /// Session persistence failed.
    #[error("Session storage error: {0}")]
    Storage(#[from] sirac_keystore::KeystoreError),

    /// Reading or writing a local file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OnboardingError {
    /// Shorthand for a single-field validation failure.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }

    /// Whether a manual retry of the same action could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// A non-fatal image → PDF failure.
///
/// Carried alongside the original file when the normaliser fails open.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ConversionError {
    /// The source file could not be read.
    #[error("Could not read '{path}': {detail}")]
    ReadFailed { path: PathBuf, detail: String },

    /// The bytes are not a decodable image.
    #[error("Could not decode image '{path}': {detail}")]
    DecodeFailed { path: PathBuf, detail: String },

    /// The PDF could not be built or written.
    #[error("Could not write PDF for '{path}': {detail}")]
    RenderFailed { path: PathBuf, detail: String },

    /// A `data:` URI was malformed.
    #[error("Invalid data URI: {detail}")]
    InvalidDataUri { detail: String },
}

/// Per-field validation messages, in field-name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Messages for one field (empty when the field is valid).
    pub fn field(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Turn the collection into `Ok(())` when empty.
    pub fn into_result(self) -> Result<(), OnboardingError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(OnboardingError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid form:")?;
        for (field, messages) in &self.fields {
            for m in messages {
                write!(f, "\n  • {field}: {m}")?;
            }
        }
        Ok(())
    }
}
