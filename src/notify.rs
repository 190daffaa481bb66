//! User-facing alerts and pipeline events.
//!
//! Inject an [`Arc<dyn AlertSink>`] into [`crate::onboard::Onboarding`] to
//! receive the messages a mobile client would show as blocking alerts
//! (conversion failures, server rejections, network trouble) together with
//! a few lifecycle events for spinners.
//!
//! # Example
//!
//! ```rust
//! use sirac_onboarding::{Alert, AlertSink};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct Collect(Mutex<Vec<String>>);
//!
//! impl AlertSink for Collect {
//!     fn on_alert(&self, alert: &Alert) {
//!         self.0.lock().unwrap().push(alert.message.clone());
//!     }
//! }
//!
//! let sink = Arc::new(Collect::default());
//! sink.on_alert(&Alert::conversion("Could not convert the photo"));
//! assert_eq!(sink.0.lock().unwrap().len(), 1);
//! ```

use crate::error::OnboardingError;
use crate::model::{NormalizedDocument, SubmissionReceipt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// What kind of problem an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Image → PDF failed; the original file is kept.
    Conversion,
    /// Timeout or unreachable host.
    Network,
    /// The backend rejected the request.
    Server,
    /// A form failed client-side checks.
    Validation,
    /// No stored login; the user has to sign in again.
    Session,
    /// A problem on this device: missing file, storage, wrong step.
    Local,
}

/// A message meant for the person using the wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    /// `true` when the user must acknowledge before continuing.
    pub blocking: bool,
}

impl Alert {
    pub fn conversion(message: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::Conversion,
            title: "Document conversion failed".into(),
            message: message.into(),
            blocking: true,
        }
    }

    /// Map an action error to the alert a screen would display.
    ///
    /// Server messages are passed through verbatim; transport errors get a
    /// generic retry prompt.
    pub fn from_error(err: &OnboardingError) -> Self {
        match err {
            OnboardingError::Network { .. } | OnboardingError::Timeout { .. } => Self {
                kind: AlertKind::Network,
                title: "Connection problem".into(),
                message: "Could not reach the server. Check your connection and try again."
                    .into(),
                blocking: true,
            },
            OnboardingError::Server { message, .. } => Self {
                kind: AlertKind::Server,
                title: "Request rejected".into(),
                message: message.clone(),
                blocking: true,
            },
            OnboardingError::Validation(_) => Self {
                kind: AlertKind::Validation,
                title: "Check the form".into(),
                message: err.to_string(),
                blocking: false,
            },
            OnboardingError::Conversion(e) => Self::conversion(e.to_string()),
            OnboardingError::Unauthenticated => Self {
                kind: AlertKind::Session,
                title: "Session expired".into(),
                message: err.to_string(),
                blocking: true,
            },
            OnboardingError::DocumentNotFound { .. }
            | OnboardingError::InvalidTransition { .. }
            | OnboardingError::Storage(_)
            | OnboardingError::Io { .. }
            | OnboardingError::InvalidConfig(_)
            | OnboardingError::Internal(_) => Self {
                kind: AlertKind::Local,
                title: "Something went wrong".into(),
                message: err.to_string(),
                blocking: true,
            },
        }
    }
}

/// Receives alerts and pipeline events.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait AlertSink: Send + Sync {
    /// A message the user should see.
    fn on_alert(&self, alert: &Alert) {
        let _ = alert;
    }

    /// A picked document is about to be normalised.
    fn on_normalize_start(&self, uri: &str) {
        let _ = uri;
    }

    /// A document finished normalising (converted or passed through).
    fn on_normalize_complete(&self, doc: &NormalizedDocument) {
        let _ = doc;
    }

    /// The submission request is about to be sent.
    fn on_submission_start(&self, file_parts: usize) {
        let _ = file_parts;
    }

    /// The backend accepted the submission.
    fn on_submission_complete(&self, receipt: &SubmissionReceipt) {
        let _ = receipt;
    }
}

/// A no-op implementation for callers that don't need alerts.
pub struct NoopAlertSink;

impl AlertSink for NoopAlertSink {}

/// Forwards alerts to `tracing`; the default sink of the orchestrator.
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn on_alert(&self, alert: &Alert) {
        warn!(kind = ?alert.kind, "{}: {}", alert.title, alert.message);
    }

    fn on_submission_complete(&self, receipt: &SubmissionReceipt) {
        info!("Registration {} accepted", receipt.registration_id);
    }
}

/// Convenience alias matching the type stored by the orchestrator.
pub type SharedAlertSink = Arc<dyn AlertSink>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        alerts: Mutex<Vec<Alert>>,
    }

    impl AlertSink for Recording {
        fn on_alert(&self, alert: &Alert) {
            self.alerts.lock().unwrap().push(alert.clone());
        }
    }

    #[test]
    fn noop_sink_does_not_panic() {
        let sink = NoopAlertSink;
        sink.on_alert(&Alert::conversion("x"));
        sink.on_normalize_start("file:///tmp/a.jpg");
        sink.on_submission_start(1);
    }

    #[test]
    fn server_message_is_verbatim() {
        let err = OnboardingError::Server {
            status: 400,
            message: "NUIT inválido".into(),
        };
        let alert = Alert::from_error(&err);
        assert_eq!(alert.kind, AlertKind::Server);
        assert_eq!(alert.message, "NUIT inválido");
    }

    #[test]
    fn local_failures_are_not_blamed_on_the_server() {
        let local = [
            OnboardingError::DocumentNotFound {
                uri: "/sdcard/bi.jpg".into(),
            },
            OnboardingError::InvalidTransition {
                from: "Review".into(),
                action: "attach a document".into(),
            },
            OnboardingError::Io {
                path: "/tmp/bi.pdf".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            },
        ];
        for err in &local {
            assert_eq!(Alert::from_error(err).kind, AlertKind::Local, "{err}");
        }
        assert_eq!(
            Alert::from_error(&OnboardingError::Unauthenticated).kind,
            AlertKind::Session
        );
    }

    #[test]
    fn network_errors_get_generic_prompt() {
        let err = OnboardingError::Timeout {
            url: "http://x".into(),
            secs: 15,
        };
        let alert = Alert::from_error(&err);
        assert_eq!(alert.kind, AlertKind::Network);
        assert!(alert.message.contains("try again"));
    }

    #[test]
    fn arc_dyn_sink_records() {
        let rec = Arc::new(Recording::default());
        let sink: SharedAlertSink = rec.clone();
        sink.on_alert(&Alert::conversion("bad image"));
        assert_eq!(rec.alerts.lock().unwrap()[0].kind, AlertKind::Conversion);
    }
}
