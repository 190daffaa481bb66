//! The onboarding orchestrator.
//!
//! [`Onboarding`] is the only place where wizard transitions meet file and
//! network I/O. Each method corresponds to one user action on one screen:
//!
//! | Screen | Action |
//! |--------|--------|
//! | Login | [`Onboarding::login`] (or [`Onboarding::resume`] with a stored session) |
//! | TokenVerification | [`Onboarding::verify_token`] |
//! | Welcome … CommercialData | [`Onboarding::advance`] |
//! | DocumentUpload | [`Onboarding::attach_document`], [`Onboarding::remove_document`], [`Onboarding::continue_with_documents`] |
//! | Review | [`Onboarding::sign`], [`Onboarding::submit`] |
//!
//! Failed actions are returned as `Err` and, when the user should see them,
//! raised through the [`AlertSink`](crate::notify::AlertSink). The wizard
//! never moves on a failure.

use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::error::OnboardingError;
use crate::model::{
    CommercialData, DocumentSlot, NormalizedDocument, PersonalData, ProfileType,
    SubmissionReceipt, WizardState,
};
use crate::notify::{Alert, LogAlertSink, SharedAlertSink};
use crate::pipeline::assemble::{self, SubmissionRequest};
use crate::pipeline::normalize::Normalizer;
use crate::session::Session;
use crate::validate;
use crate::wizard::{StepInput, Wizard, WizardStep};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives one onboarding from login to success.
pub struct Onboarding {
    config: ClientConfig,
    session: Session,
    api: ApiClient,
    normalizer: Normalizer,
    alerts: SharedAlertSink,
    wizard: Wizard,
    /// Every file this run created that is not yet submitted or discarded,
    /// including ones no longer reachable from the current state.
    renders: BTreeMap<PathBuf, NormalizedDocument>,
}

impl Onboarding {
    /// Orchestrator reporting alerts through `tracing`.
    pub fn new(config: ClientConfig, session: Session) -> Result<Self, OnboardingError> {
        Self::with_alerts(config, session, Arc::new(LogAlertSink))
    }

    pub fn with_alerts(
        config: ClientConfig,
        session: Session,
        alerts: SharedAlertSink,
    ) -> Result<Self, OnboardingError> {
        let base_url = session.base_url(&config)?;
        let api = ApiClient::new(&config, base_url, Arc::new(session.clone()))?;
        let normalizer = Normalizer::new(&config, alerts.clone());
        Ok(Self {
            config,
            session,
            api,
            normalizer,
            alerts,
            wizard: Wizard::new(),
            renders: BTreeMap::new(),
        })
    }

    pub fn step(&self) -> WizardStep {
        self.wizard.step()
    }

    pub fn state(&self) -> &WizardState {
        self.wizard.state()
    }

    pub fn wizard(&self) -> &Wizard {
        &self.wizard
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    // ── Login & token ────────────────────────────────────────────────────

    /// Log in and persist the session. Moves Login → TokenVerification.
    pub async fn login(
        &mut self,
        email: &str,
        password: &SecretString,
    ) -> Result<WizardStep, OnboardingError> {
        self.require_step(WizardStep::Login, "log in")?;
        validate::validate_login(email, password)?;

        let response = self
            .api
            .login(email, password, &self.config.device_name)
            .await
            .map_err(|e| self.alert(e))?;
        self.session.store_login(&response.access_token, &response.user)?;
        info!("Logged in as {}", response.user.email);

        self.wizard.advance(StepInput::LoggedIn(response.user))
    }

    /// Skip the login screen using the stored session.
    pub fn resume(&mut self) -> Result<WizardStep, OnboardingError> {
        self.require_step(WizardStep::Login, "resume a session")?;
        if !self.session.is_authenticated() {
            return Err(OnboardingError::Unauthenticated);
        }
        let user = self.session.user()?.unwrap_or_default();
        self.wizard.advance(StepInput::LoggedIn(user))
    }

    /// Confirm a token is present. Moves TokenVerification → Welcome.
    pub fn verify_token(&mut self) -> Result<WizardStep, OnboardingError> {
        self.require_step(WizardStep::TokenVerification, "verify the token")?;
        if !self.session.is_authenticated() {
            return Err(OnboardingError::Unauthenticated);
        }
        self.wizard.advance(StepInput::TokenVerified)
    }

    // ── Generic steps ────────────────────────────────────────────────────

    /// Continue from a form screen (welcome, profile, personal, password,
    /// commercial).
    pub fn advance(&mut self, input: StepInput) -> Result<WizardStep, OnboardingError> {
        self.wizard.advance(input)
    }

    pub fn back(&mut self) -> Result<WizardStep, OnboardingError> {
        self.wizard.back()
    }

    // ── Documents ────────────────────────────────────────────────────────

    /// Normalise `uri` and put it in `slot`, replacing any previous pick.
    ///
    /// A rendered PDF from the replaced pick is deleted. Conversion failures
    /// fail open: the original file is attached and an alert is raised.
    pub async fn attach_document(
        &mut self,
        slot: DocumentSlot,
        uri: &str,
    ) -> Result<NormalizedDocument, OnboardingError> {
        self.require_step(WizardStep::DocumentUpload, "attach a document")?;

        let doc = self.normalizer.normalize(uri).await.map_err(|e| self.alert(e))?;
        if doc.generated {
            self.renders.insert(doc.path.clone(), doc.clone());
        }
        if let Some(previous) = self.state().documents.get(slot).cloned() {
            if previous.path != doc.path {
                self.release(&previous);
            }
        }

        let attached = doc.clone();
        self.wizard
            .revise(|s| s.with_documents(s.documents.with(slot, attached)))?;
        info!("Attached {} → {}", slot, doc.path.display());
        Ok(doc)
    }

    /// Clear `slot`, deleting a PDF rendered for it.
    pub fn remove_document(
        &mut self,
        slot: DocumentSlot,
    ) -> Result<Option<NormalizedDocument>, OnboardingError> {
        self.require_step(WizardStep::DocumentUpload, "remove a document")?;
        let removed = self.state().documents.get(slot).cloned();
        if let Some(doc) = &removed {
            self.release(doc);
        }
        self.wizard
            .revise(|s| s.with_documents(s.documents.without(slot)))?;
        Ok(removed)
    }

    /// Continue with the attached documents. Needs at least one.
    pub fn continue_with_documents(&mut self) -> Result<WizardStep, OnboardingError> {
        let docs = self.state().documents.clone();
        self.wizard.advance(StepInput::Documents(docs))
    }

    // ── Review & submit ──────────────────────────────────────────────────

    /// Record the signature and submission date on the review screen.
    ///
    /// `submitted_at` defaults to now (RFC 3339, UTC).
    pub fn sign(
        &mut self,
        signature: &str,
        submitted_at: Option<&str>,
    ) -> Result<(), OnboardingError> {
        self.require_step(WizardStep::Review, "sign")?;
        let date = submitted_at
            .map(str::to_string)
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
        validate::validate_review(Some(signature), Some(&date))?;
        self.wizard.revise(|s| s.with_signature(signature, date))
    }

    /// The request [`Onboarding::submit`] would send.
    pub fn preview_submission(&self) -> Result<SubmissionRequest, OnboardingError> {
        assemble::assemble_from_state(self.state())
    }

    /// Assemble and send the registration. Review → Success on 2xx.
    ///
    /// On any failure the wizard stays on Review with its state intact and
    /// the message is alerted; the user may retry.
    pub async fn submit(&mut self) -> Result<SubmissionReceipt, OnboardingError> {
        self.require_step(WizardStep::Review, "submit")?;

        let request = self.preview_submission().map_err(|e| self.alert(e))?;
        self.alerts.on_submission_start(request.file_count());

        let receipt = self
            .api
            .submit_partner(request)
            .await
            .map_err(|e| self.alert(e))?;

        self.alerts.on_submission_complete(&receipt);
        for (_, doc) in self.wizard.state().documents.iter() {
            self.renders.remove(&doc.path);
        }
        // Whatever is left was orphaned by going back; nothing references it.
        for doc in std::mem::take(&mut self.renders).into_values() {
            self.normalizer.discard(&doc);
        }
        self.wizard.advance(StepInput::Submitted(receipt.clone()))?;
        Ok(receipt)
    }

    // ── Teardown ─────────────────────────────────────────────────────────

    /// Drop the wizard state and every file rendered during this run,
    /// including renders orphaned by going back from document upload.
    ///
    /// After a successful submission the uploaded files are kept.
    pub fn abandon(&mut self) {
        for doc in std::mem::take(&mut self.renders).into_values() {
            self.normalizer.discard(&doc);
        }
        self.wizard = Wizard::new();
    }

    /// Forget the session and start over.
    pub fn logout(&mut self) -> Result<(), OnboardingError> {
        self.abandon();
        self.session.logout()
    }

    // ── Headless ─────────────────────────────────────────────────────────

    /// Fill every remaining screen from `record` and submit.
    ///
    /// Must be called on the welcome screen, i.e. after login (or
    /// [`resume`](Self::resume)) and [`verify_token`](Self::verify_token).
    pub async fn complete(
        &mut self,
        record: OnboardingRecord,
    ) -> Result<SubmissionReceipt, OnboardingError> {
        self.require_step(WizardStep::Welcome, "run a headless onboarding")?;

        self.advance(StepInput::Start)?;
        self.advance(StepInput::Profile(record.profile))?;
        self.advance(StepInput::Personal(record.personal))?;
        let password = SecretString::from(record.password);
        self.advance(StepInput::Password {
            confirmation: password.clone(),
            password,
        })?;

        if self.step() == WizardStep::CommercialData {
            let commercial = record.commercial.ok_or_else(|| {
                OnboardingError::invalid("commercial", "merchant records need commercial data")
            })?;
            self.advance(StepInput::Commercial(commercial))?;
        } else if record.commercial.is_some() {
            warn!("Ignoring commercial data in an agent record");
        }

        for (slot, uri) in &record.documents {
            self.attach_document(*slot, uri).await?;
        }
        self.continue_with_documents()?;

        self.sign(&record.signature, record.submitted_at.as_deref())?;
        self.submit().await
    }

    // ── Internal ─────────────────────────────────────────────────────────

    /// Delete `doc` if this run created it and stop tracking it.
    fn release(&mut self, doc: &NormalizedDocument) {
        if self.renders.remove(&doc.path).is_some() {
            debug!("Releasing {}", doc.path.display());
        }
        self.normalizer.discard(doc);
    }

    fn require_step(&self, step: WizardStep, action: &str) -> Result<(), OnboardingError> {
        if self.step() == step {
            Ok(())
        } else {
            Err(OnboardingError::InvalidTransition {
                from: self.step().to_string(),
                action: action.to_string(),
            })
        }
    }

    /// Raise `err` as an alert and hand it back.
    fn alert(&self, err: OnboardingError) -> OnboardingError {
        self.alerts.on_alert(&Alert::from_error(&err));
        err
    }
}

/// Everything a headless run needs, as read from a JSON file.
///
/// ```json
/// {
///   "profile": "merchant",
///   "personal": {"nome": "Ana Macuácua", "telefone": "841234567", "bi_numero": "110100123456B"},
///   "password": "segredo123",
///   "commercial": {"nome_comercial": "Loja X", "nuit": "123456789", "alvara": "45/2024"},
///   "documents": {"bi_front": "/sdcard/DCIM/bi.jpg"},
///   "signature": "data:image/png;base64,iVBORw0KGgo="
/// }
/// ```
#[derive(Deserialize)]
pub struct OnboardingRecord {
    pub profile: ProfileType,
    pub personal: PersonalData,
    pub password: String,
    #[serde(default)]
    pub commercial: Option<CommercialData>,
    #[serde(default)]
    pub documents: BTreeMap<DocumentSlot, String>,
    pub signature: String,
    #[serde(default)]
    pub submitted_at: Option<String>,
}

impl OnboardingRecord {
    pub fn from_json(text: &str) -> Result<Self, OnboardingError> {
        serde_json::from_str(text)
            .map_err(|e| OnboardingError::invalid("record", format!("invalid JSON record: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn onboarding() -> (Onboarding, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::builder().output_dir(dir.path()).build().unwrap();
        (Onboarding::new(config, Session::in_memory()).unwrap(), dir)
    }

    /// Walk an agent onboarding to the document screen without a backend.
    fn at_document_upload(o: &mut Onboarding) {
        o.session()
            .store_login(&SecretString::from("tok"), &Default::default())
            .unwrap();
        o.resume().unwrap();
        o.verify_token().unwrap();
        o.advance(StepInput::Start).unwrap();
        o.advance(StepInput::Profile(ProfileType::Agent)).unwrap();
        o.advance(StepInput::Personal(PersonalData {
            nome: "Ana Macuácua".into(),
            telefone: "+258 84 123 4567".into(),
            bi_numero: "110100123456B".into(),
        }))
        .unwrap();
        let pw = SecretString::from("novaSenha1");
        o.advance(StepInput::Password {
            password: pw.clone(),
            confirmation: pw,
        })
        .unwrap();
        assert_eq!(o.step(), WizardStep::DocumentUpload);
    }

    fn write_jpeg(dir: &std::path::Path, name: &str) -> String {
        let path = dir.join(name);
        image::RgbImage::from_pixel(16, 12, image::Rgb([10, 120, 40]))
            .save(&path)
            .unwrap();
        path.to_string_lossy().into_owned()
    }

    fn pdfs_in(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|x| x == "pdf"))
            .count()
    }

    #[tokio::test]
    async fn user_pdf_in_output_dir_survives_reattach_and_removal() {
        let (mut o, dir) = onboarding();
        at_document_upload(&mut o);

        let scan = dir.path().join("bi_scan.pdf");
        std::fs::write(&scan, b"%PDF-1.4\n%%EOF\n").unwrap();
        let uri = scan.to_string_lossy().into_owned();

        o.attach_document(DocumentSlot::BiFront, &uri).await.unwrap();
        o.attach_document(DocumentSlot::BiFront, &uri).await.unwrap();
        assert!(scan.exists());
        assert_eq!(o.state().documents.get(DocumentSlot::BiFront).unwrap().path, scan);

        o.attach_document(DocumentSlot::BiBack, &uri).await.unwrap();
        o.remove_document(DocumentSlot::BiFront).unwrap();
        o.remove_document(DocumentSlot::BiBack).unwrap();
        assert!(scan.exists());

        o.abandon();
        assert!(scan.exists());
    }

    #[tokio::test]
    async fn replacing_a_render_deletes_only_the_old_one() {
        let (mut o, dir) = onboarding();
        let picks = tempfile::tempdir().unwrap();
        at_document_upload(&mut o);

        let photo = write_jpeg(picks.path(), "bi.jpg");
        let first = o.attach_document(DocumentSlot::BiFront, &photo).await.unwrap();
        let second = o.attach_document(DocumentSlot::BiFront, &photo).await.unwrap();
        assert_ne!(first.path, second.path);
        assert!(!first.path.exists());
        assert!(second.path.exists());
        assert_eq!(pdfs_in(dir.path()), 1);
    }

    #[tokio::test]
    async fn abandon_after_back_removes_orphaned_renders() {
        let (mut o, dir) = onboarding();
        let picks = tempfile::tempdir().unwrap();
        at_document_upload(&mut o);

        let photo = write_jpeg(picks.path(), "bi.jpg");
        let doc = o.attach_document(DocumentSlot::BiFront, &photo).await.unwrap();
        assert!(doc.generated);

        o.back().unwrap();
        assert_eq!(o.state().documents.iter().count(), 0);
        assert!(doc.path.exists());

        o.abandon();
        assert_eq!(o.step(), WizardStep::Login);
        assert_eq!(pdfs_in(dir.path()), 0);
        assert!(std::path::Path::new(&photo).exists());
    }

    #[test]
    fn verify_token_without_session_fails() {
        let (mut o, _dir) = onboarding();
        assert!(matches!(o.resume(), Err(OnboardingError::Unauthenticated)));
        assert_eq!(o.step(), WizardStep::Login);
    }

    #[test]
    fn resume_uses_stored_session() {
        let (mut o, _dir) = onboarding();
        o.session()
            .store_login(&SecretString::from("tok"), &Default::default())
            .unwrap();
        assert_eq!(o.resume().unwrap(), WizardStep::TokenVerification);
        assert_eq!(o.verify_token().unwrap(), WizardStep::Welcome);
        assert!(o.state().token_verified);
    }

    #[tokio::test]
    async fn attach_is_only_allowed_on_document_upload() {
        let (mut o, _dir) = onboarding();
        let err = o
            .attach_document(DocumentSlot::BiFront, "/tmp/bi.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, OnboardingError::InvalidTransition { .. }));
    }

    #[test]
    fn record_parses_slot_keys() {
        let record = OnboardingRecord::from_json(
            r#"{
                "profile": "agent",
                "personal": {"nome": "Ana", "telefone": "841234567", "bi_numero": "110100123456B"},
                "password": "segredo123",
                "documents": {"bi_front": "/tmp/a.jpg", "bi_back": "/tmp/b.jpg"},
                "signature": "sig"
            }"#,
        )
        .unwrap();
        assert_eq!(record.profile, ProfileType::Agent);
        assert_eq!(record.documents.len(), 2);
        assert!(record.commercial.is_none());
    }

    #[test]
    fn malformed_record_is_a_validation_error() {
        assert!(matches!(
            OnboardingRecord::from_json("{}"),
            Err(OnboardingError::Validation(_))
        ));
    }
}
