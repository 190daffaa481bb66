//! End-to-end tests against an in-process stand-in for the SIRAC backend.
//!
//! An axum server on `127.0.0.1:0` implements the two endpoints the client
//! uses and records every multipart part it receives, so the tests can
//! assert on exactly what went over the wire.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use secrecy::SecretString;
use serde_json::{json, Value};
use sirac_onboarding::{
    Alert, AlertKind, AlertSink, ClientConfig, CommercialData, DocumentSlot, Normalizer,
    Onboarding, OnboardingError, OnboardingRecord, PersonalData, ProfileType, Session, StepInput,
    WizardStep,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Fake backend ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct ReceivedPart {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

impl ReceivedPart {
    fn text(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("")
    }
}

#[derive(Clone)]
struct Backend {
    submissions: Arc<Mutex<Vec<Vec<ReceivedPart>>>>,
    authorization: Arc<Mutex<Vec<Option<String>>>>,
    reply: Arc<Mutex<(StatusCode, Value)>>,
    login_delay: Duration,
}

impl Backend {
    fn new(status: StatusCode, body: Value) -> Self {
        Self {
            submissions: Arc::default(),
            authorization: Arc::default(),
            reply: Arc::new(Mutex::new((status, body))),
            login_delay: Duration::ZERO,
        }
    }

    fn set_reply(&self, status: StatusCode, body: Value) {
        *self.reply.lock().unwrap() = (status, body);
    }

    fn last_submission(&self) -> Vec<ReceivedPart> {
        self.submissions.lock().unwrap().last().cloned().expect("no submission received")
    }

    fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

async fn login(
    State(backend): State<Backend>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    tokio::time::sleep(backend.login_delay).await;
    if body["password"] == "segredo123" && body["device_name"].is_string() {
        (
            StatusCode::OK,
            Json(json!({
                "access_token": "tok-123",
                "user": {"id": 17, "name": "Ana Macuácua", "email": body["email"]}
            })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Credenciais inválidas"})),
        )
    }
}

async fn parceiros(
    State(backend): State<Backend>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.unwrap().to_vec();
        parts.push(ReceivedPart {
            name,
            file_name,
            content_type,
            bytes,
        });
    }
    backend.authorization.lock().unwrap().push(
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );
    backend.submissions.lock().unwrap().push(parts);

    let (status, body) = backend.reply.lock().unwrap().clone();
    (status, Json(body))
}

async fn spawn_backend(backend: Backend) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/parceiros/", post(parceiros))
        .with_state(backend);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ── Test helpers ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl AlertSink for RecordingAlerts {
    fn on_alert(&self, alert: &Alert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
}

struct Harness {
    flow: Onboarding,
    alerts: Arc<RecordingAlerts>,
    output_dir: TempDir,
    picks: TempDir,
}

/// Library logs in test output; filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn harness(base_url: &str, timeout_secs: u64) -> Harness {
    init_tracing();
    let output_dir = tempfile::tempdir().unwrap();
    let picks = tempfile::tempdir().unwrap();
    let config = ClientConfig::builder()
        .base_url(base_url)
        .timeout_secs(timeout_secs)
        .output_dir(output_dir.path())
        .build()
        .unwrap();
    let alerts = Arc::new(RecordingAlerts::default());
    let flow = Onboarding::with_alerts(config, Session::in_memory(), alerts.clone()).unwrap();
    Harness {
        flow,
        alerts,
        output_dir,
        picks,
    }
}

fn write_jpeg(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::from_pixel(64, 48, image::Rgb([200, 30, 30]))
        .save(&path)
        .unwrap();
    path
}

fn personal() -> PersonalData {
    PersonalData {
        nome: "Ana Macuácua".into(),
        telefone: "+258 84 123 4567".into(),
        bi_numero: "110100123456B".into(),
    }
}

fn loja_x() -> CommercialData {
    CommercialData {
        nome_comercial: "Loja X".into(),
        nuit: "123456789".into(),
        alvara: "45/2024".into(),
        ..Default::default()
    }
}

/// Log in and walk the form screens up to document upload.
async fn to_document_upload(flow: &mut Onboarding, profile: ProfileType) {
    flow.login("ana@sirac.co.mz", &SecretString::from("segredo123"))
        .await
        .unwrap();
    flow.verify_token().unwrap();
    flow.advance(StepInput::Start).unwrap();
    flow.advance(StepInput::Profile(profile)).unwrap();
    flow.advance(StepInput::Personal(personal())).unwrap();
    let pw = SecretString::from("novaSenha1");
    flow.advance(StepInput::Password {
        password: pw.clone(),
        confirmation: pw,
    })
    .unwrap();
    if profile == ProfileType::Merchant {
        flow.advance(StepInput::Commercial(loja_x())).unwrap();
    }
    assert_eq!(flow.step(), WizardStep::DocumentUpload);
}

fn file_parts(parts: &[ReceivedPart]) -> Vec<&ReceivedPart> {
    parts.iter().filter(|p| p.file_name.is_some()).collect()
}

fn text_part<'a>(parts: &'a [ReceivedPart], name: &str) -> Option<&'a str> {
    parts
        .iter()
        .find(|p| p.name == name && p.file_name.is_none())
        .map(ReceivedPart::text)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn merchant_onboarding_converts_photo_and_submits() {
    let backend = Backend::new(StatusCode::CREATED, json!({"parceiro": {"id": 4242}}));
    let url = spawn_backend(backend.clone()).await;
    let mut h = harness(&url, 15);

    to_document_upload(&mut h.flow, ProfileType::Merchant).await;

    let photo = write_jpeg(h.picks.path(), "bi.jpg");
    let doc = h
        .flow
        .attach_document(DocumentSlot::BiFront, photo.to_str().unwrap())
        .await
        .unwrap();
    assert!(doc.converted);
    assert!(doc.path.starts_with(h.output_dir.path()));
    assert_eq!(doc.path.extension().unwrap(), "pdf");

    h.flow.continue_with_documents().unwrap();
    h.flow
        .sign("data:image/png;base64,iVBORw0KGgo=", Some("2024-05-01T10:00:00Z"))
        .unwrap();
    let receipt = h.flow.submit().await.unwrap();

    assert_eq!(receipt.registration_id, "4242");
    assert_eq!(receipt.status, 201);
    assert_eq!(h.flow.step(), WizardStep::Success);
    assert!(!h.flow.wizard().can_go_back());

    let parts = backend.last_submission();
    assert_eq!(text_part(&parts, "tipo_parceiro"), Some("comerciante"));
    assert_eq!(text_part(&parts, "designacao"), Some("Loja X"));
    assert_eq!(text_part(&parts, "nuit"), Some("123456789"));
    assert_eq!(text_part(&parts, "alvara"), Some("45/2024"));
    assert_eq!(text_part(&parts, "angariador_id"), Some("17"));
    assert_eq!(text_part(&parts, "data_adesao"), Some("2024-05-01T10:00:00Z"));
    assert_eq!(parts.iter().filter(|p| p.name == "assinatura_adesao").count(), 1);
    assert_eq!(parts.iter().filter(|p| p.name == "data_adesao").count(), 1);

    let files = file_parts(&parts);
    assert_eq!(files.len(), 1, "only the bi file is sent");
    let bi = files[0];
    assert_eq!(bi.name, "bi");
    assert_eq!(bi.content_type.as_deref(), Some("application/pdf"));
    let file_name = bi.file_name.as_deref().unwrap();
    assert!(file_name.starts_with("bi_") && file_name.ends_with(".pdf"), "{file_name}");
    assert!(bi.bytes.starts_with(b"%PDF"));

    let auth = backend.authorization.lock().unwrap().last().cloned().flatten();
    assert_eq!(auth.as_deref(), Some("Bearer tok-123"));
}

#[tokio::test]
async fn server_rejection_is_shown_verbatim_and_review_is_kept() {
    let backend = Backend::new(StatusCode::BAD_REQUEST, json!({"error": "NUIT inválido"}));
    let url = spawn_backend(backend.clone()).await;
    let mut h = harness(&url, 15);

    to_document_upload(&mut h.flow, ProfileType::Merchant).await;
    let photo = write_jpeg(h.picks.path(), "alvara.jpg");
    h.flow
        .attach_document(DocumentSlot::Alvara, photo.to_str().unwrap())
        .await
        .unwrap();
    h.flow.continue_with_documents().unwrap();
    h.flow.sign("sig", Some("2024-05-01")).unwrap();

    let err = h.flow.submit().await.unwrap_err();
    match &err {
        OnboardingError::Server { status, message } => {
            assert_eq!(*status, 400);
            assert_eq!(message, "NUIT inválido");
        }
        other => panic!("expected server error, got {other:?}"),
    }
    assert_eq!(err.to_string(), "NUIT inválido");

    assert_eq!(h.flow.step(), WizardStep::Review);
    assert!(h.flow.state().documents.get(DocumentSlot::Alvara).is_some());
    assert_eq!(h.flow.state().signature.as_deref(), Some("sig"));
    assert_eq!(h.flow.state().commercial.as_ref().unwrap().nuit, "123456789");

    {
        let alerts = h.alerts.alerts.lock().unwrap();
        let last = alerts.last().unwrap();
        assert_eq!(last.kind, AlertKind::Server);
        assert_eq!(last.message, "NUIT inválido");
    }

    // Manual retry once the backend accepts.
    backend.set_reply(StatusCode::CREATED, json!({"id": "P-77"}));
    let receipt = h.flow.submit().await.unwrap();
    assert_eq!(receipt.registration_id, "P-77");
    assert_eq!(backend.submission_count(), 2);
}

#[tokio::test]
async fn success_without_id_uses_placeholder() {
    let backend = Backend::new(StatusCode::CREATED, json!({"ok": true}));
    let url = spawn_backend(backend.clone()).await;
    let mut h = harness(&url, 15);

    to_document_upload(&mut h.flow, ProfileType::Agent).await;
    let photo = write_jpeg(h.picks.path(), "bi.jpg");
    h.flow
        .attach_document(DocumentSlot::BiFront, photo.to_str().unwrap())
        .await
        .unwrap();
    h.flow.continue_with_documents().unwrap();
    h.flow.sign("sig", None).unwrap();

    let receipt = h.flow.submit().await.unwrap();
    assert_eq!(receipt.registration_id, sirac_onboarding::UNKNOWN_REGISTRATION_ID);

    let parts = backend.last_submission();
    assert_eq!(text_part(&parts, "tipo_parceiro"), Some("agente"));
    assert_eq!(text_part(&parts, "designacao"), Some("Ana Macuácua"));
    assert_eq!(text_part(&parts, "contacto_agente"), Some("841234567"));
}

#[tokio::test]
async fn remove_then_readd_renders_a_fresh_pdf() {
    let backend = Backend::new(StatusCode::CREATED, json!({"id": 1}));
    let url = spawn_backend(backend).await;
    let mut h = harness(&url, 15);

    to_document_upload(&mut h.flow, ProfileType::Agent).await;
    let photo = write_jpeg(h.picks.path(), "bi.jpg");
    let uri = photo.to_str().unwrap();

    let first = h.flow.attach_document(DocumentSlot::BiFront, uri).await.unwrap();
    assert!(first.path.exists());

    let removed = h.flow.remove_document(DocumentSlot::BiFront).unwrap().unwrap();
    assert_eq!(removed.path, first.path);
    assert!(!first.path.exists(), "rendered PDF is deleted with its slot");
    assert!(photo.exists(), "the user's original is never deleted");
    assert!(h.flow.continue_with_documents().is_err());

    let second = h.flow.attach_document(DocumentSlot::BiFront, uri).await.unwrap();
    assert_ne!(second.path, first.path);
    assert!(second.path.exists());

    // Replacing in place also drops the superseded render.
    let third = h.flow.attach_document(DocumentSlot::BiFront, uri).await.unwrap();
    assert!(!second.path.exists());
    assert!(third.path.exists());
}

#[tokio::test]
async fn reattached_pdf_from_output_dir_is_kept_and_submitted() {
    let backend = Backend::new(StatusCode::CREATED, json!({"id": 2}));
    let url = spawn_backend(backend.clone()).await;
    let mut h = harness(&url, 15);

    to_document_upload(&mut h.flow, ProfileType::Agent).await;
    // e.g. a PDF written earlier by `sirac-onboard normalize`
    let scan = h.output_dir.path().join("bi_scan.pdf");
    std::fs::write(&scan, b"%PDF-1.4\n%%EOF\n").unwrap();
    let uri = scan.to_str().unwrap();

    let first = h.flow.attach_document(DocumentSlot::BiFront, uri).await.unwrap();
    assert!(!first.converted && !first.generated);
    h.flow.attach_document(DocumentSlot::BiFront, uri).await.unwrap();
    assert!(scan.exists(), "re-attaching must not delete the user's file");

    h.flow.continue_with_documents().unwrap();
    h.flow.sign("sig", Some("2024-05-01")).unwrap();
    h.flow.submit().await.unwrap();
    assert_eq!(h.flow.step(), WizardStep::Success);

    let parts = backend.last_submission();
    let bi = parts.iter().find(|p| p.name == "bi").unwrap();
    assert!(bi.bytes.starts_with(b"%PDF"));
    assert!(scan.exists());
}

#[tokio::test]
async fn unreadable_image_fails_open_with_alert() {
    let mut h = harness("http://127.0.0.1:9", 15);
    let bad = h.picks.path().join("scan.png");
    std::fs::write(&bad, b"definitely not a png").unwrap();

    h.flow
        .session()
        .store_login(&SecretString::from("tok"), &Default::default())
        .unwrap();
    h.flow.resume().unwrap();
    h.flow.verify_token().unwrap();
    h.flow.advance(StepInput::Start).unwrap();
    h.flow.advance(StepInput::Profile(ProfileType::Agent)).unwrap();
    h.flow.advance(StepInput::Personal(personal())).unwrap();
    let pw = SecretString::from("novaSenha1");
    h.flow
        .advance(StepInput::Password {
            password: pw.clone(),
            confirmation: pw,
        })
        .unwrap();

    let doc = h
        .flow
        .attach_document(DocumentSlot::Nuit, bad.to_str().unwrap())
        .await
        .unwrap();
    assert!(!doc.converted);
    assert_eq!(doc.path, bad);
    assert_eq!(doc.extension, "png");
    assert_eq!(doc.mime_type(), "image/png");

    let alerts = h.alerts.alerts.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Conversion);
    assert!(alerts[0].blocking);
}

#[tokio::test]
async fn pdf_and_other_files_pass_through_unchanged() {
    let out = tempfile::tempdir().unwrap();
    let picks = tempfile::tempdir().unwrap();
    let config = ClientConfig::builder().output_dir(out.path()).build().unwrap();
    let normalizer = Normalizer::new(&config, Arc::new(sirac_onboarding::NoopAlertSink));

    for name in ["contrato.pdf", "nuit.PDF", "notes.txt", "LICENCA"] {
        let path = picks.path().join(name);
        std::fs::write(&path, b"%PDF-1.4\n").unwrap();
        let doc = normalizer.normalize(path.to_str().unwrap()).await.unwrap();
        assert_eq!(doc.path, path, "{name}");
        assert!(!doc.converted, "{name}");
    }
    assert_eq!(std::fs::read_dir(out.path()).map(|d| d.count()).unwrap_or(0), 0);
}

#[tokio::test]
async fn every_image_extension_becomes_a_pdf() {
    let out = tempfile::tempdir().unwrap();
    let picks = tempfile::tempdir().unwrap();
    let config = ClientConfig::builder().output_dir(out.path()).build().unwrap();
    let normalizer = Normalizer::new(&config, Arc::new(sirac_onboarding::NoopAlertSink));

    for ext in ["jpg", "jpeg", "png", "gif", "webp", "bmp"] {
        let path = picks.path().join(format!("photo.{ext}"));
        image::RgbImage::from_pixel(16, 16, image::Rgb([10, 120, 200]))
            .save(&path)
            .unwrap();
        let doc = normalizer.try_normalize(path.to_str().unwrap()).await.unwrap();
        assert!(doc.converted, "{ext}");
        assert!(doc.is_pdf(), "{ext}");
        assert!(std::fs::read(&doc.path).unwrap().starts_with(b"%PDF"), "{ext}");
    }
}

#[tokio::test]
async fn wrong_password_surfaces_backend_message() {
    let backend = Backend::new(StatusCode::CREATED, json!({}));
    let url = spawn_backend(backend).await;
    let mut h = harness(&url, 15);

    let err = h
        .flow
        .login("ana@sirac.co.mz", &SecretString::from("errada"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Credenciais inválidas");
    assert_eq!(h.flow.step(), WizardStep::Login);
    assert!(!h.flow.session().is_authenticated());
}

#[tokio::test]
async fn slow_backend_times_out_without_retry() {
    let mut backend = Backend::new(StatusCode::CREATED, json!({}));
    backend.login_delay = Duration::from_secs(3);
    let url = spawn_backend(backend).await;
    let mut h = harness(&url, 1);

    let err = h
        .flow
        .login("ana@sirac.co.mz", &SecretString::from("segredo123"))
        .await
        .unwrap_err();
    assert!(matches!(err, OnboardingError::Timeout { secs: 1, .. }), "{err:?}");
    assert_eq!(h.alerts.alerts.lock().unwrap()[0].kind, AlertKind::Network);
    assert_eq!(h.flow.step(), WizardStep::Login);
}

#[tokio::test]
async fn headless_record_runs_the_whole_wizard() {
    let backend = Backend::new(StatusCode::CREATED, json!({"parceiro": {"id": "M-1"}}));
    let url = spawn_backend(backend.clone()).await;
    let mut h = harness(&url, 15);

    let front = write_jpeg(h.picks.path(), "frente.jpg");
    let back = write_jpeg(h.picks.path(), "verso.jpg");
    let record = OnboardingRecord::from_json(
        &json!({
            "profile": "merchant",
            "personal": {"nome": "Ana Macuácua", "telefone": "841234567", "bi_numero": "110100123456B"},
            "password": "novaSenha1",
            "commercial": {
                "nome_comercial": "Loja X",
                "nuit": "123456789",
                "alvara": "45/2024",
                "owners": [{"nome": "Ana", "telefone": "841234567", "quota": 100.0}]
            },
            "documents": {"bi_front": front, "bi_back": back},
            "signature": "sig"
        })
        .to_string(),
    )
    .unwrap();

    h.flow
        .login("ana@sirac.co.mz", &SecretString::from("segredo123"))
        .await
        .unwrap();
    h.flow.verify_token().unwrap();
    let receipt = h.flow.complete(record).await.unwrap();
    assert_eq!(receipt.registration_id, "M-1");

    let parts = backend.last_submission();
    assert_eq!(file_parts(&parts).len(), 1, "the BI back side has no backend field");
    let owners: Value = serde_json::from_str(text_part(&parts, "proprietarios").unwrap()).unwrap();
    assert_eq!(owners[0]["nome"], "Ana");
}
