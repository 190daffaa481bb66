//! Domain data threaded through the onboarding wizard.
//!
//! [`WizardState`] is a plain value: every step handler receives the
//! previous state and returns an augmented copy (see [`crate::wizard`]).
//! Nothing here performs I/O.
//!
//! Field names follow the backend's Portuguese vocabulary (`nome`, `nuit`,
//! `alvara`, …) so the mapping in [`crate::pipeline::assemble`] stays
//! obvious.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// ── Profile ──────────────────────────────────────────────────────────────

/// Which kind of partner is being registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileType {
    /// Individual agent; no commercial-data step.
    Agent,
    /// Merchant with a trading name, NUIT and licence.
    Merchant,
}

impl ProfileType {
    /// Value sent as `tipo_parceiro`.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ProfileType::Agent => "agente",
            ProfileType::Merchant => "comerciante",
        }
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ── Form data ────────────────────────────────────────────────────────────

/// Personal details of the person registering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalData {
    pub nome: String,
    pub telefone: String,
    /// National ID card (BI) number.
    pub bi_numero: String,
}

/// Postal address of the business.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub provincia: String,
    pub distrito: String,
    pub bairro: String,
    pub avenida: Option<String>,
    pub numero: Option<String>,
    pub referencia: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.provincia.is_empty()
            && self.distrito.is_empty()
            && self.bairro.is_empty()
            && self.avenida.is_none()
            && self.numero.is_none()
            && self.referencia.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Owner {
    pub nome: String,
    pub telefone: String,
    pub bi_numero: Option<String>,
    /// Ownership share in percent, when declared.
    pub quota: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Assistant {
    pub nome: String,
    pub telefone: String,
}

/// A point of sale operated by the merchant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Establishment {
    pub designacao: String,
    pub endereco: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Business details; only collected for [`ProfileType::Merchant`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommercialData {
    pub nome_comercial: String,
    /// Tax identification number (9 digits).
    pub nuit: String,
    /// Trading licence number, e.g. `45/2024`.
    pub alvara: String,
    pub tipo_empresa: Option<String>,
    pub natureza_actividade: Option<String>,
    pub banco: Option<String>,
    pub numero_conta: Option<String>,
    pub bairro_ref: Option<String>,
    pub profissao: Option<String>,
    pub address: Address,
    pub owners: Vec<Owner>,
    pub assistants: Vec<Assistant>,
    pub establishments: Vec<Establishment>,
}

// ── Documents ────────────────────────────────────────────────────────────

/// The fixed set of document slots on the upload screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSlot {
    /// Front of the national ID card.
    BiFront,
    /// Back of the national ID card.
    BiBack,
    /// Tax registration certificate.
    Nuit,
    /// Trading licence.
    Alvara,
}

impl DocumentSlot {
    pub const ALL: [DocumentSlot; 4] = [
        DocumentSlot::BiFront,
        DocumentSlot::BiBack,
        DocumentSlot::Nuit,
        DocumentSlot::Alvara,
    ];

    /// Multipart field name the backend accepts for this slot, if any.
    pub fn backend_field(&self) -> Option<&'static str> {
        match self {
            DocumentSlot::BiFront => Some("bi"),
            DocumentSlot::BiBack => None,
            DocumentSlot::Nuit => Some("nuit"),
            DocumentSlot::Alvara => Some("alvara"),
        }
    }

    /// Short identifier used in file names and logs.
    pub fn key(&self) -> &'static str {
        match self {
            DocumentSlot::BiFront => "bi_frente",
            DocumentSlot::BiBack => "bi_verso",
            DocumentSlot::Nuit => "nuit",
            DocumentSlot::Alvara => "alvara",
        }
    }
}

impl fmt::Display for DocumentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A picked document after normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    /// Local file to upload.
    pub path: PathBuf,
    /// The URI the user picked.
    pub original_uri: String,
    /// Lower-case extension of `path` (`"pdf"` after a conversion).
    pub extension: String,
    /// `true` when `path` is a PDF this crate rendered from an image.
    pub converted: bool,
    /// `true` when this crate created `path` (a render or a decoded `data:`
    /// URI) and may delete it. User files are never owned.
    #[serde(default)]
    pub generated: bool,
}

impl NormalizedDocument {
    pub fn is_pdf(&self) -> bool {
        self.extension == "pdf"
    }

    /// MIME type matching the real file format.
    pub fn mime_type(&self) -> &'static str {
        mime_for_extension(&self.extension)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// MIME type for a lower-case file extension.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Populated document slots. Replacing a slot yields a new value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSlots {
    bi_front: Option<NormalizedDocument>,
    bi_back: Option<NormalizedDocument>,
    nuit: Option<NormalizedDocument>,
    alvara: Option<NormalizedDocument>,
}

impl DocumentSlots {
    pub fn get(&self, slot: DocumentSlot) -> Option<&NormalizedDocument> {
        self.slot_ref(slot).as_ref()
    }

    /// Copy with `slot` set to `doc`.
    pub fn with(&self, slot: DocumentSlot, doc: NormalizedDocument) -> Self {
        let mut next = self.clone();
        *next.slot_mut(slot) = Some(doc);
        next
    }

    /// Copy with `slot` cleared.
    pub fn without(&self, slot: DocumentSlot) -> Self {
        let mut next = self.clone();
        *next.slot_mut(slot) = None;
        next
    }

    pub fn has_any_document(&self) -> bool {
        DocumentSlot::ALL.iter().any(|s| self.get(*s).is_some())
    }

    /// Populated slots in [`DocumentSlot::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (DocumentSlot, &NormalizedDocument)> {
        DocumentSlot::ALL
            .into_iter()
            .filter_map(move |s| self.get(s).map(|d| (s, d)))
    }

    fn slot_ref(&self, slot: DocumentSlot) -> &Option<NormalizedDocument> {
        match slot {
            DocumentSlot::BiFront => &self.bi_front,
            DocumentSlot::BiBack => &self.bi_back,
            DocumentSlot::Nuit => &self.nuit,
            DocumentSlot::Alvara => &self.alvara,
        }
    }

    fn slot_mut(&mut self, slot: DocumentSlot) -> &mut Option<NormalizedDocument> {
        match slot {
            DocumentSlot::BiFront => &mut self.bi_front,
            DocumentSlot::BiBack => &mut self.bi_back,
            DocumentSlot::Nuit => &mut self.nuit,
            DocumentSlot::Alvara => &mut self.alvara,
        }
    }
}

// ── Session & results ────────────────────────────────────────────────────

/// The user returned by the login endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Backend id; numeric or string depending on deployment.
    #[serde(default)]
    pub id: serde_json::Value,
    #[serde(default, alias = "nome")]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AuthenticatedUser {
    /// The id rendered as text (used for `angariador_id`), if present.
    pub fn id_string(&self) -> Option<String> {
        json_scalar_to_string(&self.id)
    }
}

/// Render a JSON number or string as text.
pub(crate) fn json_scalar_to_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// Server-assigned registration id, or [`crate::api::UNKNOWN_REGISTRATION_ID`].
    pub registration_id: String,
    pub status: u16,
    /// Full response body for callers that need more than the id.
    pub raw: serde_json::Value,
}

/// Everything collected so far. Each field is `None`/default until its
/// owning step completes.
#[derive(Debug, Clone, Default)]
pub struct WizardState {
    pub user: Option<AuthenticatedUser>,
    pub token_verified: bool,
    pub profile: Option<ProfileType>,
    pub personal: Option<PersonalData>,
    /// Password chosen for the new partner account.
    pub password: Option<SecretString>,
    pub commercial: Option<CommercialData>,
    pub documents: DocumentSlots,
    /// Signature blob from the signature pad (usually a PNG data URI).
    pub signature: Option<String>,
    /// ISO-8601 submission date.
    pub submitted_at: Option<String>,
    pub receipt: Option<SubmissionReceipt>,
}

impl WizardState {
    pub fn with_documents(&self, documents: DocumentSlots) -> Self {
        Self {
            documents,
            ..self.clone()
        }
    }

    pub fn with_signature(
        &self,
        signature: impl Into<String>,
        submitted_at: impl Into<String>,
    ) -> Self {
        Self {
            signature: Some(signature.into()),
            submitted_at: Some(submitted_at.into()),
            ..self.clone()
        }
    }
}
