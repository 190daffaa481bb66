//! Submission assembly: wizard data → multipart parts.
//!
//! The backend expects one `multipart/form-data` POST. Scalars travel as
//! plain text parts, nested collections as JSON-encoded text parts that the
//! server parses itself, and each document as a file part.
//!
//! Assembly is pure: [`SubmissionRequest`] lists the parts (file parts by
//! path) so it can be inspected and tested without a network. Files are
//! only read when [`SubmissionRequest::into_form`] builds the reqwest form.

use crate::error::OnboardingError;
use crate::model::{
    CommercialData, DocumentSlot, DocumentSlots, PersonalData, ProfileType, WizardState,
};
use crate::validate::{normalize_phone, validate_review};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Payload of one multipart part.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartBody {
    Text(String),
    File {
        path: PathBuf,
        file_name: String,
        mime: &'static str,
    },
}

/// One named multipart part.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormPart {
    pub name: String,
    pub body: PartBody,
}

/// The assembled, not yet sent, submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRequest {
    parts: Vec<FormPart>,
    dropped_slots: Vec<DocumentSlot>,
}

impl SubmissionRequest {
    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    /// First text part called `name`.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|p| match &p.body {
            PartBody::Text(t) if p.name == name => Some(t.as_str()),
            _ => None,
        })
    }

    /// First file part called `name`.
    pub fn file(&self, name: &str) -> Option<&FormPart> {
        self.parts
            .iter()
            .find(|p| p.name == name && matches!(p.body, PartBody::File { .. }))
    }

    pub fn has_file(&self, name: &str) -> bool {
        self.file(name).is_some()
    }

    /// Number of parts (text or file) called `name`.
    pub fn count(&self, name: &str) -> usize {
        self.parts.iter().filter(|p| p.name == name).count()
    }

    pub fn file_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p.body, PartBody::File { .. }))
            .count()
    }

    /// Populated slots the backend has no field for; not transmitted.
    pub fn dropped_slots(&self) -> &[DocumentSlot] {
        &self.dropped_slots
    }

    /// Read the document files and build the reqwest form.
    pub async fn into_form(self) -> Result<Form, OnboardingError> {
        let mut form = Form::new();
        for part in self.parts {
            form = match part.body {
                PartBody::Text(text) => form.text(part.name, text),
                PartBody::File {
                    path,
                    file_name,
                    mime,
                } => {
                    let bytes = tokio::fs::read(&path)
                        .await
                        .map_err(|source| OnboardingError::Io {
                            path: path.clone(),
                            source,
                        })?;
                    let file_part = Part::bytes(bytes)
                        .file_name(file_name)
                        .mime_str(mime)
                        .map_err(|e| OnboardingError::Internal(format!("bad MIME type: {e}")))?;
                    form.part(part.name, file_part)
                }
            };
        }
        Ok(form)
    }
}

/// Assemble a merchant submission from commercial data and documents.
///
/// # Errors
/// [`OnboardingError::Validation`] when `signature` or `submitted_at` is
/// missing or blank; nothing is built and nothing is sent.
pub fn assemble(
    commercial: &CommercialData,
    documents: &DocumentSlots,
    signature: Option<&str>,
    submitted_at: Option<&str>,
    submitter_id: Option<&str>,
) -> Result<SubmissionRequest, OnboardingError> {
    build(AssemblyInput {
        partner_type: ProfileType::Merchant,
        commercial,
        personal: None,
        documents,
        signature,
        submitted_at,
        submitter_id,
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
    })
}

/// Assemble the submission for whatever profile the wizard collected.
///
/// Agents have no commercial step; their designation and contact come from
/// the personal data.
pub fn assemble_from_state(state: &WizardState) -> Result<SubmissionRequest, OnboardingError> {
    let partner_type = state.profile.ok_or_else(|| {
        OnboardingError::invalid("tipo_parceiro", "select a profile before submitting")
    })?;

    let empty = CommercialData::default();
    let commercial = match (partner_type, state.commercial.as_ref()) {
        (_, Some(c)) => c,
        (ProfileType::Agent, None) => &empty,
        (ProfileType::Merchant, None) => {
            return Err(OnboardingError::invalid(
                "nome_comercial",
                "commercial data is required for merchants",
            ))
        }
    };

    let submitter_id = state.user.as_ref().and_then(|u| u.id_string());

    build(AssemblyInput {
        partner_type,
        commercial,
        personal: state.personal.as_ref(),
        documents: &state.documents,
        signature: state.signature.as_deref(),
        submitted_at: state.submitted_at.as_deref(),
        submitter_id: submitter_id.as_deref(),
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
    })
}

// ── Internal ─────────────────────────────────────────────────────────────

struct AssemblyInput<'a> {
    partner_type: ProfileType,
    commercial: &'a CommercialData,
    personal: Option<&'a PersonalData>,
    documents: &'a DocumentSlots,
    signature: Option<&'a str>,
    submitted_at: Option<&'a str>,
    submitter_id: Option<&'a str>,
    timestamp_ms: i64,
}

fn build(input: AssemblyInput<'_>) -> Result<SubmissionRequest, OnboardingError> {
    validate_review(input.signature, input.submitted_at)?;

    let c = input.commercial;
    let mut parts = Vec::new();

    let designacao = match (input.partner_type, input.personal) {
        (ProfileType::Agent, Some(p)) if c.nome_comercial.trim().is_empty() => p.nome.as_str(),
        _ => c.nome_comercial.as_str(),
    };
    let contacto = input.personal.map(|p| normalize_phone(&p.telefone));

    push_text(&mut parts, "tipo_parceiro", Some(input.partner_type.wire_name()));
    push_text(&mut parts, "designacao", Some(designacao));
    push_text(&mut parts, "contacto_agente", contacto.as_deref());
    push_text(&mut parts, "tipo_empresa", c.tipo_empresa.as_deref());
    push_text(&mut parts, "natureza_actividade", c.natureza_actividade.as_deref());
    push_text(&mut parts, "nuit", Some(c.nuit.as_str()));
    push_text(&mut parts, "alvara", Some(c.alvara.as_str()));
    push_text(&mut parts, "banco", c.banco.as_deref());
    push_text(&mut parts, "numero_conta", c.numero_conta.as_deref());
    push_text(&mut parts, "bairro_ref", c.bairro_ref.as_deref());
    push_text(&mut parts, "profissao", c.profissao.as_deref());

    if !c.address.is_empty() {
        push_json(&mut parts, "endereco", &address_json(c));
    }
    if !c.owners.is_empty() {
        push_json(&mut parts, "proprietarios", &owners_json(c));
    }
    if !c.assistants.is_empty() {
        push_json(&mut parts, "assistentes", &assistants_json(c));
    }
    if !c.establishments.is_empty() {
        push_json(&mut parts, "estabelecimentos", &establishments_json(c));
    }

    push_text(&mut parts, "assinatura_adesao", input.signature);
    push_text(&mut parts, "data_adesao", input.submitted_at);
    push_text(&mut parts, "angariador_id", input.submitter_id);

    let mut dropped_slots = Vec::new();
    for (slot, doc) in input.documents.iter() {
        let Some(field) = slot.backend_field() else {
            warn!(
                "Document slot '{}' has no backend field; '{}' will not be sent",
                slot,
                doc.path.display()
            );
            dropped_slots.push(slot);
            continue;
        };
        let file_name = format!(
            "{field}_{}.{}",
            input.timestamp_ms,
            file_extension(&doc.extension)
        );
        parts.push(FormPart {
            name: field.to_string(),
            body: PartBody::File {
                path: doc.path.clone(),
                file_name,
                mime: doc.mime_type(),
            },
        });
    }

    debug!(
        "Assembled submission: {} parts, {} dropped slots",
        parts.len(),
        dropped_slots.len()
    );

    Ok(SubmissionRequest {
        parts,
        dropped_slots,
    })
}

fn file_extension(ext: &str) -> &str {
    if ext.is_empty() {
        "bin"
    } else {
        ext
    }
}

/// Append a text part unless the value is missing or blank.
fn push_text(parts: &mut Vec<FormPart>, name: &str, value: Option<&str>) {
    if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
        parts.push(FormPart {
            name: name.to_string(),
            body: PartBody::Text(v.to_string()),
        });
    }
}

fn push_json(parts: &mut Vec<FormPart>, name: &str, value: &Value) {
    parts.push(FormPart {
        name: name.to_string(),
        body: PartBody::Text(value.to_string()),
    });
}

fn address_json(c: &CommercialData) -> Value {
    let a = &c.address;
    json!({
        "provincia": a.provincia,
        "distrito": a.distrito,
        "bairro": a.bairro,
        "avenida": a.avenida,
        "numero": a.numero,
        "referencia": a.referencia,
    })
}

fn owners_json(c: &CommercialData) -> Value {
    c.owners
        .iter()
        .map(|o| {
            json!({
                "nome": o.nome.trim(),
                "telefone": normalize_phone(&o.telefone),
                "bi": o.bi_numero,
                "quota": o.quota,
            })
        })
        .collect()
}

fn assistants_json(c: &CommercialData) -> Value {
    c.assistants
        .iter()
        .map(|a| {
            json!({
                "nome": a.nome.trim(),
                "telefone": normalize_phone(&a.telefone),
            })
        })
        .collect()
}

fn establishments_json(c: &CommercialData) -> Value {
    c.establishments
        .iter()
        .map(|e| {
            json!({
                "designacao": e.designacao.trim(),
                "endereco": e.endereco.trim(),
                "latitude": e.latitude,
                "longitude": e.longitude,
            })
        })
        .collect()
}
