//! Client-side form validation.
//!
//! Each function checks one screen's input and returns every failing field
//! at once, so a UI can mark them all inline. Nothing here touches the
//! network; a form that passes can still be rejected by the backend.

use crate::error::{OnboardingError, ValidationErrors};
use crate::model::{CommercialData, DocumentSlots, PersonalData};
use secrecy::{ExposeSecret, SecretString};

const REQUIRED: &str = "is required";

/// Minimum length for the account password.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Login form: `email` and `password`.
pub fn validate_login(email: &str, password: &SecretString) -> Result<(), OnboardingError> {
    let mut errs = ValidationErrors::new();
    let email = email.trim();
    if email.is_empty() {
        errs.add("email", REQUIRED);
    } else if !looks_like_email(email) {
        errs.add("email", "is not a valid e-mail address");
    }
    if password.expose_secret().is_empty() {
        errs.add("password", REQUIRED);
    }
    errs.into_result()
}

/// Personal data screen.
pub fn validate_personal(data: &PersonalData) -> Result<(), OnboardingError> {
    let mut errs = ValidationErrors::new();

    if data.nome.trim().is_empty() {
        errs.add("nome", REQUIRED);
    } else if data.nome.trim().chars().count() < 3 {
        errs.add("nome", "must have at least 3 characters");
    }

    check_phone(&mut errs, "telefone", &data.telefone);

    let bi = data.bi_numero.trim();
    if bi.is_empty() {
        errs.add("bi_numero", REQUIRED);
    } else if !is_bi_number(bi) {
        errs.add("bi_numero", "must be 12 digits followed by a letter");
    }

    errs.into_result()
}

/// Password creation screen.
pub fn validate_password(
    password: &SecretString,
    confirmation: &SecretString,
) -> Result<(), OnboardingError> {
    let mut errs = ValidationErrors::new();
    let pwd = password.expose_secret();

    if pwd.is_empty() {
        errs.add("password", REQUIRED);
    } else {
        if pwd.chars().count() < MIN_PASSWORD_LEN {
            errs.add(
                "password",
                format!("must have at least {MIN_PASSWORD_LEN} characters"),
            );
        }
        if !pwd.chars().any(|c| c.is_alphabetic()) || !pwd.chars().any(|c| c.is_ascii_digit()) {
            errs.add("password", "must contain letters and digits");
        }
    }
    if pwd != confirmation.expose_secret() {
        errs.add("password_confirmation", "does not match");
    }

    errs.into_result()
}

/// Commercial data screen, including the nested collections.
pub fn validate_commercial(data: &CommercialData) -> Result<(), OnboardingError> {
    let mut errs = ValidationErrors::new();

    if data.nome_comercial.trim().is_empty() {
        errs.add("nome_comercial", REQUIRED);
    }

    let nuit = data.nuit.trim();
    if nuit.is_empty() {
        errs.add("nuit", REQUIRED);
    } else if nuit.len() != 9 || !nuit.chars().all(|c| c.is_ascii_digit()) {
        errs.add("nuit", "must have exactly 9 digits");
    }

    if data.alvara.trim().is_empty() {
        errs.add("alvara", REQUIRED);
    }

    if let Some(conta) = data.numero_conta.as_deref() {
        if !conta.trim().is_empty() && data.banco.as_deref().unwrap_or("").trim().is_empty() {
            errs.add("banco", "is required when an account number is given");
        }
    }

    for (i, owner) in data.owners.iter().enumerate() {
        if owner.nome.trim().is_empty() {
            errs.add(format!("owners[{i}].nome"), REQUIRED);
        }
        check_phone(&mut errs, &format!("owners[{i}].telefone"), &owner.telefone);
        if let Some(q) = owner.quota {
            if !(0.0..=100.0).contains(&q) {
                errs.add(format!("owners[{i}].quota"), "must be between 0 and 100");
            }
        }
    }

    for (i, assistant) in data.assistants.iter().enumerate() {
        if assistant.nome.trim().is_empty() {
            errs.add(format!("assistants[{i}].nome"), REQUIRED);
        }
        check_phone(&mut errs, &format!("assistants[{i}].telefone"), &assistant.telefone);
    }

    for (i, est) in data.establishments.iter().enumerate() {
        if est.designacao.trim().is_empty() {
            errs.add(format!("establishments[{i}].designacao"), REQUIRED);
        }
        if let Some(lat) = est.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                errs.add(format!("establishments[{i}].latitude"), "out of range");
            }
        }
        if let Some(lon) = est.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                errs.add(format!("establishments[{i}].longitude"), "out of range");
            }
        }
    }

    errs.into_result()
}

/// Document upload screen: at least one slot must be filled.
pub fn validate_documents(docs: &DocumentSlots) -> Result<(), OnboardingError> {
    if docs.has_any_document() {
        Ok(())
    } else {
        Err(OnboardingError::invalid(
            "documents",
            "attach at least one document",
        ))
    }
}

/// Review screen: signature and an ISO-8601 submission date.
pub fn validate_review(
    signature: Option<&str>,
    submitted_at: Option<&str>,
) -> Result<(), OnboardingError> {
    let mut errs = ValidationErrors::new();

    if signature.map(str::trim).unwrap_or("").is_empty() {
        errs.add("assinatura_adesao", REQUIRED);
    }

    match submitted_at.map(str::trim) {
        None | Some("") => errs.add("data_adesao", REQUIRED),
        Some(date) if !is_iso8601(date) => {
            errs.add("data_adesao", "must be an ISO-8601 date")
        }
        Some(_) => {}
    }

    errs.into_result()
}

// ── Field rules ──────────────────────────────────────────────────────────

/// Strip spaces and the `+258` country code from a Mozambican number.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let digits = digits.strip_prefix("+258").unwrap_or(&digits);
    let digits = digits.strip_prefix("00258").unwrap_or(digits);
    digits.to_string()
}

fn check_phone(errs: &mut ValidationErrors, field: &str, raw: &str) {
    let phone = normalize_phone(raw);
    if phone.is_empty() {
        errs.add(field, REQUIRED);
    } else if !is_mobile_number(&phone) {
        errs.add(field, "must be a 9-digit number starting with 82–87");
    }
}

fn is_mobile_number(phone: &str) -> bool {
    phone.len() == 9
        && phone.chars().all(|c| c.is_ascii_digit())
        && matches!(&phone[..2], "82" | "83" | "84" | "85" | "86" | "87")
}

fn is_bi_number(bi: &str) -> bool {
    let chars: Vec<char> = bi.chars().collect();
    chars.len() == 13
        && chars[..12].iter().all(|c| c.is_ascii_digit())
        && chars[12].is_ascii_alphabetic()
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn is_iso8601(date: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(date).is_ok()
        || chrono::NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok()
}
