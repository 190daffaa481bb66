//! # sirac-onboarding
//!
//! Client library for registering SIRAC agents and merchants.
//!
//! The mobile onboarding flow is a multi-step wizard ending in a single
//! `multipart/form-data` POST. This crate implements everything behind the
//! screens: step sequencing, client-side validation, session persistence,
//! converting photographed documents into PDFs, and assembling and sending
//! the registration.
//!
//! ## Pipeline Overview
//!
//! ```text
//! login ─▶ token ─▶ welcome ─▶ profile ─▶ personal ─▶ password ─┬▶ commercial ─┐
//!                                                              └──────────────┴▶ documents ─▶ review ─▶ success
//!
//! documents:  picked URI ─▶ resolve ─▶ image? ─▶ render PDF (spawn_blocking)
//!                                        └─ no ─▶ passthrough
//! review:     wizard state ─▶ assemble parts ─▶ POST /api/v1/parceiros/
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sirac_onboarding::{ClientConfig, DocumentSlot, Onboarding, ProfileType, Session, StepInput};
//! use sirac_onboarding::{CommercialData, PersonalData};
//! use secrecy::SecretString;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder().base_url("https://sirac.example.org").build()?;
//!     let mut flow = Onboarding::new(config, Session::open_default()?)?;
//!
//!     flow.login("ana@sirac.co.mz", &SecretString::from("segredo123")).await?;
//!     flow.verify_token()?;
//!     flow.advance(StepInput::Start)?;
//!     flow.advance(StepInput::Profile(ProfileType::Merchant))?;
//!     flow.advance(StepInput::Personal(PersonalData {
//!         nome: "Ana Macuácua".into(),
//!         telefone: "841234567".into(),
//!         bi_numero: "110100123456B".into(),
//!     }))?;
//!     let pw = SecretString::from("novaSenha1");
//!     flow.advance(StepInput::Password { password: pw.clone(), confirmation: pw })?;
//!     flow.advance(StepInput::Commercial(CommercialData {
//!         nome_comercial: "Loja X".into(),
//!         nuit: "123456789".into(),
//!         alvara: "45/2024".into(),
//!         ..Default::default()
//!     }))?;
//!     flow.attach_document(DocumentSlot::BiFront, "/sdcard/DCIM/bi.jpg").await?;
//!     flow.continue_with_documents()?;
//!     flow.sign("data:image/png;base64,iVBORw0KGgo=", None)?;
//!     let receipt = flow.submit().await?;
//!     println!("registered: {}", receipt.registration_id);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `sirac-onboard` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! sirac-onboarding = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod notify;
pub mod onboard;
pub mod pipeline;
pub mod session;
pub mod validate;
pub mod wizard;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use api::{ApiClient, LoginResponse, UNKNOWN_REGISTRATION_ID};
pub use config::{ClientConfig, ClientConfigBuilder, PageSize};
pub use error::{ConversionError, OnboardingError, ValidationErrors};
pub use model::{
    Address, Assistant, AuthenticatedUser, CommercialData, DocumentSlot, DocumentSlots,
    Establishment, NormalizedDocument, Owner, PersonalData, ProfileType, SubmissionReceipt,
    WizardState,
};
pub use notify::{Alert, AlertKind, AlertSink, LogAlertSink, NoopAlertSink, SharedAlertSink};
pub use onboard::{Onboarding, OnboardingRecord};
pub use pipeline::assemble::{assemble, assemble_from_state, FormPart, PartBody, SubmissionRequest};
pub use pipeline::normalize::Normalizer;
pub use session::{Session, StaticToken, TokenProvider};
pub use wizard::{StepInput, Wizard, WizardStep};
