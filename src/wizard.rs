//! Step sequencing for the onboarding wizard.
//!
//! ```text
//! Login ─▶ TokenVerification ─▶ Welcome ─▶ ProfileSelect ─▶ PersonalData ─▶ PasswordCreate
//!                                                                              │
//!                              ┌──────────── Merchant ─────────────────────────┤
//!                              ▼                                               │ Agent
//!                        CommercialData ─▶ DocumentUpload ◀────────────────────┘
//!                                               │
//!                                               ▼
//!                                            Review ─▶ Success
//! ```
//!
//! [`Wizard`] holds only the current step, the current [`WizardState`] and a
//! back-stack of earlier `(step, state)` snapshots. Transitions are computed
//! by [`transition`], a pure function from the previous state to a new one;
//! a rejected input leaves the wizard untouched.

use crate::error::OnboardingError;
use crate::model::{
    AuthenticatedUser, CommercialData, DocumentSlots, PersonalData, ProfileType,
    SubmissionReceipt, WizardState,
};
use crate::validate;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// The screens of the wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Login,
    TokenVerification,
    Welcome,
    ProfileSelect,
    PersonalData,
    PasswordCreate,
    CommercialData,
    DocumentUpload,
    Review,
    Success,
}

impl WizardStep {
    pub fn name(&self) -> &'static str {
        match self {
            WizardStep::Login => "login",
            WizardStep::TokenVerification => "token verification",
            WizardStep::Welcome => "welcome",
            WizardStep::ProfileSelect => "profile selection",
            WizardStep::PersonalData => "personal data",
            WizardStep::PasswordCreate => "password creation",
            WizardStep::CommercialData => "commercial data",
            WizardStep::DocumentUpload => "document upload",
            WizardStep::Review => "review",
            WizardStep::Success => "success",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WizardStep::Success)
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The "continue" payload of each step.
#[derive(Debug, Clone)]
pub enum StepInput {
    /// Login succeeded for this user.
    LoggedIn(AuthenticatedUser),
    /// A session token is present.
    TokenVerified,
    /// The welcome screen's start button.
    Start,
    Profile(ProfileType),
    Personal(PersonalData),
    Password {
        password: SecretString,
        confirmation: SecretString,
    },
    Commercial(CommercialData),
    Documents(DocumentSlots),
    /// The backend accepted the registration.
    Submitted(SubmissionReceipt),
}

impl StepInput {
    fn name(&self) -> &'static str {
        match self {
            StepInput::LoggedIn(_) => "log in",
            StepInput::TokenVerified => "verify the token",
            StepInput::Start => "start",
            StepInput::Profile(_) => "select a profile",
            StepInput::Personal(_) => "enter personal data",
            StepInput::Password { .. } => "create a password",
            StepInput::Commercial(_) => "enter commercial data",
            StepInput::Documents(_) => "continue with documents",
            StepInput::Submitted(_) => "complete the submission",
        }
    }
}

/// Compute the successor of `step` for `input`.
///
/// Validates the input first; on failure nothing is produced.
pub fn transition(
    step: WizardStep,
    state: &WizardState,
    input: StepInput,
) -> Result<(WizardStep, WizardState), OnboardingError> {
    use WizardStep as S;

    let next = match (step, input) {
        (S::Login, StepInput::LoggedIn(user)) => (
            S::TokenVerification,
            WizardState {
                user: Some(user),
                ..state.clone()
            },
        ),
        (S::TokenVerification, StepInput::TokenVerified) => (
            S::Welcome,
            WizardState {
                token_verified: true,
                ..state.clone()
            },
        ),
        (S::Welcome, StepInput::Start) => (S::ProfileSelect, state.clone()),
        (S::ProfileSelect, StepInput::Profile(profile)) => (
            S::PersonalData,
            WizardState {
                profile: Some(profile),
                ..state.clone()
            },
        ),
        (S::PersonalData, StepInput::Personal(data)) => {
            validate::validate_personal(&data)?;
            (
                S::PasswordCreate,
                WizardState {
                    personal: Some(data),
                    ..state.clone()
                },
            )
        }
        (
            S::PasswordCreate,
            StepInput::Password {
                password,
                confirmation,
            },
        ) => {
            validate::validate_password(&password, &confirmation)?;
            let fork = match state.profile {
                Some(ProfileType::Merchant) => S::CommercialData,
                Some(ProfileType::Agent) => S::DocumentUpload,
                None => {
                    return Err(OnboardingError::invalid(
                        "profile",
                        "select a profile first",
                    ))
                }
            };
            (
                fork,
                WizardState {
                    password: Some(password),
                    ..state.clone()
                },
            )
        }
        (S::CommercialData, StepInput::Commercial(data)) => {
            validate::validate_commercial(&data)?;
            (
                S::DocumentUpload,
                WizardState {
                    commercial: Some(data),
                    ..state.clone()
                },
            )
        }
        (S::DocumentUpload, StepInput::Documents(docs)) => {
            validate::validate_documents(&docs)?;
            (S::Review, state.with_documents(docs))
        }
        (S::Review, StepInput::Submitted(receipt)) => {
            validate::validate_review(state.signature.as_deref(), state.submitted_at.as_deref())?;
            (
                S::Success,
                WizardState {
                    receipt: Some(receipt),
                    ..state.clone()
                },
            )
        }
        (from, input) => {
            return Err(OnboardingError::InvalidTransition {
                from: from.to_string(),
                action: input.name().to_string(),
            })
        }
    };
    Ok(next)
}

/// The wizard: current step, current state and back-stack.
#[derive(Debug, Clone)]
pub struct Wizard {
    step: WizardStep,
    state: WizardState,
    history: Vec<(WizardStep, WizardState)>,
}

impl Default for Wizard {
    fn default() -> Self {
        Self::new()
    }
}

impl Wizard {
    /// A fresh wizard on the login screen.
    pub fn new() -> Self {
        Self {
            step: WizardStep::Login,
            state: WizardState::default(),
            history: Vec::new(),
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn into_state(self) -> WizardState {
        self.state
    }

    /// Number of snapshots "back" can return to.
    pub fn depth(&self) -> usize {
        self.history.len()
    }

    pub fn can_go_back(&self) -> bool {
        !self.step.is_terminal() && !self.history.is_empty()
    }

    /// Continue from the current step.
    pub fn advance(&mut self, input: StepInput) -> Result<WizardStep, OnboardingError> {
        let (next, state) = transition(self.step, &self.state, input)?;
        debug!("Wizard: {} → {}", self.step, next);

        let prev_step = std::mem::replace(&mut self.step, next);
        let prev_state = std::mem::replace(&mut self.state, state);
        if next.is_terminal() {
            self.history.clear();
        } else {
            self.history.push((prev_step, prev_state));
        }
        Ok(next)
    }

    /// Return to the previous step with the state it had then.
    pub fn back(&mut self) -> Result<WizardStep, OnboardingError> {
        if self.step.is_terminal() {
            return Err(self.rejected("go back"));
        }
        let (step, state) = self.history.pop().ok_or_else(|| self.rejected("go back"))?;
        debug!("Wizard: {} ← {}", step, self.step);
        self.step = step;
        self.state = state;
        Ok(step)
    }

    /// Replace the state of the current step without touching history.
    ///
    /// Used for edits that stay on one screen (attaching a document,
    /// signing).
    pub fn revise(
        &mut self,
        f: impl FnOnce(&WizardState) -> WizardState,
    ) -> Result<(), OnboardingError> {
        if self.step.is_terminal() {
            return Err(self.rejected("edit the form"));
        }
        self.state = f(&self.state);
        Ok(())
    }

    fn rejected(&self, action: &str) -> OnboardingError {
        OnboardingError::InvalidTransition {
            from: self.step.to_string(),
            action: action.to_string(),
        }
    }
}
