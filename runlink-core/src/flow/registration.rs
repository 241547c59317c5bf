use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Instant};
use tracing::warn;

use crate::error::{FlowError, Result};
use crate::flow::FlowTiming;
use crate::log::MessageLog;
use crate::message::{Affordance, Message, SenderType};

pub const FIELD_NAME: &str = "name";
pub const FIELD_PHONE: &str = "phone";
pub const FIELD_FLEET_TYPE: &str = "fleet_type";

const IN_PROGRESS: &str = "In progress…";
const VERIFYING_OTP: &str = "Verifying OTP…";
const TRY_AGAIN: &str = "Something went wrong. Please try again";

/// Who is registering. Runners answer one extra question (fleet type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Runner,
}

/// One question in the registration questionnaire.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub prompt: &'static str,
}

fn fields_for(role: Role) -> Vec<FieldSpec> {
    let mut fields = vec![
        FieldSpec {
            key: FIELD_NAME,
            prompt: "What's your name?",
        },
        FieldSpec {
            key: FIELD_PHONE,
            prompt: "What's your phone number?",
        },
    ];
    if role == Role::Runner {
        fields.push(FieldSpec {
            key: FIELD_FLEET_TYPE,
            prompt: "What type of fleet do you ride?",
        });
    }
    fields
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Asking,
    Submitting,
    AwaitingOtp,
    VerifyingOtp,
    Complete,
    FailedRetry,
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RegistrationState::Asking => "asking",
            RegistrationState::Submitting => "submitting",
            RegistrationState::AwaitingOtp => "awaiting_otp",
            RegistrationState::VerifyingOtp => "verifying_otp",
            RegistrationState::Complete => "complete",
            RegistrationState::FailedRetry => "failed_retry",
        };
        write!(f, "{}", s)
    }
}

/// Payload handed to the external registration backend. Opaque to the flow
/// beyond success or failure.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationSubmission {
    pub role: Role,
    pub name: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fleet_type: Option<String>,
}

/// External registration collaborator. Rejections name the failing field via
/// `FlowError::ValidationRejected`.
#[allow(async_fn_in_trait)]
pub trait RegistrationApi {
    async fn register(&self, submission: &RegistrationSubmission) -> Result<()>;
    async fn send_otp(&self, phone: &str) -> Result<()>;
    async fn verify_otp(&self, phone: &str, code: &str) -> Result<()>;
}

/// The registration questionnaire state machine.
///
/// Asks each field exactly once in order. A remote rejection resumes at the
/// failing field, keeping every previously validated answer; it never
/// restarts the questionnaire.
pub struct RegistrationFlow {
    role: Role,
    self_id: String,
    counterpart_id: String,
    fields: Vec<FieldSpec>,
    step: usize,
    /// Highest field index the backend has accepted. Tracked independently
    /// of `step` so retries resume at the right question.
    last_validated: Option<usize>,
    collected: HashMap<String, String>,
    state: RegistrationState,
    otp_sent_at: Option<Instant>,
    timing: FlowTiming,
}

impl RegistrationFlow {
    pub fn new(role: Role, self_id: &str, counterpart_id: &str, timing: FlowTiming) -> Self {
        Self {
            role,
            self_id: self_id.to_string(),
            counterpart_id: counterpart_id.to_string(),
            fields: fields_for(role),
            step: 0,
            last_validated: None,
            collected: HashMap::new(),
            state: RegistrationState::Asking,
            otp_sent_at: None,
            timing,
        }
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.collected.get(key).map(String::as_str)
    }

    /// The question currently awaiting an answer, if any.
    pub fn current_prompt(&self) -> Option<&'static str> {
        matches!(self.state, RegistrationState::Asking).then(|| self.fields[self.step].prompt)
    }

    fn sender_type(&self) -> SenderType {
        match self.role {
            Role::User => SenderType::User,
            Role::Runner => SenderType::Runner,
        }
    }

    /// Ask the first question.
    pub fn start(&mut self, log: &mut MessageLog) {
        log.append(Message::text(
            &self.counterpart_id,
            SenderType::Runner,
            self.fields[self.step].prompt,
        ));
    }

    /// Accept one answer. Whitespace-only input is a silent no-op. The last
    /// answer triggers the remote submission; remote failures resolve to a
    /// re-prompt, never an error from this method.
    pub async fn submit_answer<A: RegistrationApi>(
        &mut self,
        log: &mut MessageLog,
        api: &A,
        raw: &str,
    ) -> Result<()> {
        if self.state != RegistrationState::Asking {
            return Err(FlowError::UnexpectedInput(self.state.to_string()));
        }
        let answer = raw.trim();
        if answer.is_empty() {
            return Ok(());
        }

        log.append(Message::text(&self.self_id, self.sender_type(), answer));
        let key = self.fields[self.step].key;
        self.collected.insert(key.to_string(), answer.to_string());

        if self.step + 1 < self.fields.len() {
            self.step += 1;
            self.prompt_current(log, None).await;
            return Ok(());
        }

        self.submit(log, api).await;
        Ok(())
    }

    async fn prompt_current(&mut self, log: &mut MessageLog, prefix: Option<&str>) {
        tokio::time::sleep(self.timing.prompt_delay).await;
        let prompt = self.fields[self.step].prompt;
        let text = match prefix {
            Some(prefix) => format!("{} {}", prefix, prompt),
            None => prompt.to_string(),
        };
        log.append(Message::text(
            &self.counterpart_id,
            SenderType::Runner,
            &text,
        ));
    }

    fn submission(&self) -> RegistrationSubmission {
        RegistrationSubmission {
            role: self.role,
            name: self.collected.get(FIELD_NAME).cloned().unwrap_or_default(),
            phone: self.collected.get(FIELD_PHONE).cloned().unwrap_or_default(),
            fleet_type: self.collected.get(FIELD_FLEET_TYPE).cloned(),
        }
    }

    async fn submit<A: RegistrationApi>(&mut self, log: &mut MessageLog, api: &A) {
        self.state = RegistrationState::Submitting;
        log.append(Message::ephemeral_system(IN_PROGRESS));

        let submission = self.submission();
        let result = match timeout(self.timing.remote_timeout, api.register(&submission)).await {
            Ok(result) => result,
            Err(_) => Err(FlowError::Timeout("registration submit".to_string())),
        };

        match result {
            Ok(()) => {
                self.last_validated = Some(self.fields.len() - 1);
                self.state = RegistrationState::AwaitingOtp;
                self.otp_sent_at = Some(Instant::now());
                log.resolve_ephemeral(Some(Message::system(
                    "We sent a verification code to your phone",
                )));
            }
            Err(FlowError::ValidationRejected { field, reason }) => {
                warn!(%field, %reason, "registration rejected");
                self.state = RegistrationState::FailedRetry;
                log.resolve_ephemeral(None);
                log.remove_last_from(&self.self_id);
                self.fail_back_to(&field);
                self.prompt_current(log, Some("Let's try again.")).await;
                self.state = RegistrationState::Asking;
            }
            Err(err) => {
                warn!(error = %err, "registration did not complete");
                // Retryable: collected answers and the step cursor are kept.
                log.resolve_ephemeral(Some(Message::system(TRY_AGAIN)));
                self.state = RegistrationState::Asking;
            }
        }
    }

    fn fail_back_to(&mut self, field: &str) {
        if let Some(idx) = self.fields.iter().position(|f| f.key == field) {
            self.last_validated = if idx == 0 { None } else { Some(idx - 1) };
        }
        self.step = self.resume_index();
    }

    /// Index of the question to re-ask after a rejection. With nothing
    /// validated yet this is explicitly the first field.
    fn resume_index(&self) -> usize {
        self.last_validated.map_or(0, |i| i + 1)
    }

    /// Verify the OTP code. Failure re-arms `AwaitingOtp` with an inline
    /// resend affordance.
    pub async fn verify_otp<A: RegistrationApi>(
        &mut self,
        log: &mut MessageLog,
        api: &A,
        code: &str,
    ) -> Result<()> {
        if self.state != RegistrationState::AwaitingOtp {
            return Err(FlowError::UnexpectedInput(self.state.to_string()));
        }
        let code = code.trim();
        if code.is_empty() {
            return Ok(());
        }

        self.state = RegistrationState::VerifyingOtp;
        log.append(Message::ephemeral_system(VERIFYING_OTP));

        let phone = self.collected.get(FIELD_PHONE).cloned().unwrap_or_default();
        let result = match timeout(self.timing.remote_timeout, api.verify_otp(&phone, code)).await
        {
            Ok(result) => result,
            Err(_) => Err(FlowError::Timeout("otp verification".to_string())),
        };

        match result {
            Ok(()) => {
                self.state = RegistrationState::Complete;
                log.resolve_ephemeral(Some(Message::system("You're all set")));
            }
            Err(FlowError::ValidationRejected { .. }) => {
                self.state = RegistrationState::AwaitingOtp;
                log.resolve_ephemeral(Some(Message::text_with_affordance(
                    &self.counterpart_id,
                    SenderType::Runner,
                    "That code didn't match. Try again",
                    Some(Affordance::ResendLink),
                )));
            }
            Err(err) => {
                warn!(error = %err, "otp verification did not complete");
                self.state = RegistrationState::AwaitingOtp;
                log.resolve_ephemeral(Some(Message::system(TRY_AGAIN)));
            }
        }
        Ok(())
    }

    /// Seconds left on the resend cool-down, if it is still running.
    pub fn resend_wait(&self) -> Option<u64> {
        let sent_at = self.otp_sent_at?;
        let elapsed = sent_at.elapsed();
        if elapsed >= self.timing.otp_resend_cooldown {
            return None;
        }
        let remaining = self.timing.otp_resend_cooldown - elapsed;
        Some(remaining.as_secs().max(1))
    }

    pub fn can_resend(&self) -> bool {
        self.state == RegistrationState::AwaitingOtp && self.resend_wait().is_none()
    }

    /// Ask the backend for a fresh code. Gated by the cool-down window.
    pub async fn resend_otp<A: RegistrationApi>(&mut self, api: &A) -> Result<()> {
        if self.state != RegistrationState::AwaitingOtp {
            return Err(FlowError::UnexpectedInput(self.state.to_string()));
        }
        if let Some(remaining) = self.resend_wait() {
            return Err(FlowError::ResendCooldown(remaining));
        }
        let phone = self.collected.get(FIELD_PHONE).cloned().unwrap_or_default();
        match timeout(self.timing.remote_timeout, api.send_otp(&phone)).await {
            Ok(Ok(())) => {
                self.otp_sent_at = Some(Instant::now());
                Ok(())
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(FlowError::Timeout("otp resend".to_string())),
        }
    }
}
