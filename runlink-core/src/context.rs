use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// Identifies the conversation between exactly one user and one runner.
///
/// The string form `user-{userId}-runner-{runnerId}` is deterministic: both
/// participants compute it independently and converge on the same channel
/// room without any discovery handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ContextId {
    user_id: String,
    runner_id: String,
}

impl ContextId {
    pub fn new(user_id: &str, runner_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            runner_id: runner_id.to_string(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn runner_id(&self) -> &str {
        &self.runner_id
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user-{}-runner-{}", self.user_id, self.runner_id)
    }
}

impl std::str::FromStr for ContextId {
    type Err = FlowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("user-")
            .ok_or_else(|| FlowError::InvalidContextId(s.to_string()))?;
        let (user_id, runner_id) = rest
            .split_once("-runner-")
            .ok_or_else(|| FlowError::InvalidContextId(s.to_string()))?;
        if user_id.is_empty() || runner_id.is_empty() {
            return Err(FlowError::InvalidContextId(s.to_string()));
        }
        Ok(Self::new(user_id, runner_id))
    }
}

impl From<ContextId> for String {
    fn from(id: ContextId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ContextId {
    type Error = FlowError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}
