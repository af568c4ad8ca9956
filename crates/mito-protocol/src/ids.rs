use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of a freshly minted [`CorrelationId`].
pub const CORRELATION_ID_LEN: usize = 12;

/// Protocol-level id pairing one outbound request with its reply.
///
/// Minted per `send`, never reused, unrelated to backend state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CORRELATION_ID_LEN - 1)
            .map(char::from)
            .collect();
        Self(format!("_{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a logical backend step. Owned by the caller: passing the same
/// id back into an edit asks the backend to overwrite that step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Returns the supplied id when it is usable, otherwise mints a new one.
    pub fn reuse_or_generate(existing: Option<StepId>) -> Self {
        match existing {
            Some(step_id) if !step_id.is_empty() => step_id,
            _ => Self::generate(),
        }
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StepId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn correlation_ids_are_pairwise_distinct() {
        let ids: HashSet<CorrelationId> = (0..10_000).map(|_| CorrelationId::generate()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn correlation_ids_are_short_and_prefixed() {
        let id = CorrelationId::generate();
        assert_eq!(id.as_str().len(), CORRELATION_ID_LEN);
        assert!(id.as_str().starts_with('_'));
    }

    #[test]
    fn blank_step_ids_are_replaced() {
        let minted = StepId::reuse_or_generate(Some(StepId::from("  ")));
        assert!(!minted.is_empty());
        assert_ne!(minted.as_str(), "  ");

        let kept = StepId::reuse_or_generate(Some(StepId::from("step-7")));
        assert_eq!(kept.as_str(), "step-7");
    }
}
