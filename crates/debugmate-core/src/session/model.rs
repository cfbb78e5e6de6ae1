//! Debug session lifecycle entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{DebugContext, ErrorInfo};

/// Lifecycle state of a [`DebugSession`].
///
/// `Active` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    Active,
    /// A fix succeeded.
    Resolved,
    /// Superseded by a new session or discarded by the operator.
    Abandoned,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

/// One debugging conversation tied to a single failed test step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSession {
    pub id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub test_case_id: Option<String>,
    pub test_case_name: Option<String>,
    pub step_id: Option<String>,
    pub step_index: Option<usize>,
    pub error: Option<ErrorInfo>,
    /// Base64 screenshot captured at failure time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub status: SessionStatus,
}

/// Everything known about a step failure at the moment a session starts.
#[derive(Debug, Clone, Default)]
pub struct SessionStart {
    pub test_case_id: Option<String>,
    pub test_case_name: Option<String>,
    pub step_id: Option<String>,
    pub step_index: Option<usize>,
    pub error: Option<ErrorInfo>,
    pub screenshot: Option<String>,
    /// Initial failure snapshot; refreshed later by the diagnostics collector.
    pub context: Option<DebugContext>,
}

impl DebugSession {
    /// Creates an active session from a step failure.
    pub fn start(start: &SessionStart) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            start_time: Utc::now(),
            end_time: None,
            test_case_id: start.test_case_id.clone(),
            test_case_name: start.test_case_name.clone(),
            step_id: start.step_id.clone(),
            step_index: start.step_index,
            error: start.error.clone(),
            screenshot: start.screenshot.clone(),
            status: SessionStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Moves the session into a terminal state.
    ///
    /// Returns `false` when the session had already ended.
    pub fn finish(&mut self, status: SessionStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.end_time = Some(Utc::now());
        true
    }

    /// Error message of the failing step, or an empty string.
    pub fn error_message(&self) -> &str {
        self.error.as_ref().map(|e| e.message.as_str()).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_is_one_way() {
        let mut session = DebugSession::start(&SessionStart::default());
        assert!(session.is_active());

        assert!(session.finish(SessionStatus::Resolved));
        assert_eq!(session.status, SessionStatus::Resolved);
        assert!(session.end_time.is_some());

        assert!(!session.finish(SessionStatus::Abandoned));
        assert_eq!(session.status, SessionStatus::Resolved);
    }

    #[test]
    fn test_finish_rejects_active_target() {
        let mut session = DebugSession::start(&SessionStart::default());
        assert!(!session.finish(SessionStatus::Active));
        assert!(session.is_active());
    }
}
