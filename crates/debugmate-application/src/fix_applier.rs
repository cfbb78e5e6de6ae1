//! Applies fixes through the external [`FixRunner`] and records outcomes in
//! the knowledge base.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use debugmate_core::knowledge::{KnowledgeBase, NewKnowledgeEntry, extract_error_pattern};
use debugmate_core::session::DebugSession;
use debugmate_core::suggestion::{FixOutcome, FixRunner, FixSuggestion};
use debugmate_core::{DebugError, Result};
use futures::FutureExt;
use tracing::{debug, warn};

#[derive(Default)]
pub struct FixApplier {
    runner: Option<Arc<dyn FixRunner>>,
}

impl FixApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runner(mut self, runner: Arc<dyn FixRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn has_runner(&self) -> bool {
        self.runner.is_some()
    }

    /// Runs the fix. Runner errors and panics become a failed outcome; only a
    /// missing runner is an error.
    pub async fn apply(&self, suggestion: &FixSuggestion, session: &DebugSession) -> Result<FixOutcome> {
        let runner = self
            .runner
            .as_ref()
            .ok_or_else(|| DebugError::config("no fix runner is configured"))?;

        let outcome = match AssertUnwindSafe(runner.apply(suggestion, session)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!("[FixApplier] Runner failed: {}", err);
                FixOutcome {
                    success: false,
                    message: err.to_string(),
                }
            }
            Err(_) => {
                warn!("[FixApplier] Runner panicked");
                FixOutcome {
                    success: false,
                    message: "fix runner panicked".to_string(),
                }
            }
        };
        Ok(outcome)
    }

    /// Records whether `suggestion` fixed the session's error.
    ///
    /// The fix is merged into the entry for the error pattern (created when
    /// missing) and the entry's success rate is updated. One call counts as
    /// one use of the entry. Returns the entry id, or `None` when the session
    /// carries no error to learn from.
    pub fn record(
        knowledge: &mut KnowledgeBase,
        session: &DebugSession,
        suggestion: &FixSuggestion,
        success: bool,
    ) -> Option<String> {
        let pattern = extract_error_pattern(session.error_message());
        if pattern.is_empty() {
            return None;
        }

        let id = knowledge.add_entry(
            NewKnowledgeEntry::new(pattern, vec![suggestion.clone()])
                .with_frequency(0)
                .with_tags(["fix".to_string(), suggestion.suggestion_type.to_string()]),
        );

        let key = suggestion.dedup_key();
        let fix_index = knowledge
            .get_entry(&id)
            .and_then(|entry| entry.fixes.iter().position(|f| f.dedup_key() == key));
        match fix_index.map(|index| knowledge.record_fix_used(&id, index)) {
            Some(Ok(_)) => {}
            Some(Err(err)) => debug!("[FixApplier] Could not mark fix as used: {}", err),
            None => debug!("[FixApplier] Fix '{}' missing from entry {}", suggestion.description, id),
        }

        match knowledge.update_success_rate(&id, success) {
            Ok(rate) => debug!("[FixApplier] {} success rate now {:.2}", id, rate),
            Err(err) => warn!("[FixApplier] Could not update success rate: {}", err),
        }
        Some(id)
    }
}
