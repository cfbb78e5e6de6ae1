//! Application layer of DebugMate: prompt assembly, fix generation and the
//! session orchestrator.

pub mod assistant_service;
pub mod context_builder;
pub mod fix_applier;
pub mod fix_generator;
pub mod messages;

pub use assistant_service::{AssistantObserver, DebugAssistantService, TENTATIVE_SUCCESS_RATE};
pub use context_builder::{ContextBuilder, Detail, PromptInput};
pub use fix_applier::FixApplier;
pub use fix_generator::{ErrorClass, FailureInput, FixSuggestionGenerator, classify_error};
