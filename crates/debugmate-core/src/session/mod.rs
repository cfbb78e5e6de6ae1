//! Debug session domain module.
//!
//! # Module Structure
//!
//! - `model`: Session lifecycle entity (`DebugSession`, `SessionStatus`)
//! - `message`: Conversation message types (`MessageRole`, `Message`)
//! - `history`: Bounded conversation ring (`ConversationHistory`)

mod history;
mod message;
mod model;

// Re-export public API
pub use history::ConversationHistory;
pub use message::{Message, MessageRole};
pub use model::{DebugSession, SessionStart, SessionStatus};
