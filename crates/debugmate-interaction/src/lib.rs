//! LLM backends for the DebugMate assistant.

pub mod claude_api_client;

pub use claude_api_client::{ClaudeApiClient, SseEvent, parse_sse_line};
