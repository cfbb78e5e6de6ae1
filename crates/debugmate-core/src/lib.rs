//! Domain model and pure engines of the DebugMate assistant.
//!
//! Everything here is free of I/O: the automation agent, the LLM and
//! durable storage are reached through the traits in [`agent`], [`llm`]
//! and [`storage`].

pub mod action;
pub mod agent;
pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod parser;
pub mod session;
pub mod storage;
pub mod suggestion;

// Re-export common error type
pub use error::{DebugError, Result};
