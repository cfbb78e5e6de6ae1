//! Capability surface of the browser-automation agent.
//!
//! The executor is polymorphic over any backend that implements
//! [`AutomationAgent`] and [`Page`]. Only the primitives the assistant
//! actually drives are exposed here.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::MouseButton;

/// Failures raised by the automation backend.
///
/// The display text of `ElementNotFound` and `Timeout` is stable: fix
/// suggestion classification keys off "not found" and "timed out".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// No agent or page is attached.
    #[error("automation agent unavailable: {0}")]
    Unavailable(String),

    /// The backend does not implement this capability (e.g. no AI actions).
    #[error("capability not supported: {0}")]
    Unsupported(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("timed out: {0}")]
    Timeout(String),

    /// A page primitive failed.
    #[error("page error: {0}")]
    Page(String),

    #[error("{0}")]
    Other(String),
}

impl AgentError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

/// Element bounding box in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn center(&self) -> (f64, f64) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }
}

/// An element found by AI location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedElement {
    pub rect: Rect,
    #[serde(default)]
    pub description: Option<String>,
}

impl LocatedElement {
    pub fn center(&self) -> (f64, f64) {
        self.rect.center()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickOptions {
    pub button: MouseButton,
    pub click_count: u32,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            button: MouseButton::Left,
            click_count: 1,
        }
    }
}

/// Low-level page primitives.
#[async_trait]
pub trait Page: Send + Sync {
    async fn mouse_click(&self, x: f64, y: f64, options: ClickOptions) -> Result<(), AgentError>;
    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), AgentError>;
    async fn keyboard_type(&self, text: &str, delay_ms: Option<u64>) -> Result<(), AgentError>;
    async fn keyboard_down(&self, key: &str) -> Result<(), AgentError>;
    async fn keyboard_up(&self, key: &str) -> Result<(), AgentError>;
    async fn keyboard_press(&self, key: &str) -> Result<(), AgentError>;
    /// Evaluates a script in the page and returns its JSON result.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, AgentError>;
    /// Captures a PNG screenshot.
    async fn screenshot(&self) -> Result<Vec<u8>, AgentError>;
    async fn reload(&self) -> Result<(), AgentError>;
    async fn goto(&self, url: &str) -> Result<(), AgentError>;
    async fn go_back(&self) -> Result<(), AgentError>;
    async fn go_forward(&self) -> Result<(), AgentError>;
    async fn url(&self) -> Result<String, AgentError>;
    async fn title(&self) -> Result<String, AgentError>;
    async fn content(&self) -> Result<String, AgentError>;
}

/// AI-driven automation capabilities plus access to the raw page.
#[async_trait]
pub trait AutomationAgent: Send + Sync {
    /// Performs a natural-language instruction (e.g. "click Submit").
    async fn act(&self, instruction: &str) -> Result<(), AgentError>;

    /// Locates elements matching a description. `None` means nothing matched.
    async fn locate(&self, description: &str) -> Result<Option<Vec<LocatedElement>>, AgentError>;

    /// Asks the agent a question about the current page.
    async fn query(&self, prompt: &str) -> Result<String, AgentError>;

    /// The page driven by this agent, when one is attached.
    fn page(&self) -> Option<Arc<dyn Page>>;
}

/// Resolves the current agent. Returning `None` means no page is under test.
pub type AgentGetter = Arc<dyn Fn() -> Option<Arc<dyn AutomationAgent>> + Send + Sync>;
