//! Page actions planned by the assistant and their results.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical action types understood by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ActionType {
    Click,
    Input,
    Scroll,
    Refresh,
    Highlight,
    Screenshot,
    Wait,
    Compare,
    Describe,
    Locate,
}

impl ActionType {
    /// Resolves a tag token (case-insensitive, aliases included).
    ///
    /// Unknown tokens yield `None`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "click" => Some(Self::Click),
            "input" | "type" => Some(Self::Input),
            "scroll" => Some(Self::Scroll),
            "refresh" | "reload" => Some(Self::Refresh),
            "highlight" => Some(Self::Highlight),
            "screenshot" => Some(Self::Screenshot),
            "wait" | "sleep" => Some(Self::Wait),
            "compare" => Some(Self::Compare),
            "describe" => Some(Self::Describe),
            "locate" | "find" => Some(Self::Locate),
            _ => None,
        }
    }

    /// Critical actions abort a multi-action sequence when they fail.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Click | Self::Input)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// A point in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Optional knobs for a [`DebugAction`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionOptions {
    pub click_count: Option<u32>,
    pub button: Option<MouseButton>,
    /// Explicit click position; skips element location.
    pub position: Option<Point>,
    /// Select-all + backspace before typing.
    pub clear_before: bool,
    /// Press Enter after typing.
    pub submit: bool,
    /// Delay between keystrokes.
    pub delay_ms: Option<u64>,
    /// Numeric wait duration, takes precedence over the action value.
    pub timeout: Option<u64>,
    pub label: Option<String>,
    pub color: Option<String>,
    /// Highlight lifetime override.
    pub duration_ms: Option<u64>,
    /// Base64 screenshot to compare against.
    pub previous_screenshot: Option<String>,
    /// Snapshot id returned by an earlier screenshot action.
    pub snapshot_id: Option<String>,
    /// Force the manual strategy even when AI actions are available.
    pub manual: bool,
}

/// A plan for one side-effecting page operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugAction {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub options: ActionOptions,
}

impl DebugAction {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action_type,
            target: None,
            value: None,
            options: ActionOptions::default(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_options(mut self, options: ActionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn click(target: impl Into<String>) -> Self {
        Self::new(ActionType::Click).with_target(target)
    }

    pub fn input(target: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(ActionType::Input).with_target(target).with_value(value)
    }

    pub fn highlight(target: impl Into<String>) -> Self {
        Self::new(ActionType::Highlight).with_target(target)
    }

    /// Short human description used in logs and chat.
    pub fn describe(&self) -> String {
        match (&self.target, &self.value) {
            (Some(t), Some(v)) => format!("{} {} = {}", self.action_type, t, v),
            (Some(t), None) => format!("{} {}", self.action_type, t),
            (None, Some(v)) => format!("{} {}", self.action_type, v),
            (None, None) => self.action_type.to_string(),
        }
    }
}

/// Outcome of executing one [`DebugAction`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time spent executing, in milliseconds.
    pub duration: u64,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_screenshot(mut self, screenshot: String) -> Self {
        self.screenshot = Some(screenshot);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_aliases_normalize() {
        assert_eq!(ActionType::from_token("TYPE"), Some(ActionType::Input));
        assert_eq!(ActionType::from_token("reload"), Some(ActionType::Refresh));
        assert_eq!(ActionType::from_token(" sleep "), Some(ActionType::Wait));
        assert_eq!(ActionType::from_token("find"), Some(ActionType::Locate));
        assert_eq!(ActionType::from_token("teleport"), None);
    }

    #[test]
    fn test_canonical_names_round_trip_through_tokens() {
        for action_type in ActionType::iter() {
            assert_eq!(ActionType::from_token(&action_type.to_string()), Some(action_type));
        }
    }

    #[test]
    fn test_only_click_and_input_are_critical() {
        let critical: Vec<_> = ActionType::iter().filter(|t| t.is_critical()).collect();
        assert_eq!(critical, vec![ActionType::Click, ActionType::Input]);
    }

    #[test]
    fn test_action_serializes_type_field() {
        let action = DebugAction::click("Submit");
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "click");
        assert_eq!(json["target"], "Submit");
    }
}
