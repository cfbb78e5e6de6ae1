//! Structured reply protocol.
//!
//! Model replies carry inline tags that the assistant turns into work:
//!
//! ```text
//! [ACTION:<type>[:<target>][:<value>]]
//! [SUGGESTION:<description>[|<code>][|<confidence 0..1>]]
//! [CONTEXT:<type>[:<details>]]
//! ```
//!
//! Tag names and action types are case-insensitive. Parsing never fails:
//! malformed tags are skipped and the rest of the reply is still usable.

mod scan;
mod scoring;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::{ActionType, DebugAction};
use crate::context::{ContextKind, ContextRequest};
use crate::suggestion::{FixSuggestion, clamp_unit};

use scan::{TagKind, scan_tags};
pub use scoring::{infer_suggestion_type, response_confidence};

/// Confidence of a tagged suggestion that omits one.
pub const DEFAULT_SUGGESTION_CONFIDENCE: f64 = 0.7;

/// Confidence of suggestions mined from plain sentences.
pub const MINED_SUGGESTION_CONFIDENCE: f64 = 0.5;

static MINED_SUGGESTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:建议|suggest(?:ion)?s?|recommend(?:ation)?s?)\s*[:：]?\s*([^\n。.!?！？]{4,200})")
        .expect("suggestion regex")
});

static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("blank-run regex")
});

/// Everything extracted from one model reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedResponse {
    /// Reply text with all recognized tags removed.
    pub text: String,
    pub actions: Vec<DebugAction>,
    pub suggestions: Vec<FixSuggestion>,
    pub context_request: Option<ContextRequest>,
    /// Informational quality score in `[0, 1]`; never gates behavior.
    pub confidence: f64,
}

impl ParsedResponse {
    /// True when the reply asks for any follow-up work.
    pub fn has_actionable_content(&self) -> bool {
        !self.actions.is_empty() || !self.suggestions.is_empty() || self.context_request.is_some()
    }
}

/// Parses model replies into actions, suggestions and context requests.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    mine_natural_language: bool,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self {
            mine_natural_language: true,
        }
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables mining "suggest ..." sentences outside tags.
    pub fn with_natural_language(mut self, enabled: bool) -> Self {
        self.mine_natural_language = enabled;
        self
    }

    pub fn parse(&self, raw: &str) -> ParsedResponse {
        let tags = scan_tags(raw);
        let mut actions = Vec::new();
        let mut suggestions = Vec::new();
        let mut context_request = None;

        for tag in &tags {
            match tag.kind {
                TagKind::Action => {
                    if let Some(action) = parse_action(tag.body) {
                        actions.push(action);
                    }
                }
                TagKind::Suggestion => {
                    if let Some(suggestion) = parse_suggestion(tag.body) {
                        suggestions.push(suggestion);
                    }
                }
                TagKind::Context => {
                    if context_request.is_none() {
                        context_request = parse_context(tag.body);
                    }
                }
            }
        }

        if self.mine_natural_language {
            for mined in mine_sentences(raw) {
                let key = mined.dedup_key();
                if !suggestions.iter().any(|s| s.dedup_key() == key) {
                    suggestions.push(mined);
                }
            }
        }

        let text = strip_tags(raw, &tags);
        let confidence = response_confidence(&text, actions.len(), suggestions.len());

        debug!(
            "[ResponseParser] {} actions, {} suggestions, context request: {}",
            actions.len(),
            suggestions.len(),
            context_request.is_some()
        );

        ParsedResponse {
            text,
            actions,
            suggestions,
            context_request,
            confidence,
        }
    }
}

/// Convenience wrapper around [`ResponseParser::parse`] with defaults.
pub fn parse_response(raw: &str) -> ParsedResponse {
    ResponseParser::default().parse(raw)
}

fn non_empty(segment: Option<&str>) -> Option<String> {
    segment
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `type[:target][:value]`; the value keeps any further colons.
fn parse_action(body: &str) -> Option<DebugAction> {
    let mut parts = body.splitn(3, ':');
    let action_type = ActionType::from_token(parts.next()?)?;

    let mut action = DebugAction::new(action_type);
    action.target = non_empty(parts.next());
    action.value = non_empty(parts.next());
    Some(action)
}

/// Parsed from the end backward so code may contain `|`.
fn parse_suggestion(body: &str) -> Option<FixSuggestion> {
    let mut rest = body;
    let mut confidence = DEFAULT_SUGGESTION_CONFIDENCE;

    if let Some((head, last)) = rest.rsplit_once('|') {
        if let Ok(value) = last.trim().parse::<f64>() {
            if value.is_finite() {
                confidence = clamp_unit(value);
                rest = head;
            }
        }
    }

    let (description, code) = match rest.split_once('|') {
        Some((description, code)) => (description.trim(), code.trim()),
        None => (rest.trim(), ""),
    };

    if description.is_empty() {
        return None;
    }

    let suggestion_type = infer_suggestion_type(description, code);
    Some(FixSuggestion::new(suggestion_type, description, confidence).with_code(code))
}

fn parse_context(body: &str) -> Option<ContextRequest> {
    let (kind, details) = match body.split_once(':') {
        Some((kind, details)) => (kind, non_empty(Some(details))),
        None => (body, None),
    };
    Some(ContextRequest {
        kind: ContextKind::from_token(kind)?,
        details,
    })
}

/// True when `pos` sits inside an unclosed `[`.
fn inside_tag(text: &str, pos: usize) -> bool {
    let mut depth: i32 = 0;
    for ch in text[..pos].chars() {
        match ch {
            '[' => depth += 1,
            ']' => depth = (depth - 1).max(0),
            _ => {}
        }
    }
    depth > 0
}

fn mine_sentences(raw: &str) -> Vec<FixSuggestion> {
    MINED_SUGGESTION_RE
        .captures_iter(raw)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if inside_tag(raw, whole.start()) {
                return None;
            }
            let description = caps.get(1)?.as_str().trim();
            if description.contains('[') || description.chars().count() < 4 {
                return None;
            }
            Some(FixSuggestion::new(
                infer_suggestion_type(description, ""),
                description,
                MINED_SUGGESTION_CONFIDENCE,
            ))
        })
        .collect()
}

fn strip_tags(raw: &str, tags: &[scan::RawTag<'_>]) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut cursor = 0;
    for tag in tags {
        text.push_str(&raw[cursor..tag.start]);
        cursor = tag.end;
    }
    text.push_str(&raw[cursor..]);

    let text = text.replace("\r\n", "\n");
    BLANK_RUN_RE.replace_all(&text, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggestion::SuggestionType;

    #[test]
    fn test_static_patterns_compile() {
        assert!(MINED_SUGGESTION_RE.is_match("Suggestion: reload the page first"));
        assert!(BLANK_RUN_RE.is_match("a\n\n\nb"));
    }

    #[test]
    fn test_single_click_action() {
        let parsed = parse_response("[ACTION:click:Submit button]");

        assert_eq!(parsed.actions.len(), 1);
        assert_eq!(parsed.actions[0].action_type, ActionType::Click);
        assert_eq!(parsed.actions[0].target.as_deref(), Some("Submit button"));
        assert!(parsed.suggestions.is_empty());
        assert_eq!(parsed.text, "");
    }

    #[test]
    fn test_action_segments_are_trimmed_and_aliased() {
        let parsed = parse_response("Typing now [action: Type : Email field : a@b.test ]");

        let action = &parsed.actions[0];
        assert_eq!(action.action_type, ActionType::Input);
        assert_eq!(action.target.as_deref(), Some("Email field"));
        assert_eq!(action.value.as_deref(), Some("a@b.test"));
        assert_eq!(parsed.text, "Typing now");
    }

    #[test]
    fn test_action_value_keeps_colons() {
        let parsed = parse_response("[ACTION:input:URL field:https://example.test:8080/x]");
        assert_eq!(parsed.actions[0].value.as_deref(), Some("https://example.test:8080/x"));
    }

    #[test]
    fn test_unknown_action_type_is_dropped() {
        let parsed = parse_response("[ACTION:teleport:moon] [ACTION:reload]");
        assert_eq!(parsed.actions.len(), 1);
        assert_eq!(parsed.actions[0].action_type, ActionType::Refresh);
        assert!(parsed.actions[0].target.is_none());
    }

    #[test]
    fn test_full_suggestion() {
        let parsed = parse_response("[SUGGESTION:Increase timeout|{timeout:30000}|0.8]");

        assert_eq!(parsed.suggestions.len(), 1);
        let s = &parsed.suggestions[0];
        assert_eq!(s.description, "Increase timeout");
        assert_eq!(s.code, "{timeout:30000}");
        assert_eq!(s.confidence, 0.8);
        assert_eq!(s.suggestion_type, SuggestionType::Timeout);
    }

    #[test]
    fn test_suggestion_defaults() {
        let parsed = parse_response("[SUGGESTION:Check the selector]");
        let s = &parsed.suggestions[0];
        assert_eq!(s.confidence, DEFAULT_SUGGESTION_CONFIDENCE);
        assert_eq!(s.code, "");
        assert_eq!(s.suggestion_type, SuggestionType::Locator);
    }

    #[test]
    fn test_suggestion_code_may_contain_pipes_and_brackets() {
        let parsed = parse_response(
            "[SUGGESTION:Use fallback locator|page.locator('[data-test=a]') || page.locator('#a')|0.6]",
        );
        let s = &parsed.suggestions[0];
        assert_eq!(s.description, "Use fallback locator");
        assert_eq!(s.code, "page.locator('[data-test=a]') || page.locator('#a')");
        assert_eq!(s.confidence, 0.6);
    }

    #[test]
    fn test_suggestion_confidence_is_clamped() {
        let parsed = parse_response("[SUGGESTION:Retry the step|retry()|7]\n[SUGGESTION:Wait|x|-1]");
        assert_eq!(parsed.suggestions[0].confidence, 1.0);
        assert_eq!(parsed.suggestions[1].confidence, 0.0);
    }

    #[test]
    fn test_suggestion_without_float_keeps_last_segment_as_code() {
        let parsed = parse_response("[SUGGESTION:Patch it|await fix()]");
        let s = &parsed.suggestions[0];
        assert_eq!(s.code, "await fix()");
        assert_eq!(s.confidence, DEFAULT_SUGGESTION_CONFIDENCE);
        assert_eq!(s.suggestion_type, SuggestionType::CodeChange);
    }

    #[test]
    fn test_context_request() {
        let parsed = parse_response("I need more info. [CONTEXT:console:errors only]");
        let request = parsed.context_request.unwrap();
        assert_eq!(request.kind, ContextKind::ConsoleErrors);
        assert_eq!(request.details.as_deref(), Some("errors only"));
        assert_eq!(parsed.text, "I need more info.");
    }

    #[test]
    fn test_unknown_context_is_ignored() {
        let parsed = parse_response("[CONTEXT:cookies]");
        assert!(parsed.context_request.is_none());
    }

    #[test]
    fn test_natural_language_suggestions_are_mined() {
        let parsed = parse_response("The button is hidden. I suggest adding a wait before clicking.");
        assert_eq!(parsed.suggestions.len(), 1);
        let s = &parsed.suggestions[0];
        assert_eq!(s.confidence, MINED_SUGGESTION_CONFIDENCE);
        assert_eq!(s.suggestion_type, SuggestionType::Wait);
        assert_eq!(s.description, "adding a wait before clicking");
    }

    #[test]
    fn test_chinese_suggestion_is_mined() {
        let parsed = parse_response("页面还没加载完。建议：增加等待时间再点击按钮。");
        assert_eq!(parsed.suggestions.len(), 1);
        assert_eq!(parsed.suggestions[0].suggestion_type, SuggestionType::Wait);
    }

    #[test]
    fn test_mining_can_be_disabled() {
        let parser = ResponseParser::new().with_natural_language(false);
        let parsed = parser.parse("I suggest adding a wait before clicking.");
        assert!(parsed.suggestions.is_empty());
    }

    #[test]
    fn test_blank_lines_collapse() {
        let parsed = parse_response("First\n\n[ACTION:click:A]\n\n\n\nSecond");
        assert_eq!(parsed.text, "First\n\nSecond");
    }

    #[test]
    fn test_unclosed_tag_is_left_in_text() {
        let parsed = parse_response("Broken [ACTION:click:A");
        assert!(parsed.actions.is_empty());
        assert_eq!(parsed.text, "Broken [ACTION:click:A");
    }

    #[test]
    fn test_has_actionable_content() {
        assert!(parse_response("[ACTION:screenshot]").has_actionable_content());
        assert!(!parse_response("Everything looks fine.").has_actionable_content());
    }
}
