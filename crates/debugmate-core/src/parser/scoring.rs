//! Keyword tables and heuristic scores for parsed replies.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::suggestion::{SuggestionType, clamp_unit};

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("keyword regex")
}

/// Ordered `{pattern, type}` table; the first match wins.
static SUGGESTION_TYPE_RULES: Lazy<Vec<(Regex, SuggestionType)>> = Lazy::new(|| {
    vec![
        (compile(r"(?i)\b(?:wait|sleep|delay)|等待|延迟|稍等"), SuggestionType::Wait),
        (compile(r"(?i)\btime\s?out|超时"), SuggestionType::Timeout),
        (
            compile(r"(?i)\b(?:locator|selector|xpath|css|data-test(?:id)?)|选择器|定位"),
            SuggestionType::Locator,
        ),
        (compile(r"(?i)\b(?:retry|retries|re-?run)|重试"), SuggestionType::Retry),
        (compile(r"(?i)\b(?:assert|expect)|断言"), SuggestionType::Assertion),
        (compile(r"(?i)\b(?:debug|console\.log|logging|trace)|调试|日志"), SuggestionType::Debug),
        (compile(r"(?i)\b(?:navigate|navigation|goto|url)|导航|跳转"), SuggestionType::Navigation),
        (
            compile(r"(?i)\b(?:login|log in|auth|token|credential)|登录|认证|鉴权"),
            SuggestionType::Auth,
        ),
    ]
});

static ACTIONABLE_RE: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\b(?:click|type|input|scroll|wait|refresh|reload|locate|replace|change|add|update)\b|点击|输入|等待|刷新|修改|添加")
});

static HEDGING_RE: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\b(?:maybe|perhaps|might|possibly|not sure|unclear|i think)\b|可能|也许|不确定|大概")
});

/// Infers the suggestion type from its description, then its code.
///
/// Falls back to `CodeChange` when code is present, `Generic` otherwise.
pub fn infer_suggestion_type(description: &str, code: &str) -> SuggestionType {
    for text in [description, code] {
        if let Some((_, suggestion_type)) = SUGGESTION_TYPE_RULES
            .iter()
            .find(|(pattern, _)| pattern.is_match(text))
        {
            return *suggestion_type;
        }
    }

    if code.trim().is_empty() {
        SuggestionType::Generic
    } else {
        SuggestionType::CodeChange
    }
}

/// Heuristic quality score of a reply.
///
/// Starts at 0.5; +0.15 with actions, +0.15 with suggestions, +0.1 for
/// replies over 200 characters, +0.1 for actionable verbs, -0.2 for
/// hedging language. Clamped into `[0, 1]`.
pub fn response_confidence(text: &str, action_count: usize, suggestion_count: usize) -> f64 {
    let mut score = 0.5;
    if action_count > 0 {
        score += 0.15;
    }
    if suggestion_count > 0 {
        score += 0.15;
    }
    if text.chars().count() > 200 {
        score += 0.1;
    }
    if ACTIONABLE_RE.is_match(text) {
        score += 0.1;
    }
    if HEDGING_RE.is_match(text) {
        score -= 0.2;
    }
    clamp_unit(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_tables_compile() {
        assert!(!SUGGESTION_TYPE_RULES.is_empty());
        assert!(ACTIONABLE_RE.is_match("click the button"));
        assert!(HEDGING_RE.is_match("maybe it is hidden"));
    }

    #[test]
    fn test_type_precedence_follows_table_order() {
        assert_eq!(infer_suggestion_type("Wait longer than the timeout", ""), SuggestionType::Wait);
        assert_eq!(infer_suggestion_type("Increase timeout", "{timeout:30000}"), SuggestionType::Timeout);
        assert_eq!(infer_suggestion_type("Log in first", ""), SuggestionType::Auth);
    }

    #[test]
    fn test_description_wins_over_code() {
        assert_eq!(
            infer_suggestion_type("Use a stable selector", "await page.waitForSelector('#a')"),
            SuggestionType::Locator
        );
    }

    #[test]
    fn test_await_is_not_wait() {
        assert_eq!(infer_suggestion_type("Patch it", "await fix()"), SuggestionType::CodeChange);
        assert_eq!(infer_suggestion_type("Patch it", ""), SuggestionType::Generic);
    }

    #[test]
    fn test_confidence_bounds_and_direction() {
        let plain = response_confidence("ok", 0, 0);
        let rich = response_confidence("Click the button", 1, 1);
        let hedged = response_confidence("Maybe it is flaky", 0, 0);

        assert_eq!(plain, 0.5);
        assert!(rich > plain);
        assert!(hedged < plain);
        assert!((0.0..=1.0).contains(&response_confidence(&"click ".repeat(100), 3, 3)));
    }
}
