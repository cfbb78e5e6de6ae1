//! Fix Suggestion Generator
//!
//! Rule-based remediation for common failure classes, merged with what the
//! knowledge base has learned about similar errors.

use debugmate_core::config::{Language, SuggestionConfig};
use debugmate_core::context::DebugContext;
use debugmate_core::knowledge::{KnowledgeBase, KnowledgeEntry, extract_error_pattern};
use debugmate_core::suggestion::{FixSuggestion, SuggestionType, clamp_unit, merge_suggestions};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Knowledge-base fixes are scaled by this factor before merging.
pub const KB_CONFIDENCE_DISCOUNT: f64 = 0.9;

/// KB entries seen fewer times than this stay below the best rule.
const PROVEN_FREQUENCY: u64 = 2;

const KB_MATCH_LIMIT: usize = 3;

/// Failure taxonomy used to pick rule-based fixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorClass {
    ElementNotFound,
    Timeout,
    StaleElement,
    ClickIntercepted,
    AssertionFailed,
    NetworkError,
    Unknown,
}

/// Keyword table in precedence order: the first class with a matching
/// keyword wins.
static CLASS_KEYWORDS: Lazy<Vec<(ErrorClass, &'static [&'static str])>> = Lazy::new(|| {
    vec![
        (
            ErrorClass::StaleElement,
            &[
                "stale element",
                "stale",
                "detached from",
                "no longer attached",
                "元素已过期",
                "已分离",
            ],
        ),
        (
            ErrorClass::ClickIntercepted,
            &[
                "intercept",
                "obscured",
                "not clickable",
                "would receive the click",
                "遮挡",
                "不可点击",
            ],
        ),
        (
            ErrorClass::ElementNotFound,
            &[
                "not found",
                "no such element",
                "unable to locate",
                "could not find",
                "cannot find",
                "no element",
                "找不到",
                "未找到",
                "元素不存在",
            ],
        ),
        (ErrorClass::Timeout, &["timed out", "timeout", "time out", "超时"]),
        (
            ErrorClass::NetworkError,
            &[
                "net::",
                "network",
                "econnrefused",
                "failed to fetch",
                "socket hang up",
                "网络",
                "连接失败",
            ],
        ),
        (
            ErrorClass::AssertionFailed,
            &["assert", "expected", "to equal", "to match", "断言", "期望"],
        ),
    ]
});

/// Classifies an error message by bilingual keyword matching.
pub fn classify_error(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    CLASS_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(class, _)| *class)
        .unwrap_or(ErrorClass::Unknown)
}

struct Rule {
    suggestion_type: SuggestionType,
    en: &'static str,
    zh: &'static str,
    code: &'static str,
    confidence: f64,
}

const fn rule(
    suggestion_type: SuggestionType,
    en: &'static str,
    zh: &'static str,
    code: &'static str,
    confidence: f64,
) -> Rule {
    Rule {
        suggestion_type,
        en,
        zh,
        code,
        confidence,
    }
}

impl Rule {
    fn to_suggestion(&self, language: Language) -> FixSuggestion {
        let description = match language {
            Language::En => self.en,
            Language::Zh => self.zh,
        };
        FixSuggestion::new(self.suggestion_type, description, self.confidence).with_code(self.code)
    }
}

fn rules_for(class: ErrorClass) -> &'static [Rule] {
    static ELEMENT_NOT_FOUND: [Rule; 3] = [
        rule(
            SuggestionType::Wait,
            "Wait for the element to become visible before interacting with it",
            "在操作前等待元素可见",
            "await page.waitForSelector(selector, { state: 'visible' });",
            0.85,
        ),
        rule(
            SuggestionType::Locator,
            "Retry with a more robust locator (role, text or data-testid)",
            "改用更稳定的定位方式（role、文本或 data-testid）重试",
            "page.getByRole('button', { name: 'Submit' })",
            0.75,
        ),
        rule(
            SuggestionType::Debug,
            "Highlight the target to check whether it is rendered at all",
            "高亮目标元素，确认它是否已渲染",
            "",
            0.5,
        ),
    ];
    static TIMEOUT: [Rule; 3] = [
        rule(
            SuggestionType::Timeout,
            "Increase the timeout of this step",
            "增加该步骤的超时时间",
            "{ timeout: 30000 }",
            0.8,
        ),
        rule(
            SuggestionType::Wait,
            "Wait for the network to go idle before this step",
            "在该步骤前等待网络空闲",
            "await page.waitForLoadState('networkidle');",
            0.7,
        ),
        rule(
            SuggestionType::Retry,
            "Retry the step to rule out a slow backend",
            "重试该步骤，排除后端响应慢的情况",
            "",
            0.5,
        ),
    ];
    static STALE_ELEMENT: [Rule; 2] = [
        rule(
            SuggestionType::Retry,
            "Locate the element again right before interacting with it",
            "在操作前重新定位元素",
            "const el = page.locator(selector); await el.click();",
            0.8,
        ),
        rule(
            SuggestionType::Wait,
            "Wait for the page to finish re-rendering",
            "等待页面重新渲染完成",
            "await page.waitForLoadState('domcontentloaded');",
            0.65,
        ),
    ];
    static CLICK_INTERCEPTED: [Rule; 3] = [
        rule(
            SuggestionType::Action,
            "Close the overlay or dialog covering the element",
            "关闭遮挡元素的弹层或对话框",
            "",
            0.8,
        ),
        rule(
            SuggestionType::Action,
            "Scroll the element into view before clicking",
            "点击前将元素滚动到可视区域",
            "await element.scrollIntoViewIfNeeded();",
            0.6,
        ),
        rule(
            SuggestionType::Action,
            "Force the click as a last resort",
            "最后手段：强制点击",
            "await element.click({ force: true });",
            0.45,
        ),
    ];
    static ASSERTION_FAILED: [Rule; 2] = [
        rule(
            SuggestionType::Assertion,
            "Check the expected value against what the page actually shows",
            "核对期望值与页面实际显示的内容",
            "",
            0.75,
        ),
        rule(
            SuggestionType::Wait,
            "Use an auto-retrying assertion so the page can settle",
            "使用自动重试的断言，等待页面稳定",
            "await expect(locator).toHaveText(expected);",
            0.6,
        ),
    ];
    static NETWORK_ERROR: [Rule; 3] = [
        rule(
            SuggestionType::Retry,
            "Check the backend and retry the request",
            "检查后端服务后重试请求",
            "",
            0.7,
        ),
        rule(
            SuggestionType::Navigation,
            "Reload the page once the service is reachable",
            "服务可用后重新加载页面",
            "await page.reload();",
            0.55,
        ),
        rule(
            SuggestionType::Debug,
            "Inspect the failed network requests",
            "查看失败的网络请求",
            "",
            0.45,
        ),
    ];
    static UNKNOWN: [Rule; 2] = [
        rule(
            SuggestionType::Debug,
            "Capture a screenshot and the console output to investigate",
            "截图并查看控制台输出以进一步排查",
            "",
            0.5,
        ),
        rule(
            SuggestionType::Generic,
            "Re-run the step to rule out flakiness",
            "重新运行该步骤，排除偶发问题",
            "",
            0.4,
        ),
    ];

    match class {
        ErrorClass::ElementNotFound => &ELEMENT_NOT_FOUND,
        ErrorClass::Timeout => &TIMEOUT,
        ErrorClass::StaleElement => &STALE_ELEMENT,
        ErrorClass::ClickIntercepted => &CLICK_INTERCEPTED,
        ErrorClass::AssertionFailed => &ASSERTION_FAILED,
        ErrorClass::NetworkError => &NETWORK_ERROR,
        ErrorClass::Unknown => &UNKNOWN,
    }
}

static UNLOADED_PAGE: Rule = rule(
    SuggestionType::Navigation,
    "The page is not loaded; navigate to the application URL first",
    "页面尚未加载，请先打开应用地址",
    "await page.goto(baseUrl);",
    0.9,
);

static UNAUTHORIZED: Rule = rule(
    SuggestionType::Auth,
    "Requests are rejected as unauthorized; log in again or refresh the token",
    "请求返回未授权，请重新登录或刷新令牌",
    "",
    0.85,
);

/// True for URLs that mean nothing has been loaded yet.
pub fn is_unloaded_url(url: Option<&str>) -> bool {
    match url.map(str::trim) {
        None | Some("") => true,
        Some(url) => url == "about:blank" || url.starts_with("chrome-error://"),
    }
}

fn is_unauthorized(console_errors: &[String]) -> bool {
    console_errors.iter().any(|e| {
        let lower = e.to_lowercase();
        lower.contains("401") || lower.contains("unauthorized")
    })
}

/// Scales a knowledge-base fix so it ranks below proven rules.
///
/// Fixes from entries seen fewer than twice are additionally capped just
/// under `best_rule`.
pub fn discount_kb_confidence(confidence: f64, entry: &KnowledgeEntry, best_rule: f64) -> f64 {
    let reliability = 0.5 + 0.5 * entry.success_rate;
    let mut discounted = confidence * reliability * KB_CONFIDENCE_DISCOUNT;
    if entry.frequency < PROVEN_FREQUENCY {
        discounted = discounted.min(best_rule - 0.05);
    }
    clamp_unit(discounted)
}

/// What the generator needs to know about a failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureInput<'a> {
    pub error_message: &'a str,
    pub url: Option<&'a str>,
    pub console_errors: &'a [String],
}

impl<'a> FailureInput<'a> {
    /// Reads the last error, URL and console errors from a snapshot.
    pub fn from_context(context: &'a DebugContext, fallback_error: &'a str) -> Self {
        Self {
            error_message: context
                .last_error
                .as_ref()
                .map(|e| e.message.as_str())
                .unwrap_or(fallback_error),
            url: context.url.as_deref(),
            console_errors: &context.console_errors,
        }
    }
}

pub struct FixSuggestionGenerator {
    config: SuggestionConfig,
    language: Language,
}

impl FixSuggestionGenerator {
    pub fn new(config: SuggestionConfig, language: Language) -> Self {
        Self { config, language }
    }

    /// Ranked suggestions for a failure, best first.
    pub fn generate(&self, failure: &FailureInput<'_>, knowledge: Option<&KnowledgeBase>) -> Vec<FixSuggestion> {
        let class = classify_error(failure.error_message);
        let mut suggestions: Vec<FixSuggestion> = rules_for(class)
            .iter()
            .map(|r| r.to_suggestion(self.language))
            .collect();

        if is_unloaded_url(failure.url) {
            merge_suggestions(&mut suggestions, &[UNLOADED_PAGE.to_suggestion(self.language)]);
        }
        if is_unauthorized(failure.console_errors) {
            merge_suggestions(&mut suggestions, &[UNAUTHORIZED.to_suggestion(self.language)]);
        }

        let best_rule = suggestions
            .iter()
            .map(|s| s.confidence)
            .fold(0.0_f64, f64::max);

        if let Some(kb) = knowledge {
            let pattern = extract_error_pattern(failure.error_message);
            if !pattern.is_empty() {
                for entry in kb.find_matching_patterns(&pattern, KB_MATCH_LIMIT) {
                    let learned: Vec<FixSuggestion> = entry
                        .fixes
                        .iter()
                        .map(|fix| {
                            let mut fix = fix.clone();
                            fix.confidence = discount_kb_confidence(fix.confidence, &entry, best_rule);
                            fix
                        })
                        .collect();
                    merge_suggestions(&mut suggestions, &learned);
                }
            }
        }

        suggestions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        suggestions.retain(|s| s.confidence >= self.config.min_confidence);
        suggestions.truncate(self.config.max_suggestions);

        debug!(
            "[FixSuggestionGenerator] {} -> {} suggestions",
            class,
            suggestions.len()
        );
        suggestions
    }
}
