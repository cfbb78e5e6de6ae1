//! Context Builder
//!
//! Assembles the size-bounded [`LlmRequest`] for one conversational turn:
//! a system prompt rendered from a Jinja template (tag protocol, reply
//! language, failure summary and page diagnostics), the recent
//! conversation, and an optional screenshot.

use debugmate_core::config::{ContextConfig, Language};
use debugmate_core::context::{ContextKind, ContextRequest, DebugContext};
use debugmate_core::knowledge::extract_error_pattern;
use debugmate_core::llm::{ImageAttachment, LlmMessage, LlmRequest, LlmRole};
use debugmate_core::session::{DebugSession, Message, MessageRole};
use debugmate_core::{DebugError, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

/// Items per diagnostic list once the prompt has to be compacted.
const COMPACT_LIST_LEN: usize = 3;

/// The pending user turn is never cut below this many characters.
const MIN_LAST_TURN_CHARS: usize = 200;

/// Rendering overhead of one list line (`- ` and the newline).
const LINE_OVERHEAD: usize = 3;

/// How much page diagnostics a rendered system prompt carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    /// Configured list limits.
    Full,
    /// Lists capped at a few items; visible elements only when forced.
    Compact,
    /// URL, title and the newest lines of the forced slice that fit in
    /// `forced_chars`.
    Minimal { forced_chars: usize },
}

const SYSTEM_TEMPLATE: &str = r#"You are DebugMate, an assistant that helps diagnose failed steps of automated browser tests.
{% if language == "zh" %}Reply in Simplified Chinese.{% else %}Reply in English.{% endif %}

You can request work by embedding tags in your reply:
- [ACTION:<type>[:<target>][:<value>]] runs a page action. Types: click, input, scroll, refresh, highlight, screenshot, wait, compare, describe, locate.
- [SUGGESTION:<description>[|<code>][|<confidence 0..1>]] proposes a fix.
- [CONTEXT:<type>[:<details>]] asks for more diagnostics next turn. Types: console_errors, network_errors, visible_elements, execution_history, screenshot.
Only use tags when you need them; keep explanations short.
{% if failure %}
## Failure
{% if failure.test_case %}- Test case: {{ failure.test_case }}
{% endif %}{% if failure.step or failure.step_index is not none %}- Step{% if failure.step_index is not none %} #{{ failure.step_index }}{% endif %}{% if failure.step %}: {{ failure.step }}{% endif %}
{% endif %}{% if failure.error_type %}- Error ({{ failure.error_type }}): {{ failure.error_message }}
{% endif %}{% if failure.pattern %}- Pattern: {{ failure.pattern }}
{% endif %}{% endif %}{% if page %}
## Page
{% if page.url %}- URL: {{ page.url }}
{% endif %}{% if page.title %}- Title: {{ page.title }}
{% endif %}{% for section in page.sections %}
### {{ section.title }}{% if section.omitted > 0 %} ({{ section.omitted }} more omitted){% endif %}
{% for line in section.lines %}- {{ line }}
{% endfor %}{% endfor %}{% endif %}"#;

#[derive(Debug, Serialize)]
struct FailureView {
    test_case: Option<String>,
    step: Option<String>,
    step_index: Option<usize>,
    error_type: Option<String>,
    error_message: Option<String>,
    pattern: Option<String>,
}

#[derive(Debug, Serialize)]
struct SectionView {
    #[serde(skip)]
    kind: ContextKind,
    title: &'static str,
    lines: Vec<String>,
    omitted: usize,
}

#[derive(Debug, Serialize)]
struct PageView {
    url: Option<String>,
    title: Option<String>,
    sections: Vec<SectionView>,
}

/// Inputs for one prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub session: Option<&'a DebugSession>,
    pub context: Option<&'a DebugContext>,
    /// Conversation so far, oldest first. The last entry is the pending user turn.
    pub history: &'a [Message],
    /// Slice requested by the previous reply; included in full unless the
    /// budget cannot hold it.
    pub forced: Option<&'a ContextRequest>,
}

/// Builds prompts within the configured character budget.
pub struct ContextBuilder {
    config: ContextConfig,
    language: Language,
}

impl ContextBuilder {
    pub fn new(config: ContextConfig, language: Language) -> Self {
        Self { config, language }
    }

    /// Cache fingerprint of a failure: error pattern and page URL.
    pub fn context_key(session: Option<&DebugSession>, context: Option<&DebugContext>) -> String {
        let error = session
            .map(|s| s.error_message().to_string())
            .filter(|m| !m.is_empty())
            .or_else(|| context.and_then(|c| c.last_error.as_ref()).map(|e| e.message.clone()))
            .unwrap_or_default();
        let url = context.and_then(|c| c.url.clone()).unwrap_or_default();
        format!("{}@{}", extract_error_pattern(&error), url)
    }

    /// Renders the system prompt.
    ///
    /// Lists not named by `forced` follow `detail`; see [`Detail`].
    pub fn system_prompt(
        &self,
        session: Option<&DebugSession>,
        debug_context: Option<&DebugContext>,
        forced: Option<&ContextRequest>,
        detail: Detail,
    ) -> Result<String> {
        let failure = session.map(|s| self.failure_view(s, debug_context));
        let page = debug_context.map(|c| self.page_view(c, forced.map(|r| r.kind), detail));

        let env = Environment::new();
        env.render_str(
            SYSTEM_TEMPLATE,
            context! {
                language => self.language.to_string(),
                failure => failure,
                page => page,
            },
        )
        .map_err(|e| DebugError::internal(format!("failed to render system prompt: {e}")))
    }

    /// Builds the full request for the pending turn.
    ///
    /// System prompt plus messages never exceed `max_context_chars`. Over
    /// budget, the diagnostics are compacted, then the oldest turns dropped,
    /// then the diagnostics cut to the forced slice, and finally the pending
    /// turn (down to a floor) and the system prompt are truncated.
    pub fn build(&self, input: PromptInput<'_>) -> Result<LlmRequest> {
        let mut messages = conversation(input.history, self.config.max_history_messages);
        let render = |detail| self.system_prompt(input.session, input.context, input.forced, detail);
        let mut system = render(Detail::Full)?;

        let budget = self.config.max_context_chars;
        let total = |system: &str, messages: &[LlmMessage]| system.chars().count() + chars_of(messages);

        if total(&system, &messages) > budget {
            debug!("[ContextBuilder] Prompt over budget, compacting diagnostics");
            system = render(Detail::Compact)?;
        }
        while total(&system, &messages) > budget && messages.len() > 1 {
            messages.remove(0);
            while messages.len() > 1 && messages[0].role != LlmRole::User {
                messages.remove(0);
            }
        }
        if total(&system, &messages) > budget {
            debug!("[ContextBuilder] Still over budget, keeping only the forced slice");
            let reserve = chars_of(&messages).min(MIN_LAST_TURN_CHARS);
            let base = render(Detail::Minimal { forced_chars: 0 })?.chars().count();
            system = render(Detail::Minimal {
                forced_chars: budget.saturating_sub(base + reserve),
            })?;
        }
        fit_to_budget(&mut system, &mut messages, budget);

        let forced_screenshot = input.forced.is_some_and(|r| r.kind == ContextKind::Screenshot);
        let images = input
            .context
            .and_then(|c| c.screenshot.as_ref())
            .filter(|shot| !shot.is_empty() && (self.config.include_screenshot || forced_screenshot))
            .map(|shot| vec![ImageAttachment::png(shot.clone())])
            .unwrap_or_default();

        Ok(LlmRequest {
            system,
            messages,
            images,
            max_tokens: None,
            temperature: None,
        })
    }

    fn failure_view(&self, session: &DebugSession, debug_context: Option<&DebugContext>) -> FailureView {
        let error = session
            .error
            .as_ref()
            .or_else(|| debug_context.and_then(|c| c.last_error.as_ref()));
        FailureView {
            test_case: session.test_case_name.clone().or_else(|| session.test_case_id.clone()),
            step: debug_context.and_then(|c| c.step_description.clone()),
            step_index: session
                .step_index
                .or_else(|| debug_context.and_then(|c| c.step_index)),
            error_type: error.map(|e| e.error_type.clone()),
            error_message: error.map(|e| e.message.clone()),
            pattern: error
                .map(|e| extract_error_pattern(&e.message))
                .filter(|p| !p.is_empty()),
        }
    }

    fn page_view(&self, ctx: &DebugContext, forced: Option<ContextKind>, detail: Detail) -> PageView {
        let compact = detail != Detail::Full;
        let limit = |kind: ContextKind, configured: usize| {
            if forced == Some(kind) {
                usize::MAX
            } else if compact {
                configured.min(COMPACT_LIST_LEN)
            } else {
                configured
            }
        };

        let mut sections = Vec::new();
        push_section(
            &mut sections,
            ContextKind::ConsoleErrors,
            "Console errors",
            ctx.console_errors.iter().cloned().collect(),
            limit(ContextKind::ConsoleErrors, self.config.max_console_errors),
        );
        push_section(
            &mut sections,
            ContextKind::NetworkErrors,
            "Network errors",
            ctx.network_errors
                .iter()
                .map(|e| match e.status {
                    Some(status) => format!("{} {} ({})", status, e.url, e.message),
                    None => format!("{} ({})", e.url, e.message),
                })
                .collect(),
            limit(ContextKind::NetworkErrors, self.config.max_network_errors),
        );
        if forced == Some(ContextKind::VisibleElements) || !compact {
            push_section(
                &mut sections,
                ContextKind::VisibleElements,
                "Visible elements",
                ctx.visible_elements
                    .iter()
                    .map(|e| match &e.selector {
                        Some(selector) => format!("<{}> {} [{}]", e.tag, e.text, selector),
                        None => format!("<{}> {}", e.tag, e.text),
                    })
                    .collect(),
                limit(ContextKind::VisibleElements, self.config.max_visible_elements),
            );
        }
        push_section(
            &mut sections,
            ContextKind::ExecutionHistory,
            "Execution history",
            ctx.execution_history
                .iter()
                .map(|r| {
                    let status = if r.success { "ok" } else { "failed" };
                    match &r.error {
                        Some(error) => format!("#{} {} [{}]: {}", r.step_index, r.description, status, error),
                        None => format!("#{} {} [{}]", r.step_index, r.description, status),
                    }
                })
                .collect(),
            limit(ContextKind::ExecutionHistory, self.config.max_execution_history),
        );

        if let Detail::Minimal { forced_chars } = detail {
            sections.retain(|section| forced == Some(section.kind));
            for section in &mut sections {
                keep_newest_within(section, forced_chars);
            }
        }

        PageView {
            url: ctx.url.clone(),
            title: ctx.title.clone(),
            sections,
        }
    }
}

/// Keeps the newest `limit` lines; empty lists produce no section.
fn push_section(
    sections: &mut Vec<SectionView>,
    kind: ContextKind,
    title: &'static str,
    lines: Vec<String>,
    limit: usize,
) {
    if lines.is_empty() {
        return;
    }
    let omitted = lines.len().saturating_sub(limit);
    sections.push(SectionView {
        kind,
        title,
        lines: lines.into_iter().skip(omitted).collect(),
        omitted,
    });
}

/// Last `n` messages as LLM turns, starting with a user turn.
fn conversation(history: &[Message], n: usize) -> Vec<LlmMessage> {
    let skip = history.len().saturating_sub(n.max(1));
    history[skip..]
        .iter()
        .skip_while(|m| m.role != MessageRole::User)
        .map(|m| match m.role {
            MessageRole::User => LlmMessage::user(m.content.clone()),
            MessageRole::Assistant => LlmMessage::assistant(m.content.clone()),
        })
        .collect()
}

/// Drops the oldest lines until the rest fits in `max_chars`.
fn keep_newest_within(section: &mut SectionView, max_chars: usize) {
    let mut used = 0;
    let kept = section
        .lines
        .iter()
        .rev()
        .take_while(|line| {
            used += line.chars().count() + LINE_OVERHEAD;
            used <= max_chars
        })
        .count();
    let dropped = section.lines.len() - kept;
    section.lines.drain(..dropped);
    section.omitted += dropped;
}

fn chars_of(messages: &[LlmMessage]) -> usize {
    messages.iter().map(|m| m.content.chars().count()).sum()
}

/// Last resort: cuts the pending turn, never below its floor, then the
/// system prompt, until both fit in `budget`.
fn fit_to_budget(system: &mut String, messages: &mut [LlmMessage], budget: usize) {
    let overflow = (system.chars().count() + chars_of(messages)).saturating_sub(budget);
    if overflow == 0 {
        return;
    }
    if let Some(last) = messages.last_mut() {
        let len = last.content.chars().count();
        let floor = len.min(MIN_LAST_TURN_CHARS).min(budget);
        let keep = len.saturating_sub(overflow).max(floor);
        last.content = truncate_chars(&last.content, keep);
    }
    let room = budget.saturating_sub(chars_of(messages));
    if system.chars().count() > room {
        *system = truncate_chars(system, room);
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use debugmate_core::context::{ErrorInfo, ExecutionRecord};
    use debugmate_core::session::SessionStart;

    fn session() -> DebugSession {
        DebugSession::start(&SessionStart {
            test_case_name: Some("Checkout".into()),
            step_index: Some(3),
            error: Some(ErrorInfo::new("TimeoutError", "Timeout 5000ms exceeded waiting for '#pay'")),
            ..Default::default()
        })
    }

    fn page_context(console: usize) -> DebugContext {
        DebugContext {
            url: Some("https://shop.test/pay".into()),
            title: Some("Pay".into()),
            console_errors: (0..console).map(|i| format!("console error {i}")).collect(),
            screenshot: Some("iVBORw0KGgo=".into()),
            execution_history: vec![ExecutionRecord {
                step_index: 2,
                description: "Fill card".into(),
                success: true,
                duration_ms: 40,
                error: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_system_prompt_carries_protocol_and_failure() {
        let builder = ContextBuilder::new(ContextConfig::default(), Language::En);
        let prompt = builder
            .system_prompt(Some(&session()), Some(&page_context(2)), None, Detail::Full)
            .unwrap();

        assert!(prompt.contains("[ACTION:<type>"));
        assert!(prompt.contains("Reply in English."));
        assert!(prompt.contains("Test case: Checkout"));
        assert!(prompt.contains("Step #3"));
        assert!(prompt.contains("URL: https://shop.test/pay"));
        assert!(prompt.contains("console error 1"));
        assert!(prompt.contains("#2 Fill card [ok]"));
    }

    #[test]
    fn test_chinese_reply_language() {
        let builder = ContextBuilder::new(ContextConfig::default(), Language::Zh);
        let prompt = builder.system_prompt(None, None, None, Detail::Full).unwrap();
        assert!(prompt.contains("Simplified Chinese"));
        assert!(!prompt.contains("## Failure"));
    }

    #[test]
    fn test_lists_keep_newest_within_limit() {
        let config = ContextConfig {
            max_console_errors: 2,
            ..Default::default()
        };
        let builder = ContextBuilder::new(config, Language::En);
        let prompt = builder.system_prompt(None, Some(&page_context(5)), None, Detail::Full).unwrap();

        assert!(prompt.contains("(3 more omitted)"));
        assert!(prompt.contains("console error 4"));
        assert!(!prompt.contains("console error 0"));
    }

    #[test]
    fn test_forced_slice_is_included_in_full() {
        let config = ContextConfig {
            max_console_errors: 2,
            ..Default::default()
        };
        let builder = ContextBuilder::new(config, Language::En);
        let forced = ContextRequest {
            kind: ContextKind::ConsoleErrors,
            details: None,
        };
        let prompt = builder
            .system_prompt(None, Some(&page_context(5)), Some(&forced), Detail::Compact)
            .unwrap();
        assert!(prompt.contains("console error 0"));
        assert!(!prompt.contains("omitted"));
    }

    #[test]
    fn test_build_attaches_screenshot_and_history() {
        let builder = ContextBuilder::new(ContextConfig::default(), Language::En);
        let history = vec![
            Message::assistant("stray greeting"),
            Message::user("why did it fail?"),
            Message::assistant("The button is hidden."),
            Message::user("and now?"),
        ];
        let ctx = page_context(1);
        let request = builder
            .build(PromptInput {
                session: Some(&session()),
                context: Some(&ctx),
                history: &history,
                forced: None,
            })
            .unwrap();

        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].role, LlmRole::User);
        assert_eq!(request.images.len(), 1);
    }

    #[test]
    fn test_screenshot_respects_config_unless_forced() {
        let config = ContextConfig {
            include_screenshot: false,
            ..Default::default()
        };
        let builder = ContextBuilder::new(config, Language::En);
        let ctx = page_context(0);
        let history = vec![Message::user("look")];
        let input = PromptInput {
            session: None,
            context: Some(&ctx),
            history: &history,
            forced: None,
        };
        assert!(builder.build(input).unwrap().images.is_empty());

        let forced = ContextRequest {
            kind: ContextKind::Screenshot,
            details: None,
        };
        let request = builder
            .build(PromptInput {
                forced: Some(&forced),
                ..input
            })
            .unwrap();
        assert_eq!(request.images.len(), 1);
    }

    #[test]
    fn test_budget_drops_oldest_turns() {
        let config = ContextConfig {
            max_context_chars: 2_500,
            ..Default::default()
        };
        let builder = ContextBuilder::new(config, Language::En);
        let history: Vec<Message> = (0..6)
            .flat_map(|i| {
                [
                    Message::user(format!("question {i} {}", "x".repeat(300))),
                    Message::assistant(format!("answer {i} {}", "y".repeat(300))),
                ]
            })
            .chain([Message::user("latest")])
            .collect();

        let request = builder
            .build(PromptInput {
                session: None,
                context: None,
                history: &history,
                forced: None,
            })
            .unwrap();

        let size = request.system.chars().count()
            + request.messages.iter().map(|m| m.content.chars().count()).sum::<usize>();
        assert!(size <= 2_500);
        assert_eq!(request.messages.last().unwrap().content, "latest");
        assert_eq!(request.messages[0].role, LlmRole::User);
    }

    fn request_size(request: &LlmRequest) -> usize {
        request.system.chars().count() + request.messages.iter().map(|m| m.content.chars().count()).sum::<usize>()
    }

    #[test]
    fn test_tiny_budget_keeps_the_question() {
        let config = ContextConfig {
            max_context_chars: 200,
            ..Default::default()
        };
        let builder = ContextBuilder::new(config, Language::En);
        let ctx = page_context(5);
        let history = vec![Message::user("Why did the Submit click fail?")];

        let request = builder
            .build(PromptInput {
                session: Some(&session()),
                context: Some(&ctx),
                history: &history,
                forced: None,
            })
            .unwrap();

        assert!(request_size(&request) <= 200);
        assert_eq!(request.messages.last().unwrap().content, "Why did the Submit click fail?");
    }

    #[test]
    fn test_oversized_forced_slice_keeps_newest_lines() {
        let config = ContextConfig {
            max_context_chars: 2_000,
            ..Default::default()
        };
        let builder = ContextBuilder::new(config, Language::En);
        let ctx = page_context(500);
        let history = vec![Message::user("show me the console")];
        let forced = ContextRequest {
            kind: ContextKind::ConsoleErrors,
            details: None,
        };

        let request = builder
            .build(PromptInput {
                session: Some(&session()),
                context: Some(&ctx),
                history: &history,
                forced: Some(&forced),
            })
            .unwrap();

        assert!(request_size(&request) <= 2_000);
        assert!(request.system.contains("console error 499"));
        assert!(!request.system.contains("console error 0\n"));
        assert!(!request.system.contains("Execution history"));
        assert_eq!(request.messages[0].content, "show me the console");
    }

    #[test]
    fn test_context_key_uses_pattern_and_url() {
        let key = ContextBuilder::context_key(Some(&session()), Some(&page_context(0)));
        assert!(key.ends_with("@https://shop.test/pay"));
        assert!(key.contains("<n>"));
    }
}
