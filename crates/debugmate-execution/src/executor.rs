//! Executes parsed [`DebugAction`]s against the automation agent.
//!
//! Every action type tries the AI strategy first (one natural-language
//! instruction) and falls back to the manual strategy (locate the element,
//! then drive mouse and keyboard primitives) when the AI path fails and a
//! page is attached. Failures never escape [`ActionExecutor::execute`]:
//! errors and panics both come back as a failed [`ActionResult`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use debugmate_core::action::{ActionResult, ActionType, DebugAction, MouseButton};
use debugmate_core::agent::{AgentError, AgentGetter, AutomationAgent, ClickOptions, LocatedElement, Page};
use debugmate_core::cache::{Cache, cache_key};
use debugmate_core::config::ExecutorConfig;
use futures::FutureExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::highlight::{HighlightRegistry, clear_all_script, new_dom_id, overlay_script, removal_script};
use crate::snapshot::{SnapshotStore, diff_screenshots, encode_png};

static DURATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+)\s*(ms|s)?").expect("duration regex"));

static PURE_DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*\d+\s*(ms|s|sec|secs|seconds?)?\s*$").expect("plain delay regex"));

/// Resolves a wait duration in milliseconds.
///
/// A numeric `timeout` wins; otherwise the first `<n>[ms|s]` in `value` is
/// used (bare numbers are milliseconds); otherwise `default_ms`.
pub fn parse_wait_duration(timeout: Option<u64>, value: Option<&str>, default_ms: u64) -> u64 {
    if let Some(ms) = timeout {
        return ms;
    }
    value
        .and_then(|v| DURATION_RE.captures(v))
        .and_then(|caps| {
            let amount: u64 = caps.get(1)?.as_str().parse().ok()?;
            let seconds = caps
                .get(2)
                .is_some_and(|unit| unit.as_str().eq_ignore_ascii_case("s"));
            Some(if seconds { amount.saturating_mul(1000) } else { amount })
        })
        .unwrap_or(default_ms)
}

fn ai_result(message: String) -> ActionResult {
    ActionResult::ok(message).with_data(json!({ "strategy": "ai" }))
}

fn manual_result(message: String) -> ActionResult {
    ActionResult::ok(message).with_data(json!({ "strategy": "manual" }))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Drives one automation agent on behalf of the assistant.
pub struct ActionExecutor {
    agent_getter: AgentGetter,
    config: ExecutorConfig,
    highlights: HighlightRegistry,
    snapshots: SnapshotStore,
    element_cache: Option<Arc<Cache<Vec<LocatedElement>>>>,
}

impl ActionExecutor {
    pub fn new(agent_getter: AgentGetter, config: ExecutorConfig) -> Self {
        let snapshots = SnapshotStore::new(config.max_snapshots);
        Self {
            agent_getter,
            config,
            highlights: HighlightRegistry::new(),
            snapshots,
            element_cache: None,
        }
    }

    /// Shares an element-location cache tier with this executor.
    pub fn with_element_cache(mut self, cache: Arc<Cache<Vec<LocatedElement>>>) -> Self {
        self.element_cache = Some(cache);
        self
    }

    pub fn highlights(&self) -> &HighlightRegistry {
        &self.highlights
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Executes one action. Never fails: errors become a failed result.
    pub async fn execute(&self, action: &DebugAction) -> ActionResult {
        let started = Instant::now();
        debug!("[ActionExecutor] Executing {}", action.describe());

        let mut result = match AssertUnwindSafe(self.dispatch(action)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                warn!("[ActionExecutor] {} failed: {}", action.describe(), err);
                ActionResult::failed(format!("Failed to {}", action.describe()), err.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!("[ActionExecutor] {} panicked: {}", action.describe(), message);
                ActionResult::failed(
                    format!("Failed to {}", action.describe()),
                    format!("action panicked: {message}"),
                )
            }
        };

        result.duration = started.elapsed().as_millis() as u64;
        result
    }

    /// Executes actions in order, stopping after the first failed critical
    /// action (`click`, `input`).
    pub async fn execute_multiple(&self, actions: &[DebugAction]) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(actions.len());
        for action in actions {
            let result = self.execute(action).await;
            let halt = !result.success && action.action_type.is_critical();
            results.push(result);
            if halt {
                info!(
                    "[ActionExecutor] Critical action '{}' failed, skipping {} remaining",
                    action.describe(),
                    actions.len() - results.len()
                );
                break;
            }
        }
        results
    }

    /// Removes one highlight's overlays from the page.
    pub async fn remove_highlight(&self, highlight_id: &str) -> ActionResult {
        let Some(dom_ids) = self.highlights.take(highlight_id) else {
            return ActionResult::failed("Unknown highlight", format!("no highlight with id {highlight_id}"));
        };
        match self.run_script(&removal_script(&dom_ids)).await {
            Ok(_) => ActionResult::ok("Highlight removed"),
            Err(err) => ActionResult::failed("Failed to remove highlight", err.to_string()),
        }
    }

    /// Removes every overlay this executor drew.
    pub async fn clear_highlights(&self) -> ActionResult {
        let count = self.highlights.drain().len();
        match self.run_script(&clear_all_script()).await {
            Ok(_) => ActionResult::ok(format!("Cleared {count} highlight(s)")),
            Err(err) => ActionResult::failed("Failed to clear highlights", err.to_string()),
        }
    }

    // ============================================================================
    // Dispatch
    // ============================================================================

    async fn dispatch(&self, action: &DebugAction) -> Result<ActionResult, AgentError> {
        if action.action_type == ActionType::Wait && self.wait_is_plain_delay(action) {
            return Ok(self.delay(action).await);
        }

        let baseline = if action.action_type == ActionType::Compare {
            match self.comparison_baseline(action) {
                Ok(baseline) => Some(baseline),
                Err(result) => return Ok(result),
            }
        } else {
            None
        };

        let agent = self.agent()?;
        match action.action_type {
            ActionType::Click => self.click(&agent, action).await,
            ActionType::Input => self.input(&agent, action).await,
            ActionType::Scroll => self.scroll(&agent, action).await,
            ActionType::Refresh => self.refresh(&agent, action).await,
            ActionType::Highlight => self.highlight(&agent, action).await,
            ActionType::Screenshot => self.screenshot(&agent).await,
            ActionType::Wait => self.wait_for_element(&agent, action).await,
            ActionType::Compare => self.compare(&agent, baseline.unwrap_or_default()).await,
            ActionType::Describe => self.describe(&agent, action).await,
            ActionType::Locate => self.locate_action(&agent, action).await,
        }
    }

    fn agent(&self) -> Result<Arc<dyn AutomationAgent>, AgentError> {
        (self.agent_getter)()
            .ok_or_else(|| AgentError::Unavailable("no automation agent is attached".to_string()))
    }

    fn page(agent: &Arc<dyn AutomationAgent>) -> Result<Arc<dyn Page>, AgentError> {
        agent
            .page()
            .ok_or_else(|| AgentError::Unavailable("no page is attached".to_string()))
    }

    fn require_target(action: &DebugAction) -> Result<&str, AgentError> {
        action
            .target
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AgentError::Other(format!("{} requires a target", action.action_type)))
    }

    async fn run_script(&self, script: &str) -> Result<serde_json::Value, AgentError> {
        let agent = self.agent()?;
        Self::page(&agent)?.evaluate(script).await
    }

    /// `Ok(true)` when the AI instruction succeeded, `Ok(false)` when the
    /// manual strategy should run instead.
    async fn try_ai(
        &self,
        agent: &Arc<dyn AutomationAgent>,
        action: &DebugAction,
        instruction: &str,
    ) -> Result<bool, AgentError> {
        if !self.config.prefer_ai || action.options.manual {
            return Ok(false);
        }
        match agent.act(instruction).await {
            Ok(()) => Ok(true),
            Err(err) if agent.page().is_some() => {
                debug!("[ActionExecutor] AI strategy failed ({}), using manual strategy", err);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    // ============================================================================
    // Element location
    // ============================================================================

    async fn locate(
        &self,
        agent: &Arc<dyn AutomationAgent>,
        description: &str,
    ) -> Result<Vec<LocatedElement>, AgentError> {
        let key = cache_key(&[json!(description)]);
        if let Some(hit) = self.element_cache.as_ref().and_then(|cache| cache.get(&key)) {
            return Ok(hit);
        }

        match agent.locate(description).await? {
            Some(elements) if !elements.is_empty() => {
                if let Some(cache) = &self.element_cache {
                    cache.set(key, elements.clone());
                }
                Ok(elements)
            }
            _ => Err(AgentError::ElementNotFound(description.to_string())),
        }
    }

    async fn locate_first(
        &self,
        agent: &Arc<dyn AutomationAgent>,
        description: &str,
    ) -> Result<LocatedElement, AgentError> {
        self.locate(agent, description)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::ElementNotFound(description.to_string()))
    }

    // ============================================================================
    // Actions
    // ============================================================================

    async fn click(&self, agent: &Arc<dyn AutomationAgent>, action: &DebugAction) -> Result<ActionResult, AgentError> {
        let options = &action.options;
        let needs_manual = options.position.is_some()
            || options.click_count.is_some_and(|n| n > 1)
            || options.button.is_some_and(|b| b != MouseButton::Left);

        if !needs_manual {
            let target = Self::require_target(action)?;
            if self.try_ai(agent, action, &format!("click {target}")).await? {
                return Ok(ai_result(format!("Clicked {target}")));
            }
        }

        let page = Self::page(agent)?;
        let (x, y) = match options.position {
            Some(point) => (point.x, point.y),
            None => self.locate_first(agent, Self::require_target(action)?).await?.center(),
        };
        let click = ClickOptions {
            button: options.button.unwrap_or_default(),
            click_count: options.click_count.unwrap_or(1).max(1),
        };
        page.mouse_click(x, y, click).await?;

        let subject = action.target.as_deref().unwrap_or("position");
        Ok(manual_result(format!("Clicked {subject} at ({x:.0}, {y:.0})")))
    }

    async fn input(&self, agent: &Arc<dyn AutomationAgent>, action: &DebugAction) -> Result<ActionResult, AgentError> {
        let value = action
            .value
            .as_deref()
            .ok_or_else(|| AgentError::Other("input requires a value".to_string()))?;
        let options = &action.options;
        let needs_manual =
            options.clear_before || options.submit || options.delay_ms.is_some() || options.position.is_some();

        if !needs_manual {
            let instruction = match action.target.as_deref() {
                Some(target) => format!("type \"{value}\" into {target}"),
                None => format!("type \"{value}\""),
            };
            if self.try_ai(agent, action, &instruction).await? {
                return Ok(ai_result(format!("Typed into {}", action.target.as_deref().unwrap_or("focused element"))));
            }
        }

        let page = Self::page(agent)?;
        let focus = match (options.position, action.target.as_deref()) {
            (Some(point), _) => Some((point.x, point.y)),
            (None, Some(target)) => Some(self.locate_first(agent, target).await?.center()),
            (None, None) => None,
        };
        if let Some((x, y)) = focus {
            page.mouse_click(x, y, ClickOptions::default()).await?;
        }

        if options.clear_before {
            page.keyboard_down("Control").await?;
            page.keyboard_press("a").await?;
            page.keyboard_up("Control").await?;
            page.keyboard_press("Backspace").await?;
        }
        page.keyboard_type(value, options.delay_ms).await?;
        if options.submit {
            page.keyboard_press("Enter").await?;
        }

        Ok(manual_result(format!(
            "Typed {} characters into {}",
            value.chars().count(),
            action.target.as_deref().unwrap_or("focused element")
        )))
    }

    async fn scroll(&self, agent: &Arc<dyn AutomationAgent>, action: &DebugAction) -> Result<ActionResult, AgentError> {
        let amount = self.config.scroll_amount;
        let direction = action.value.as_deref().unwrap_or("down").trim().to_lowercase();

        let instruction = match action.target.as_deref() {
            Some(target) => format!("scroll to {target}"),
            None => format!("scroll {direction} by {amount} pixels"),
        };
        if self.try_ai(agent, action, &instruction).await? {
            return Ok(ai_result(format!("Scrolled ({instruction})")));
        }

        let page = Self::page(agent)?;
        let script = match action.target.as_deref() {
            Some(target) => {
                let element = self.locate_first(agent, target).await?;
                format!("window.scrollBy(0, {})", element.rect.top - 100.0)
            }
            None => match direction.as_str() {
                "top" => "window.scrollTo(0, 0)".to_string(),
                "bottom" => "window.scrollTo(0, document.body.scrollHeight)".to_string(),
                "up" => format!("window.scrollBy(0, {})", -amount),
                other => format!("window.scrollBy(0, {})", other.parse::<i64>().unwrap_or(amount)),
            },
        };
        page.evaluate(&script).await?;
        Ok(manual_result(format!("Scrolled ({instruction})")))
    }

    async fn refresh(&self, agent: &Arc<dyn AutomationAgent>, action: &DebugAction) -> Result<ActionResult, AgentError> {
        match agent.page() {
            Some(page) if action.options.manual || !self.config.prefer_ai => {
                page.reload().await?;
                Ok(manual_result("Page reloaded".to_string()))
            }
            _ => {
                if self.try_ai(agent, action, "reload the page").await? {
                    return Ok(ai_result("Page reloaded".to_string()));
                }
                Self::page(agent)?.reload().await?;
                Ok(manual_result("Page reloaded".to_string()))
            }
        }
    }

    async fn highlight(&self, agent: &Arc<dyn AutomationAgent>, action: &DebugAction) -> Result<ActionResult, AgentError> {
        let target = Self::require_target(action)?;
        let page = Self::page(agent)?;
        let elements = self.locate(agent, target).await?;
        let duration = action
            .options
            .duration_ms
            .unwrap_or(self.config.highlight_duration_ms);
        let label = action.options.label.as_deref().or(action.value.as_deref());

        let mut dom_ids = Vec::with_capacity(elements.len());
        for element in &elements {
            let dom_id = new_dom_id();
            page.evaluate(&overlay_script(
                &dom_id,
                &element.rect,
                label,
                action.options.color.as_deref(),
                duration,
            ))
            .await?;
            dom_ids.push(dom_id);
        }

        let count = dom_ids.len();
        let highlight_id = self.highlights.register(dom_ids, duration);
        Ok(ActionResult::ok(format!("Highlighted {count} element(s) matching {target}")).with_data(json!({
            "highlightId": highlight_id,
            "count": count,
            "durationMs": duration,
        })))
    }

    async fn screenshot(&self, agent: &Arc<dyn AutomationAgent>) -> Result<ActionResult, AgentError> {
        let bytes = Self::page(agent)?.screenshot().await?;
        let encoded = encode_png(&bytes);
        let snapshot_id = self.snapshots.insert(encoded.clone());

        Ok(ActionResult::ok("Screenshot captured")
            .with_data(json!({ "snapshotId": snapshot_id, "bytes": bytes.len() }))
            .with_screenshot(encoded))
    }

    /// A wait without a target, or whose target is itself a duration.
    fn wait_is_plain_delay(&self, action: &DebugAction) -> bool {
        match action.target.as_deref() {
            None => true,
            Some(target) => target.trim().is_empty() || PURE_DURATION_RE.is_match(target),
        }
    }

    async fn delay(&self, action: &DebugAction) -> ActionResult {
        let source = action.value.as_deref().or(action.target.as_deref());
        let requested = parse_wait_duration(action.options.timeout, source, self.config.default_wait_ms);
        let ms = requested.min(self.config.max_wait_ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        ActionResult::ok(format!("Waited {ms}ms")).with_data(json!({ "waitedMs": ms }))
    }

    /// Polls `locate` until the target shows up or the timeout elapses.
    async fn wait_for_element(
        &self,
        agent: &Arc<dyn AutomationAgent>,
        action: &DebugAction,
    ) -> Result<ActionResult, AgentError> {
        let target = Self::require_target(action)?;
        let timeout_ms = parse_wait_duration(action.options.timeout, action.value.as_deref(), self.config.max_wait_ms)
            .min(self.config.max_wait_ms);
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(10));

        loop {
            match self.locate(agent, target).await {
                Ok(elements) => {
                    return Ok(ActionResult::ok(format!("{target} is present"))
                        .with_data(json!({ "count": elements.len() })));
                }
                Err(AgentError::ElementNotFound(_)) => {}
                Err(err) => return Err(err),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AgentError::Timeout(format!("waiting for {target} after {timeout_ms}ms")));
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Resolves the screenshot to compare against, or the failed result.
    fn comparison_baseline(&self, action: &DebugAction) -> Result<String, ActionResult> {
        if let Some(shot) = action.options.previous_screenshot.as_ref().filter(|s| !s.is_empty()) {
            return Ok(shot.clone());
        }
        let snapshot_id = action
            .options
            .snapshot_id
            .as_deref()
            .or(action.target.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty());

        match snapshot_id {
            Some(id) => self.snapshots.get(id).ok_or_else(|| {
                ActionResult::failed(
                    "Cannot compare screenshots",
                    format!("missing comparison target: unknown snapshot {id}"),
                )
            }),
            None => Err(ActionResult::failed(
                "Cannot compare screenshots",
                "missing comparison target",
            )),
        }
    }

    async fn compare(&self, agent: &Arc<dyn AutomationAgent>, baseline: String) -> Result<ActionResult, AgentError> {
        let current = encode_png(&Self::page(agent)?.screenshot().await?);
        let diff = diff_screenshots(&baseline, &current);
        let snapshot_id = self.snapshots.insert(current.clone());

        let message = if diff.changed {
            format!("Page changed: {:.1}% of the image differs", diff.ratio * 100.0)
        } else {
            "No visible change".to_string()
        };
        Ok(ActionResult::ok(message)
            .with_data(json!({
                "changed": diff.changed,
                "difference": diff.ratio,
                "snapshotId": snapshot_id,
            }))
            .with_screenshot(current))
    }

    async fn describe(&self, agent: &Arc<dyn AutomationAgent>, action: &DebugAction) -> Result<ActionResult, AgentError> {
        let subject = action.target.as_deref().unwrap_or("the current page");

        if self.config.prefer_ai && !action.options.manual {
            let prompt = format!("Describe {subject} as it appears right now, including anything that blocks interaction.");
            match agent.query(&prompt).await {
                Ok(text) => {
                    return Ok(ActionResult::ok(text.clone())
                        .with_data(json!({ "description": text, "strategy": "ai" })));
                }
                Err(err) if agent.page().is_some() => {
                    debug!("[ActionExecutor] AI describe failed ({}), using page metadata", err);
                }
                Err(err) => return Err(err),
            }
        }

        let page = Self::page(agent)?;
        let title = page.title().await?;
        let url = page.url().await?;
        let mut data = json!({ "title": title, "url": url, "strategy": "manual" });
        if let Some(target) = action.target.as_deref() {
            let elements = self.locate(agent, target).await?;
            data["elements"] = json!(elements);
        }
        Ok(ActionResult::ok(format!("{title} ({url})")).with_data(data))
    }

    async fn locate_action(&self, agent: &Arc<dyn AutomationAgent>, action: &DebugAction) -> Result<ActionResult, AgentError> {
        let target = Self::require_target(action)?;
        let elements = self.locate(agent, target).await?;
        Ok(ActionResult::ok(format!("Found {} element(s) matching {target}", elements.len()))
            .with_data(json!({ "elements": elements })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ActMode, MockAgent, MockPage, getter};
    use debugmate_core::action::{ActionOptions, Point};
    use debugmate_core::config::TierConfig;

    fn executor(agent: Option<Arc<MockAgent>>) -> ActionExecutor {
        ActionExecutor::new(getter(agent), ExecutorConfig::default())
    }

    #[test]
    fn test_parse_wait_duration() {
        assert_eq!(parse_wait_duration(Some(42), Some("5s"), 1000), 42);
        assert_eq!(parse_wait_duration(None, Some("5s"), 1000), 5000);
        assert_eq!(parse_wait_duration(None, Some("250 ms"), 1000), 250);
        assert_eq!(parse_wait_duration(None, Some("wait 300"), 1000), 300);
        assert_eq!(parse_wait_duration(None, Some("soon"), 1000), 1000);
        assert_eq!(parse_wait_duration(None, None, 1000), 1000);
    }

    #[test]
    fn test_duration_patterns_compile() {
        assert!(DURATION_RE.is_match("5s"));
        assert!(PURE_DURATION_RE.is_match(" 250 ms "));
        assert!(!PURE_DURATION_RE.is_match("until the spinner hides"));
    }

    #[tokio::test]
    async fn test_click_uses_ai_strategy_first() {
        let page = MockPage::new();
        let agent = MockAgent::new(ActMode::Succeed).with_page(page.clone());
        let result = executor(Some(agent.clone())).execute(&DebugAction::click("Submit")).await;

        assert!(result.success);
        assert_eq!(result.data.unwrap()["strategy"], "ai");
        assert_eq!(agent.act_calls(), vec!["click Submit".to_string()]);
        assert!(page.calls().is_empty());
    }

    #[tokio::test]
    async fn test_click_falls_back_to_manual() {
        let page = MockPage::new();
        let agent = MockAgent::new(ActMode::Unsupported).with_page(page.clone());
        let result = executor(Some(agent)).execute(&DebugAction::click("Submit")).await;

        assert!(result.success, "{:?}", result);
        assert_eq!(result.data.unwrap()["strategy"], "manual");
        assert_eq!(page.calls(), vec!["click 60,40 x1".to_string()]);
    }

    #[tokio::test]
    async fn test_explicit_position_skips_location() {
        let page = MockPage::new();
        let agent = MockAgent::new(ActMode::Succeed).with_page(page.clone());
        let action = DebugAction::new(ActionType::Click).with_options(ActionOptions {
            position: Some(Point { x: 5.0, y: 7.0 }),
            click_count: Some(2),
            ..Default::default()
        });

        assert!(executor(Some(agent.clone())).execute(&action).await.success);
        assert_eq!(page.calls(), vec!["click 5,7 x2".to_string()]);
        assert_eq!(agent.locate_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_agent_is_a_failed_result() {
        let result = executor(None).execute(&DebugAction::click("Submit")).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_input_manual_clear_and_submit() {
        let page = MockPage::new();
        let agent = MockAgent::new(ActMode::Succeed).with_page(page.clone());
        let action = DebugAction::input("Email", "a@b.test").with_options(ActionOptions {
            clear_before: true,
            submit: true,
            delay_ms: Some(20),
            ..Default::default()
        });

        let result = executor(Some(agent.clone())).execute(&action).await;
        assert!(result.success);
        assert!(agent.act_calls().is_empty());
        assert_eq!(
            page.calls(),
            vec![
                "click 60,40 x1",
                "down Control",
                "press a",
                "up Control",
                "press Backspace",
                "type a@b.test delay=Some(20)",
                "press Enter",
            ]
        );
    }

    #[tokio::test]
    async fn test_sequence_halts_on_critical_failure() {
        let agent = MockAgent::new(ActMode::Fail);
        let results = executor(Some(agent))
            .execute_multiple(&[DebugAction::click("A"), DebugAction::click("B")])
            .await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
    }

    #[tokio::test]
    async fn test_sequence_continues_past_non_critical_failure() {
        let page = MockPage::new();
        let agent = MockAgent::new(ActMode::Succeed)
            .with_page(page)
            .with_locate_none();
        let results = executor(Some(agent))
            .execute_multiple(&[DebugAction::highlight("Ghost"), DebugAction::click("B")])
            .await;

        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("not found"));
        assert!(results[1].success);
    }

    #[tokio::test]
    async fn test_highlight_registers_and_removes() {
        let page = MockPage::new();
        let agent = MockAgent::new(ActMode::Succeed).with_page(page.clone());
        let exec = executor(Some(agent));

        let result = exec.execute(&DebugAction::highlight("Submit")).await;
        assert!(result.success);
        let id = result.data.unwrap()["highlightId"].as_str().unwrap().to_string();
        assert_eq!(exec.highlights().len(), 1);

        assert!(exec.remove_highlight(&id).await.success);
        assert!(exec.highlights().is_empty());
        assert!(!exec.remove_highlight(&id).await.success);
        assert_eq!(page.calls().iter().filter(|c| c.starts_with("eval")).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_wait_accepts_duration_in_target() {
        let exec = executor(None);
        let action = DebugAction::new(ActionType::Wait).with_target("2s");

        let result = exec.execute(&action).await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["waitedMs"], 2000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_element_times_out() {
        let agent = MockAgent::new(ActMode::Succeed)
            .with_page(MockPage::new())
            .with_locate_none();
        let action = DebugAction::new(ActionType::Wait)
            .with_target("Spinner gone")
            .with_value("1s");

        let result = executor(Some(agent.clone())).execute(&action).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
        assert!(agent.locate_count() > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_element_polls_until_present() {
        let agent = MockAgent::new(ActMode::Succeed)
            .with_page(MockPage::new())
            .with_appear_after(3);
        let action = DebugAction::new(ActionType::Wait).with_target("Results table");

        let result = executor(Some(agent.clone())).execute(&action).await;
        assert!(result.success, "{:?}", result);
        assert_eq!(agent.locate_count(), 3);
    }

    #[tokio::test]
    async fn test_compare_requires_a_baseline() {
        let result = executor(None).execute(&DebugAction::new(ActionType::Compare)).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("missing comparison target"));
    }

    #[tokio::test]
    async fn test_screenshot_then_compare_by_snapshot_id() {
        let agent = MockAgent::new(ActMode::Succeed).with_page(MockPage::new());
        let exec = executor(Some(agent));

        let shot = exec.execute(&DebugAction::new(ActionType::Screenshot)).await;
        assert!(shot.screenshot.is_some());
        let snapshot_id = shot.data.unwrap()["snapshotId"].as_str().unwrap().to_string();

        let compare = DebugAction::new(ActionType::Compare).with_options(ActionOptions {
            snapshot_id: Some(snapshot_id),
            ..Default::default()
        });
        let result = exec.execute(&compare).await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["changed"], false);
    }

    #[tokio::test]
    async fn test_panics_are_contained() {
        let agent = MockAgent::new(ActMode::Panic).with_page(MockPage::new());
        let result = executor(Some(agent)).execute(&DebugAction::click("Boom")).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn test_locations_are_cached() {
        let agent = MockAgent::new(ActMode::Succeed).with_page(MockPage::new());
        let cache = Arc::new(Cache::new("elements", TierConfig::new(10, 0)));
        let exec = executor(Some(agent.clone())).with_element_cache(cache.clone());

        let locate = DebugAction::new(ActionType::Locate).with_target("Submit");
        assert!(exec.execute(&locate).await.success);
        assert!(exec.execute(&locate).await.success);
        assert_eq!(agent.locate_count(), 1);
        assert_eq!(cache.stats().total_hits, 1);
    }

    #[tokio::test]
    async fn test_describe_prefers_agent_query() {
        let agent = MockAgent::new(ActMode::Succeed).with_page(MockPage::new());
        let result = executor(Some(agent)).execute(&DebugAction::new(ActionType::Describe)).await;
        assert!(result.success);
        assert_eq!(result.message, "A login form with a disabled Submit button");
    }
}
