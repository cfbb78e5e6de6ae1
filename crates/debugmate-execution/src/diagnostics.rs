//! Live page diagnostics for the context builder.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use debugmate_core::agent::{AgentError, AgentGetter, Page};
use debugmate_core::cache::{Cache, CacheManager};
use debugmate_core::config::ContextConfig;
use debugmate_core::context::{DebugContext, DiagnosticsCollector, ElementSummary, ErrorInfo, ExecutionRecord, NetworkError};
use debugmate_core::{DebugError, Result};
use serde::Deserialize;
use tracing::debug;

use crate::snapshot::encode_png;

/// Installs a `console.error` / failed-request recorder on the page.
///
/// Idempotent; the recorder survives until the next navigation.
pub const CAPTURE_HOOK_SCRIPT: &str = r#"(() => {
  if (window.__debugmate) return true;
  const state = { consoleErrors: [], networkErrors: [] };
  window.__debugmate = state;
  const original = console.error.bind(console);
  console.error = (...args) => {
    state.consoleErrors.push(args.map(a => (a && a.stack) || String(a)).join(' '));
    original(...args);
  };
  window.addEventListener('error', e => state.consoleErrors.push(String(e.message)));
  const fetchImpl = window.fetch && window.fetch.bind(window);
  if (fetchImpl) {
    window.fetch = async (...args) => {
      const url = String(args[0] && args[0].url || args[0]);
      try {
        const res = await fetchImpl(...args);
        if (!res.ok) state.networkErrors.push({ url, status: res.status, message: res.statusText });
        return res;
      } catch (err) {
        state.networkErrors.push({ url, status: null, message: String(err) });
        throw err;
      }
    };
  }
  return true;
})()"#;

/// Reads what the recorder captured plus a summary of visible elements.
pub const COLLECT_SCRIPT: &str = r#"(() => {
  const state = window.__debugmate || { consoleErrors: [], networkErrors: [] };
  const visible = el => {
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0 && r.bottom > 0 && r.top < window.innerHeight;
  };
  const selector = el => el.id ? '#' + el.id : (el.getAttribute('data-testid') ? `[data-testid="${el.getAttribute('data-testid')}"]` : null);
  const elements = Array.from(document.querySelectorAll('a,button,input,select,textarea,[role=button],h1,h2,label'))
    .filter(visible)
    .map(el => ({ tag: el.tagName.toLowerCase(), text: (el.innerText || el.value || el.placeholder || '').trim().slice(0, 80), selector: selector(el) }));
  return { consoleErrors: state.consoleErrors, networkErrors: state.networkErrors, visibleElements: elements };
})()"#;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CollectedPage {
    console_errors: Vec<String>,
    network_errors: Vec<NetworkError>,
    visible_elements: Vec<ElementSummary>,
}

#[derive(Debug, Default)]
struct StepState {
    step_description: Option<String>,
    step_index: Option<usize>,
    last_error: Option<ErrorInfo>,
    history: Vec<ExecutionRecord>,
}

/// Collects a [`DebugContext`] from the page behind the current agent.
///
/// Step information (current step, last error, history) is not visible on
/// the page; the test runner pushes it in through [`record_step`](Self::record_step)
/// and [`set_last_error`](Self::set_last_error).
pub struct PageDiagnosticsCollector {
    agent_getter: AgentGetter,
    config: ContextConfig,
    steps: Mutex<StepState>,
    screenshots: Option<Arc<Cache<String>>>,
}

impl PageDiagnosticsCollector {
    pub fn new(agent_getter: AgentGetter, config: ContextConfig) -> Self {
        Self {
            agent_getter,
            config,
            steps: Mutex::new(StepState::default()),
            screenshots: None,
        }
    }

    /// Reuses captures of the same URL while they are live in `cache`.
    pub fn with_screenshot_cache(mut self, cache: Arc<Cache<String>>) -> Self {
        self.screenshots = Some(cache);
        self
    }

    async fn capture(&self, page: &Arc<dyn Page>, url: &str) -> Option<String> {
        let shoot = || async {
            page.screenshot()
                .await
                .map(|bytes| encode_png(&bytes))
        };
        let result = match &self.screenshots {
            Some(cache) => cache.get_or_fetch(&CacheManager::screenshot_key(url), shoot).await,
            None => shoot().await,
        };
        match result {
            Ok(encoded) => Some(encoded),
            Err(err) => {
                debug!("[Diagnostics] Screenshot failed: {}", err);
                None
            }
        }
    }

    fn page(&self) -> Result<Arc<dyn Page>> {
        (self.agent_getter)()
            .and_then(|agent| agent.page())
            .ok_or_else(|| DebugError::from(AgentError::Unavailable("no page is attached".to_string())))
    }

    fn state(&self) -> std::sync::MutexGuard<'_, StepState> {
        self.steps.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Injects the console/network recorder into the current page.
    pub async fn install_hooks(&self) -> Result<()> {
        self.page()?.evaluate(CAPTURE_HOOK_SCRIPT).await?;
        Ok(())
    }

    /// Appends one executed step; the history is capped at the configured size.
    pub fn record_step(&self, record: ExecutionRecord) {
        let mut state = self.state();
        state.step_description = Some(record.description.clone());
        state.step_index = Some(record.step_index);
        state.history.push(record);
        let overflow = state
            .history
            .len()
            .saturating_sub(self.config.max_execution_history);
        state.history.drain(..overflow);
    }

    pub fn set_last_error(&self, error: ErrorInfo) {
        self.state().last_error = Some(error);
    }

    /// Forgets step state, e.g. when a new test run starts.
    pub fn reset(&self) {
        *self.state() = StepState::default();
    }
}

fn tail<T>(mut items: Vec<T>, n: usize) -> Vec<T> {
    let skip = items.len().saturating_sub(n);
    items.split_off(skip)
}

#[async_trait]
impl DiagnosticsCollector for PageDiagnosticsCollector {
    async fn collect(&self) -> Result<DebugContext> {
        let page = self.page()?;

        let url = page.url().await?;
        let title = page.title().await?;

        let collected = match page.evaluate(COLLECT_SCRIPT).await {
            Ok(value) => match serde_json::from_value::<CollectedPage>(value) {
                Ok(collected) => collected,
                Err(err) => {
                    debug!("[Diagnostics] Unexpected collection payload: {}", err);
                    CollectedPage::default()
                }
            },
            Err(err) => {
                debug!("[Diagnostics] Collection script failed: {}", err);
                CollectedPage::default()
            }
        };

        let screenshot = if self.config.include_screenshot {
            self.capture(&page, &url).await
        } else {
            None
        };

        let (step_description, step_index, last_error, history) = {
            let state = self.state();
            (
                state.step_description.clone(),
                state.step_index,
                state.last_error.clone(),
                state.history.clone(),
            )
        };

        let mut visible_elements = collected.visible_elements;
        visible_elements.truncate(self.config.max_visible_elements);

        Ok(DebugContext {
            url: Some(url),
            title: Some(title),
            step_description,
            step_index,
            last_error,
            screenshot,
            console_errors: tail(collected.console_errors, self.config.max_console_errors),
            network_errors: tail(collected.network_errors, self.config.max_network_errors),
            visible_elements,
            execution_history: tail(history, self.config.max_execution_history),
        })
    }
}
