//! Scripted agent and page doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use debugmate_core::agent::{AgentError, AgentGetter, AutomationAgent, ClickOptions, LocatedElement, Page, Rect};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActMode {
    Succeed,
    Unsupported,
    Fail,
    Panic,
}

pub struct MockPage {
    calls: Mutex<Vec<String>>,
    pub screenshot: Mutex<Vec<u8>>,
    pub evaluate_result: Mutex<Value>,
    pub url: String,
    pub title: String,
}

impl MockPage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            screenshot: Mutex::new(vec![137, 80, 78, 71, 1, 2, 3, 4]),
            evaluate_result: Mutex::new(Value::Null),
            url: "https://shop.test/checkout".to_string(),
            title: "Checkout".to_string(),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Page for MockPage {
    async fn mouse_click(&self, x: f64, y: f64, options: ClickOptions) -> Result<(), AgentError> {
        self.record(format!("click {x},{y} x{}", options.click_count));
        Ok(())
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), AgentError> {
        self.record(format!("move {x},{y}"));
        Ok(())
    }

    async fn keyboard_type(&self, text: &str, delay_ms: Option<u64>) -> Result<(), AgentError> {
        self.record(format!("type {text} delay={delay_ms:?}"));
        Ok(())
    }

    async fn keyboard_down(&self, key: &str) -> Result<(), AgentError> {
        self.record(format!("down {key}"));
        Ok(())
    }

    async fn keyboard_up(&self, key: &str) -> Result<(), AgentError> {
        self.record(format!("up {key}"));
        Ok(())
    }

    async fn keyboard_press(&self, key: &str) -> Result<(), AgentError> {
        self.record(format!("press {key}"));
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, AgentError> {
        self.record(format!("eval {}", script.len()));
        Ok(self.evaluate_result.lock().unwrap().clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AgentError> {
        self.record("screenshot".to_string());
        Ok(self.screenshot.lock().unwrap().clone())
    }

    async fn reload(&self) -> Result<(), AgentError> {
        self.record("reload".to_string());
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<(), AgentError> {
        self.record(format!("goto {url}"));
        Ok(())
    }

    async fn go_back(&self) -> Result<(), AgentError> {
        self.record("back".to_string());
        Ok(())
    }

    async fn go_forward(&self) -> Result<(), AgentError> {
        self.record("forward".to_string());
        Ok(())
    }

    async fn url(&self) -> Result<String, AgentError> {
        Ok(self.url.clone())
    }

    async fn title(&self) -> Result<String, AgentError> {
        Ok(self.title.clone())
    }

    async fn content(&self) -> Result<String, AgentError> {
        Ok("<html></html>".to_string())
    }
}

pub struct MockAgent {
    mode: ActMode,
    page: Option<Arc<MockPage>>,
    act_calls: Mutex<Vec<String>>,
    locate_calls: AtomicUsize,
    /// `locate` returns nothing until this many calls have been made.
    appear_after: usize,
    locate_none: bool,
}

impl MockAgent {
    pub fn new(mode: ActMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            page: None,
            act_calls: Mutex::new(Vec::new()),
            locate_calls: AtomicUsize::new(0),
            appear_after: 0,
            locate_none: false,
        })
    }

    fn rebuild(self: Arc<Self>, f: impl FnOnce(&mut Self)) -> Arc<Self> {
        let mut agent = Arc::try_unwrap(self).unwrap_or_else(|_| panic!("agent already shared"));
        f(&mut agent);
        Arc::new(agent)
    }

    pub fn with_page(self: Arc<Self>, page: Arc<MockPage>) -> Arc<Self> {
        self.rebuild(|a| a.page = Some(page))
    }

    pub fn with_locate_none(self: Arc<Self>) -> Arc<Self> {
        self.rebuild(|a| a.locate_none = true)
    }

    pub fn with_appear_after(self: Arc<Self>, calls: usize) -> Arc<Self> {
        self.rebuild(|a| a.appear_after = calls)
    }

    pub fn act_calls(&self) -> Vec<String> {
        self.act_calls.lock().unwrap().clone()
    }

    pub fn locate_count(&self) -> usize {
        self.locate_calls.load(Ordering::SeqCst)
    }
}

pub fn element() -> LocatedElement {
    LocatedElement {
        rect: Rect {
            left: 10.0,
            top: 20.0,
            width: 100.0,
            height: 40.0,
        },
        description: Some("button".to_string()),
    }
}

#[async_trait]
impl AutomationAgent for MockAgent {
    async fn act(&self, instruction: &str) -> Result<(), AgentError> {
        self.act_calls.lock().unwrap().push(instruction.to_string());
        match self.mode {
            ActMode::Succeed => Ok(()),
            ActMode::Unsupported => Err(AgentError::Unsupported("act".to_string())),
            ActMode::Fail => Err(AgentError::Other(format!("could not {instruction}"))),
            ActMode::Panic => panic!("agent crashed during {instruction}"),
        }
    }

    async fn locate(&self, _description: &str) -> Result<Option<Vec<LocatedElement>>, AgentError> {
        let call = self.locate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.locate_none || call < self.appear_after {
            return Ok(None);
        }
        Ok(Some(vec![element()]))
    }

    async fn query(&self, _prompt: &str) -> Result<String, AgentError> {
        match self.mode {
            ActMode::Succeed => Ok("A login form with a disabled Submit button".to_string()),
            _ => Err(AgentError::Unsupported("query".to_string())),
        }
    }

    fn page(&self) -> Option<Arc<dyn Page>> {
        self.page.clone().map(|p| p as Arc<dyn Page>)
    }
}

pub fn getter(agent: Option<Arc<MockAgent>>) -> AgentGetter {
    Arc::new(move || agent.clone().map(|a| a as Arc<dyn AutomationAgent>))
}

pub fn console_payload() -> Value {
    json!({
        "consoleErrors": ["TypeError: cannot read properties of undefined"],
        "visibleElements": [{ "tag": "button", "text": "Submit", "selector": "#submit" }]
    })
}
