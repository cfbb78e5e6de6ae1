#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use debugmate_application::AssistantObserver;
use debugmate_core::action::{ActionResult, DebugAction};
use debugmate_core::agent::{AgentError, AgentGetter, AutomationAgent, ClickOptions, LocatedElement, Page, Rect};
use debugmate_core::context::{DebugContext, DiagnosticsCollector, ErrorInfo};
use debugmate_core::llm::{LlmClient, LlmError, LlmRequest, TextStream};
use debugmate_core::session::{DebugSession, Message, SessionStart};
use debugmate_core::suggestion::{FixOutcome, FixRunner, FixSuggestion};
use futures::stream;

/// LLM double replaying queued replies and recording every request.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    streams: Mutex<VecDeque<Vec<Result<String, LlmError>>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, text: &str) {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn fail(&self, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(LlmError::http(503, message)));
    }

    pub fn stream_chunks(&self, chunks: Vec<Result<String, LlmError>>) {
        self.streams.lock().unwrap().push_back(chunks);
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("No further ideas.".to_string()))
    }

    async fn stream(&self, request: LlmRequest) -> Result<TextStream, LlmError> {
        self.requests.lock().unwrap().push(request);
        let chunks = self.streams.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// Agent whose AI actions always succeed; no page attached.
pub struct AiOnlyAgent;

#[async_trait]
impl AutomationAgent for AiOnlyAgent {
    async fn act(&self, _instruction: &str) -> Result<(), AgentError> {
        Ok(())
    }

    async fn locate(&self, _description: &str) -> Result<Option<Vec<LocatedElement>>, AgentError> {
        Ok(Some(vec![LocatedElement {
            rect: Rect {
                left: 0.0,
                top: 0.0,
                width: 10.0,
                height: 10.0,
            },
            description: None,
        }]))
    }

    async fn query(&self, _prompt: &str) -> Result<String, AgentError> {
        Ok("A checkout form".to_string())
    }

    fn page(&self) -> Option<Arc<dyn Page>> {
        None
    }
}

/// Page recording every evaluated script.
#[derive(Default)]
pub struct ScriptPage {
    scripts: Mutex<Vec<String>>,
}

impl ScriptPage {
    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Page for ScriptPage {
    async fn mouse_click(&self, _x: f64, _y: f64, _options: ClickOptions) -> Result<(), AgentError> {
        Ok(())
    }
    async fn mouse_move(&self, _x: f64, _y: f64) -> Result<(), AgentError> {
        Ok(())
    }
    async fn keyboard_type(&self, _text: &str, _delay_ms: Option<u64>) -> Result<(), AgentError> {
        Ok(())
    }
    async fn keyboard_down(&self, _key: &str) -> Result<(), AgentError> {
        Ok(())
    }
    async fn keyboard_up(&self, _key: &str) -> Result<(), AgentError> {
        Ok(())
    }
    async fn keyboard_press(&self, _key: &str) -> Result<(), AgentError> {
        Ok(())
    }
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, AgentError> {
        self.scripts.lock().unwrap().push(script.to_string());
        Ok(serde_json::Value::Null)
    }
    async fn screenshot(&self) -> Result<Vec<u8>, AgentError> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
    async fn reload(&self) -> Result<(), AgentError> {
        Ok(())
    }
    async fn goto(&self, _url: &str) -> Result<(), AgentError> {
        Ok(())
    }
    async fn go_back(&self) -> Result<(), AgentError> {
        Ok(())
    }
    async fn go_forward(&self) -> Result<(), AgentError> {
        Ok(())
    }
    async fn url(&self) -> Result<String, AgentError> {
        Ok("https://shop.test/checkout".to_string())
    }
    async fn title(&self) -> Result<String, AgentError> {
        Ok("Checkout".to_string())
    }
    async fn content(&self) -> Result<String, AgentError> {
        Ok("<html></html>".to_string())
    }
}

/// Agent locating one element on a [`ScriptPage`].
pub struct PageAgent(pub Arc<ScriptPage>);

#[async_trait]
impl AutomationAgent for PageAgent {
    async fn act(&self, instruction: &str) -> Result<(), AgentError> {
        AiOnlyAgent.act(instruction).await
    }

    async fn locate(&self, description: &str) -> Result<Option<Vec<LocatedElement>>, AgentError> {
        AiOnlyAgent.locate(description).await
    }

    async fn query(&self, prompt: &str) -> Result<String, AgentError> {
        AiOnlyAgent.query(prompt).await
    }

    fn page(&self) -> Option<Arc<dyn Page>> {
        Some(self.0.clone())
    }
}

pub fn page_agent() -> (AgentGetter, Arc<ScriptPage>) {
    let page = Arc::new(ScriptPage::default());
    let agent: Arc<dyn AutomationAgent> = Arc::new(PageAgent(page.clone()));
    (Arc::new(move || Some(agent.clone())), page)
}

/// Collector counting how often the page was inspected.
#[derive(Default)]
pub struct CountingCollector(Mutex<usize>);

impl CountingCollector {
    pub fn calls(&self) -> usize {
        *self.0.lock().unwrap()
    }
}

#[async_trait]
impl DiagnosticsCollector for CountingCollector {
    async fn collect(&self) -> debugmate_core::Result<DebugContext> {
        let mut calls = self.0.lock().unwrap();
        *calls += 1;
        Ok(DebugContext {
            console_errors: vec![format!("collected {}", *calls)],
            ..Default::default()
        })
    }
}

pub fn ai_agent() -> AgentGetter {
    let agent: Arc<dyn AutomationAgent> = Arc::new(AiOnlyAgent);
    Arc::new(move || Some(agent.clone()))
}

pub fn no_agent() -> AgentGetter {
    Arc::new(|| None)
}

pub struct FixedRunner(pub bool);

#[async_trait]
impl FixRunner for FixedRunner {
    async fn apply(&self, _suggestion: &FixSuggestion, _session: &DebugSession) -> debugmate_core::Result<FixOutcome> {
        Ok(FixOutcome {
            success: self.0,
            message: "step re-run".to_string(),
        })
    }
}

/// Observer writing one line per callback.
#[derive(Default)]
pub struct EventLog(Mutex<Vec<String>>);

impl EventLog {
    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }
}

impl AssistantObserver for EventLog {
    fn on_message(&self, message: &Message) {
        self.push(format!("message:{:?}", message.role));
    }

    fn on_session_start(&self, session: &DebugSession) {
        self.push(format!("start:{}", session.id));
    }

    fn on_session_end(&self, session: &DebugSession) {
        self.push(format!("end:{}:{}", session.id, session.status));
    }

    fn on_action_executed(&self, action: &DebugAction, result: &ActionResult) {
        self.push(format!("action:{}:{}", action.action_type, result.success));
    }

    fn on_fix_applied(&self, _suggestion: &FixSuggestion, outcome: &FixOutcome) {
        self.push(format!("fix:{}", outcome.success));
    }
}

pub fn failure(message: &str) -> SessionStart {
    SessionStart {
        test_case_id: Some("tc-1".to_string()),
        test_case_name: Some("Checkout".to_string()),
        step_index: Some(4),
        error: Some(ErrorInfo::new("Error", message)),
        ..Default::default()
    }
}
