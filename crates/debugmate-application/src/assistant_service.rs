//! Debug assistant service.
//!
//! Owns the session lifecycle and conversation history, and wires the
//! engines together for each turn: refresh diagnostics, build the prompt,
//! call the LLM (through the reply cache), parse the reply, optionally run
//! the requested actions, and learn from suggested and applied fixes.
//!
//! # Session states
//!
//! `no session -> active -> resolved | abandoned`. Starting a session
//! abandons the previous one; a successful fix resolves it.

use std::sync::{Arc, RwLock as StdRwLock};

use debugmate_core::action::{ActionResult, DebugAction};
use debugmate_core::agent::AgentGetter;
use debugmate_core::cache::{CacheManager, CacheManagerStats};
use debugmate_core::config::AssistantConfig;
use debugmate_core::context::{ContextRequest, DebugContext, DiagnosticsCollector};
use debugmate_core::knowledge::{KnowledgeBase, KnowledgeStats, NewKnowledgeEntry, extract_error_pattern};
use debugmate_core::llm::{LlmClient, LlmError, LlmRequest};
use debugmate_core::parser::ResponseParser;
use debugmate_core::session::{ConversationHistory, DebugSession, Message, SessionStart, SessionStatus};
use debugmate_core::suggestion::{FixOutcome, FixRunner, FixSuggestion};
use debugmate_core::{DebugError, Result};
use debugmate_execution::{ActionExecutor, PageDiagnosticsCollector};
use futures::StreamExt;
use serde_json::json;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::context_builder::{ContextBuilder, PromptInput};
use crate::fix_applier::FixApplier;
use crate::fix_generator::{FailureInput, FixSuggestionGenerator};
use crate::messages;

/// Success rate given to fixes the LLM proposed but nobody has tried yet.
pub const TENTATIVE_SUCCESS_RATE: f64 = 0.5;

/// Lifecycle and conversation callbacks. Every method defaults to a no-op.
pub trait AssistantObserver: Send + Sync {
    fn on_message(&self, _message: &Message) {}
    fn on_session_start(&self, _session: &DebugSession) {}
    fn on_session_end(&self, _session: &DebugSession) {}
    fn on_action_executed(&self, _action: &DebugAction, _result: &ActionResult) {}
    fn on_fix_applied(&self, _suggestion: &FixSuggestion, _outcome: &FixOutcome) {}
}

struct ActiveSession {
    session: DebugSession,
    history: ConversationHistory,
    context: DebugContext,
    /// Slice the last reply asked for, consumed by the next prompt.
    pending_context: Option<ContextRequest>,
}

struct PreparedTurn {
    session_id: String,
    error_message: String,
    query: String,
    context_key: String,
    request: LlmRequest,
}

pub struct DebugAssistantService {
    config: AssistantConfig,
    llm: Arc<dyn LlmClient>,
    agent_getter: AgentGetter,
    executor: ActionExecutor,
    diagnostics: Option<Arc<dyn DiagnosticsCollector>>,
    parser: ResponseParser,
    context_builder: ContextBuilder,
    fix_generator: FixSuggestionGenerator,
    fix_applier: FixApplier,
    knowledge: Mutex<KnowledgeBase>,
    cache: Arc<CacheManager>,
    state: RwLock<Option<ActiveSession>>,
    observers: StdRwLock<Vec<Arc<dyn AssistantObserver>>>,
}

impl DebugAssistantService {
    pub fn new(config: AssistantConfig, llm: Arc<dyn LlmClient>, agent_getter: AgentGetter) -> Self {
        let cache = Arc::new(CacheManager::new(config.cache.clone()));
        let executor = ActionExecutor::new(agent_getter.clone(), config.executor.clone())
            .with_element_cache(cache.element_cache());

        Self {
            parser: ResponseParser::new(),
            context_builder: ContextBuilder::new(config.context.clone(), config.language),
            fix_generator: FixSuggestionGenerator::new(config.suggestions.clone(), config.language),
            fix_applier: FixApplier::new(),
            knowledge: Mutex::new(KnowledgeBase::new(&config.knowledge)),
            diagnostics: None,
            state: RwLock::new(None),
            observers: StdRwLock::new(Vec::new()),
            executor,
            cache,
            llm,
            agent_getter,
            config,
        }
    }

    pub fn with_knowledge_base(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = Mutex::new(knowledge);
        self
    }

    pub fn with_diagnostics(mut self, collector: Arc<dyn DiagnosticsCollector>) -> Self {
        self.diagnostics = Some(collector);
        self
    }

    pub fn with_fix_runner(mut self, runner: Arc<dyn FixRunner>) -> Self {
        self.fix_applier = FixApplier::new().with_runner(runner);
        self
    }

    /// Replaces the cache manager (e.g. one driven by a manual clock).
    pub fn with_cache_manager(mut self, cache: Arc<CacheManager>) -> Self {
        self.executor = ActionExecutor::new(self.agent_getter.clone(), self.config.executor.clone())
            .with_element_cache(cache.element_cache());
        self.cache = cache;
        self
    }

    /// Collects diagnostics from the automation page, reusing screenshots
    /// through this service's cache. Call after `with_cache_manager`.
    pub fn with_page_diagnostics(mut self) -> Self {
        let collector = PageDiagnosticsCollector::new(self.agent_getter.clone(), self.config.context.clone())
            .with_screenshot_cache(self.cache.screenshot_cache());
        self.diagnostics = Some(Arc::new(collector));
        self
    }

    pub fn subscribe(&self, observer: Arc<dyn AssistantObserver>) {
        self.observers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(observer);
    }

    fn notify(&self, f: impl Fn(&dyn AssistantObserver)) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        for observer in &observers {
            f(observer.as_ref());
        }
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    // ============================================================================
    // Session lifecycle
    // ============================================================================

    /// Starts a session for a step failure, abandoning any active one.
    pub async fn start_session(&self, start: SessionStart) -> DebugSession {
        let session = DebugSession::start(&start);
        let seed = DebugContext {
            step_index: start.step_index,
            last_error: start.error.clone(),
            screenshot: start.screenshot.clone(),
            ..Default::default()
        };
        let context = seed.merged_with(start.context.unwrap_or_default());

        let previous = {
            let mut state = self.state.write().await;
            let previous = state.take().map(|mut active| {
                active.session.finish(SessionStatus::Abandoned);
                active.session
            });
            *state = Some(ActiveSession {
                session: session.clone(),
                history: ConversationHistory::new(self.config.max_history),
                context: context.clone(),
                pending_context: None,
            });
            previous
        };

        if let Some(previous) = previous {
            self.forget_session(&previous.id).await;
            info!("[DebugAssistant] Session {} abandoned", previous.id);
            self.notify(|o| o.on_session_end(&previous));
        }
        info!("[DebugAssistant] Session {} started", session.id);
        self.notify(|o| o.on_session_start(&session));
        session
    }

    /// Ends the active session with a terminal status.
    pub async fn end_session(&self, status: SessionStatus) -> Result<DebugSession> {
        let ended = {
            let mut state = self.state.write().await;
            let active = state.as_mut().ok_or(DebugError::NoActiveSession)?;
            if !active.session.finish(status) {
                return Err(DebugError::internal(format!(
                    "cannot end a session with status '{status}'"
                )));
            }
            let ended = active.session.clone();
            *state = None;
            ended
        };

        self.forget_session(&ended.id).await;
        info!("[DebugAssistant] Session {} ended as {}", ended.id, ended.status);
        self.notify(|o| o.on_session_end(&ended));
        Ok(ended)
    }

    pub async fn current_session(&self) -> Option<DebugSession> {
        self.state.read().await.as_ref().map(|a| a.session.clone())
    }

    /// Conversation of the active session, oldest first.
    pub async fn history(&self) -> Vec<Message> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|a| a.history.to_vec())
            .unwrap_or_default()
    }

    /// Context slice the next prompt will include in full.
    pub async fn pending_context_request(&self) -> Option<ContextRequest> {
        self.state
            .read()
            .await
            .as_ref()
            .and_then(|a| a.pending_context.clone())
    }

    async fn active_session(&self) -> Result<(DebugSession, DebugContext)> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|a| (a.session.clone(), a.context.clone()))
            .ok_or(DebugError::NoActiveSession)
    }

    async fn resolve(&self, session_id: &str) {
        let resolved = {
            let mut state = self.state.write().await;
            let finished = match state.as_mut() {
                Some(active) if active.session.id == session_id => {
                    active.session.finish(SessionStatus::Resolved).then(|| active.session.clone())
                }
                _ => None,
            };
            if finished.is_some() {
                *state = None;
            }
            finished
        };

        if let Some(session) = resolved {
            self.forget_session(&session.id).await;
            info!("[DebugAssistant] Session {} resolved", session.id);
            self.notify(|o| o.on_session_end(&session));
        }
    }

    /// Drops per-session page state and removes overlays still on screen.
    async fn forget_session(&self, session_id: &str) {
        self.cache.invalidate_page_state(session_id);
        if self.executor.highlights().is_empty() {
            return;
        }
        let result = self.executor.clear_highlights().await;
        if !result.success {
            debug!("[DebugAssistant] Highlights not cleared: {}", result.message);
        }
    }

    // ============================================================================
    // Conversation
    // ============================================================================

    /// Starts a session and asks the assistant about the failure.
    pub async fn analyze_failure(&self, start: SessionStart) -> Result<Message> {
        let step = start
            .context
            .as_ref()
            .and_then(|c| c.step_description.clone());
        let error = start
            .error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_default();
        let prompt = messages::analysis_request(self.config.language, step.as_deref(), &error);

        self.start_session(start).await;
        self.send_message(&prompt).await
    }

    /// Sends one user turn and returns the assistant reply.
    ///
    /// LLM failures do not fail the call: the reply is a localized apology
    /// with `{"error": true}` metadata.
    pub async fn send_message(&self, text: &str) -> Result<Message> {
        let turn = self.prepare_turn(text).await?;
        let llm = Arc::clone(&self.llm);
        let request = turn.request.clone();
        let reply = self
            .cache
            .get_or_fetch_llm(&turn.query, &turn.context_key, || async move { llm.complete(request).await })
            .await;
        self.finish_turn(turn, reply).await
    }

    /// Like [`send_message`](Self::send_message), forwarding text deltas to
    /// `on_delta` as they arrive. Output received before a stream error is
    /// discarded.
    pub async fn send_message_streaming<F>(&self, text: &str, mut on_delta: F) -> Result<Message>
    where
        F: FnMut(&str) + Send,
    {
        let turn = self.prepare_turn(text).await?;

        let reply = match self.llm.stream(turn.request.clone()).await {
            Ok(mut stream) => {
                let mut full = String::new();
                let mut failure = None;
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(delta) => {
                            on_delta(&delta);
                            full.push_str(&delta);
                        }
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }
                match failure {
                    Some(err) => Err(err),
                    None => Ok(full),
                }
            }
            Err(err) => Err(err),
        };

        if let Ok(full) = &reply {
            self.cache
                .set_llm_response(&turn.query, &turn.context_key, full.clone());
        }
        self.finish_turn(turn, reply).await
    }

    async fn refresh_context(&self, session_id: &str, current: DebugContext) -> DebugContext {
        let Some(collector) = self.diagnostics.clone() else {
            return current;
        };
        if let Some(snapshot) = self.cache.get_context(session_id) {
            debug!("[DebugAssistant] Reusing page snapshot for {}", session_id);
            return snapshot;
        }
        let url = current.url.clone().unwrap_or_default();

        match self
            .cache
            .get_or_fetch_diagnostics(&url, || async move { collector.collect().await })
            .await
        {
            Ok(fresh) => {
                let merged = current.merged_with(fresh);
                self.cache.set_context(session_id, merged.clone());
                merged
            }
            Err(err) => {
                warn!("[DebugAssistant] Diagnostics unavailable: {}", err);
                current
            }
        }
    }

    async fn prepare_turn(&self, text: &str) -> Result<PreparedTurn> {
        self.cache.maybe_sweep();

        let (session, context) = self.active_session().await?;
        let context = self.refresh_context(&session.id, context).await;
        let user_message = Message::user(text);

        let turn = {
            let mut state = self.state.write().await;
            let active = state
                .as_mut()
                .filter(|a| a.session.id == session.id)
                .ok_or(DebugError::NoActiveSession)?;

            active.context = context;
            active.history.push(user_message.clone());
            let forced = active.pending_context.take();
            let history = active.history.to_vec();

            let request = self.context_builder.build(PromptInput {
                session: Some(&active.session),
                context: Some(&active.context),
                history: &history,
                forced: forced.as_ref(),
            })?;

            let error_message = active
                .context
                .last_error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| active.session.error_message().to_string());

            PreparedTurn {
                session_id: active.session.id.clone(),
                context_key: ContextBuilder::context_key(Some(&active.session), Some(&active.context)),
                query: text.to_string(),
                error_message,
                request,
            }
        };

        debug!(
            "[DebugAssistant] Prompt ready: {} messages, {} chars",
            turn.request.messages.len(),
            turn.request.char_len()
        );
        self.notify(|o| o.on_message(&user_message));
        Ok(turn)
    }

    async fn finish_turn(&self, turn: PreparedTurn, reply: std::result::Result<String, LlmError>) -> Result<Message> {
        let message = match reply {
            Ok(raw) => self.assistant_message(&turn, &raw).await,
            Err(err) => {
                warn!("[DebugAssistant] {}", err);
                Message::assistant(messages::llm_failure(self.config.language))
                    .with_metadata(json!({ "error": true, "detail": err.to_string() }))
            }
        };

        {
            let mut state = self.state.write().await;
            match state.as_mut().filter(|a| a.session.id == turn.session_id) {
                Some(active) => {
                    active.pending_context = message.context_request.clone();
                    active.history.push(message.clone());
                }
                None => debug!(
                    "[DebugAssistant] Session {} ended mid-turn, reply not recorded",
                    turn.session_id
                ),
            }
        }

        self.notify(|o| o.on_message(&message));
        Ok(message)
    }

    async fn assistant_message(&self, turn: &PreparedTurn, raw: &str) -> Message {
        let parsed = self.parser.parse(raw);

        if !parsed.suggestions.is_empty() {
            self.learn_tentative(&turn.error_message, &parsed.suggestions)
                .await;
        }

        let mut metadata = json!({ "confidence": parsed.confidence });
        if self.config.auto_execute_actions && !parsed.actions.is_empty() {
            let results = self.execute_actions(&parsed.actions).await;
            metadata["actionResults"] = json!(results);
        }

        Message::assistant(parsed.text)
            .with_actions(parsed.actions)
            .with_suggestions(parsed.suggestions)
            .with_context_request(parsed.context_request)
            .with_metadata(metadata)
    }

    /// Stores LLM-proposed fixes as untried knowledge.
    async fn learn_tentative(&self, error_message: &str, suggestions: &[FixSuggestion]) {
        let pattern = extract_error_pattern(error_message);
        if pattern.is_empty() {
            return;
        }
        let id = self.knowledge.lock().await.add_entry(
            // Suggested, not yet used.
            NewKnowledgeEntry::new(pattern, suggestions.to_vec())
                .with_frequency(0)
                .with_success_rate(TENTATIVE_SUCCESS_RATE)
                .with_tags(["llm"]),
        );
        self.cache.invalidate_fix_suggestions();
        debug!(
            "[DebugAssistant] Recorded {} suggested fixes under {}",
            suggestions.len(),
            id
        );
    }

    // ============================================================================
    // Actions
    // ============================================================================

    pub async fn execute_action(&self, action: &DebugAction) -> ActionResult {
        let result = self.executor.execute(action).await;
        self.page_changed().await;
        self.notify(|o| o.on_action_executed(action, &result));
        result
    }

    /// Runs actions in order, stopping after a failed critical action.
    pub async fn execute_actions(&self, actions: &[DebugAction]) -> Vec<ActionResult> {
        let results = self.executor.execute_multiple(actions).await;
        self.page_changed().await;
        for (action, result) in actions.iter().zip(&results) {
            self.notify(|o| o.on_action_executed(action, result));
        }
        results
    }

    /// Actions may change the page, so the next turn collects again.
    async fn page_changed(&self) {
        if let Some(active) = self.state.read().await.as_ref() {
            self.cache.invalidate_page_state(&active.session.id);
        }
    }

    // ============================================================================
    // Fixes
    // ============================================================================

    /// Ranked fixes for the active failure, cached per error and URL.
    pub async fn get_fix_suggestions(&self) -> Result<Vec<FixSuggestion>> {
        let (session, context) = self.active_session().await?;
        let failure = FailureInput::from_context(&context, session.error_message());
        let url = context.url.clone().unwrap_or_default();

        let knowledge = self.knowledge.lock().await;
        Ok(self
            .cache
            .get_or_compute_fix_suggestions(failure.error_message, &url, || {
                self.fix_generator.generate(&failure, Some(&knowledge))
            }))
    }

    /// Applies a fix through the runner, records the outcome and resolves
    /// the session on success.
    pub async fn apply_fix(&self, suggestion: &FixSuggestion) -> Result<FixOutcome> {
        let (session, _) = self.active_session().await?;
        let outcome = self.fix_applier.apply(suggestion, &session).await?;

        self.record_outcome(&session, suggestion, outcome.success).await;
        self.notify(|o| o.on_fix_applied(suggestion, &outcome));
        if outcome.success {
            self.resolve(&session.id).await;
        }
        Ok(outcome)
    }

    /// Records an outcome observed outside the runner (e.g. the operator
    /// fixed the test by hand). Returns the knowledge entry id.
    pub async fn report_fix_outcome(&self, suggestion: &FixSuggestion, success: bool) -> Result<Option<String>> {
        let (session, _) = self.active_session().await?;
        let id = self.record_outcome(&session, suggestion, success).await;

        let outcome = FixOutcome {
            success,
            message: messages::reported_outcome(self.config.language, success).to_string(),
        };
        self.notify(|o| o.on_fix_applied(suggestion, &outcome));
        if success {
            self.resolve(&session.id).await;
        }
        Ok(id)
    }

    async fn record_outcome(&self, session: &DebugSession, suggestion: &FixSuggestion, success: bool) -> Option<String> {
        let id = {
            let mut knowledge = self.knowledge.lock().await;
            FixApplier::record(&mut knowledge, session, suggestion, success)
        };
        self.cache.invalidate_fix_suggestions();
        id
    }

    // ============================================================================
    // Knowledge and caches
    // ============================================================================

    /// Locks the knowledge base for direct access.
    pub async fn knowledge(&self) -> MutexGuard<'_, KnowledgeBase> {
        self.knowledge.lock().await
    }

    pub async fn knowledge_stats(&self) -> KnowledgeStats {
        self.knowledge.lock().await.stats()
    }

    pub async fn export_knowledge(&self) -> Result<String> {
        self.knowledge.lock().await.export()
    }

    pub async fn import_knowledge(&self, json: &str) -> Result<usize> {
        let imported = self.knowledge.lock().await.import(json)?;
        self.cache.invalidate_fix_suggestions();
        Ok(imported)
    }

    pub fn cache_stats(&self) -> CacheManagerStats {
        self.cache.stats()
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }
}
