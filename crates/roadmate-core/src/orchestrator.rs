//! The tool-calling loop.
//!
//! One user message is processed as a small state machine:
//!
//! ```text
//! AwaitingModel ──text──────────► Responding ──► Done
//!       │ ▲
//!  calls│ └──────── ExecutingTools ◄── RequestingTools
//!       └─────────────────────────────────┘
//! any state ──► Failed
//! ```
//!
//! New turns accumulate in a pending log and reach the session store in one
//! append once the loop has settled, while the session lock is still held.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::agents::AgentProfile;
use crate::config::OrchestratorConfig;
use crate::demux::{demultiplex, StreamEvent};
use crate::error::{AgentError, Result};
use crate::model::{normalize_call_ids, ModelClient, ModelRequest, ModelResponse};
use crate::session::{SessionLocks, SessionStore};
use crate::tool_registry::ToolRegistry;
use crate::types::{visible_transcript, LoopEvent, ToolCall, ToolOutput, Turn, TurnKind};

const CYCLE_LIMIT_APOLOGY: &str =
    "Sorry, I wasn't able to finish that request. Could you try asking in a different way?";

pub type EventStream = BoxStream<'static, StreamEvent>;

/// Limits applied to every user turn.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub max_tool_cycles: usize,
    pub model_timeout: Duration,
    pub stream_idle_timeout: Duration,
    pub stream_buffer: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for LoopSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            max_tool_cycles: config.max_tool_cycles,
            model_timeout: config.model_timeout(),
            stream_idle_timeout: config.stream_idle_timeout(),
            stream_buffer: config.stream_buffer.max(1),
        }
    }
}

#[derive(Debug)]
enum LoopState {
    AwaitingModel,
    RequestingTools(Vec<ToolCall>),
    ExecutingTools(Vec<ToolCall>),
    Responding(String),
    Failed(AgentError),
}

impl LoopState {
    fn name(&self) -> &'static str {
        match self {
            Self::AwaitingModel => "awaiting_model",
            Self::RequestingTools(_) => "requesting_tools",
            Self::ExecutingTools(_) => "executing_tools",
            Self::Responding(_) => "responding",
            Self::Failed(_) => "failed",
        }
    }
}

/// Where loop events go. A blocking turn has no consumer; a streaming turn
/// is cancelled once its consumer disappears.
struct EventSink {
    tx: Option<mpsc::Sender<LoopEvent>>,
    cancelled: AtomicBool,
}

impl EventSink {
    fn detached() -> Self {
        Self {
            tx: None,
            cancelled: AtomicBool::new(false),
        }
    }

    fn channel(tx: mpsc::Sender<LoopEvent>) -> Self {
        Self {
            tx: Some(tx),
            cancelled: AtomicBool::new(false),
        }
    }

    fn is_streaming(&self) -> bool {
        self.tx.is_some()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
            || self.tx.as_ref().is_some_and(|tx| tx.is_closed())
    }

    /// Returns false once the consumer is gone.
    async fn emit(&self, event: LoopEvent) -> bool {
        let Some(tx) = &self.tx else {
            return true;
        };
        if self.cancelled.load(Ordering::Relaxed) {
            return false;
        }
        if tx.send(event).await.is_err() {
            debug!("Stream consumer went away, cancelling turn");
            self.cancelled.store(true, Ordering::Relaxed);
            return false;
        }
        true
    }
}

/// Drives conversations for one agent profile.
#[derive(Clone)]
pub struct Orchestrator {
    model: Arc<dyn ModelClient>,
    registry: Arc<ToolRegistry>,
    store: Arc<dyn SessionStore>,
    locks: Arc<SessionLocks>,
    profile: Arc<AgentProfile>,
    settings: LoopSettings,
    tz: Tz,
}

impl Orchestrator {
    /// Fails if the profile names a tool the registry doesn't have.
    pub fn new(
        model: Arc<dyn ModelClient>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn SessionStore>,
        profile: AgentProfile,
    ) -> Result<Self> {
        profile.validate(&registry)?;
        Ok(Self {
            model,
            registry,
            store,
            locks: Arc::new(SessionLocks::new()),
            profile: Arc::new(profile),
            settings: LoopSettings::default(),
            tz: chrono_tz::Europe::Helsinki,
        })
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_time_zone(mut self, tz: Tz) -> Self {
        self.tz = tz;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<SessionLocks> {
        &self.locks
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    /// Process one user message and return the final reply.
    ///
    /// The turn runs in its own task, so dropping this future does not leave
    /// the session half-updated.
    pub async fn send_message(&self, session_id: &str, text: &str) -> Result<String> {
        check_input(session_id, text)?;
        let this = self.clone();
        let session_id = session_id.to_string();
        let text = text.to_string();
        tokio::spawn(async move { this.run_turn(session_id, text, EventSink::detached()).await })
            .await
            .map_err(|e| AgentError::Other(anyhow::anyhow!("turn task failed: {}", e)))?
    }

    /// Process one user message, streaming the reply as it is generated.
    ///
    /// Dropping the returned stream cancels the turn: tools already running
    /// finish and are recorded, but the model is not called again.
    pub fn stream_message(&self, session_id: &str, text: &str) -> Result<EventStream> {
        check_input(session_id, text)?;
        let (tx, rx) = mpsc::channel(self.settings.stream_buffer.max(1));
        let this = self.clone();
        let session_id = session_id.to_string();
        let text = text.to_string();
        tokio::spawn(async move {
            let _ = this.run_turn(session_id, text, EventSink::channel(tx)).await;
        });
        Ok(Box::pin(demultiplex(ReceiverStream::new(rx))))
    }

    /// User and assistant messages of a session.
    pub async fn transcript(&self, session_id: &str) -> Result<Vec<Turn>> {
        let turns = self.store.load(session_id).await?;
        Ok(visible_transcript(&turns).into_iter().cloned().collect())
    }

    async fn run_turn(self, session_id: String, text: String, sink: EventSink) -> Result<String> {
        let _guard = self.locks.acquire(&session_id).await;

        let history = match self.store.load(&session_id).await {
            Ok(history) => history,
            Err(e) => {
                sink.emit(LoopEvent::Failed { error: e.to_string() }).await;
                return Err(e);
            }
        };
        debug!(session = %session_id, turns = history.len(), "Starting turn");

        let mut pending = vec![Turn::user(text)];
        let outcome = self.drive(&session_id, &history, &mut pending, &sink).await;

        let (result, event) = match outcome {
            Ok(segments) => {
                let turn = Turn::assistant_from_segments(segments);
                let reply = turn.text().unwrap_or_default().to_string();
                pending.push(turn);
                info!(session = %session_id, new_turns = pending.len(), "Turn completed");
                (Ok(reply.clone()), LoopEvent::Done { reply })
            }
            Err(e) => {
                match &e {
                    AgentError::ToolCycleLimitExceeded(_) => {
                        pending.push(Turn::assistant(CYCLE_LIMIT_APOLOGY))
                    }
                    _ => pending.push(Turn::failure(e.kind(), e.to_string())),
                }
                warn!(session = %session_id, kind = e.kind(), "Turn failed: {}", e);
                let error = e.to_string();
                (Err(e), LoopEvent::Failed { error })
            }
        };

        if let Err(e) = self.store.append(&session_id, pending).await {
            error!(session = %session_id, "Failed to persist turn: {}", e);
            sink.emit(LoopEvent::Failed { error: e.to_string() }).await;
            return Err(e);
        }
        sink.emit(event).await;
        result
    }

    /// Run the state machine until it settles. On success returns the text
    /// segments of the reply; tool pairs are appended to `pending` as each
    /// batch completes.
    async fn drive(
        &self,
        session_id: &str,
        history: &[Turn],
        pending: &mut Vec<Turn>,
        sink: &EventSink,
    ) -> Result<Vec<String>> {
        let system_prompt = self.profile.render_system_prompt(Utc::now(), self.tz);
        let tools = self.registry.descriptors(Some(&self.profile.tools));
        let max_cycles = self.settings.max_tool_cycles;

        let mut segments = Vec::new();
        let mut cycles = 0;
        let mut state = LoopState::AwaitingModel;

        loop {
            debug!(session = session_id, cycle = cycles, state = state.name(), "Loop state");
            state = match state {
                LoopState::AwaitingModel if sink.is_cancelled() => {
                    LoopState::Failed(AgentError::Cancelled)
                }
                LoopState::AwaitingModel => {
                    let request = ModelRequest {
                        system_prompt: system_prompt.clone(),
                        turns: history.iter().chain(pending.iter()).cloned().collect(),
                        tools: tools.clone(),
                    };
                    match self.call_model(&request, sink).await {
                        Ok(ModelResponse::Text(text)) => LoopState::Responding(text),
                        Ok(ModelResponse::ToolCalls { calls, .. }) if calls.is_empty() => {
                            LoopState::Failed(AgentError::ModelResponseMalformed(
                                "tool call response without any calls".into(),
                            ))
                        }
                        Ok(ModelResponse::ToolCalls { preamble, calls }) => {
                            if !preamble.is_empty() {
                                segments.push(preamble);
                            }
                            let taken = history.iter().chain(pending.iter()).filter_map(|t| match &t.kind {
                                TurnKind::ToolInvocation { call_id, .. } => Some(call_id.as_str()),
                                _ => None,
                            });
                            LoopState::RequestingTools(normalize_call_ids(calls, taken))
                        }
                        Err(e) => LoopState::Failed(e),
                    }
                }
                LoopState::RequestingTools(calls) => {
                    cycles += 1;
                    if cycles > max_cycles {
                        LoopState::Failed(AgentError::ToolCycleLimitExceeded(max_cycles))
                    } else if sink.is_cancelled() {
                        LoopState::Failed(AgentError::Cancelled)
                    } else {
                        LoopState::ExecutingTools(calls)
                    }
                }
                LoopState::ExecutingTools(calls) => {
                    let outputs = self.execute(&calls, sink).await;
                    pending.extend(calls.iter().map(Turn::tool_invocation));
                    pending.extend(outputs.iter().map(Turn::tool_result));
                    LoopState::AwaitingModel
                }
                LoopState::Responding(text) => {
                    segments.push(text);
                    return Ok(segments);
                }
                LoopState::Failed(e) => return Err(e),
            };
        }
    }

    async fn call_model(&self, request: &ModelRequest, sink: &EventSink) -> Result<ModelResponse> {
        let timeout = self.settings.model_timeout;
        let attempt = async {
            if sink.is_streaming() {
                self.consume_stream(request, sink).await
            } else {
                self.model.invoke(request).await
            }
        };
        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::ModelUnavailable(format!(
                "no response within {:?}",
                timeout
            ))),
        }
    }

    async fn consume_stream(&self, request: &ModelRequest, sink: &EventSink) -> Result<ModelResponse> {
        let mut fragments = self.model.invoke_streaming(request).await?;
        let idle = self.settings.stream_idle_timeout;

        loop {
            let next = tokio::time::timeout(idle, fragments.next())
                .await
                .map_err(|_| AgentError::ModelUnavailable(format!("model stream stalled for {:?}", idle)))?;
            match next {
                Some(Ok(fragment)) => {
                    if let Some(response) = fragment.terminal {
                        return Ok(response);
                    }
                    if !sink.emit(LoopEvent::Fragment(fragment)).await {
                        return Err(AgentError::Cancelled);
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(AgentError::ModelResponseMalformed(
                        "stream ended without a terminal fragment".into(),
                    ))
                }
            }
        }
    }

    /// Run one batch. Calls outside the active profile are answered with an
    /// error result without touching the registry.
    async fn execute(&self, calls: &[ToolCall], sink: &EventSink) -> Vec<ToolOutput> {
        for call in calls {
            sink.emit(LoopEvent::ToolCallStarted {
                id: call.id.clone(),
                name: call.name.clone(),
            })
            .await;
        }

        let allowed = |call: &ToolCall| self.profile.tools.iter().any(|t| *t == call.name);
        let runnable: Vec<ToolCall> = calls.iter().filter(|c| allowed(*c)).cloned().collect();
        let mut executed = self.registry.invoke_all(&runnable).await.into_iter();

        let outputs: Vec<ToolOutput> = calls
            .iter()
            .map(|call| {
                if allowed(call) {
                    executed.next().unwrap_or_else(|| {
                        ToolOutput::error(&call.id, format!("Error: {} produced no output", call.name))
                    })
                } else {
                    warn!(tool = %call.name, "Model requested a tool outside the active profile");
                    ToolOutput::error(
                        &call.id,
                        format!("Error: {}", AgentError::UnknownTool(call.name.clone())),
                    )
                }
            })
            .collect();

        for output in &outputs {
            sink.emit(LoopEvent::ToolCallFinished(output.clone())).await;
        }
        outputs
    }
}

fn check_input(session_id: &str, text: &str) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(AgentError::InvalidInput("sessionId must be a non-empty string".into()));
    }
    if text.trim().is_empty() {
        return Err(AgentError::InvalidInput("message must be a non-empty string".into()));
    }
    Ok(())
}
