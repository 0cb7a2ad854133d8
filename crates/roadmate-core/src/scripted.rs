//! Deterministic model used by tests and offline runs.
//!
//! Responses are served from a queue in call order; once the queue is empty
//! an optional fallback function answers every request.

use crate::error::{AgentError, Result};
use crate::model::{ModelClient, ModelRequest, ModelResponse};
use crate::types::TurnKind;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type ResponderFn = dyn Fn(&ModelRequest) -> ModelResponse + Send + Sync;

/// One scripted model turn.
#[derive(Clone)]
pub enum ScriptStep {
    Respond(ModelResponse),
    /// Build the response from the request.
    Compute(Arc<ResponderFn>),
    /// Wait, then respond.
    Delayed(Duration, ModelResponse),
    /// Fail as an unreachable upstream would.
    Fail(String),
    /// Never answer.
    Stall,
}

impl ScriptStep {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Respond(ModelResponse::Text(text.into()))
    }

    pub fn compute<F>(f: F) -> Self
    where
        F: Fn(&ModelRequest) -> ModelResponse + Send + Sync + 'static,
    {
        Self::Compute(Arc::new(f))
    }
}

#[derive(Default)]
pub struct ScriptedModel {
    steps: Mutex<VecDeque<ScriptStep>>,
    fallback: Option<Arc<ResponderFn>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn with_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(&ModelRequest) -> ModelResponse + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(f));
        self
    }

    /// A model that answers every message with `"echo: <last user text>"`.
    pub fn echo() -> Self {
        Self::default().with_fallback(|req| {
            ModelResponse::Text(format!("echo: {}", last_user_text(req).unwrap_or_default()))
        })
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn next_step(&self) -> Option<ScriptStep> {
        let queued = self.steps.lock().ok().and_then(|mut s| s.pop_front());
        queued.or_else(|| self.fallback.clone().map(ScriptStep::Compute))
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        match self.next_step() {
            Some(ScriptStep::Respond(response)) => Ok(response),
            Some(ScriptStep::Compute(f)) => Ok(f(request)),
            Some(ScriptStep::Delayed(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Some(ScriptStep::Fail(message)) => Err(AgentError::ModelUnavailable(message)),
            Some(ScriptStep::Stall) => futures::future::pending().await,
            None => Err(AgentError::ModelUnavailable("script exhausted".into())),
        }
    }
}

/// Text of the most recent user message in a request.
pub fn last_user_text(request: &ModelRequest) -> Option<String> {
    request.turns.iter().rev().find_map(|t| match &t.kind {
        TurnKind::UserMessage { text } => Some(text.clone()),
        _ => None,
    })
}

/// Content of the most recent tool result in a request, if it came after the
/// last user message.
pub fn last_tool_result(request: &ModelRequest) -> Option<(String, bool)> {
    for turn in request.turns.iter().rev() {
        match &turn.kind {
            TurnKind::ToolResult {
                content, is_error, ..
            } => return Some((content.clone(), *is_error)),
            TurnKind::UserMessage { .. } => return None,
            _ => {}
        }
    }
    None
}
