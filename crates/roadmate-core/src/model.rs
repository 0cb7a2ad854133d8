//! Model invocation seam.
//!
//! A [`ModelClient`] performs exactly one model turn: given the conversation so
//! far it either answers with text or asks for tools. Streaming adapters yield
//! [`ResponseFragment`]s in generation order and always finish with a terminal
//! fragment carrying the assembled [`ModelResponse`], or with an error.

use crate::error::Result;
use crate::types::{ToolCall, ToolDescriptor, Turn};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Everything the model sees for one invocation.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub turns: Vec<Turn>,
    pub tools: Vec<ToolDescriptor>,
}

/// Outcome of one model turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    /// A final answer for the user.
    Text(String),
    /// One or more tools to run before the model continues. `preamble` is any
    /// user-visible text the model produced alongside the calls.
    ToolCalls {
        preamble: String,
        calls: Vec<ToolCall>,
    },
}

impl ModelResponse {
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::ToolCalls {
            preamble: String::new(),
            calls,
        }
    }
}

/// Make every call id in a batch non-empty and unique, both within the batch
/// and against `taken`. The first call keeps a repeated id; later ones and
/// empty ids get a fresh `call_<uuid>`.
pub fn normalize_call_ids<'a>(
    calls: Vec<ToolCall>,
    taken: impl IntoIterator<Item = &'a str>,
) -> Vec<ToolCall> {
    let mut seen: HashSet<String> = taken.into_iter().map(str::to_string).collect();
    calls
        .into_iter()
        .map(|mut call| {
            if call.id.trim().is_empty() || seen.contains(&call.id) {
                call.id = format!("call_{}", Uuid::new_v4().simple());
            }
            seen.insert(call.id.clone());
            call
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FragmentPhase {
    /// Text the user is meant to read.
    AssistantText,
    /// Tool-call construction; never shown to the user.
    ToolInternal,
}

/// One streamed piece of a model turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFragment {
    pub phase: FragmentPhase,
    pub delta: String,
    /// Set on the last fragment of a turn.
    pub terminal: Option<ModelResponse>,
}

impl ResponseFragment {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            phase: FragmentPhase::AssistantText,
            delta: delta.into(),
            terminal: None,
        }
    }

    pub fn tool_internal(delta: impl Into<String>) -> Self {
        Self {
            phase: FragmentPhase::ToolInternal,
            delta: delta.into(),
            terminal: None,
        }
    }

    pub fn terminal(response: ModelResponse) -> Self {
        let phase = match response {
            ModelResponse::Text(_) => FragmentPhase::AssistantText,
            ModelResponse::ToolCalls { .. } => FragmentPhase::ToolInternal,
        };
        Self {
            phase,
            delta: String::new(),
            terminal: Some(response),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }
}

pub type FragmentStream = BoxStream<'static, Result<ResponseFragment>>;

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one model turn and wait for the whole response.
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse>;

    /// Run one model turn, yielding fragments as they are produced.
    ///
    /// The default implementation waits for [`ModelClient::invoke`] and
    /// replays the result as fragments.
    async fn invoke_streaming(&self, request: &ModelRequest) -> Result<FragmentStream> {
        let response = self.invoke(request).await?;
        Ok(Box::pin(stream::iter(
            fragments_for(response).into_iter().map(Ok),
        )))
    }
}

/// Split a complete response into the fragments a streaming model would have
/// produced for it. Concatenating the `assistant-text` deltas gives back the
/// response text.
pub fn fragments_for(response: ModelResponse) -> Vec<ResponseFragment> {
    let mut fragments = Vec::new();
    match &response {
        ModelResponse::Text(text) => {
            fragments.extend(text.split_inclusive(' ').map(ResponseFragment::text));
        }
        ModelResponse::ToolCalls { preamble, calls } => {
            fragments.extend(preamble.split_inclusive(' ').map(ResponseFragment::text));
            for call in calls {
                fragments.push(ResponseFragment::tool_internal(call.name.clone()));
                fragments.push(ResponseFragment::tool_internal(call.arguments.clone()));
            }
        }
    }
    fragments.push(ResponseFragment::terminal(response));
    fragments
}
