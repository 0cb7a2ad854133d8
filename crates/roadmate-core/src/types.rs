use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ResponseFragment;
use crate::schema::InputSchema;

/// A single entry in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: TurnKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnKind {
    UserMessage {
        text: String,
    },
    AssistantMessage {
        text: String,
        /// Per-cycle text segments that make up `text`, when there was more than one.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        blocks: Vec<ContentBlock>,
    },
    ToolInvocation {
        call_id: String,
        tool_name: String,
        /// Raw JSON arguments exactly as the model produced them.
        arguments: String,
    },
    ToolResult {
        call_id: String,
        content: String,
        is_error: bool,
    },
    /// Recorded when a user turn ends without an assistant answer.
    FailureNotice {
        kind: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
}

impl Turn {
    fn new(kind: TurnKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(TurnKind::UserMessage { text: text.into() })
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(TurnKind::AssistantMessage {
            text: text.into(),
            blocks: Vec::new(),
        })
    }

    /// An assistant message assembled from several text segments.
    pub fn assistant_from_segments(segments: Vec<String>) -> Self {
        let text = segments.concat();
        let blocks = if segments.len() > 1 {
            segments
                .into_iter()
                .filter(|s| !s.is_empty())
                .map(|text| ContentBlock::Text { text })
                .collect()
        } else {
            Vec::new()
        };
        Self::new(TurnKind::AssistantMessage { text, blocks })
    }

    pub fn tool_invocation(call: &ToolCall) -> Self {
        Self::new(TurnKind::ToolInvocation {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
        })
    }

    pub fn tool_result(output: &ToolOutput) -> Self {
        Self::new(TurnKind::ToolResult {
            call_id: output.tool_call_id.clone(),
            content: output.content.clone(),
            is_error: output.is_error,
        })
    }

    pub fn failure(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TurnKind::FailureNotice {
            kind: kind.into(),
            message: message.into(),
        })
    }

    /// User and assistant messages are the only turns an end user ever sees.
    pub fn is_visible(&self) -> bool {
        matches!(
            self.kind,
            TurnKind::UserMessage { .. } | TurnKind::AssistantMessage { .. }
        )
    }

    /// Text of a user or assistant message.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            TurnKind::UserMessage { text } | TurnKind::AssistantMessage { text, .. } => {
                Some(text)
            }
            _ => None,
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Model-facing description of a registered tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: InputSchema,
}

/// Output from a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// Event emitted by the orchestration loop while a user turn is processed.
#[derive(Debug, Clone)]
pub enum LoopEvent {
    /// A piece of a streamed model response.
    Fragment(ResponseFragment),
    /// A tool is about to run.
    ToolCallStarted { id: String, name: String },
    /// A tool finished, successfully or not.
    ToolCallFinished(ToolOutput),
    /// The turn completed with this reply.
    Done { reply: String },
    /// The turn failed.
    Failed { error: String },
}

/// Visible transcript of a history: user and assistant messages only.
pub fn visible_transcript(turns: &[Turn]) -> Vec<&Turn> {
    turns.iter().filter(|t| t.is_visible()).collect()
}
