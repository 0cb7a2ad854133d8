//! Turns the orchestrator's event sequence into what a streaming client sees:
//! assistant text in generation order, then exactly one `Done` or `Error`.

use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};

use crate::model::FragmentPhase;
use crate::types::LoopEvent;

/// One client-facing stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Content(String),
    Done,
    Error(String),
}

impl StreamEvent {
    /// JSON body of the SSE `data:` line.
    pub fn to_payload(&self) -> Value {
        match self {
            Self::Content(text) => json!({ "content": text, "node": "assistant" }),
            Self::Done => json!({ "done": true }),
            Self::Error(message) => json!({ "error": message }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Content(_))
    }
}

fn translate(event: LoopEvent) -> Option<StreamEvent> {
    match event {
        LoopEvent::Fragment(f) if f.phase == FragmentPhase::AssistantText && !f.delta.is_empty() => {
            Some(StreamEvent::Content(f.delta))
        }
        LoopEvent::Done { .. } => Some(StreamEvent::Done),
        LoopEvent::Failed { error } => Some(StreamEvent::Error(error)),
        _ => None,
    }
}

/// Filter loop events down to client events. The output ends after the first
/// terminal event; if the input ends without one, an `Error` is emitted.
pub fn demultiplex<S>(events: S) -> impl Stream<Item = StreamEvent> + Send
where
    S: Stream<Item = LoopEvent> + Send + Unpin,
{
    stream::unfold(Some(events), |state| async move {
        let mut events = state?;
        loop {
            match events.next().await {
                Some(event) => {
                    if let Some(out) = translate(event) {
                        let next = if out.is_terminal() { None } else { Some(events) };
                        return Some((out, next));
                    }
                }
                None => {
                    return Some((
                        StreamEvent::Error("response stream ended unexpectedly".into()),
                        None,
                    ))
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelResponse, ResponseFragment};
    use crate::types::ToolOutput;

    async fn run(events: Vec<LoopEvent>) -> Vec<StreamEvent> {
        demultiplex(stream::iter(events)).collect().await
    }

    #[tokio::test]
    async fn test_only_assistant_text_passes() {
        let out = run(vec![
            LoopEvent::Fragment(ResponseFragment::text("Let me ")),
            LoopEvent::Fragment(ResponseFragment::tool_internal("get_menu")),
            LoopEvent::ToolCallStarted { id: "c1".into(), name: "get_menu".into() },
            LoopEvent::ToolCallFinished(ToolOutput::ok("c1", "Burger House menu")),
            LoopEvent::Fragment(ResponseFragment::text("")),
            LoopEvent::Fragment(ResponseFragment::text("check.")),
            LoopEvent::Fragment(ResponseFragment::terminal(ModelResponse::Text("check.".into()))),
            LoopEvent::Done { reply: "Let me check.".into() },
        ])
        .await;
        assert_eq!(
            out,
            vec![
                StreamEvent::Content("Let me ".into()),
                StreamEvent::Content("check.".into()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_is_terminal() {
        let out = run(vec![
            LoopEvent::Fragment(ResponseFragment::text("Hmm")),
            LoopEvent::Failed { error: "model unavailable".into() },
            LoopEvent::Fragment(ResponseFragment::text("late")),
        ])
        .await;
        assert_eq!(
            out,
            vec![
                StreamEvent::Content("Hmm".into()),
                StreamEvent::Error("model unavailable".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_producer_vanishing_is_an_error() {
        let out = run(vec![LoopEvent::Fragment(ResponseFragment::text("partial"))]).await;
        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], StreamEvent::Error(_)));
    }

    #[test]
    fn test_payloads() {
        assert_eq!(
            StreamEvent::Content("Hi".into()).to_payload().to_string(),
            r#"{"content":"Hi","node":"assistant"}"#
        );
        assert_eq!(StreamEvent::Done.to_payload().to_string(), r#"{"done":true}"#);
        assert_eq!(
            StreamEvent::Error("boom".into()).to_payload()["error"],
            "boom"
        );
    }
}
