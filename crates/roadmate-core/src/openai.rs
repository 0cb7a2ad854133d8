//! OpenAI-compatible model adapter.
//!
//! Works against any endpoint speaking the chat-completions protocol
//! (Gemini's compatibility layer, Ollama, vLLM, OpenAI itself). Requests go
//! through a [`ProviderChain`] for failover; streamed tool calls are
//! reassembled from their per-index deltas before the terminal fragment.

use std::collections::{HashMap, VecDeque};

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionResponseStream, ChatCompletionTool, ChatCompletionToolArgs,
    ChatCompletionToolType, CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    CreateChatCompletionStreamResponse, FunctionCall, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures::StreamExt;

use crate::config::AppConfig;
use crate::error::{AgentError, Result};
use crate::model::{
    normalize_call_ids, FragmentStream, ModelClient, ModelRequest, ModelResponse, ResponseFragment,
};
use crate::provider::{ProviderChain, RequestError, ResolvedProvider};
use crate::types::{ToolCall, ToolDescriptor, Turn, TurnKind};

pub struct OpenAiModelClient {
    chain: ProviderChain,
    clients: HashMap<String, Client<OpenAIConfig>>,
}

impl OpenAiModelClient {
    pub fn new(chain: ProviderChain) -> Self {
        let clients = chain
            .providers()
            .iter()
            .map(|p| {
                let config = OpenAIConfig::new()
                    .with_api_base(&p.api_base)
                    .with_api_key(p.api_key.clone().unwrap_or_else(|| "not-needed".to_string()));
                (p.name.clone(), Client::with_config(config))
            })
            .collect();
        Self { chain, clients }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(ProviderChain::from_config(config)?))
    }

    fn client(&self, provider: &ResolvedProvider) -> std::result::Result<&Client<OpenAIConfig>, RequestError> {
        self.clients
            .get(&provider.name)
            .ok_or_else(|| RequestError::Permanent(format!("no client for provider {}", provider.name)))
    }
}

fn build_request(
    provider: &ResolvedProvider,
    messages: &[ChatCompletionRequestMessage],
    tools: &[ChatCompletionTool],
    stream: bool,
) -> std::result::Result<CreateChatCompletionRequest, RequestError> {
    let mut builder = CreateChatCompletionRequestArgs::default();
    builder
        .model(&provider.model)
        .messages(messages.to_vec())
        .temperature(provider.temperature)
        .top_p(provider.top_p)
        .max_completion_tokens(provider.max_tokens)
        .stream(stream);
    if !tools.is_empty() {
        builder.tools(tools.to_vec());
    }
    builder
        .build()
        .map_err(|e| RequestError::Permanent(e.to_string()))
}

fn classify(err: OpenAIError) -> RequestError {
    match err {
        OpenAIError::Reqwest(e) => RequestError::Transient(e.to_string()),
        OpenAIError::StreamError(e) => RequestError::Transient(e),
        other => RequestError::Permanent(other.to_string()),
    }
}

fn build_err(e: OpenAIError) -> AgentError {
    AgentError::ModelResponseMalformed(format!("could not encode request: {}", e))
}

/// Convert tool descriptors to function-calling tools.
pub fn build_tools(descriptors: &[ToolDescriptor]) -> Result<Vec<ChatCompletionTool>> {
    descriptors
        .iter()
        .map(|d| {
            let func = FunctionObjectArgs::default()
                .name(&d.name)
                .description(&d.description)
                .parameters(d.schema.to_json_schema())
                .build()
                .map_err(|e| AgentError::Config(format!("function '{}': {}", d.name, e)))?;
            ChatCompletionToolArgs::default()
                .r#type(ChatCompletionToolType::Function)
                .function(func)
                .build()
                .map_err(|e| AgentError::Config(format!("tool '{}': {}", d.name, e)))
        })
        .collect()
}

/// Convert history to chat-completion messages. Consecutive tool invocations
/// become one assistant message carrying all calls; failure notices are not
/// shown to the model.
pub fn build_messages(system_prompt: &str, turns: &[Turn]) -> Result<Vec<ChatCompletionRequestMessage>> {
    let mut result = Vec::with_capacity(turns.len() + 1);

    if !system_prompt.is_empty() {
        let sys = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            .map_err(build_err)?;
        result.push(ChatCompletionRequestMessage::System(sys));
    }

    let mut pending_calls: Vec<ChatCompletionMessageToolCall> = Vec::new();
    let flush = |calls: &mut Vec<ChatCompletionMessageToolCall>,
                 out: &mut Vec<ChatCompletionRequestMessage>|
     -> Result<()> {
        if calls.is_empty() {
            return Ok(());
        }
        let msg = ChatCompletionRequestAssistantMessageArgs::default()
            .tool_calls(std::mem::take(calls))
            .build()
            .map_err(build_err)?;
        out.push(ChatCompletionRequestMessage::Assistant(msg));
        Ok(())
    };

    for turn in turns {
        if !matches!(turn.kind, TurnKind::ToolInvocation { .. }) {
            flush(&mut pending_calls, &mut result)?;
        }
        match &turn.kind {
            TurnKind::UserMessage { text } => {
                let m = ChatCompletionRequestUserMessageArgs::default()
                    .content(text.as_str())
                    .build()
                    .map_err(build_err)?;
                result.push(ChatCompletionRequestMessage::User(m));
            }
            TurnKind::AssistantMessage { text, .. } => {
                let m = ChatCompletionRequestAssistantMessageArgs::default()
                    .content(text.as_str())
                    .build()
                    .map_err(build_err)?;
                result.push(ChatCompletionRequestMessage::Assistant(m));
            }
            TurnKind::ToolInvocation {
                call_id,
                tool_name,
                arguments,
            } => pending_calls.push(ChatCompletionMessageToolCall {
                id: call_id.clone(),
                r#type: ChatCompletionToolType::Function,
                function: FunctionCall {
                    name: tool_name.clone(),
                    arguments: arguments.clone(),
                },
            }),
            TurnKind::ToolResult { call_id, content, .. } => {
                let m = ChatCompletionRequestToolMessageArgs::default()
                    .tool_call_id(call_id.as_str())
                    .content(content.as_str())
                    .build()
                    .map_err(build_err)?;
                result.push(ChatCompletionRequestMessage::Tool(m));
            }
            TurnKind::FailureNotice { .. } => {}
        }
    }
    flush(&mut pending_calls, &mut result)?;

    Ok(result)
}

fn to_tool_call(tc: &ChatCompletionMessageToolCall) -> ToolCall {
    ToolCall::new(&tc.id, &tc.function.name, &tc.function.arguments)
}

#[async_trait]
impl ModelClient for OpenAiModelClient {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse> {
        let messages = build_messages(&request.system_prompt, &request.turns)?;
        let tools = build_tools(&request.tools)?;

        let response = self
            .chain
            .request_with_failover(|provider| {
                let messages = &messages;
                let tools = &tools;
                async move {
                    let req = build_request(&provider, messages, tools, false)?;
                    self.client(&provider)?
                        .chat()
                        .create(req)
                        .await
                        .map_err(classify)
                }
            })
            .await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::ModelResponseMalformed("no choices in response".into()))?;

        let content = choice.message.content.unwrap_or_default();
        match choice.message.tool_calls {
            Some(calls) if !calls.is_empty() => {
                let calls = normalize_call_ids(calls.iter().map(to_tool_call).collect(), []);
                if calls.iter().any(|c| c.name.is_empty()) {
                    return Err(AgentError::ModelResponseMalformed("tool call without a name".into()));
                }
                Ok(ModelResponse::ToolCalls {
                    preamble: content,
                    calls,
                })
            }
            _ => Ok(ModelResponse::Text(content)),
        }
    }

    async fn invoke_streaming(&self, request: &ModelRequest) -> Result<FragmentStream> {
        let messages = build_messages(&request.system_prompt, &request.turns)?;
        let tools = build_tools(&request.tools)?;

        let inner = self
            .chain
            .request_with_failover(|provider| {
                let messages = &messages;
                let tools = &tools;
                async move {
                    let req = build_request(&provider, messages, tools, true)?;
                    self.client(&provider)?
                        .chat()
                        .create_stream(req)
                        .await
                        .map_err(classify)
                }
            })
            .await?;

        let assembler = StreamAssembler::new(inner);
        Ok(Box::pin(futures::stream::unfold(assembler, |mut st| async move {
            st.next_fragment().await.map(|item| (item, st))
        })))
    }
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Turns chat-completion chunks into ordered fragments plus one terminal.
struct StreamAssembler {
    inner: ChatCompletionResponseStream,
    text: String,
    calls: Vec<PartialCall>,
    pending: VecDeque<ResponseFragment>,
    finished: bool,
}

impl StreamAssembler {
    fn new(inner: ChatCompletionResponseStream) -> Self {
        Self {
            inner,
            text: String::new(),
            calls: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    async fn next_fragment(&mut self) -> Option<Result<ResponseFragment>> {
        loop {
            if let Some(fragment) = self.pending.pop_front() {
                return Some(Ok(fragment));
            }
            if self.finished {
                return None;
            }
            match self.inner.next().await {
                Some(Ok(chunk)) => self.absorb(chunk),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(AgentError::ModelUnavailable(format!("stream failed: {}", e))));
                }
                None => {
                    self.finished = true;
                    match assemble(std::mem::take(&mut self.text), std::mem::take(&mut self.calls)) {
                        Ok(response) => self.pending.push_back(ResponseFragment::terminal(response)),
                        Err(e) => return Some(Err(e)),
                    }
                }
            }
        }
    }

    fn absorb(&mut self, chunk: CreateChatCompletionStreamResponse) {
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    self.text.push_str(&content);
                    self.pending.push_back(ResponseFragment::text(content));
                }
            }
            for tc in choice.delta.tool_calls.unwrap_or_default() {
                let index = tc.index as usize;
                if self.calls.len() <= index {
                    self.calls.resize_with(index + 1, PartialCall::default);
                }
                let slot = &mut self.calls[index];
                if let Some(id) = tc.id {
                    slot.id = id;
                }
                if let Some(function) = tc.function {
                    if let Some(name) = function.name {
                        slot.name.push_str(&name);
                        self.pending.push_back(ResponseFragment::tool_internal(name));
                    }
                    if let Some(args) = function.arguments {
                        slot.arguments.push_str(&args);
                        self.pending.push_back(ResponseFragment::tool_internal(args));
                    }
                }
            }
        }
    }
}

fn assemble(text: String, calls: Vec<PartialCall>) -> Result<ModelResponse> {
    let calls: Vec<PartialCall> = calls
        .into_iter()
        .filter(|c| !(c.id.is_empty() && c.name.is_empty() && c.arguments.is_empty()))
        .collect();
    if calls.is_empty() {
        return Ok(ModelResponse::Text(text));
    }
    if calls.iter().any(|c| c.name.is_empty()) {
        return Err(AgentError::ModelResponseMalformed(
            "streamed tool call without a name".into(),
        ));
    }
    let calls = normalize_call_ids(
        calls
            .into_iter()
            .map(|c| ToolCall::new(c.id, c.name, c.arguments))
            .collect(),
        [],
    );
    Ok(ModelResponse::ToolCalls {
        preamble: text,
        calls,
    })
}
