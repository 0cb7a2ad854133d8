use crate::error::{AgentError, Result};
use crate::schema::InputSchema;
use crate::types::{ToolCall, ToolDescriptor, ToolOutput};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (used in function calling).
    fn name(&self) -> &str;

    /// Human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// Declared inputs.
    fn input_schema(&self) -> InputSchema;

    /// Execute the tool with arguments already validated against [`Tool::input_schema`].
    async fn execute(&self, args: Value) -> Result<String>;
}

/// Central registry for all available tools.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Names are unique across the registry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AgentError::DuplicateToolName(name));
        }
        tracing::debug!("Registered tool: {}", name);
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<&Arc<dyn Tool>> {
        self.tools
            .get(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Descriptors for every registered tool, or only those named in `subset`.
    pub fn descriptors(&self, subset: Option<&[String]>) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .filter(|t| match subset {
                Some(names) => names.iter().any(|n| n == t.name()),
                None => true,
            })
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                description: t.description().to_string(),
                schema: t.input_schema(),
            })
            .collect()
    }

    /// Run a single call. Never fails: every problem becomes an error payload
    /// the model can read.
    pub async fn invoke(&self, call: &ToolCall) -> ToolOutput {
        match self.try_invoke(call).await {
            Ok(content) => ToolOutput::ok(&call.id, content),
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, "Tool call failed: {}", e);
                ToolOutput::error(&call.id, format!("Error: {}", e))
            }
        }
    }

    async fn try_invoke(&self, call: &ToolCall) -> Result<String> {
        let tool = self.resolve(&call.name)?;

        let raw: Value = if call.arguments.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&call.arguments).map_err(|e| AgentError::ToolValidation {
                tool_name: call.name.clone(),
                message: format!("invalid JSON arguments: {}", e),
            })?
        };

        let args = tool
            .input_schema()
            .validate(raw)
            .map_err(|message| AgentError::ToolValidation {
                tool_name: call.name.clone(),
                message,
            })?;

        tool.execute(args).await
    }

    /// Run a batch of calls concurrently, each in its own task, and wait for
    /// all of them. Outputs come back in request order.
    pub async fn invoke_all(self: &Arc<Self>, calls: &[ToolCall]) -> Vec<ToolOutput> {
        let handles: Vec<_> = calls
            .iter()
            .cloned()
            .map(|call| {
                let registry = Arc::clone(self);
                tokio::spawn(async move { registry.invoke(&call).await })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(calls)
            .map(|(joined, call)| match joined {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!(tool = %call.name, "Tool task aborted: {}", e);
                    ToolOutput::error(
                        &call.id,
                        format!("Error: tool {} aborted unexpectedly", call.name),
                    )
                }
            })
            .collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, FieldType};
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text back"
        }

        fn input_schema(&self) -> InputSchema {
            InputSchema::new()
                .field(FieldSpec::required("text", FieldType::String, "Text to echo"))
                .field(FieldSpec::optional("times", FieldType::Integer, "Repeats").with_default(json!(1)))
        }

        async fn execute(&self, args: Value) -> Result<String> {
            let text = args["text"].as_str().unwrap_or_default();
            let times = args["times"].as_u64().unwrap_or(1) as usize;
            if text == "boom" {
                return Err(AgentError::tool_execution("echo", "exploded"));
            }
            if text == "panic" {
                panic!("tool panicked");
            }
            Ok(text.repeat(times))
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();
        Arc::new(registry)
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();
        let err = registry.register(Arc::new(Echo)).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateToolName(name) if name == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = registry();
        assert!(matches!(registry.resolve("nope"), Err(AgentError::UnknownTool(_))));
        assert!(registry.resolve("echo").is_ok());
    }

    #[test]
    fn test_descriptors_subset() {
        let registry = registry();
        assert_eq!(registry.descriptors(None).len(), 1);
        assert!(registry.descriptors(Some(&["other".to_string()])).is_empty());
        let d = &registry.descriptors(Some(&["echo".to_string()]))[0];
        assert_eq!(d.schema.to_json_schema()["required"], json!(["text"]));
    }

    #[tokio::test]
    async fn test_invoke_validates_before_running() {
        let registry = registry();
        let ok = registry.invoke(&ToolCall::new("1", "echo", r#"{"text":"ab","times":2}"#)).await;
        assert_eq!(ok, ToolOutput::ok("1", "abab"));

        let missing = registry.invoke(&ToolCall::new("2", "echo", "{}")).await;
        assert!(missing.is_error);
        assert!(missing.content.contains("missing required field 'text'"));

        let bad_json = registry.invoke(&ToolCall::new("3", "echo", "{not json")).await;
        assert!(bad_json.is_error);
        assert!(bad_json.content.contains("invalid JSON"));

        let unknown = registry.invoke(&ToolCall::new("4", "nope", "{}")).await;
        assert!(unknown.is_error);
        assert!(unknown.content.contains("Unknown tool: nope"));
    }

    #[tokio::test]
    async fn test_invoke_all_isolates_failures() {
        let registry = registry();
        let calls = vec![
            ToolCall::new("a", "echo", r#"{"text":"boom"}"#),
            ToolCall::new("b", "echo", r#"{"text":"panic"}"#),
            ToolCall::new("c", "echo", r#"{"text":"fine"}"#),
        ];
        let outputs = registry.invoke_all(&calls).await;
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0].tool_call_id, "a");
        assert!(outputs[0].is_error);
        assert!(outputs[1].is_error);
        assert_eq!(outputs[2], ToolOutput::ok("c", "fine"));
    }
}
