pub mod agents;
pub mod config;
pub mod demux;
pub mod error;
pub mod eviction;
pub mod model;
pub mod openai;
pub mod orchestrator;
pub mod provider;
pub mod schema;
pub mod scripted;
pub mod session;
pub mod tool_registry;
pub mod types;

pub use agents::{resolve_profile, AgentProfile};
pub use config::AppConfig;
pub use demux::StreamEvent;
pub use error::{AgentError, Result};
pub use eviction::EvictionPolicy;
pub use model::{ModelClient, ModelRequest, ModelResponse};
pub use orchestrator::{EventStream, LoopSettings, Orchestrator};
pub use schema::{FieldSpec, FieldType, InputSchema};
pub use session::{FileSessionStore, MemorySessionStore, SessionLocks, SessionStore};
pub use tool_registry::{Tool, ToolRegistry};
pub use types::{ToolCall, ToolOutput, Turn, TurnKind};
