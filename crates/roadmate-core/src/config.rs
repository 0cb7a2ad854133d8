use crate::agents::ProfileConfig;
use crate::error::AgentError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Active agent profile.
    pub agent: String,
    /// IANA zone used for prompts and display times.
    pub timezone: String,
    pub provider: ProviderConfig,
    /// Explicit provider chain; when empty `provider` is used alone.
    pub providers: Vec<ProviderEntry>,
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub orchestrator: OrchestratorConfig,
    pub tools: ToolsConfig,
    pub calendar: CalendarConfig,
    /// Overrides and additions to the built-in agent profiles.
    pub profiles: HashMap<String, ProfileConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent: "copilot".into(),
            timezone: "Europe/Helsinki".into(),
            provider: ProviderConfig::default(),
            providers: Vec::new(),
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            tools: ToolsConfig::default(),
            calendar: CalendarConfig::default(),
            profiles: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path, falling back to defaults if
    /// the file doesn't exist.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Write current configuration to the default path.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        Ok(())
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("roadmate")
            .join("config.toml")
    }

    /// Data directory for persisted sessions.
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("roadmate")
    }

    pub fn time_zone(&self) -> Result<Tz, AgentError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| AgentError::Config(format!("invalid timezone '{}': {}", self.timezone, e)))
    }
}

/// Default model provider (any OpenAI-compatible endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_base: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Environment variable holding the API key, read when `api_key` is unset.
    pub api_key_env: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta/openai".into(),
            model: "gemini-2.0-flash".into(),
            api_key: None,
            api_key_env: Some("GOOGLE_GENAI_API_KEY".into()),
            max_tokens: 2048,
            temperature: 0.7,
            top_p: 0.95,
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

/// One entry of an explicit provider chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    pub api_base: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Lower is tried first.
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Consecutive failures before the provider is skipped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
}

fn default_priority() -> u32 {
    1
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allow any origin.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            cors: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Memory,
    File,
}

/// Session storage and eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    /// Directory for the file backend (defaults to `data_dir/sessions`).
    pub history_dir: Option<PathBuf>,
    /// Keep at most this many sessions, evicting the least recently used.
    pub max_sessions: Option<usize>,
    /// Evict sessions idle for longer than this.
    pub ttl_secs: Option<u64>,
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::Memory,
            history_dir: None,
            max_sessions: None,
            ttl_secs: None,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    pub fn history_dir(&self) -> PathBuf {
        self.history_dir
            .clone()
            .unwrap_or_else(|| AppConfig::data_dir().join("sessions"))
    }
}

/// Limits for the tool-calling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Tool-calling cycles allowed per user message.
    pub max_tool_cycles: usize,
    /// Upper bound for one model call.
    pub model_timeout_secs: u64,
    /// Longest allowed gap between streamed fragments.
    pub stream_idle_timeout_secs: u64,
    /// Capacity of the event channel between the loop and a stream consumer.
    pub stream_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_cycles: 8,
            model_timeout_secs: 60,
            stream_idle_timeout_secs: 30,
            stream_buffer: 64,
        }
    }
}

impl OrchestratorConfig {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}

/// Settings for the data-source tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Base URL of the restaurant menu service (`GET {base}/menu`).
    /// Falls back to the `API_BASE_URL` environment variable.
    pub menu_api_base: Option<String>,
    pub http_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            menu_api_base: None,
            http_timeout_secs: 10,
        }
    }
}

impl ToolsConfig {
    pub fn resolved_menu_api_base(&self) -> Option<String> {
        self.menu_api_base
            .clone()
            .or_else(|| std::env::var("API_BASE_URL").ok())
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarBackend {
    Memory,
    Google,
}

/// Calendar provider used by the calendar tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub backend: CalendarBackend,
    pub api_base: String,
    pub calendar_id: String,
    pub access_token: Option<String>,
    pub access_token_env: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            backend: CalendarBackend::Memory,
            api_base: "https://www.googleapis.com/calendar/v3".into(),
            calendar_id: "primary".into(),
            access_token: None,
            access_token_env: "GOOGLE_CALENDAR_TOKEN".into(),
        }
    }
}

impl CalendarConfig {
    pub fn resolved_access_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .or_else(|| std::env::var(&self.access_token_env).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("gemini-2.0-flash"));
        assert!(toml_str.contains("Europe/Helsinki"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider.model, config.provider.model);
        assert_eq!(
            parsed.orchestrator.max_tool_cycles,
            config.orchestrator.max_tool_cycles
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            agent = "restaurant"

            [orchestrator]
            max_tool_cycles = 3

            [session]
            backend = "file"
            max_sessions = 100
            "#,
        )
        .unwrap();
        assert_eq!(parsed.agent, "restaurant");
        assert_eq!(parsed.orchestrator.max_tool_cycles, 3);
        assert_eq!(parsed.orchestrator.model_timeout_secs, 60);
        assert_eq!(parsed.session.backend, SessionBackend::File);
        assert_eq!(parsed.session.max_sessions, Some(100));
        assert_eq!(parsed.server.port, 8000);
    }

    #[test]
    fn test_time_zone_parsing() {
        let mut config = AppConfig::default();
        assert_eq!(config.time_zone().unwrap(), chrono_tz::Europe::Helsinki);
        config.timezone = "Mars/Olympus".into();
        assert!(matches!(config.time_zone(), Err(AgentError::Config(_))));
    }
}
