use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::AgentError;

/// A model endpoint with its API key resolved from config or environment.
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    pub name: String,
    pub api_base: String,
    pub model: String,
    pub api_key: Option<String>,
    pub priority: u32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// How a failed request should affect failover.
#[derive(Debug, Clone)]
pub enum RequestError {
    /// Timeout, connection failure or server-side error: try the next provider.
    Transient(String),
    /// Rejected request (auth, bad input): stop.
    Permanent(String),
}

#[derive(Debug, Default)]
struct ProviderHealth {
    consecutive_failures: u32,
}

/// Ordered model endpoints with health tracking and automatic failover.
pub struct ProviderChain {
    providers: Vec<ResolvedProvider>,
    health: RwLock<HashMap<String, ProviderHealth>>,
}

fn resolve_key(key: &Option<String>, env: &Option<String>) -> Option<String> {
    key.clone().or_else(|| {
        env.as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|v| !v.is_empty())
    })
}

impl ProviderChain {
    pub fn new(mut providers: Vec<ResolvedProvider>) -> Self {
        providers.sort_by_key(|p| p.priority);
        let health = providers
            .iter()
            .map(|p| (p.name.clone(), ProviderHealth::default()))
            .collect();
        Self {
            providers,
            health: RwLock::new(health),
        }
    }

    /// Build the chain from `[[providers]]`, or from `[provider]` alone when
    /// no chain is configured.
    pub fn from_config(config: &AppConfig) -> Result<Self, AgentError> {
        let base = &config.provider;
        let providers: Vec<ResolvedProvider> = if config.providers.is_empty() {
            vec![ResolvedProvider {
                name: "default".into(),
                api_base: base.api_base.clone(),
                model: base.model.clone(),
                api_key: resolve_key(&base.api_key, &base.api_key_env),
                priority: 1,
                timeout: Duration::from_secs(base.timeout_secs),
                max_retries: base.max_retries,
                max_tokens: base.max_tokens,
                temperature: base.temperature,
                top_p: base.top_p,
            }]
        } else {
            config
                .providers
                .iter()
                .map(|entry| ResolvedProvider {
                    name: entry.name.clone(),
                    api_base: entry.api_base.clone(),
                    model: entry.model.clone(),
                    api_key: resolve_key(&entry.api_key, &entry.api_key_env),
                    priority: entry.priority,
                    timeout: Duration::from_secs(entry.timeout_secs),
                    max_retries: entry.max_retries,
                    max_tokens: entry.max_tokens.unwrap_or(base.max_tokens),
                    temperature: entry.temperature.unwrap_or(base.temperature),
                    top_p: entry.top_p.unwrap_or(base.top_p),
                })
                .collect()
        };

        if providers.iter().any(|p| p.max_retries == 0) {
            return Err(AgentError::Config("provider max_retries must be at least 1".into()));
        }

        Ok(Self::new(providers))
    }

    /// Providers currently considered healthy, in priority order.
    fn candidates(&self) -> Vec<ResolvedProvider> {
        let health = match self.health.read() {
            Ok(h) => h,
            Err(poisoned) => poisoned.into_inner(),
        };
        let healthy: Vec<ResolvedProvider> = self
            .providers
            .iter()
            .filter(|p| {
                health
                    .get(&p.name)
                    .map(|h| h.consecutive_failures < p.max_retries)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        // With every provider marked down, retry the whole chain rather than
        // refusing service until restart.
        if healthy.is_empty() {
            self.providers.clone()
        } else {
            healthy
        }
    }

    pub fn record_success(&self, name: &str) {
        if let Ok(mut health) = self.health.write() {
            if let Some(h) = health.get_mut(name) {
                h.consecutive_failures = 0;
            }
        }
    }

    pub fn record_failure(&self, name: &str) {
        if let Ok(mut health) = self.health.write() {
            if let Some(h) = health.get_mut(name) {
                h.consecutive_failures += 1;
            }
        }
    }

    pub fn is_healthy(&self, name: &str) -> bool {
        let Ok(health) = self.health.read() else {
            return false;
        };
        self.providers
            .iter()
            .find(|p| p.name == name)
            .zip(health.get(name))
            .map(|(p, h)| h.consecutive_failures < p.max_retries)
            .unwrap_or(false)
    }

    /// Try `make_request` against each candidate until one succeeds. Each
    /// attempt is bounded by the provider's timeout, which counts as a
    /// transient failure. Exhausting the chain is `ModelUnavailable`.
    pub async fn request_with_failover<F, Fut, T>(&self, make_request: F) -> Result<T, AgentError>
    where
        F: Fn(ResolvedProvider) -> Fut,
        Fut: std::future::Future<Output = Result<T, RequestError>>,
    {
        let mut errors = Vec::new();

        for provider in self.candidates() {
            debug!("Trying provider: {}", provider.name);

            let outcome = match tokio::time::timeout(provider.timeout, make_request(provider.clone())).await {
                Ok(outcome) => outcome,
                Err(_) => Err(RequestError::Transient(format!(
                    "timed out after {}s",
                    provider.timeout.as_secs()
                ))),
            };

            match outcome {
                Ok(result) => {
                    self.record_success(&provider.name);
                    return Ok(result);
                }
                Err(RequestError::Transient(msg)) => {
                    warn!("Provider {} transient error: {}", provider.name, msg);
                    self.record_failure(&provider.name);
                    errors.push(format!("{}: {}", provider.name, msg));
                }
                Err(RequestError::Permanent(msg)) => {
                    warn!("Provider {} permanent error: {}", provider.name, msg);
                    self.record_failure(&provider.name);
                    return Err(AgentError::ModelUnavailable(format!(
                        "provider {} rejected the request: {}",
                        provider.name, msg
                    )));
                }
            }
        }

        Err(AgentError::ModelUnavailable(format!(
            "all providers failed: {}",
            errors.join("; ")
        )))
    }

    pub fn providers(&self) -> &[ResolvedProvider] {
        &self.providers
    }
}
