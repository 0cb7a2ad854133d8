use roadmate_core::config::AppConfig;
use roadmate_core::orchestrator::Orchestrator;

/// Shared application state for the server.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(config: AppConfig, orchestrator: Orchestrator) -> Self {
        Self {
            config,
            orchestrator,
        }
    }
}
