mod repl;

use anyhow::Result;
use clap::{Parser, Subcommand};
use roadmate_core::config::{AppConfig, SessionBackend};
use roadmate_core::openai::OpenAiModelClient;
use roadmate_core::session::{FileSessionStore, MemorySessionStore, SessionStore};
use roadmate_core::tool_registry::ToolRegistry;
use roadmate_core::{resolve_profile, LoopSettings, Orchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "roadmate",
    about = "Tool-calling conversation agent for drivers and restaurant desks",
    version,
    author
)]
struct Cli {
    /// Path to config file (default: ~/.config/roadmate/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the model name
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Override the API base URL
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Agent profile to run (restaurant, copilot, or one defined in config)
    #[arg(short, long, global = true)]
    agent: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive chat (default)
    Chat {
        /// Session id to create or resume
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Start the HTTP server
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,
        /// Bind port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show or manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Initialize default configuration file
    Init,
    /// Print config file path
    Path,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("roadmate=info,roadmate_core=info,roadmate_server=info,tower_http=info,warn")
        })
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wire registry, model, store and profile into an orchestrator.
fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let mut registry = ToolRegistry::new();
    roadmate_tools::register_all(&mut registry, config)?;
    let registry = Arc::new(registry);

    let profile = resolve_profile(&config.agent, &config.profiles)?;
    let model = Arc::new(OpenAiModelClient::from_config(config)?);
    let store: Arc<dyn SessionStore> = match config.session.backend {
        SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
        SessionBackend::File => Arc::new(FileSessionStore::new(config.session.history_dir())?),
    };

    tracing::info!(
        "Loaded {} tools, agent: {}, model: {}, endpoint: {}",
        registry.len(),
        profile.name,
        config.provider.model,
        config.provider.api_base,
    );

    let orchestrator = Orchestrator::new(model, registry, store, profile)?
        .with_settings(LoopSettings::from(&config.orchestrator))
        .with_time_zone(config.time_zone()?);
    Ok(orchestrator)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    if let Some(model) = &cli.model {
        config.provider.model = model.clone();
    }
    if let Some(api_base) = &cli.api_base {
        config.provider.api_base = api_base.clone();
    }
    if let Some(agent) = &cli.agent {
        config.agent = agent.clone();
    }

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            if let Some(h) = host {
                config.server.host = h;
            }
            if let Some(p) = port {
                config.server.port = p;
            }
            let orchestrator = build_orchestrator(&config)?;
            roadmate_server::serve(config, orchestrator).await?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, &config)?;
        }
        Some(Commands::Chat { session }) => {
            let orchestrator = build_orchestrator(&config)?;
            repl::run(&config, orchestrator, session).await?;
        }
        None => {
            let orchestrator = build_orchestrator(&config)?;
            repl::run(&config, orchestrator, None).await?;
        }
    }

    Ok(())
}

fn handle_config_command(action: Option<ConfigAction>, config: &AppConfig) -> Result<()> {
    match action {
        Some(ConfigAction::Show) | None => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
        }
        Some(ConfigAction::Init) => {
            let path = AppConfig::default_path();
            if path.exists() {
                println!("Config already exists at: {}", path.display());
            } else {
                config.save()?;
                println!("Created default config at: {}", path.display());
            }
        }
        Some(ConfigAction::Path) => {
            println!("{}", AppConfig::default_path().display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_serve_overrides() {
        let cli = Cli::parse_from(["roadmate", "--agent", "restaurant", "serve", "--port", "9000"]);
        assert_eq!(cli.agent.as_deref(), Some("restaurant"));
        assert!(matches!(cli.command, Some(Commands::Serve { port: Some(9000), .. })));
    }

    #[test]
    fn test_build_orchestrator_from_defaults() {
        let config = AppConfig::default();
        let orchestrator = build_orchestrator(&config).unwrap();
        assert_eq!(orchestrator.profile().name, config.agent);
    }
}
