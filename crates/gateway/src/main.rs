mod api;
mod bootstrap;
mod state;

use clap::{Parser, Subcommand};
use sq_domain::config::{Config, ConfigSeverity};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sequent", about = "Reasoning orchestrator gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "sequent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP gateway.
    Serve,
    /// Validate the configuration and exit.
    Check,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    let config = if path.exists() {
        Config::load(path)?
    } else {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Check => {
            let config = load_config(&cli.config)?;
            println!(
                "ok: {} provider(s), {} workflow(s)",
                config.providers.len(),
                config.workflows.enabled.len()
            );
            Ok(())
        }
        Command::Serve => {
            let config = load_config(&cli.config)?;
            let addr = format!("{}:{}", config.server.host, config.server.port);
            let state = bootstrap::build_app_state(config).await?;

            let app = api::router(state);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(addr = %addr, "sequent gateway listening");
            axum::serve(listener, app).await?;
            Ok(())
        }
    }
}
