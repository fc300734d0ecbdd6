//! Operator CLI: run the server, or trigger a single supervisor tick
//! against a fresh in-memory backend and exit.

use clap::{Parser, Subcommand};
use llmgate_server::config::GatewayConfig;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "llmgate", about = "Multi-tenant LLM gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (the default when no subcommand is given).
    Serve,
    /// Run exactly one supervisor cycle against a fresh in-memory backend,
    /// print the tick report, and exit.
    Tick,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = GatewayConfig::from_env()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => llmgate_server::run(config).await,
        Commands::Tick => run_tick(config).await,
    }
}

async fn run_tick(config: GatewayConfig) -> anyhow::Result<()> {
    let state = llmgate_server::state::build(&config).await?;
    let now = chrono::Utc::now();
    match state.supervisor.tick(now).await? {
        Some(results) => {
            let report = llmgate_server::state::summarize_tick(now, &results);
            info!(
                tenants = report.tenants_processed,
                bots = report.bots_checked,
                heals = report.auto_heals_performed,
                alerts = report.alerts_raised,
                "tick complete"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        None => {
            println!("tick skipped: another replica holds the claim");
        }
    }
    Ok(())
}
