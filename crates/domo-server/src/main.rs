use clap::{Parser, Subcommand};

mod app;
mod dlq;

#[derive(Parser)]
#[command(name = "domo-server", about = "Assistant orchestration service")]
struct Cli {
    /// Path to domo.toml (defaults to DOMO_CONFIG or ./domo.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestrator, scheduler, and extractor.
    Run,
    /// Inspect and recover dead-lettered messages.
    Dlq {
        #[command(subcommand)]
        command: dlq::DlqCommand,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = domo_core::DomoConfig::load(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("config load failed: {e}"))?;

    init_tracing(&config);

    match cli.command {
        Command::Run => app::run(config).await,
        Command::Dlq { command } => dlq::run(config, command).await,
    }
}

fn init_tracing(config: &domo_core::DomoConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());
    if config.logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
