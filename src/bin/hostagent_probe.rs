//! Host agent discovery probe.
//!
//! Runs one discovery cycle against the local host agent and reports where
//! it got to. Useful for checking container networking before deploying an
//! instrumented service.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hostagent::{Collaborators, Config, Discovery, ProtocolState, SharedSettings, VERSION};

#[derive(Parser)]
#[command(name = "hostagent-probe")]
#[command(version = VERSION)]
#[command(about = "Discover, announce to and test the local host agent", long_about = None)]
struct Cli {
    /// Host agent address to try first
    #[arg(long)]
    host: Option<String>,

    /// Host agent port
    #[arg(short, long)]
    port: Option<u16>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Retry period in milliseconds
    #[arg(long)]
    retry_ms: Option<u64>,

    /// Give up after this many seconds
    #[arg(short, long, default_value = "120")]
    timeout: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?.merge(Config::from_env()),
        None => Config::from_env(),
    };
    if let Some(host) = cli.host {
        config.agent.host = host;
    }
    if let Some(port) = cli.port {
        config.agent.port = port;
    }
    if let Some(retry_ms) = cli.retry_ms {
        config.agent.retry_period_ms = retry_ms;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let settings = SharedSettings::new();
        let collaborators = Collaborators::system(&config.agent, Arc::new(settings.clone()))?;
        let discovery = Discovery::spawn(config.agent, collaborators);

        let outcome = tokio::time::timeout(
            Duration::from_secs(cli.timeout),
            discovery.wait_for(ProtocolState::Ready),
        )
        .await;

        let snapshot = discovery.snapshot();
        println!("state:   {}", snapshot.state);
        println!("host:    {}", snapshot.host);
        println!("retries: {}", snapshot.retries);
        if let Some(response) = settings.current() {
            println!("pid:     {}", response.pid);
            if !response.agent_uuid.is_empty() {
                println!("agent:   {}", response.agent_uuid);
            }
        }

        match outcome {
            Ok(Ok(_)) => Ok::<_, anyhow::Error>(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(anyhow::anyhow!(
                "host agent not ready after {}s (stuck in {})",
                cli.timeout,
                snapshot.state
            )),
        }
    })
}
