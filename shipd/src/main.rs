use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use shipd::server;
use shipd::supervisor::{Supervisor, SysinfoProbe};

#[derive(Parser)]
#[command(name = "shipd")]
#[command(about = "Wraps the log shipper and exposes the reload control endpoint", long_about = None)]
struct Cli {
    #[arg(long, default_value = "0.0.0.0:8090")]
    listen: String,
    /// Daemon binary to supervise.
    #[arg(long, default_value = "fluentd")]
    daemon: String,
    /// Configuration file passed to the daemon at startup.
    #[arg(long, default_value = "/fluentd/etc/fluent.conf")]
    daemon_config: String,
    /// Seconds to wait after the reload signal before probing for
    /// stuck workers.
    #[arg(long, default_value_t = 5)]
    grace_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let supervisor = Arc::new(Supervisor::new(
        cli.daemon,
        vec!["-c".to_string(), cli.daemon_config],
        Duration::from_secs(cli.grace_secs),
        Arc::new(SysinfoProbe),
    ));
    supervisor
        .start()
        .await
        .context("failed to start the log daemon")?;

    let app = server::router(supervisor);
    let listener = tokio::net::TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("failed to bind control endpoint on {}", cli.listen))?;
    info!("serving control endpoint on {}", cli.listen);
    axum::serve(listener, app).await?;
    Ok(())
}
