use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;

use logsyncd::confgen::ConfigWriter;
use logsyncd::config::{Settings, load_config};
use logsyncd::debounce::DebounceGate;
use logsyncd::notifier::HttpNotifier;
use logsyncd::reconciler::Reconciler;
use logsyncd::registry::{RegistryStore, watch};
use logsyncd::render::render;
use logsyncd::resolver::resolve_fragments;

#[derive(Parser)]
#[command(name = "logsyncd")]
#[command(about = "Keeps the log shipper's config in sync with the workload registry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the controller using ./logsyncd run --config config.yaml")]
    Run {
        #[arg(long, value_name = "CONFIG_YAML")]
        config: String,
    },
    #[command(about = "Resolve and print the generated config for a single workload")]
    Render {
        #[arg(long, value_name = "CONFIG_YAML")]
        config: String,
        #[arg(long)]
        namespace: String,
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run(&config).await,
        Commands::Render {
            config,
            namespace,
            name,
        } => render_once(&config, &namespace, &name).await,
    }
}

async fn connect(settings: &Settings) -> Result<RegistryStore> {
    let endpoints: Vec<&str> = settings
        .registry
        .endpoints
        .iter()
        .map(|s| s.as_str())
        .collect();
    RegistryStore::new(&endpoints)
        .await
        .context("Failed to connect to the workload registry")
}

async fn run(config_path: &str) -> Result<()> {
    let settings = load_config(config_path)?;
    let store = connect(&settings).await?;

    let notifier = HttpNotifier::new(&settings.notify_url);
    let gate = Arc::new(DebounceGate::new(
        Duration::from_secs(settings.debounce_secs),
        Box::new(notifier),
    ));
    tokio::spawn(gate.clone().run());

    let (tx, rx) = mpsc::channel(256);
    watch::spawn(
        store.clone(),
        Duration::from_secs(settings.resync_secs),
        tx,
    );

    let writer = ConfigWriter::new(&settings.config_dir, &settings.pos_dir, &settings.log_dir);
    let reconciler = Reconciler::new(
        Arc::new(store),
        writer,
        gate,
        settings.global_namespace.clone(),
    );
    info!(
        "controller running, config dir {}, notify {}",
        settings.config_dir.display(),
        settings.notify_url
    );
    reconciler.run(rx).await;
    Ok(())
}

async fn render_once(config_path: &str, namespace: &str, name: &str) -> Result<()> {
    let settings = load_config(config_path)?;
    let store = connect(&settings).await?;

    let Some(workload) = store.get_workload(namespace, name).await? else {
        bail!("workload {namespace}/{name} not found in the registry");
    };
    let templates = resolve_fragments(&store, &settings.global_namespace, &workload).await;
    let mut fragments = Vec::with_capacity(templates.len());
    for template in &templates {
        fragments.push(render(template, &workload)?);
    }
    if fragments.is_empty() {
        println!("no fragments resolved; no config file would exist");
        return Ok(());
    }
    let writer = ConfigWriter::new(&settings.config_dir, &settings.pos_dir, &settings.log_dir);
    print!("{}", writer.assemble(&workload, &fragments));
    Ok(())
}
