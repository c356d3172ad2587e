use anyhow::Context;
use clap::Parser;
use mockwire::config::Settings;
use mockwire::mapping::MappingModel;
use mockwire::server::{register_admin_mappings, serve};
use mockwire::Dispatcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Mockwire - HTTP test-double server
#[derive(Parser, Debug)]
#[command(name = "mockwire")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on (overrides the settings file)
    #[arg(short, long, env = "MOCKWIRE_PORT")]
    port: Option<u16>,

    /// YAML settings file
    #[arg(short, long, env = "MOCKWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// JSON array of mappings to import at startup
    #[arg(short, long, env = "MOCKWIRE_MAPPINGS")]
    mappings: Option<PathBuf>,

    /// Answer unmatched requests with the closest mapping
    #[arg(long, env = "MOCKWIRE_ALLOW_PARTIAL_MAPPING")]
    allow_partial_mapping: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "MOCKWIRE_LOG_JSON")]
    log_json: bool,
}

fn load_settings(args: &Args) -> anyhow::Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    if let Some(port) = args.port {
        settings.listen.port = port;
    }
    if let Some(mappings) = &args.mappings {
        settings.mappings_file = Some(mappings.clone());
    }
    if args.allow_partial_mapping {
        settings.allow_partial_mapping = true;
    }
    settings.validate()?;
    Ok(settings)
}

fn import_mappings_file(dispatcher: &Dispatcher, path: &Path) -> anyhow::Result<usize> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read mappings file {}", path.display()))?;
    let models: Vec<MappingModel> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse mappings file {}", path.display()))?;
    dispatcher
        .import_mappings(&models)
        .with_context(|| format!("Failed to import mappings from {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(args.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.log_json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    let settings = load_settings(&args)?;

    let dispatcher = Arc::new(Dispatcher::new(&settings));
    register_admin_mappings(&dispatcher)?;
    if let Some(path) = &settings.mappings_file {
        let count = import_mappings_file(&dispatcher, path)?;
        tracing::info!(count, file = %path.display(), "Mappings imported");
    }

    let addr = settings.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    serve(listener, dispatcher, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
