use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use sotto_app::runtime::{start_session, SessionHandle};
use sotto_foundation::Settings;
use sotto_providers::ProviderRegistry;
use sotto_session::SessionConfig;

#[derive(Parser, Debug)]
#[command(name = "sotto", about = "Dictation session coordinator", version)]
struct Cli {
    /// Path to the TOML settings file
    #[arg(short, long, env = "SOTTO_CONFIG")]
    config: Option<PathBuf>,

    /// Log level filter (overrides the settings file)
    #[arg(long)]
    log_level: Option<String>,
}

fn init_logging(level: &str) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "sotto.log");
    let (non_blocking_file, _guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(_guard);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| settings.log_level.clone());
    init_logging(&level).map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;
    tracing::info!("Starting sotto session coordinator");

    let registry = Arc::new(ProviderRegistry::new(settings.clone()));
    registry
        .validate()
        .context("Provider configuration is unusable")?;
    tracing::info!(
        "Providers available - STT: {:?}, LLM: {:?}",
        registry.available_stt(),
        registry.available_llm()
    );

    let config = SessionConfig::from_settings(&settings);
    let mut handle = start_session(config, registry);
    tracing::info!(
        "Session runtime ready; transport attaches at {}:{}",
        settings.host,
        settings.port
    );

    // Until a transport is attached, drain the session's outbound legs
    // so the dispatch loop never blocks on a full channel.
    let mut server_rx = handle.server_rx.take().context("server_rx already taken")?;
    let server_sink = tokio::spawn(async move {
        while let Some(message) = server_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => tracing::info!(target: "outbound", "{json}"),
                Err(e) => tracing::error!(target: "outbound", "Serialization failed: {e}"),
            }
        }
    });
    let mut format_rx = handle.format_rx.take().context("format_rx already taken")?;
    let format_sink = tokio::spawn(async move {
        while let Some(request) = format_rx.recv().await {
            tracing::info!(
                target: "outbound",
                "Formatting request ({} context messages): {:?}",
                request.context.len(),
                request.text
            );
        }
    });
    let mut finalize_rx = handle
        .finalize_rx
        .take()
        .context("finalize_rx already taken")?;
    let finalize_sink = tokio::spawn(async move {
        while finalize_rx.recv().await.is_some() {
            tracing::debug!(target: "outbound", "Finalize requested with no STT leg attached");
        }
    });

    SessionHandle::wait_for_shutdown_signal().await;

    tracing::info!("Beginning graceful shutdown");
    handle.shutdown().await;
    server_sink.abort();
    format_sink.abort();
    finalize_sink.abort();
    let _ = server_sink.await;
    let _ = format_sink.await;
    let _ = finalize_sink.await;
    tracing::info!("Shutdown complete");

    Ok(())
}
