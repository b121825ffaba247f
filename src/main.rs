//! usenet-relay daemon entry point.

use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use usenet_relay::{Config, Result, TransferSupervisor, UploadWatcher, server, wait_for_signal};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting usenet-relay");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    prepare_directories(&config).await?;

    let supervisor = Arc::new(TransferSupervisor::new(&config)?);

    let mut watcher = UploadWatcher::new(supervisor.clone(), config.transfer.watch_dir.clone())?;
    watcher.start()?;
    let watcher_task = tokio::spawn(watcher.run());

    let bind_address = config.bind_address;
    let server_task = tokio::spawn(server::start_server(supervisor, bind_address));

    wait_for_signal().await;
    tracing::info!("shutting down");

    watcher_task.abort();
    server_task.abort();
    let _ = watcher_task.await;
    let _ = server_task.await;

    Ok(())
}

/// Create the working directories and sweep stale partial downloads.
async fn prepare_directories(config: &Config) -> Result<()> {
    for dir in [
        &config.transfer.watch_dir,
        &config.transfer.download_dir,
        &config.transfer.temp_dir,
    ] {
        tokio::fs::create_dir_all(dir).await?;
    }

    // Anything still in the scratch directory is a leftover from a previous
    // run; in-flight downloads never survive a restart.
    let mut entries = tokio::fs::read_dir(&config.transfer.temp_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let removed = if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match removed {
            Ok(()) => tracing::info!(path = %path.display(), "removed stale temp entry"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove temp entry"),
        }
    }

    Ok(())
}
