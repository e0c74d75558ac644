#![forbid(unsafe_code)]

use sl_gen::{GenerationProvider, SseProvider};
use sl_server::{Server, ServerConfig, run_stdio};
use sl_storage::SqliteStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    // stdout is the protocol channel; all logging goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::from_env();
    if let Err(err) = run(config) {
        tracing::error!(error = %err, "server failed");
        std::process::exit(1);
    }
}

fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::open(&config.storage_dir)?;

    let provider: Option<Arc<dyn GenerationProvider>> = match &config.api_base {
        Some(base) => {
            let provider = SseProvider::new(base.clone(), config.api_key.clone())?;
            Some(Arc::new(provider))
        }
        None => {
            tracing::warn!("no STORYLOOM_API_BASE set, generation disabled");
            None
        }
    };

    let mut server = Server::new(store, provider, config.model)?;
    tracing::info!(
        storage_dir = %config.storage_dir.display(),
        "listening on stdio"
    );
    run_stdio(&mut server)?;
    tracing::info!("stdin closed, shutting down");
    Ok(())
}
