//! hasher-jitter-server -- jitter RPC endpoint over a Unix domain socket.
//!
//! Exposes a shared [`FlashSearcher`] to out-of-process hashers (hardware
//! drivers, simulators) that cannot link the engine directly.

#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

use std::path::PathBuf;
use std::sync::Arc;

use hasher_jitter::{loader, FlashSearcher, JitterConfig};

pub use client::JitterClient;
pub use error::{Result, ServerError};
pub use server::JitterServer;

/// Server configuration.
#[derive(Clone, Debug, Default)]
pub struct ServerConfig {
    /// Engine settings; `socket_path` and `cache_size` apply here.
    pub jitter: JitterConfig,
    /// Directory of training-frame files loaded at startup.
    pub data_dir: Option<PathBuf>,
}

/// Build a searcher and fill it from the configured data directory
pub fn open_searcher(config: &ServerConfig) -> Result<Arc<FlashSearcher>> {
    let searcher = Arc::new(FlashSearcher::new(&config.jitter));
    if let Some(dir) = &config.data_dir {
        let loaded = loader::load_from_directory(&searcher, dir)?;
        tracing::info!(dir = %dir.display(), frames = loaded, "Knowledge base loaded");
    }
    Ok(searcher)
}

/// Serve until Ctrl-C.
pub async fn run(config: ServerConfig) -> Result<()> {
    let searcher = open_searcher(&config)?;
    let server = JitterServer::bind(&config.jitter.socket_path, searcher)?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
}
