//! Unix-socket jitter server.
//!
//! One task per connection; each connection serves request/response pairs
//! until the peer closes. Errors end the offending connection only.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hasher_jitter::FlashSearcher;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

use crate::error::{Result, ServerError};
use crate::protocol::{self, JitterRequest, SLOTS_BODY_LEN};

/// Jitter RPC endpoint bound to a Unix socket
pub struct JitterServer {
    listener: UnixListener,
    socket_path: PathBuf,
    searcher: Arc<FlashSearcher>,
}

impl JitterServer {
    /// Bind `socket_path`, replacing a stale socket file.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(socket_path: impl AsRef<Path>, searcher: Arc<FlashSearcher>) -> Result<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();
        match std::fs::remove_file(&socket_path) {
            Ok(()) => tracing::debug!(path = %socket_path.display(), "Removed stale socket"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(&socket_path)?;
        tracing::info!(
            path = %socket_path.display(),
            frames = searcher.len(),
            "Jitter server listening"
        );
        Ok(Self {
            listener,
            socket_path,
            searcher,
        })
    }

    /// Path of the bound socket
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept connections until `shutdown` resolves, then remove the socket file
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, _addr) = accepted?;
                    let searcher = Arc::clone(&self.searcher);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, searcher).await {
                            tracing::warn!(error = %e, "Jitter connection closed with error");
                        }
                    });
                }
                _ = &mut shutdown => {
                    tracing::info!("Jitter server shutting down");
                    break;
                }
            }
        }

        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            tracing::debug!(error = %e, "Socket file already gone");
        }
        Ok(())
    }

    /// Accept connections forever
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }
}

async fn handle_connection(mut stream: UnixStream, searcher: Arc<FlashSearcher>) -> Result<()> {
    let mut body = [0u8; SLOTS_BODY_LEN];
    loop {
        let version = match stream.read_u8().await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let len = protocol::body_len(version).ok_or(ServerError::UnsupportedVersion(version))?;
        stream.read_exact(&mut body[..len]).await?;

        let request = JitterRequest::decode(version, &body[..len])?;
        let jitter = request.resolve(&searcher);
        stream.write_all(&protocol::encode_response(jitter)).await?;
    }
}
