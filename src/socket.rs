//! Unix socket ownership.
//!
//! Only one daemon may serve a socket path. A leftover file from a crashed
//! daemon is detected by connecting to it: nobody answering means stale.

use std::io;
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("another daemon is already listening on {}", .0.display())]
    AlreadyRunning(PathBuf),
    #[error("failed to bind {}: {source}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn bind_error(path: &Path) -> impl FnOnce(io::Error) -> SocketError + '_ {
    move |source| SocketError::Bind { path: path.to_path_buf(), source }
}

/// Bind `path`, replacing a stale socket file but never a live daemon's.
///
/// # Errors
///
/// [`SocketError::AlreadyRunning`] when another process accepts connections
/// on `path`; [`SocketError::Bind`] for any other failure.
pub async fn bind(path: &Path) -> Result<UnixListener, SocketError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(bind_error(path))?;
    }

    match UnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            if UnixStream::connect(path).await.is_ok() {
                return Err(SocketError::AlreadyRunning(path.to_path_buf()));
            }
            warn!(path = %path.display(), "socket: removing stale socket");
            tokio::fs::remove_file(path).await.map_err(bind_error(path))?;
            UnixListener::bind(path).map_err(bind_error(path))
        }
        Err(e) => Err(bind_error(path)(e)),
    }
}

/// Remove the socket file on shutdown.
pub fn remove(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "socket: removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "socket: remove failed"),
    }
}

#[cfg(test)]
#[path = "socket_test.rs"]
mod tests;
