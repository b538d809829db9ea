//! Per-identity on-disk data: cookie jars and browser helper homes.
//!
//! ```text
//! <cache_dir>/
//!   cookies/<identity>.jar     in-process web view cookies
//!   id-<identity>/             HOME of the remote browser helper
//! ```

use std::io;
use std::path::PathBuf;

use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityStore {
    cache_dir: PathBuf,
}

impl IdentityStore {
    #[must_use]
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    #[must_use]
    pub fn cookie_jar(&self, identity: u32) -> PathBuf {
        self.cache_dir.join("cookies").join(format!("{identity}.jar"))
    }

    #[must_use]
    pub fn helper_home(&self, identity: u32) -> PathBuf {
        self.cache_dir.join(format!("id-{identity}"))
    }

    /// Delete everything stored for `identity`. Missing data is not an error.
    ///
    /// # Errors
    ///
    /// Any I/O failure other than "not found".
    pub async fn remove_for_identity(&self, identity: u32) -> io::Result<()> {
        ignore_missing(tokio::fs::remove_file(self.cookie_jar(identity)).await)?;
        ignore_missing(tokio::fs::remove_dir_all(self.helper_home(identity)).await)?;
        info!(identity, "identity: removed stored data");
        Ok(())
    }
}

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
