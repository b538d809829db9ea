//! Account directory: maps credential identities to user accounts.
//!
//! Used only by indicator escalation: a failed request for identity `n` is
//! attributed to the first account whose `credentials_id` is `n`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: u32,
    pub display_name: String,
    pub credentials_id: u32,
}

#[async_trait::async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_by_identity(&self, identity: u32) -> Option<Account>;
}

/// Directory with no accounts; escalation never happens.
pub struct NoAccounts;

#[async_trait::async_trait]
impl AccountDirectory for NoAccounts {
    async fn find_by_identity(&self, _identity: u32) -> Option<Account> {
        None
    }
}

/// JSON array of [`Account`]s, re-read on every lookup so external edits
/// are picked up without a restart.
pub struct JsonAccountFile {
    path: PathBuf,
}

impl JsonAccountFile {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait::async_trait]
impl AccountDirectory for JsonAccountFile {
    async fn find_by_identity(&self, identity: u32) -> Option<Account> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "accounts: read failed");
                return None;
            }
        };
        let accounts: Vec<Account> = match serde_json::from_slice(&raw) {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "accounts: invalid account file");
                return None;
            }
        };
        accounts.into_iter().find(|a| a.credentials_id == identity)
    }
}

#[cfg(test)]
#[path = "accounts_test.rs"]
mod tests;
