//! Indicator service: tracks accounts whose credentials stopped working.
//!
//! DESIGN
//! ======
//! Failures accumulate as a set of account ids. The first report after a
//! clear raises the error status and shows one desktop notification; later
//! reports only grow the set until `clear_error_status` resets it.
//!
//! Every property change is published on a broadcast channel (forwarded to
//! brokers as `indicator:properties_changed`) and the idle signal follows
//! "no failures".

use std::collections::BTreeSet;
use std::process::Stdio;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, broadcast, watch};
use tracing::{info, warn};

use crate::params::{self, Parameters, keys};

const CHANGES_CAPACITY: usize = 64;

/// Snapshot of the published properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndicatorProperties {
    pub failures: Vec<u32>,
    pub error_status: bool,
}

#[derive(Debug, Default)]
struct IndicatorState {
    failures: BTreeSet<u32>,
    error_status: bool,
}

impl IndicatorState {
    fn properties(&self) -> IndicatorProperties {
        IndicatorProperties { failures: self.failures.iter().copied().collect(), error_status: self.error_status }
    }
}

// =============================================================================
// NOTIFIER
// =============================================================================

pub trait Notifier: Send + Sync {
    fn notify(&self, summary: &str, body: &str);
}

/// Logs notifications instead of showing them.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, summary: &str, body: &str) {
        info!(%summary, %body, "indicator: notification");
    }
}

/// Shows notifications with an external program (`notify-send`).
pub struct CommandNotifier {
    program: String,
}

impl CommandNotifier {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, summary: &str, body: &str) {
        let spawned = tokio::process::Command::new(&self.program)
            .arg(summary)
            .arg(body)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(mut child) => {
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
            }
            Err(e) => warn!(program = %self.program, error = %e, "indicator: notification failed"),
        }
    }
}

/// Notification summary naming the account when a display name was given.
#[must_use]
pub fn notification_summary(display_name: Option<&str>) -> String {
    match display_name {
        Some(name) if !name.is_empty() => {
            format!("Applications can no longer access your {name} Web Account")
        }
        _ => "Applications can no longer access some of your Web Accounts".to_string(),
    }
}

const NOTIFICATION_BODY: &str = "Open the online accounts settings to sign in again.";

// =============================================================================
// SERVICE
// =============================================================================

#[derive(Clone)]
pub struct Indicator {
    state: Arc<RwLock<IndicatorState>>,
    changes: broadcast::Sender<IndicatorProperties>,
    idle: Arc<watch::Sender<bool>>,
    notifier: Arc<dyn Notifier>,
}

impl Indicator {
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        let (changes, _) = broadcast::channel(CHANGES_CAPACITY);
        let (idle, _) = watch::channel(true);
        Self { state: Arc::new(RwLock::new(IndicatorState::default())), changes, idle: Arc::new(idle), notifier }
    }

    /// Record a failure for `account_id`. Shows a notification unless one
    /// is already up.
    pub async fn report_failure(&self, account_id: u32, notification: &Parameters) {
        let mut state = self.state.write().await;
        state.failures.insert(account_id);
        info!(account_id, failures = state.failures.len(), "indicator: failure reported");
        if !state.error_status {
            state.error_status = true;
            let summary = notification_summary(params::get_str(notification, keys::DISPLAY_NAME));
            self.notifier.notify(&summary, NOTIFICATION_BODY);
        }
        self.publish(&state);
    }

    pub async fn remove_failures(&self, account_ids: &[u32]) {
        let mut state = self.state.write().await;
        let before = state.failures.len();
        for id in account_ids {
            state.failures.remove(id);
        }
        if state.failures.len() != before {
            self.publish(&state);
        }
    }

    pub async fn clear_error_status(&self) {
        let mut state = self.state.write().await;
        if state.error_status {
            state.error_status = false;
            self.publish(&state);
        }
    }

    pub async fn properties(&self) -> IndicatorProperties {
        self.state.read().await.properties()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<IndicatorProperties> {
        self.changes.subscribe()
    }

    /// `true` while no failures are recorded.
    #[must_use]
    pub fn idle_signal(&self) -> watch::Receiver<bool> {
        self.idle.subscribe()
    }

    fn publish(&self, state: &IndicatorState) {
        // No subscribers is fine.
        let _ = self.changes.send(state.properties());
        self.idle.send_replace(state.failures.is_empty());
    }
}

#[cfg(test)]
#[path = "indicator_test.rs"]
mod tests;
