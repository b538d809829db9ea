//! Inactivity timer: fires once every watched component has been idle for
//! a full interval.
//!
//! Each component publishes a `watch::Receiver<bool>` (`true` = idle). Any
//! component turning busy stops the countdown; it restarts from zero when
//! all are idle again. A component whose sender is gone counts as idle.

use std::time::Duration;

use futures::future::select_all;
use tokio::sync::watch;
use tracing::debug;

pub struct InactivityTimer {
    interval: Duration,
    signals: Vec<watch::Receiver<bool>>,
}

impl InactivityTimer {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval, signals: Vec::new() }
    }

    #[must_use]
    pub fn watch(mut self, signal: watch::Receiver<bool>) -> Self {
        self.signals.push(signal);
        self
    }

    /// Resolve after all components stayed idle for `interval`.
    pub async fn wait(mut self) {
        loop {
            // Drop closed signals; their last value no longer matters.
            self.signals.retain(|rx| rx.has_changed().is_ok());

            let all_idle = self.signals.iter().all(|rx| *rx.borrow());
            if self.signals.is_empty() {
                tokio::time::sleep(self.interval).await;
                return;
            }

            if all_idle {
                tokio::select! {
                    () = tokio::time::sleep(self.interval) => {
                        debug!(interval_ms = self.interval.as_millis(), "inactivity: timer fired");
                        return;
                    }
                    () = any_changed(&mut self.signals) => {}
                }
            } else {
                any_changed(&mut self.signals).await;
            }
        }
    }
}

/// Resolve when any signal changes value or closes.
async fn any_changed(signals: &mut [watch::Receiver<bool>]) {
    let waits = signals.iter_mut().map(|rx| Box::pin(rx.changed()));
    let _ = select_all(waits).await;
}

#[cfg(test)]
#[path = "inactivity_test.rs"]
mod tests;
