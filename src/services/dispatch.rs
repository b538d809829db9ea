//! Dispatch service: the broker-facing facade over the queue manager.
//!
//! ARCHITECTURE
//! ============
//! A single actor task owns the [`QueueManager`]. Route handlers hold a
//! cloneable [`ServiceHandle`] and talk to the actor over a command channel;
//! running requests report back over the completion channel. Both channels
//! are drained by one `select!` loop, so queue state never needs a lock.
//!
//! ```text
//! ServiceHandle ──Command──▶ actor ──enqueue/cancel/refresh──▶ QueueManager
//!                              ▲                                   │
//!                              └──────── Completion ◀── variants ◀─┘
//! ```
//!
//! After every step the actor publishes whether all queues are empty on a
//! `watch` channel; the inactivity timer consumes it.

use std::io;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BrowserMode;
use crate::params::{self, Parameters, QueryError, keys};
use crate::queue::QueueManager;
use crate::request::{Context, Reply, Request, RequestKey, RequestKind};
use crate::services::identity::IdentityStore;

enum Command {
    Query { parameters: Parameters, reply: oneshot::Sender<Reply> },
    Refresh { parameters: Parameters, reply: oneshot::Sender<Reply> },
    Cancel { request_id: String },
}

/// Cloneable handle to the dispatch actor.
#[derive(Clone)]
pub struct ServiceHandle {
    commands: mpsc::UnboundedSender<Command>,
    idle: watch::Receiver<bool>,
    identities: IdentityStore,
}

impl ServiceHandle {
    /// Queue a new request. The receiver resolves once the request
    /// completes; it errors if the service shut down first.
    pub fn query_dialog(&self, parameters: Parameters) -> oneshot::Receiver<Reply> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Query { parameters, reply });
        rx
    }

    /// Forward updated parameters to the running request named by their
    /// `RequestId`.
    pub fn refresh_dialog(&self, parameters: Parameters) -> oneshot::Receiver<Reply> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Refresh { parameters, reply });
        rx
    }

    pub fn cancel_ui_request(&self, request_id: &str) {
        self.send(Command::Cancel { request_id: request_id.to_string() });
    }

    /// Delete the cookie jar and helper cache kept for `identity`.
    ///
    /// # Errors
    ///
    /// Filesystem errors other than the data already being absent.
    pub async fn remove_identity_data(&self, identity: u32) -> io::Result<()> {
        debug!(identity, "dispatch: removing identity data");
        self.identities.remove_for_identity(identity).await
    }

    /// `true` while no request is queued or running.
    #[must_use]
    pub fn idle_signal(&self) -> watch::Receiver<bool> {
        self.idle.clone()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("dispatch: service is not running");
        }
    }
}

/// Spawn the dispatch actor. The task ends when every handle is dropped.
pub fn spawn_service(context: Context, mode: BrowserMode) -> (ServiceHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (idle_tx, idle_rx) = watch::channel(true);
    let identities = context.identities.clone();

    let actor = Actor { context, mode, next_key: 1, idle: idle_tx };
    let task = tokio::spawn(actor.run(commands_rx));

    (ServiceHandle { commands: commands_tx, idle: idle_rx, identities }, task)
}

struct Actor {
    context: Context,
    mode: BrowserMode,
    next_key: RequestKey,
    idle: watch::Sender<bool>,
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let (events_tx, mut completions) = mpsc::unbounded_channel();
        let mut manager = QueueManager::new(events_tx);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle(&mut manager, command);
                }
                Some(completion) = completions.recv() => manager.on_completed(completion),
            }

            let idle = manager.is_idle();
            self.idle.send_if_modified(|current| {
                let changed = *current != idle;
                *current = idle;
                changed
            });
        }

        debug!(pending = manager.request_count(), "dispatch: service stopped");
    }

    fn handle(&mut self, manager: &mut QueueManager, command: Command) {
        match command {
            Command::Query { parameters, reply } => {
                let parameters = params::expand_arguments(parameters);
                let kind = RequestKind::select(&parameters, self.mode);
                let key = self.next_key;
                self.next_key += 1;
                let request = Request::new(key, kind, parameters, reply, self.context.clone());
                info!(
                    key,
                    request_id = request.id(),
                    kind = ?request.kind(),
                    window_id = request.window_id(),
                    embedded = request.embedded_ui(),
                    method = request.method(),
                    mechanism = request.mechanism(),
                    "dispatch: query dialog"
                );
                manager.enqueue(request);
            }
            Command::Refresh { parameters, reply } => {
                let parameters = params::expand_arguments(parameters);
                let request_id = params::get_str(&parameters, keys::REQUEST_ID).unwrap_or_default().to_string();
                let result = if manager.refresh(&request_id, parameters) {
                    debug!(%request_id, "dispatch: refresh forwarded");
                    Parameters::new()
                } else {
                    warn!(%request_id, "dispatch: no running request to refresh");
                    params::error_result(QueryError::RefreshFailed)
                };
                let _ = reply.send(Ok(result));
            }
            Command::Cancel { request_id } => {
                if !manager.cancel(&request_id) {
                    debug!(%request_id, "dispatch: cancel for unknown request");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
