//! Request: one authentication transaction.
//!
//! ARCHITECTURE
//! ============
//! A [`Request`] is owned by its window queue. `start()` spawns the variant
//! (dialog, in-process browser, remote helper) as a task that receives a
//! [`Job`]: the parameters, a control channel, and a single-shot
//! [`Completer`]. The variant ends by consuming the completer, which first
//! hands the reply to the broker and then reports a [`Completion`] to the
//! queue manager.
//!
//! ```text
//! QueueManager ──start()──▶ Request ──spawn──▶ variant task
//!      ▲                       │                    │
//!      │                  cancel()/refresh()        │
//!      │                       └──── Control ──────▶│
//!      │                                            ▼
//!      └──────────── Completion ◀──────────── Completer ──▶ reply (broker)
//! ```
//!
//! INVARIANTS
//! ==========
//! - `start()` has an effect at most once; a second call is logged and
//!   ignored.
//! - Exactly one reply and one completion per request, whatever the path:
//!   result, cancel, failure, or a variant task that dies without replying
//!   (the completer's `Drop` answers with an internal error).
//!
//! ESCALATION
//! ==========
//! A dialog or in-process web login with no caller window (window id 0) for
//! a known identity is not shown. The failure is reported to the indicator
//! service and the request completes with `QueryErrorCode = Forbidden`.
//! Remote-helper logins always run.

pub mod browser;
pub mod dialog;
pub mod remote;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::{BrowserMode, HelperConfig};
use crate::frame::ErrorCode;
use crate::params::{self, Parameters, QueryError, keys};
use crate::services::accounts::AccountDirectory;
use crate::services::identity::IdentityStore;
use crate::services::indicator::Indicator;
use crate::toolkit::{Placement, Toolkit, ToolkitError};

/// Daemon-internal request handle. Unique for the daemon's lifetime.
pub type RequestKey = u64;

/// What the broker eventually receives.
pub type Reply = Result<Parameters, RequestError>;

// =============================================================================
// KIND
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Dialog,
    Browser,
    RemoteBrowser,
}

impl RequestKind {
    /// Requests carrying `OpenUrl` are web logins; everything else is a
    /// credentials dialog.
    #[must_use]
    pub fn select(parameters: &Parameters, mode: BrowserMode) -> Self {
        if !parameters.contains_key(keys::OPEN_URL) {
            return Self::Dialog;
        }
        match mode {
            BrowserMode::Remote => Self::RemoteBrowser,
            BrowserMode::InProcess => Self::Browser,
        }
    }

    /// Dialogs and in-process web views open a window of their own. The
    /// remote helper manages its own window and is never escalated.
    #[must_use]
    pub fn shows_local_window(self) -> bool {
        matches!(self, Self::Dialog | Self::Browser)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("{0}")]
    Internal(String),
    #[error("invalid parameters: {0}")]
    BadParameters(String),
    #[error(transparent)]
    Toolkit(#[from] ToolkitError),
}

impl ErrorCode for RequestError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Internal(_) => "E_INTERNAL",
            Self::BadParameters(_) => "E_BAD_PARAMETERS",
            Self::Toolkit(e) => e.error_code(),
        }
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Collaborators shared by every request. Built once in `main`.
#[derive(Clone)]
pub struct Context {
    pub toolkit: Arc<dyn Toolkit>,
    pub indicator: Option<Indicator>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub identities: IdentityStore,
    pub helper: HelperConfig,
}

// =============================================================================
// COMPLETION
// =============================================================================

/// Sent to the queue manager once a request has replied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub key: RequestKey,
    pub window_id: u32,
}

/// Single-shot completion handle held by a running variant.
pub struct Completer {
    key: RequestKey,
    window_id: u32,
    request_id: String,
    reply: Option<oneshot::Sender<Reply>>,
    events: mpsc::UnboundedSender<Completion>,
}

impl Completer {
    pub(crate) fn new(
        key: RequestKey,
        window_id: u32,
        request_id: String,
        reply: oneshot::Sender<Reply>,
        events: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self { key, window_id, request_id, reply: Some(reply), events }
    }

    pub fn set_result(self, result: Parameters) {
        debug!(request_id = %self.request_id, "request: result ready");
        self.finish(Ok(result));
    }

    pub fn set_canceled(self) {
        debug!(request_id = %self.request_id, "request: canceled");
        self.finish(Ok(params::canceled_result()));
    }

    /// Reply with an error, bypassing result delivery.
    pub fn fail(self, err: RequestError) {
        warn!(request_id = %self.request_id, error = %err, "request: failed");
        self.finish(Err(err));
    }

    fn finish(mut self, reply: Reply) {
        self.deliver(reply);
    }

    fn deliver(&mut self, reply: Reply) {
        let Some(tx) = self.reply.take() else {
            return;
        };
        if tx.send(reply).is_err() {
            debug!(request_id = %self.request_id, "request: broker no longer waiting for reply");
        }
        let _ = self.events.send(Completion { key: self.key, window_id: self.window_id });
    }
}

impl Drop for Completer {
    fn drop(&mut self) {
        if self.reply.is_some() {
            warn!(request_id = %self.request_id, "request: ended without a reply");
            self.deliver(Err(RequestError::Internal("request ended without a reply".into())));
        }
    }
}

// =============================================================================
// JOB
// =============================================================================

/// Messages from the owning queue into a running variant.
#[derive(Debug)]
pub enum Control {
    Cancel,
    Refresh(Parameters),
}

/// Everything a variant task needs.
pub struct Job {
    pub parameters: Parameters,
    pub client_data: Parameters,
    pub placement: Placement,
    pub identity: u32,
    pub context: Context,
    pub control: mpsc::UnboundedReceiver<Control>,
    pub completer: Completer,
}

// =============================================================================
// REQUEST
// =============================================================================

enum State {
    Pending(oneshot::Sender<Reply>),
    InProgress(mpsc::UnboundedSender<Control>),
    Finished,
}

pub struct Request {
    key: RequestKey,
    kind: RequestKind,
    id: String,
    parameters: Parameters,
    client_data: Parameters,
    window_id: u32,
    embedded: bool,
    context: Context,
    state: State,
}

impl Request {
    pub fn new(
        key: RequestKey,
        kind: RequestKind,
        parameters: Parameters,
        reply: oneshot::Sender<Reply>,
        context: Context,
    ) -> Self {
        let client_data = params::get_map(&parameters, keys::CLIENT_DATA).cloned().unwrap_or_default();
        let window_id = params::get_u32(&client_data, keys::WINDOW_ID).unwrap_or(0);
        let embedded = params::get_bool(&client_data, keys::EMBEDDED);
        let id = params::get_str(&parameters, keys::REQUEST_ID).unwrap_or_default().to_string();
        Self { key, kind, id, parameters, client_data, window_id, embedded, context, state: State::Pending(reply) }
    }

    /// Spawn the variant. No-op (logged) if already started or finished.
    pub fn start(&mut self, events: &mpsc::UnboundedSender<Completion>) {
        let reply = match std::mem::replace(&mut self.state, State::Finished) {
            State::Pending(reply) => reply,
            other => {
                warn!(request_id = %self.id, key = self.key, "request: already started");
                self.state = other;
                return;
            }
        };

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        self.state = State::InProgress(control_tx);

        let job = Job {
            parameters: self.parameters.clone(),
            client_data: self.client_data.clone(),
            placement: self.placement(),
            identity: self.identity(),
            context: self.context.clone(),
            control: control_rx,
            completer: self.completer(reply, events),
        };
        info!(request_id = %self.id, key = self.key, kind = ?self.kind, window_id = self.window_id, "request: starting");

        let kind = self.kind;
        tokio::spawn(async move {
            if kind.shows_local_window()
                && job.placement == Placement::TopLevel
                && dispatch_to_indicator(&job).await
            {
                job.completer.set_result(params::error_result(QueryError::Forbidden));
                return;
            }
            match kind {
                RequestKind::Dialog => dialog::run(job).await,
                RequestKind::Browser => browser::run(job).await,
                RequestKind::RemoteBrowser => remote::run(job).await,
            }
        });
    }

    /// Cancel. A request that never started completes right here; a running
    /// one is told to stop and completes from its task.
    pub fn cancel(&mut self, events: &mpsc::UnboundedSender<Completion>) {
        match std::mem::replace(&mut self.state, State::Finished) {
            State::Pending(reply) => self.completer(reply, events).set_canceled(),
            State::InProgress(control) => {
                if control.send(Control::Cancel).is_err() {
                    debug!(request_id = %self.id, "request: cancel after variant finished");
                }
                self.state = State::InProgress(control);
            }
            State::Finished => {}
        }
    }

    /// Forward new parameters to a running dialog or web view. Returns
    /// whether the variant took them.
    pub fn refresh(&self, parameters: Parameters) -> bool {
        if self.kind == RequestKind::RemoteBrowser {
            return false;
        }
        match &self.state {
            State::InProgress(control) => control.send(Control::Refresh(parameters)).is_ok(),
            State::Pending(_) | State::Finished => false,
        }
    }

    fn completer(&self, reply: oneshot::Sender<Reply>, events: &mpsc::UnboundedSender<Completion>) -> Completer {
        Completer::new(self.key, self.window_id, self.id.clone(), reply, events.clone())
    }

    #[must_use]
    pub fn key(&self) -> RequestKey {
        self.key
    }

    #[must_use]
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Caller-supplied `RequestId`; empty when absent.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn window_id(&self) -> u32 {
        self.window_id
    }

    #[must_use]
    pub fn embedded_ui(&self) -> bool {
        self.embedded
    }

    #[must_use]
    pub fn identity(&self) -> u32 {
        params::get_u32(&self.parameters, keys::IDENTITY).unwrap_or(0)
    }

    #[must_use]
    pub fn method(&self) -> &str {
        params::get_str(&self.parameters, keys::METHOD).unwrap_or_default()
    }

    #[must_use]
    pub fn mechanism(&self) -> &str {
        params::get_str(&self.parameters, keys::MECHANISM).unwrap_or_default()
    }

    #[cfg(test)]
    pub fn client_data(&self) -> &Parameters {
        &self.client_data
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        matches!(self.state, State::InProgress(_))
    }

    #[must_use]
    pub fn placement(&self) -> Placement {
        Placement::for_window(self.window_id, self.embedded)
    }
}

/// Report the failure to the indicator instead of showing UI. Returns
/// whether the request was handed off.
async fn dispatch_to_indicator(job: &Job) -> bool {
    let Some(indicator) = &job.context.indicator else {
        return false;
    };
    if job.identity == 0 {
        return false;
    }
    let Some(account) = job.context.accounts.find_by_identity(job.identity).await else {
        debug!(identity = job.identity, "request: no account for identity, showing UI");
        return false;
    };

    let mut notification = Parameters::new();
    notification.insert(keys::DISPLAY_NAME.into(), Value::String(account.display_name.clone()));
    notification.insert(keys::CLIENT_DATA.into(), Value::Object(job.client_data.clone()));
    notification.insert(keys::IDENTITY.into(), Value::from(job.identity));
    for key in [keys::METHOD, keys::MECHANISM] {
        let value = params::get_str(&job.parameters, key).unwrap_or_default();
        notification.insert(key.into(), Value::String(value.to_string()));
    }

    info!(identity = job.identity, account_id = account.id, "request: escalating to indicator");
    indicator.report_failure(account.id, &notification).await;
    true
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
