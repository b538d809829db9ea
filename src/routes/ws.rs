//! WebSocket handler: the broker's RPC surface.
//!
//! DESIGN
//! ======
//! Every upgraded connection runs one `select!` loop over three sources:
//! - inbound binary frames from the broker → decode + dispatch by prefix
//! - deferred replies for `ui:query_dialog`/`ui:refresh_dialog`, delivered
//!   through the per-connection channel once the request completes
//! - indicator property changes → `indicator:properties_changed`
//!
//! Handlers validate input, call a service, and return an `Outcome`. The
//! dispatch layer turns the outcome into reply frames. Handlers never touch
//! the socket.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → loop
//! 2. Broker sends frames → dispatch → Outcome → reply (now or deferred)
//! 3. Close → loop ends. Requests already queued keep running; their replies
//!    are dropped.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::{Data, ErrorCode, Frame, Status};
use crate::params;
use crate::request::Reply;
use crate::services::indicator::{Indicator, IndicatorProperties};
use crate::state::AppState;

const CLIENT_CHANNEL_CAPACITY: usize = 64;

pub const PROPERTIES_CHANGED: &str = "indicator:properties_changed";

// =============================================================================
// OUTCOME
// =============================================================================

/// What the dispatch layer sends back for one inbound frame.
enum Outcome {
    /// Send done+data to the sender.
    Reply(Data),
    /// Send empty done to the sender.
    Done,
    /// Nothing now; a task delivers the reply through the client channel.
    Deferred,
}

#[derive(Debug, thiserror::Error)]
enum RouteError {
    #[error("{0} required")]
    Missing(&'static str),
    #[error("indicator is disabled")]
    IndicatorDisabled,
    #[error("request service stopped")]
    ServiceStopped,
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl ErrorCode for RouteError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Missing(_) => "E_BAD_REQUEST",
            Self::IndicatorDisabled => "E_INDICATOR_DISABLED",
            Self::ServiceStopped => "E_SERVICE_STOPPED",
            Self::Io(_) => "E_IO",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(CLIENT_CHANNEL_CAPACITY);
    let mut changes = state.indicator.as_ref().map(Indicator::subscribe);

    info!(%client_id, "ws: client connected");

    'conn: loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Binary(bytes) => {
                        for frame in process_inbound_bytes(&state, client_id, &client_tx, &bytes).await {
                            if send_frame(&mut socket, &frame).await.is_err() {
                                break 'conn;
                            }
                        }
                    }
                    Message::Text(_) => warn!(%client_id, "ws: text frames are not supported"),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
            properties = next_change(&mut changes) => {
                let frame = Frame::request(PROPERTIES_CHANGED, properties_data(&properties));
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(%client_id, "ws: client disconnected");
}

/// Next indicator change; pends forever without an indicator.
async fn next_change(changes: &mut Option<broadcast::Receiver<IndicatorProperties>>) -> IndicatorProperties {
    let Some(rx) = changes else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(properties) => return properties,
            Err(broadcast::error::RecvError::Lagged(skipped)) => debug!(skipped, "ws: indicator changes lagged"),
            Err(broadcast::error::RecvError::Closed) => return std::future::pending().await,
        }
    }
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Decode and process one inbound binary frame and return frames for the
/// sender. Deferred replies arrive later on `client_tx`.
async fn process_inbound_bytes(
    state: &AppState,
    client_id: Uuid,
    client_tx: &mpsc::Sender<Frame>,
    bytes: &[u8],
) -> Vec<Frame> {
    let req = match frames::decode_frame(bytes) {
        Ok(wire) => match Frame::try_from(wire) {
            Ok(req) => req,
            Err(e) => {
                warn!(%client_id, error = %e, "ws: invalid inbound frame");
                return vec![Frame::request("gateway:error", Data::new()).with_data("message", e.to_string())];
            }
        },
        Err(e) => {
            warn!(%client_id, error = %e, "ws: undecodable inbound frame");
            return vec![Frame::request("gateway:error", Data::new()).with_data("message", format!("decode: {e}"))];
        }
    };

    info!(%client_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");

    let prefix = req.prefix();
    let result = match prefix {
        "ui" => handle_ui(state, client_tx, &req).await,
        "indicator" => handle_indicator(state, &req).await,
        _ => Err(req.error(format!("unknown prefix: {prefix}"))),
    };

    match result {
        Ok(Outcome::Reply(data)) => vec![req.done_with(data)],
        Ok(Outcome::Done) => vec![req.done()],
        Ok(Outcome::Deferred) => vec![],
        Err(err_frame) => vec![err_frame],
    }
}

// =============================================================================
// UI HANDLERS
// =============================================================================

async fn handle_ui(state: &AppState, client_tx: &mpsc::Sender<Frame>, req: &Frame) -> Result<Outcome, Frame> {
    match req.op() {
        "query_dialog" => {
            let reply = state.service.query_dialog(req.data.clone());
            spawn_deferred_reply(req.clone(), reply, client_tx.clone());
            Ok(Outcome::Deferred)
        }
        "refresh_dialog" => {
            let reply = state.service.refresh_dialog(req.data.clone());
            spawn_deferred_reply(req.clone(), reply, client_tx.clone());
            Ok(Outcome::Deferred)
        }
        "cancel_request" => {
            let Some(request_id) = params::get_str(&req.data, "request_id") else {
                return Err(req.error_from(&RouteError::Missing("request_id")));
            };
            state.service.cancel_ui_request(request_id);
            Ok(Outcome::Done)
        }
        "remove_identity_data" => {
            let Some(identity) = params::get_u32(&req.data, "identity") else {
                return Err(req.error_from(&RouteError::Missing("identity")));
            };
            match state.service.remove_identity_data(identity).await {
                Ok(()) => Ok(Outcome::Done),
                Err(e) => Err(req.error_from(&RouteError::from(e))),
            }
        }
        op => Err(req.error(format!("unknown ui op: {op}"))),
    }
}

/// Wait for a request's reply and deliver it as a terminal frame.
fn spawn_deferred_reply(req: Frame, reply: oneshot::Receiver<Reply>, client_tx: mpsc::Sender<Frame>) {
    tokio::spawn(async move {
        let frame = match reply.await {
            Ok(Ok(result)) => {
                if let Some(code) = params::result_error(&result) {
                    debug!(id = %req.id, syscall = %req.syscall, ?code, "ws: reply carries query error");
                }
                req.done_with(result)
            }
            Ok(Err(e)) => req.error_from(&e),
            Err(_) => req.error_from(&RouteError::ServiceStopped),
        };
        if client_tx.send(frame).await.is_err() {
            debug!(id = %req.id, "ws: client gone before reply");
        }
    });
}

// =============================================================================
// INDICATOR HANDLERS
// =============================================================================

async fn handle_indicator(state: &AppState, req: &Frame) -> Result<Outcome, Frame> {
    let Some(indicator) = &state.indicator else {
        return Err(req.error_from(&RouteError::IndicatorDisabled));
    };

    match req.op() {
        "report_failure" => {
            let Some(account_id) = params::get_u32(&req.data, "account_id") else {
                return Err(req.error_from(&RouteError::Missing("account_id")));
            };
            let notification = params::get_map(&req.data, "notification").cloned().unwrap_or_default();
            indicator.report_failure(account_id, &notification).await;
            Ok(Outcome::Done)
        }
        "remove_failures" => {
            let Some(ids) = req.data.get("account_ids").and_then(Value::as_array) else {
                return Err(req.error_from(&RouteError::Missing("account_ids")));
            };
            let ids: Vec<u32> = ids.iter().filter_map(Value::as_u64).filter_map(|id| u32::try_from(id).ok()).collect();
            indicator.remove_failures(&ids).await;
            Ok(Outcome::Done)
        }
        "clear_error_status" => {
            indicator.clear_error_status().await;
            Ok(Outcome::Done)
        }
        "properties" => Ok(Outcome::Reply(properties_data(&indicator.properties().await))),
        op => Err(req.error(format!("unknown indicator op: {op}"))),
    }
}

fn properties_data(properties: &IndicatorProperties) -> Data {
    match serde_json::to_value(properties) {
        Ok(Value::Object(map)) => map,
        _ => Data::new(),
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), axum::Error> {
    if frame.status == Status::Error {
        let code = frame.data.get("code").and_then(Value::as_str).unwrap_or("-");
        let message = frame.data.get("message").and_then(Value::as_str).unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else {
        info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    let bytes = frames::encode_frame(&frames::Frame::from(frame));
    socket.send(Message::Binary(bytes.into())).await
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
