use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Args, Parser, Subcommand};
use frames::{Frame, Status};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value, json};
use tokio::net::UnixStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

type Socket = WebSocketStream<UnixStream>;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("cannot reach daemon at {}: {source}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("websocket error: {0}")]
    Ws(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket closed")]
    WsClosed,
    #[error("frame decode failed: {0}")]
    Decode(#[from] frames::CodecError),
    #[error("timed out waiting for daemon reply")]
    Timeout,
    #[error("daemon returned error for {syscall}: {code}: {message}")]
    ServerError { syscall: String, code: String, message: String },
    #[error("parameters must be a JSON object")]
    NotAnObject,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("reading stdin failed: {0}")]
    Stdin(#[source] io::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for CliError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Ws(Box::new(error))
    }
}

#[derive(Parser, Debug)]
#[command(name = "authui-cli", about = "Broker-side client for the authui daemon")]
struct Cli {
    /// Daemon socket. Defaults to `$XDG_RUNTIME_DIR/authui.sock`.
    #[arg(long, env = "AUTHUI_SOCKET")]
    socket: Option<PathBuf>,

    /// Seconds to wait for a reply.
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show a dialog or web login and print the reply.
    Query(ParamsArgs),
    /// Send new parameters to a running request (matched by `RequestId`).
    Refresh(ParamsArgs),
    /// Cancel a queued or running request.
    Cancel { request_id: String },
    /// Delete cookies and helper data stored for an identity.
    RemoveIdentity { identity: u32 },
    Indicator(IndicatorCommand),
}

#[derive(Args, Debug)]
struct ParamsArgs {
    /// Request parameters as a JSON object, or `-` to read stdin.
    #[arg(long, default_value = "-")]
    params: String,
}

#[derive(Args, Debug)]
struct IndicatorCommand {
    #[command(subcommand)]
    command: IndicatorSubcommand,
}

#[derive(Subcommand, Debug)]
enum IndicatorSubcommand {
    Properties,
    Report {
        account_id: u32,
        #[arg(long)]
        display_name: Option<String>,
    },
    Remove {
        account_ids: Vec<u32>,
    },
    Clear,
    /// Print property changes until interrupted.
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let path = cli.socket.clone().unwrap_or_else(default_socket_path);
    let timeout = Duration::from_secs(cli.timeout);
    let mut socket = connect(&path).await?;

    let (syscall, data) = match cli.command {
        Command::Query(args) => ("ui:query_dialog", parse_params(&read_params(&args.params)?)?),
        Command::Refresh(args) => ("ui:refresh_dialog", parse_params(&read_params(&args.params)?)?),
        Command::Cancel { request_id } => ("ui:cancel_request", object(json!({"request_id": request_id}))),
        Command::RemoveIdentity { identity } => ("ui:remove_identity_data", object(json!({"identity": identity}))),
        Command::Indicator(indicator) => match indicator.command {
            IndicatorSubcommand::Properties => ("indicator:properties", Map::new()),
            IndicatorSubcommand::Report { account_id, display_name } => {
                let mut notification = Map::new();
                if let Some(name) = display_name {
                    notification.insert("DisplayName".into(), Value::String(name));
                }
                ("indicator:report_failure", object(json!({"account_id": account_id, "notification": notification})))
            }
            IndicatorSubcommand::Remove { account_ids } => {
                ("indicator:remove_failures", object(json!({"account_ids": account_ids})))
            }
            IndicatorSubcommand::Clear => ("indicator:clear_error_status", Map::new()),
            IndicatorSubcommand::Watch => return watch_properties(&mut socket).await,
        },
    };

    let req = request_frame(syscall, data);
    send(&mut socket, &req).await?;
    let reply = wait_for_terminal_response(&mut socket, &req.id, syscall, timeout).await?;
    print_json(&reply.data)?;
    let _ = socket.close(None).await;
    Ok(())
}

fn default_socket_path() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .filter(|v| !v.is_empty())
        .map_or_else(std::env::temp_dir, PathBuf::from)
        .join("authui.sock")
}

async fn connect(path: &Path) -> Result<Socket, CliError> {
    let stream =
        UnixStream::connect(path).await.map_err(|source| CliError::Connect { path: path.to_path_buf(), source })?;
    let (socket, _response) = tokio_tungstenite::client_async("ws://localhost/ws", stream).await?;
    Ok(socket)
}

async fn send(socket: &mut Socket, frame: &Frame) -> Result<(), CliError> {
    socket.send(Message::Binary(frames::encode_frame(frame).into())).await?;
    Ok(())
}

async fn watch_properties(socket: &mut Socket) -> Result<(), CliError> {
    loop {
        let frame = recv_next(socket).await?;
        if frame.syscall == "indicator:properties_changed" {
            print_json(&frame.data)?;
        }
    }
}

async fn wait_for_terminal_response(
    socket: &mut Socket,
    request_id: &str,
    syscall: &str,
    timeout: Duration,
) -> Result<Frame, CliError> {
    let fut = async {
        loop {
            let frame = recv_next(socket).await?;
            if is_reply_to(&frame, request_id, syscall) {
                return check_status(frame);
            }
        }
    };
    tokio::time::timeout(timeout, fut).await.map_err(|_| CliError::Timeout)?
}

fn is_reply_to(frame: &Frame, request_id: &str, syscall: &str) -> bool {
    frame.parent_id.as_deref() == Some(request_id)
        && frame.syscall == syscall
        && matches!(frame.status, Status::Done | Status::Error | Status::Cancel)
}

fn check_status(frame: Frame) -> Result<Frame, CliError> {
    if frame.status != Status::Error {
        return Ok(frame);
    }
    let field = |key: &str| frame.data.get(key).and_then(Value::as_str).unwrap_or("-").to_owned();
    Err(CliError::ServerError { code: field("code"), message: field("message"), syscall: frame.syscall.clone() })
}

async fn recv_next(socket: &mut Socket) -> Result<Frame, CliError> {
    loop {
        let Some(message) = socket.next().await else {
            return Err(CliError::WsClosed);
        };
        match message? {
            Message::Binary(bytes) => return frames::decode_frame(&bytes).map_err(CliError::from),
            Message::Close(_) => return Err(CliError::WsClosed),
            _ => {}
        }
    }
}

fn read_params(raw: &str) -> Result<String, CliError> {
    if raw != "-" {
        return Ok(raw.to_owned());
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf).map_err(CliError::Stdin)?;
    Ok(buf)
}

fn parse_params(raw: &str) -> Result<Map<String, Value>, CliError> {
    match serde_json::from_str::<Value>(raw.trim())? {
        Value::Object(map) => Ok(map),
        _ => Err(CliError::NotAnObject),
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn request_frame(syscall: &str, data: Map<String, Value>) -> Frame {
    Frame {
        id: Uuid::new_v4().to_string(),
        parent_id: None,
        ts: now_ms(),
        from: Some("authui-cli".to_owned()),
        syscall: syscall.to_owned(),
        status: Status::Request,
        data: Value::Object(data),
    }
}

fn now_ms() -> i64 {
    let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(duration.as_millis()).unwrap_or(0)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
