//! Out-of-process web login variant.
//!
//! DESIGN
//! ======
//! The helper program is spawned per request with piped stdio. Its stdin
//! and stdout carry the framed IPC protocol (handshake enabled); its stderr
//! is forwarded to the log. `HOME` points at the identity's private cache
//! directory so browser profiles never mix between identities.
//!
//! ```text
//! daemon                                   helper
//!   │ spawn(--desktop-file-hint=…)  ───────▶ │
//!   │ "SsoUi" [Start params]        ───────▶ │
//!   │                               ◀─────── │ "SsoUi" [SetResult map]
//!   │ close stdin, wait ≤ timeout, kill      │
//! ```
//!
//! ERROR HANDLING
//! ==============
//! Spawn failures, broken pipes, protocol errors, and a helper that closes
//! its stdout without a result all fail the request with an internal error.
//! On cancel the broker gets its canceled reply right away; the helper is
//! then sent `Cancel` and given `shutdown_timeout` to exit before it is
//! killed.

use std::path::Path;
use std::process::Stdio;

use ipc::{FrameReader, FrameWriter, Message, Role};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::{Completer, Control, Job, RequestError};
use crate::config::HelperConfig;
use crate::params::Parameters;

const COMMUNICATION_ERROR: &str = "Error communicating with remote process";

fn communication_error() -> RequestError {
    RequestError::Internal(COMMUNICATION_ERROR.into())
}

/// Both directions of an established helper channel.
pub struct HelperChannel<R, W> {
    pub reader: FrameReader<R>,
    pub writer: FrameWriter<W>,
}

pub(super) async fn run(job: Job) {
    let Job { parameters, identity, context, mut control, completer, .. } = job;
    let home = context.identities.helper_home(identity);

    let (mut child, mut channel) = match spawn_helper(&context.helper, &home).await {
        Ok(spawned) => spawned,
        Err(e) => {
            error!(program = %context.helper.program.display(), error = %e, "remote: helper launch failed");
            completer.fail(communication_error());
            return;
        }
    };

    drive(parameters, &mut channel, &mut control, completer).await;

    close(channel).await;
    match tokio::time::timeout(context.helper.shutdown_timeout, child.wait()).await {
        Ok(Ok(status)) => debug!(%status, "remote: helper exited"),
        Ok(Err(e)) => warn!(error = %e, "remote: waiting for helper failed"),
        Err(_) => {
            warn!("remote: helper did not exit, killing");
            let _ = child.kill().await;
        }
    }
}

async fn spawn_helper(
    config: &HelperConfig,
    home: &Path,
) -> std::io::Result<(Child, HelperChannel<ChildStdout, ChildStdin>)> {
    tokio::fs::create_dir_all(home).await?;

    let mut child = Command::new(&config.program)
        .arg(format!("--desktop-file-hint={}", config.desktop_file))
        .env("HOME", home)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let missing = || std::io::Error::other("helper stdio not captured");
    let stdin = child.stdin.take().ok_or_else(missing)?;
    let stdout = child.stdout.take().ok_or_else(missing)?;
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "authui::helper", "{line}");
            }
        });
    }

    let writer = FrameWriter::new(stdin, true).await?;
    let reader = FrameReader::new(stdout, Role::Client, true);
    Ok((child, HelperChannel { reader, writer }))
}

/// End of stdin tells a well-behaved helper to exit.
async fn close<R, W: AsyncWrite + Unpin>(mut channel: HelperChannel<R, W>) {
    if let Err(e) = channel.writer.shutdown().await {
        debug!(error = %e, "remote: closing helper stdin failed");
    }
}

/// Send `Start` and wait for the helper's answer or a cancel.
pub(crate) async fn drive<R, W>(
    parameters: Parameters,
    channel: &mut HelperChannel<R, W>,
    control: &mut mpsc::UnboundedReceiver<Control>,
    completer: Completer,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Err(e) = channel.writer.send(&Message::Start(parameters)).await {
        warn!(error = %e, "remote: sending start failed");
        completer.fail(communication_error());
        return;
    }

    loop {
        tokio::select! {
            msg = channel.reader.next() => {
                match msg {
                    Ok(Some(Message::SetResult(result))) => completer.set_result(result),
                    Ok(Some(Message::SetCanceled)) => completer.set_canceled(),
                    // The client-role reader only yields results.
                    Ok(Some(other)) => {
                        debug!(opcode = ?other.opcode(), "remote: ignoring message");
                        continue;
                    }
                    Ok(None) => {
                        warn!("remote: helper closed channel without a result");
                        completer.fail(communication_error());
                    }
                    Err(e) => {
                        warn!(error = %e, "remote: protocol error");
                        completer.fail(communication_error());
                    }
                }
                return;
            }
            msg = control.recv() => match msg {
                Some(Control::Refresh(_)) => debug!("remote: refresh not supported"),
                Some(Control::Cancel) | None => {
                    completer.set_canceled();
                    if let Err(e) = channel.writer.send(&Message::Cancel).await {
                        debug!(error = %e, "remote: helper gone before cancel");
                    }
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
#[path = "remote_test.rs"]
mod tests;
