//! Credentials dialog variant.
//!
//! Field rules:
//! - username shown when queried (`QueryUserName`) or preset (`UserName`),
//!   editable only when queried; same for the password with
//!   `QueryPassword`/`Secret`.
//! - the reply carries `UserName`/`Secret` only for queried fields.
//!
//! A refresh replaces parameters and reopens the dialog (captcha reload).

use serde_json::Value;
use tracing::debug;

use super::{Control, Job};
use crate::params::{self, Parameters, keys};
use crate::toolkit::{DialogForm, DialogOutcome, FormField, ToolkitError};

pub const DEFAULT_TITLE: &str = "Enter your credentials";

/// Text for `QueryMessageId` values.
#[must_use]
pub fn message_for_id(id: u32) -> Option<&'static str> {
    match id {
        1 => Some("Enter your credentials to login"),
        2 => Some("Previous authentication attempt failed. Please try again."),
        _ => None,
    }
}

#[must_use]
pub fn build_form(parameters: &Parameters) -> DialogForm {
    let title = params::get_str(parameters, keys::TITLE).unwrap_or(DEFAULT_TITLE).to_string();
    let caption = params::get_str(parameters, keys::CAPTION).map(str::to_owned);
    let message = params::get_str(parameters, keys::MESSAGE)
        .map(str::to_owned)
        .or_else(|| {
            params::get_u32(parameters, keys::MESSAGE_ID)
                .and_then(message_for_id)
                .map(str::to_owned)
        });

    DialogForm {
        title,
        caption,
        message,
        username: field(parameters, keys::QUERY_USERNAME, keys::USERNAME),
        password: field(parameters, keys::QUERY_PASSWORD, keys::PASSWORD),
    }
}

fn field(parameters: &Parameters, query_key: &str, value_key: &str) -> FormField {
    let queried = params::get_bool(parameters, query_key);
    let preset = params::get_str(parameters, value_key);
    FormField {
        visible: queried || preset.is_some(),
        editable: queried,
        value: preset.unwrap_or_default().to_string(),
    }
}

#[must_use]
pub fn build_reply(form: &DialogForm, username: String, password: String) -> Parameters {
    let mut reply = Parameters::new();
    if form.username.editable {
        reply.insert(keys::USERNAME.into(), Value::String(username));
    }
    if form.password.editable {
        reply.insert(keys::PASSWORD.into(), Value::String(password));
    }
    reply
}

enum Step {
    Closed(Result<DialogOutcome, ToolkitError>),
    Control(Option<Control>),
}

pub(super) async fn run(job: Job) {
    let Job { mut parameters, placement, context, mut control, completer, .. } = job;

    loop {
        let form = build_form(&parameters);
        let step = tokio::select! {
            outcome = context.toolkit.run_dialog(&form, placement) => Step::Closed(outcome),
            msg = control.recv() => Step::Control(msg),
        };

        match step {
            Step::Closed(Ok(DialogOutcome::Accepted { username, password })) => {
                completer.set_result(build_reply(&form, username, password));
                return;
            }
            Step::Closed(Ok(DialogOutcome::Rejected)) => {
                completer.set_canceled();
                return;
            }
            Step::Closed(Err(e)) => {
                completer.fail(e.into());
                return;
            }
            Step::Control(Some(Control::Refresh(update))) => {
                debug!(keys = update.len(), "dialog: refreshing");
                parameters.extend(update);
            }
            Step::Control(Some(Control::Cancel) | None) => {
                completer.set_canceled();
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "dialog_test.rs"]
mod tests;
