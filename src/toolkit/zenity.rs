//! External dialog program toolkit (`zenity --forms`).
//!
//! The credentials form is rendered by spawning the dialog program and
//! parsing its stdout. Exit status 0 is acceptance, 1 is rejection (Cancel
//! button or window closed). Web views are not supported.

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::{DialogForm, DialogOutcome, Placement, Toolkit, ToolkitError, WebView, WebViewSpec};

/// Field separator requested from the dialog program.
const SEPARATOR: char = '\u{1f}';

pub struct ZenityToolkit {
    program: String,
}

impl ZenityToolkit {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait::async_trait]
impl Toolkit for ZenityToolkit {
    async fn run_dialog(&self, form: &DialogForm, placement: Placement) -> Result<DialogOutcome, ToolkitError> {
        let args = dialog_args(form, placement);
        debug!(program = %self.program, ?placement, "zenity: opening dialog");
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ToolkitError::Launch { program: self.program.clone(), source })?;

        match output.status.code() {
            Some(0) => Ok(parse_output(form, &String::from_utf8_lossy(&output.stdout))),
            Some(1) => Ok(DialogOutcome::Rejected),
            _ => Err(ToolkitError::Abnormal(output.status.to_string())),
        }
    }

    fn open_web_view(&self, _spec: &WebViewSpec) -> Result<WebView, ToolkitError> {
        Err(ToolkitError::Unsupported("a web view"))
    }
}

/// Command-line arguments for `form`.
pub(crate) fn dialog_args(form: &DialogForm, placement: Placement) -> Vec<String> {
    let mut args = vec!["--forms".to_string(), format!("--title={}", form.title), format!("--separator={SEPARATOR}")];

    let mut text: Vec<&str> = Vec::new();
    if let Some(caption) = &form.caption {
        text.push(caption);
    }
    if let Some(message) = &form.message {
        text.push(message);
    }
    let fixed_user;
    if form.username.visible && !form.username.editable {
        fixed_user = format!("Username: {}", form.username.value);
        text.push(&fixed_user);
    }
    if !text.is_empty() {
        args.push(format!("--text={}", text.join("\n")));
    }

    if form.username.visible && form.username.editable {
        args.push("--add-entry=Username".to_string());
    }
    if form.password.visible && form.password.editable {
        args.push("--add-password=Password".to_string());
    }

    match placement {
        Placement::TopLevel => {}
        Placement::Transient(wid) | Placement::Embedded(wid) => {
            args.push("--modal".to_string());
            args.push(format!("--attach={wid}"));
        }
    }
    args
}

/// Map the program's output back onto the form's editable fields. Fields
/// that were not editable keep their preset value.
pub(crate) fn parse_output(form: &DialogForm, stdout: &str) -> DialogOutcome {
    let mut fields = stdout.trim_end_matches('\n').split(SEPARATOR);
    let mut next_for = |field: &super::FormField| {
        if field.visible && field.editable {
            fields.next().unwrap_or_default().to_string()
        } else {
            field.value.clone()
        }
    };
    let username = next_for(&form.username);
    let password = next_for(&form.password);
    DialogOutcome::Accepted { username, password }
}

#[cfg(test)]
#[path = "zenity_test.rs"]
mod tests;
