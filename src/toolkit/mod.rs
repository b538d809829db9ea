//! Toolkit seam: how requests put UI on screen.
//!
//! DESIGN
//! ======
//! Request variants describe *what* to show (a [`DialogForm`], a
//! [`WebViewSpec`]) and *where* ([`Placement`]); a [`Toolkit`] implementation
//! renders it. The daemon binary ships [`zenity::ZenityToolkit`], which
//! drives an external dialog program and has no web view. Tests use
//! scripted toolkits.

pub mod zenity;

use std::path::PathBuf;

use tokio::sync::mpsc;
use url::Url;

use crate::frame::ErrorCode;

// =============================================================================
// PLACEMENT
// =============================================================================

/// Where a request's UI goes relative to the caller's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// No caller window: standalone top-level window.
    TopLevel,
    /// Modal dialog transient for the caller window.
    Transient(u32),
    /// Embedded into the caller window.
    Embedded(u32),
}

impl Placement {
    #[must_use]
    pub fn for_window(window_id: u32, embedded: bool) -> Self {
        match (window_id, embedded) {
            (0, _) => Self::TopLevel,
            (wid, true) => Self::Embedded(wid),
            (wid, false) => Self::Transient(wid),
        }
    }
}

// =============================================================================
// DIALOG
// =============================================================================

/// One text field of the credentials form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormField {
    pub visible: bool,
    pub editable: bool,
    pub value: String,
}

/// Fully-resolved credentials form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogForm {
    pub title: String,
    pub caption: Option<String>,
    pub message: Option<String>,
    pub username: FormField,
    pub password: FormField,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogOutcome {
    Accepted { username: String, password: String },
    Rejected,
}

// =============================================================================
// WEB VIEW
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebViewSpec {
    pub title: String,
    pub url: Url,
    pub placement: Placement,
    /// Persistent cookie storage for this identity.
    pub cookie_jar: PathBuf,
}

/// Events a web view reports back to its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebEvent {
    UrlChanged(Url),
    LoadStarted,
    LoadFinished { ok: bool },
    /// Username/password captured from a login form.
    Credentials { username: String, password: String },
    /// The user or the view itself closed the window.
    Closed,
}

/// Commands a request sends to its web view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebCommand {
    Navigate(Url),
    /// Replace the page with the toolkit's "loading failed" view.
    ShowLoadFailed,
    Close,
}

/// A live web view: event stream in, command stream out.
pub struct WebView {
    pub events: mpsc::Receiver<WebEvent>,
    pub commands: mpsc::Sender<WebCommand>,
}

// =============================================================================
// TRAIT
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ToolkitError {
    #[error("toolkit cannot show {0}")]
    Unsupported(&'static str),
    #[error("failed to launch {program}: {source}")]
    Launch { program: String, source: std::io::Error },
    #[error("dialog exited abnormally: {0}")]
    Abnormal(String),
}

impl ErrorCode for ToolkitError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Unsupported(_) | Self::Launch { .. } => "E_TOOLKIT_UNAVAILABLE",
            Self::Abnormal(_) => "E_INTERNAL",
        }
    }
}

#[async_trait::async_trait]
pub trait Toolkit: Send + Sync {
    /// Show the form and wait for the user. Dropping the future must take
    /// the dialog down.
    async fn run_dialog(&self, form: &DialogForm, placement: Placement) -> Result<DialogOutcome, ToolkitError>;

    /// Open a web view. The view stays up until it reports `Closed` or
    /// receives `WebCommand::Close`.
    fn open_web_view(&self, spec: &WebViewSpec) -> Result<WebView, ToolkitError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
