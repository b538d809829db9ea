//! In-process web login variant.
//!
//! DESIGN
//! ======
//! [`WebSession`] is the pure state machine; `run` wires it to a toolkit
//! web view, the control channel, and the load-failure timer.
//!
//! - The login is over when the view reaches a URL whose host and path
//!   match `FinalUrl`, or when the view is closed.
//! - Navigation to a scheme outside `ClientData.AllowedSchemes` (default
//!   `https`) is ignored.
//! - A failed load arms a timer; a new load or URL change disarms it. On
//!   expiry the view switches to its load-failed page and stays open; the
//!   reply still waits for the view to close or the request to be canceled.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use super::{Control, Job, RequestError};
use crate::params::{self, Parameters, keys};
use crate::toolkit::{WebCommand, WebEvent, WebViewSpec};

pub const DEFAULT_TITLE: &str = "Web authentication";
pub const FAIL_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_ALLOWED_SCHEMES: &[&str] = &["https"];

/// Window title: `Title`, else derived from `Caption`.
#[must_use]
pub fn title(parameters: &Parameters) -> String {
    if let Some(title) = params::get_str(parameters, keys::TITLE) {
        return title.to_string();
    }
    match params::get_str(parameters, keys::CAPTION) {
        Some(caption) if !caption.is_empty() => format!("{DEFAULT_TITLE} for {caption}"),
        _ => DEFAULT_TITLE.to_string(),
    }
}

/// What the driver should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    Continue,
    Finished,
    ArmFailTimer,
    DisarmFailTimer,
}

#[derive(Debug, Clone)]
pub struct WebSession {
    final_url: Option<Url>,
    allowed_schemes: Vec<String>,
    current_url: Option<Url>,
    response_url: Option<Url>,
    username: Option<String>,
    password: Option<String>,
}

impl WebSession {
    #[must_use]
    pub fn new(parameters: &Parameters, client_data: &Parameters) -> Self {
        let final_url = params::get_str(parameters, keys::FINAL_URL).and_then(|raw| Url::parse(raw).ok());
        let allowed_schemes = params::get_str_list(client_data, keys::ALLOWED_SCHEMES)
            .unwrap_or_else(|| DEFAULT_ALLOWED_SCHEMES.iter().map(|s| (*s).to_string()).collect());
        Self { final_url, allowed_schemes, current_url: None, response_url: None, username: None, password: None }
    }

    /// Host and path equal to `FinalUrl`; query and fragment are free.
    #[must_use]
    pub fn is_final(&self, url: &Url) -> bool {
        self.final_url
            .as_ref()
            .is_some_and(|target| target.host_str() == url.host_str() && target.path() == url.path())
    }

    #[must_use]
    pub fn scheme_allowed(&self, url: &Url) -> bool {
        self.allowed_schemes.iter().any(|s| s == url.scheme())
    }

    pub fn handle(&mut self, event: &WebEvent) -> SessionStep {
        match event {
            WebEvent::UrlChanged(url) => {
                if self.is_final(url) {
                    debug!(%url, "browser: final url reached");
                    self.response_url = Some(url.clone());
                    return SessionStep::Finished;
                }
                if !self.scheme_allowed(url) {
                    warn!(scheme = url.scheme(), "browser: navigation to disallowed scheme ignored");
                    return SessionStep::Continue;
                }
                self.current_url = Some(url.clone());
                SessionStep::DisarmFailTimer
            }
            WebEvent::LoadStarted => SessionStep::DisarmFailTimer,
            WebEvent::LoadFinished { ok: false } => SessionStep::ArmFailTimer,
            WebEvent::LoadFinished { ok: true } => SessionStep::Continue,
            WebEvent::Credentials { username, password } => {
                self.username = Some(username.clone());
                self.password = Some(password.clone());
                SessionStep::Continue
            }
            WebEvent::Closed => SessionStep::Finished,
        }
    }

    /// `UrlResponse` (final URL if reached, else last URL) plus captured
    /// credentials.
    #[must_use]
    pub fn reply(&self) -> Parameters {
        let mut reply = Parameters::new();
        if let Some(url) = self.response_url.as_ref().or(self.current_url.as_ref()) {
            reply.insert(keys::URL_RESPONSE.into(), Value::String(url.to_string()));
        }
        if let Some(username) = &self.username {
            reply.insert(keys::USERNAME.into(), Value::String(username.clone()));
        }
        if let Some(password) = &self.password {
            reply.insert(keys::PASSWORD.into(), Value::String(password.clone()));
        }
        reply
    }
}

fn open_url(parameters: &Parameters) -> Option<Url> {
    params::get_str(parameters, keys::OPEN_URL).and_then(|raw| Url::parse(raw).ok())
}

pub(super) async fn run(job: Job) {
    let Job { parameters, client_data, placement, identity, context, mut control, completer } = job;

    let Some(url) = open_url(&parameters) else {
        completer.fail(RequestError::BadParameters("OpenUrl is not a valid URL".into()));
        return;
    };
    let spec =
        WebViewSpec { title: title(&parameters), url, placement, cookie_jar: context.identities.cookie_jar(identity) };
    let mut view = match context.toolkit.open_web_view(&spec) {
        Ok(view) => view,
        Err(e) => {
            completer.fail(e.into());
            return;
        }
    };

    let mut session = WebSession::new(&parameters, &client_data);
    let fail_timer = tokio::time::sleep(FAIL_TIMEOUT);
    tokio::pin!(fail_timer);
    let mut timer_armed = false;

    loop {
        tokio::select! {
            event = view.events.recv() => {
                let event = event.unwrap_or(WebEvent::Closed);
                match session.handle(&event) {
                    SessionStep::Finished => {
                        if event != WebEvent::Closed {
                            let _ = view.commands.try_send(WebCommand::Close);
                        }
                        completer.set_result(session.reply());
                        return;
                    }
                    SessionStep::ArmFailTimer => {
                        fail_timer.as_mut().reset(Instant::now() + FAIL_TIMEOUT);
                        timer_armed = true;
                    }
                    SessionStep::DisarmFailTimer => timer_armed = false,
                    SessionStep::Continue => {}
                }
            }
            () = &mut fail_timer, if timer_armed => {
                warn!("browser: page failed to load");
                timer_armed = false;
                let _ = view.commands.try_send(WebCommand::ShowLoadFailed);
            }
            msg = control.recv() => match msg {
                Some(Control::Refresh(update)) => {
                    if let Some(url) = open_url(&update) {
                        debug!(%url, "browser: refreshing");
                        let _ = view.commands.try_send(WebCommand::Navigate(url));
                    }
                }
                Some(Control::Cancel) | None => {
                    let _ = view.commands.try_send(WebCommand::Close);
                    completer.set_canceled();
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
#[path = "browser_test.rs"]
mod tests;
