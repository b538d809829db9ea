use super::*;
use crate::request::{Completion, Reply, Request, RequestKind};
use crate::state::test_helpers::{ScriptedToolkit, WebCall, params, recv, test_context};
use crate::toolkit::zenity::ZenityToolkit;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

fn url(raw: &str) -> Url {
    Url::parse(raw).expect("url")
}

fn session(value: serde_json::Value) -> WebSession {
    let parameters = params(value);
    let client_data = params::get_map(&parameters, keys::CLIENT_DATA).cloned().unwrap_or_default();
    WebSession::new(&parameters, &client_data)
}

// =============================================================================
// SESSION
// =============================================================================

#[test]
fn title_rules() {
    assert_eq!(title(&params(json!({"Title": "Sign in"}))), "Sign in");
    assert_eq!(title(&params(json!({"Caption": "Example"}))), "Web authentication for Example");
    assert_eq!(title(&params(json!({"Caption": ""}))), "Web authentication");
    assert_eq!(title(&Parameters::new()), "Web authentication");
}

#[test]
fn final_url_matches_host_and_path_only() {
    let s = session(json!({"FinalUrl": "https://example.com/callback"}));
    assert!(s.is_final(&url("https://example.com/callback?code=abc#x")));
    assert!(!s.is_final(&url("https://example.com/callback/more")));
    assert!(!s.is_final(&url("https://evil.com/callback")));

    let no_final = session(json!({}));
    assert!(!no_final.is_final(&url("https://example.com/callback")));
}

#[test]
fn final_url_reached_finishes_with_response() {
    let mut s = session(json!({"FinalUrl": "http://localhost/done"}));
    assert_eq!(s.handle(&WebEvent::UrlChanged(url("https://login.example.com/"))), SessionStep::DisarmFailTimer);
    assert_eq!(s.handle(&WebEvent::UrlChanged(url("http://localhost/done?token=t"))), SessionStep::Finished);
    assert_eq!(s.reply()[keys::URL_RESPONSE], json!("http://localhost/done?token=t"));
}

#[test]
fn disallowed_scheme_is_ignored() {
    let mut s = session(json!({}));
    s.handle(&WebEvent::UrlChanged(url("https://example.com/a")));
    assert_eq!(s.handle(&WebEvent::UrlChanged(url("http://example.com/b"))), SessionStep::Continue);
    assert_eq!(s.handle(&WebEvent::Closed), SessionStep::Finished);
    assert_eq!(s.reply()[keys::URL_RESPONSE], json!("https://example.com/a"));
}

#[test]
fn allowed_schemes_come_from_client_data() {
    let s = session(json!({"ClientData": {"AllowedSchemes": ["https", "http"]}}));
    assert!(s.scheme_allowed(&url("http://example.com")));
    assert!(!s.scheme_allowed(&url("ftp://example.com")));
}

#[test]
fn load_events_drive_fail_timer() {
    let mut s = session(json!({}));
    assert_eq!(s.handle(&WebEvent::LoadFinished { ok: false }), SessionStep::ArmFailTimer);
    assert_eq!(s.handle(&WebEvent::LoadStarted), SessionStep::DisarmFailTimer);
    assert_eq!(s.handle(&WebEvent::LoadFinished { ok: true }), SessionStep::Continue);
}

#[test]
fn captured_credentials_are_replied() {
    let mut s = session(json!({}));
    s.handle(&WebEvent::Credentials { username: "alice".into(), password: "pw".into() });
    let reply = s.reply();
    assert_eq!(reply[keys::USERNAME], json!("alice"));
    assert_eq!(reply[keys::PASSWORD], json!("pw"));
    assert!(!reply.contains_key(keys::URL_RESPONSE));
}

// =============================================================================
// DRIVER
// =============================================================================

struct Running {
    request: Request,
    reply: oneshot::Receiver<Reply>,
    events: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    _cache: tempfile::TempDir,
}

fn start_browser(toolkit: Arc<dyn crate::toolkit::Toolkit>, value: serde_json::Value) -> Running {
    let cache = tempfile::tempdir().expect("tempdir");
    let (reply_tx, reply) = oneshot::channel();
    let (events, completions) = mpsc::unbounded_channel();
    let mut request =
        Request::new(1, RequestKind::Browser, params(value), reply_tx, test_context(toolkit, cache.path()));
    request.start(&events);
    Running { request, reply, events, completions, _cache: cache }
}

async fn open_view(web_rx: &mut mpsc::UnboundedReceiver<WebCall>) -> WebCall {
    recv(web_rx).await
}

#[tokio::test]
async fn final_url_completes_and_closes_view() {
    let (toolkit, _dialogs, mut web_rx) = ScriptedToolkit::new();
    let mut running = start_browser(
        toolkit,
        json!({"OpenUrl": "https://login.example.com/", "FinalUrl": "https://app.example.com/cb", "Identity": 3}),
    );

    let mut view = open_view(&mut web_rx).await;
    assert_eq!(view.spec.url.as_str(), "https://login.example.com/");
    assert!(view.spec.cookie_jar.ends_with("cookies/3.jar"));

    view.events.send(WebEvent::UrlChanged(url("https://app.example.com/cb?code=1"))).await.expect("send");

    let result = running.reply.await.expect("reply").expect("result");
    assert_eq!(result[keys::URL_RESPONSE], json!("https://app.example.com/cb?code=1"));
    assert_eq!(view.commands.recv().await, Some(WebCommand::Close));
    assert_eq!(recv(&mut running.completions).await, Completion { key: 1, window_id: 0 });
}

#[tokio::test(start_paused = true)]
async fn load_failure_shows_error_page_until_closed() {
    let (toolkit, _dialogs, mut web_rx) = ScriptedToolkit::new();
    let mut running = start_browser(toolkit, json!({"OpenUrl": "https://login.example.com/"}));

    let mut view = open_view(&mut web_rx).await;
    view.events.send(WebEvent::UrlChanged(url("https://login.example.com/"))).await.expect("send");
    view.events.send(WebEvent::LoadFinished { ok: false }).await.expect("send");

    let started = tokio::time::Instant::now();
    assert_eq!(view.commands.recv().await, Some(WebCommand::ShowLoadFailed));
    assert!(started.elapsed() >= FAIL_TIMEOUT - Duration::from_millis(1));
    assert!(running.reply.try_recv().is_err(), "request must stay open on the error page");

    view.events.send(WebEvent::Closed).await.expect("send");
    let result = running.reply.await.expect("reply").expect("result");
    assert_eq!(result[keys::URL_RESPONSE], json!("https://login.example.com/"));
    assert_eq!(recv(&mut running.completions).await, Completion { key: 1, window_id: 0 });
}

#[tokio::test(start_paused = true)]
async fn cancel_on_error_page_replies_canceled() {
    let (toolkit, _dialogs, mut web_rx) = ScriptedToolkit::new();
    let mut running = start_browser(toolkit, json!({"OpenUrl": "https://login.example.com/"}));

    let mut view = open_view(&mut web_rx).await;
    view.events.send(WebEvent::LoadFinished { ok: false }).await.expect("send");
    assert_eq!(view.commands.recv().await, Some(WebCommand::ShowLoadFailed));

    running.request.cancel(&running.events);
    let result = running.reply.await.expect("reply").expect("result");
    assert_eq!(params::result_error(&result), Some(params::QueryError::Canceled));
    assert_eq!(view.commands.recv().await, Some(WebCommand::Close));
}

#[tokio::test]
async fn closing_view_replies_with_last_url() {
    let (toolkit, _dialogs, mut web_rx) = ScriptedToolkit::new();
    let running = start_browser(toolkit, json!({"OpenUrl": "https://login.example.com/"}));

    let view = open_view(&mut web_rx).await;
    view.events.send(WebEvent::LoadFinished { ok: false }).await.expect("send");
    view.events.send(WebEvent::LoadStarted).await.expect("send");
    view.events.send(WebEvent::UrlChanged(url("https://login.example.com/step2"))).await.expect("send");
    view.events.send(WebEvent::Closed).await.expect("send");

    let result = running.reply.await.expect("reply").expect("result");
    assert_eq!(result[keys::URL_RESPONSE], json!("https://login.example.com/step2"));
}

#[tokio::test]
async fn cancel_closes_view_and_replies_canceled() {
    let (toolkit, _dialogs, mut web_rx) = ScriptedToolkit::new();
    let mut running = start_browser(toolkit, json!({"OpenUrl": "https://login.example.com/"}));

    let mut view = open_view(&mut web_rx).await;
    running.request.cancel(&running.events);

    let result = running.reply.await.expect("reply").expect("result");
    assert_eq!(params::result_error(&result), Some(params::QueryError::Canceled));
    assert_eq!(view.commands.recv().await, Some(WebCommand::Close));
}

#[tokio::test]
async fn refresh_navigates_view() {
    let (toolkit, _dialogs, mut web_rx) = ScriptedToolkit::new();
    let running = start_browser(toolkit, json!({"OpenUrl": "https://login.example.com/"}));

    let mut view = open_view(&mut web_rx).await;
    assert!(running.request.refresh(params(json!({"OpenUrl": "https://login.example.com/captcha"}))));
    assert_eq!(
        view.commands.recv().await,
        Some(WebCommand::Navigate(url("https://login.example.com/captcha")))
    );
}

#[tokio::test]
async fn toolkit_without_web_view_fails_request() {
    let running = start_browser(Arc::new(ZenityToolkit::new("zenity")), json!({"OpenUrl": "https://example.com/"}));
    let err = running.reply.await.expect("reply").expect_err("should fail");
    assert!(matches!(err, RequestError::Toolkit(_)));
}

#[tokio::test]
async fn invalid_open_url_is_bad_parameters() {
    let (toolkit, _dialogs, _web_rx) = ScriptedToolkit::new();
    let running = start_browser(toolkit, json!({"OpenUrl": "not a url"}));
    let err = running.reply.await.expect("reply").expect_err("should fail");
    assert!(matches!(err, RequestError::BadParameters(_)));
}
