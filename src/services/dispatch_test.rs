use super::*;
use crate::state::test_helpers::{DialogCall, ScriptedToolkit, params, recv, test_context};
use crate::toolkit::DialogOutcome;
use serde_json::json;
use tokio::time::{Duration, timeout};

struct Running {
    handle: ServiceHandle,
    dialogs: mpsc::UnboundedReceiver<DialogCall>,
    cache: tempfile::TempDir,
}

fn start() -> Running {
    let cache = tempfile::tempdir().expect("tempdir");
    let (toolkit, dialogs, _web) = ScriptedToolkit::new();
    let (handle, _task) = spawn_service(test_context(toolkit, cache.path()), BrowserMode::Remote);
    Running { handle, dialogs, cache }
}

async fn wait_idle(rx: &mut watch::Receiver<bool>, expected: bool) {
    timeout(Duration::from_secs(2), rx.wait_for(|idle| *idle == expected))
        .await
        .expect("idle signal timed out")
        .expect("service stopped");
}

#[tokio::test]
async fn query_dialog_replies_when_user_accepts() {
    let mut s = start();
    let reply = s.handle.query_dialog(params(json!({"QueryPassword": true, "RequestId": "r1"})));

    let call = recv(&mut s.dialogs).await;
    call.respond
        .send(Ok(DialogOutcome::Accepted { username: String::new(), password: "secret".into() }))
        .expect("respond");

    let result = reply.await.expect("reply").expect("result");
    assert_eq!(result["Secret"], json!("secret"));
}

#[tokio::test]
async fn variant_wrappers_are_expanded_before_dispatch() {
    let mut s = start();
    let _reply = s.handle.query_dialog(params(json!({
        "QueryPassword": {"signature": "b", "value": true},
        "ClientData": {"signature": "a{sv}", "value": {"WindowId": {"signature": "u", "value": 17}}},
    })));

    let call = recv(&mut s.dialogs).await;
    assert!(call.form.password.visible);
    assert_eq!(call.placement, crate::toolkit::Placement::Transient(17));
}

#[tokio::test]
async fn idle_signal_tracks_queue_state() {
    let mut s = start();
    let mut idle = s.handle.idle_signal();
    assert!(*idle.borrow());

    let reply = s.handle.query_dialog(params(json!({"QueryPassword": true, "RequestId": "r1"})));
    wait_idle(&mut idle, false).await;

    let _call = recv(&mut s.dialogs).await;
    s.handle.cancel_ui_request("r1");
    let result = reply.await.expect("reply").expect("result");
    assert_eq!(params::result_error(&result), Some(QueryError::Canceled));
    wait_idle(&mut idle, true).await;
}

#[tokio::test]
async fn refresh_of_running_request_is_forwarded() {
    let mut s = start();
    let _reply = s.handle.query_dialog(params(json!({"QueryPassword": true, "RequestId": "r1"})));
    let _first = recv(&mut s.dialogs).await;

    let refreshed = s.handle.refresh_dialog(params(json!({"RequestId": "r1", "QueryMessageId": 2})));
    assert!(refreshed.await.expect("reply").expect("result").is_empty());

    let reopened = recv(&mut s.dialogs).await;
    assert!(reopened.form.message.is_some());
}

#[tokio::test]
async fn refresh_of_unknown_request_fails() {
    let s = start();
    let refreshed = s.handle.refresh_dialog(params(json!({"RequestId": "nope"})));
    let result = refreshed.await.expect("reply").expect("result");
    assert_eq!(params::result_error(&result), Some(QueryError::RefreshFailed));
}

#[tokio::test]
async fn remove_identity_data_deletes_cookies_and_helper_home() {
    let s = start();
    let store = IdentityStore::new(s.cache.path().to_path_buf());
    let jar = store.cookie_jar(6);
    std::fs::create_dir_all(jar.parent().expect("parent")).expect("mkdir");
    std::fs::write(&jar, b"cookie").expect("write");
    std::fs::create_dir_all(store.helper_home(6).join("profile")).expect("mkdir");

    s.handle.remove_identity_data(6).await.expect("remove");
    assert!(!jar.exists());
    assert!(!store.helper_home(6).exists());

    s.handle.remove_identity_data(6).await.expect("second remove is a no-op");
}

#[tokio::test]
async fn open_url_requests_use_configured_browser_mode() {
    let s = start();
    let reply = s.handle.query_dialog(params(json!({"OpenUrl": "https://example.com/"})));
    // Remote mode spawns the helper, which is `true` in tests and exits.
    let err = reply.await.expect("reply").expect_err("helper exits");
    assert!(matches!(err, crate::request::RequestError::Internal(_)));
}
