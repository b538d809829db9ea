use super::*;

#[tokio::test]
async fn binds_and_creates_parent_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("run").join("authui.sock");

    let _listener = bind(&path).await.expect("bind");
    assert!(path.exists());
}

#[tokio::test]
async fn live_daemon_is_not_replaced() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("authui.sock");
    let _first = bind(&path).await.expect("first bind");

    let err = bind(&path).await.expect_err("second bind must fail");
    assert!(matches!(err, SocketError::AlreadyRunning(p) if p == path));
}

#[tokio::test]
async fn stale_socket_file_is_replaced() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("authui.sock");
    drop(bind(&path).await.expect("first bind"));
    assert!(path.exists(), "dropping a listener leaves the file behind");

    let listener = bind(&path).await.expect("rebind over stale file");
    let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });
    UnixStream::connect(&path).await.expect("connect");
    accept.await.expect("join").expect("accept");
}

#[tokio::test]
async fn remove_deletes_file_and_tolerates_absence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("authui.sock");
    let _listener = bind(&path).await.expect("bind");

    remove(&path);
    assert!(!path.exists());
    remove(&path);
}
