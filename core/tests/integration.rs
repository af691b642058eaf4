//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives the full pipeline
//! (worker pool, `UreqTransport`, status policy, converters, completion
//! thread) over real HTTP. Each callback forwards its result through a
//! channel so the test thread can wait on it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use courier_core::error::Result;
use courier_core::{
    ApiError, Dispatcher, DispatcherBuilder, DispatcherConfig, Empty, Endpoint, HttpMethod, Request, Text,
    TransportConfig, TransportErrorKind, UreqTransport,
};
use serde::{Deserialize, Serialize};

const WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, PartialEq, Deserialize)]
struct User {
    id: i64,
    name: String,
}

#[derive(Serialize)]
struct NewUser {
    name: String,
}

fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
    });
    addr
}

fn setup() -> (Dispatcher, Endpoint) {
    let addr = start_server();
    let transport = UreqTransport::new(TransportConfig {
        timeout: Some(Duration::from_secs(5)),
        ..TransportConfig::default()
    });
    let dispatcher = Dispatcher::builder()
        .transport(transport)
        .build()
        .unwrap();
    (dispatcher, Endpoint::new(&format!("http://{addr}/")))
}

/// A completion callback plus the receiver that observes it.
fn expect<T: Send + 'static>() -> (impl FnOnce(Result<T>) + Send + 'static, mpsc::Receiver<Result<T>>) {
    let (tx, rx) = mpsc::channel();
    (move |result: Result<T>| tx.send(result).unwrap(), rx)
}

#[test]
fn get_decodes_seeded_user() {
    let (dispatcher, api) = setup();
    let (done, rx) = expect();
    dispatcher.send_json::<User, _, _>(api.get("/users/1"), done);

    let user = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(
        user,
        User {
            id: 1,
            name: "Ana".to_string()
        }
    );
}

#[test]
fn missing_user_is_a_status_error() {
    let (dispatcher, api) = setup();
    let (done, rx) = expect();
    dispatcher.send_json::<User, _, _>(api.get("/users/999"), done);

    let err = rx.recv_timeout(WAIT).unwrap().unwrap_err();
    assert_eq!(err.status_code(), Some(404));
}

#[test]
fn server_error_is_a_status_error() {
    let (dispatcher, api) = setup();
    let (done, rx) = expect();
    dispatcher.fetch::<String, _, _>(api.get("/status/503"), done);

    let err = rx.recv_timeout(WAIT).unwrap().unwrap_err();
    assert_eq!(err.status_code(), Some(503));
    assert_eq!(err.to_string(), "the server could not complete the request");
}

#[test]
fn redirect_is_followed_by_default() {
    let (dispatcher, api) = setup();
    let (done, rx) = expect();
    dispatcher.send_json::<User, _, _>(api.get("/redirect/1"), done);

    let user = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(user.id, 1);
}

#[test]
fn redirect_is_returned_when_not_following() {
    let (dispatcher, api) = setup();
    let (done, rx) = expect();
    dispatcher.fetch::<String, _, _>(api.get("/redirect/1").follow_redirects(false), done);

    // the 301 itself succeeds; its body is not the user
    let body = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert!(!body.contains("Ana"));
}

#[test]
fn no_content_converts_with_empty() {
    let (dispatcher, api) = setup();
    let (done, rx) = expect();
    dispatcher.send(api.get("/empty"), Empty, done);

    rx.recv_timeout(WAIT).unwrap().unwrap();
}

#[test]
fn invalid_utf8_fails_text_conversion() {
    let (dispatcher, api) = setup();
    let (done, rx) = expect();
    dispatcher.send(api.get("/invalid-utf8"), Text, done);

    let err = rx.recv_timeout(WAIT).unwrap().unwrap_err();
    assert!(matches!(err, ApiError::Conversion(_)));
}

#[test]
fn post_creates_user() {
    let (dispatcher, api) = setup();
    let (done, rx) = expect();
    let request = api.post(
        "/users",
        NewUser {
            name: "Bo".to_string(),
        },
    );
    dispatcher.send_json::<User, _, _>(request, done);

    let user = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(user.name, "Bo");
    assert!(user.id > 1);
}

#[test]
fn connection_refused_is_a_transport_error() {
    let addr = {
        // bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let dispatcher = Dispatcher::builder()
        .transport(UreqTransport::default())
        .build()
        .unwrap();
    let (done, rx) = expect();
    dispatcher.fetch::<Vec<u8>, _, _>(Request::get(format!("http://{addr}/users/1")), done);

    match rx.recv_timeout(WAIT).unwrap().unwrap_err() {
        ApiError::Transport(err) => assert_eq!(err.kind(), TransportErrorKind::Connection),
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[test]
fn download_replaces_existing_file_exactly() {
    let (dispatcher, api) = setup();

    let (done, rx) = expect();
    let upload = Request::new(HttpMethod::Put, api.url("/files/report.txt")).body(b"fresh".to_vec());
    dispatcher.fetch::<(), _, _>(upload, done);
    rx.recv_timeout(WAIT).unwrap().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("report.txt");
    std::fs::write(&destination, b"stale content that is much longer").unwrap();

    let (done, rx) = expect::<PathBuf>();
    dispatcher.download(api.get("/files/report.txt"), destination.clone(), false, done);

    let path = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(path, destination);
    assert_eq!(std::fs::read(&destination).unwrap(), b"fresh");
}

#[test]
fn failed_download_leaves_destination_alone() {
    let (dispatcher, api) = setup();
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("keep.txt");
    std::fs::write(&destination, b"keep me").unwrap();

    let (done, rx) = expect::<PathBuf>();
    dispatcher.download(api.get("/files/missing.txt"), destination.clone(), false, done);

    let err = rx.recv_timeout(WAIT).unwrap().unwrap_err();
    assert_eq!(err.status_code(), Some(404));
    assert_eq!(std::fs::read(&destination).unwrap(), b"keep me");
}

#[test]
fn archive_download_unzips_into_directory() {
    let (dispatcher, api) = setup();
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("bundle");

    let (done, rx) = expect::<PathBuf>();
    dispatcher.download(api.get("/archive"), destination.clone(), true, done);

    rx.recv_timeout(WAIT).unwrap().unwrap();
    for (name, data) in mock_server::ARCHIVE_ENTRIES {
        assert_eq!(std::fs::read(destination.join(name)).unwrap(), *data);
    }
}

#[test]
fn cancelled_request_reports_cancellation() {
    let (dispatcher, api) = setup();
    let (done, rx) = expect();
    let handle = dispatcher.fetch::<Vec<u8>, _, _>(api.get("/delay/1500"), done);
    std::thread::sleep(Duration::from_millis(100));
    handle.cancel();

    let err = rx.recv_timeout(WAIT).unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert!(handle.is_cancelled());
}

#[test]
fn concurrent_requests_each_complete_once() {
    let (dispatcher, api) = setup();
    let (tx, rx) = mpsc::channel();
    for _ in 0..16 {
        let tx = tx.clone();
        dispatcher.send_json::<User, _, _>(api.get("/users/1"), move |result| {
            tx.send(result.map(|user| user.id)).unwrap();
        });
    }
    drop(tx);

    let ids: Vec<i64> = rx.iter().map(|result| result.unwrap()).collect();
    assert_eq!(ids, vec![1; 16]);
}

#[test]
fn default_config_builds_a_working_dispatcher() {
    let addr = start_server();
    let dispatcher = DispatcherBuilder::new(DispatcherConfig::default())
        .build()
        .unwrap();
    let (done, rx) = expect();
    dispatcher.fetch::<String, _, _>(Request::get(format!("http://{addr}/users/1")), done);

    let body = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(body, r#"{"id":1,"name":"Ana"}"#);
}
