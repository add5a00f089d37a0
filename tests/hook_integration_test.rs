use rask_sentry_hook::stacktrace::{StacktraceConfig, TracedError};
use rask_sentry_hook::transport::{COMPRESSED_CONTENT_TYPE, JSON_CONTENT_TYPE, decode_payload};
use rask_sentry_hook::{FieldValue, HookError, LogEntry, LogLevel, Packet, SentryHook};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header_exists, method, path},
};

const STORE_PATH: &str = "/sentry/api/project-id/store/";

#[derive(Debug, thiserror::Error)]
#[error("error message")]
struct TestError;

async fn start_sentry(status: u16) -> (MockServer, String) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STORE_PATH))
        .and(header_exists("x-sentry-auth"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    let dsn = format!("http://public:secret@{}/sentry/project-id", server.address());
    (server, dsn)
}

fn hook_for(dsn: &str) -> SentryHook {
    SentryHook::new(dsn, &[LogLevel::Error]).unwrap()
}

async fn fire(hook: Arc<SentryHook>, entry: LogEntry) -> Result<(), HookError> {
    tokio::task::spawn_blocking(move || hook.fire(&entry))
        .await
        .unwrap()
}

async fn received(server: &MockServer) -> Vec<(String, Vec<u8>)> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .map(|request| {
            let content_type = request
                .headers
                .get("content-type")
                .unwrap()
                .to_str()
                .unwrap()
                .to_string();
            (content_type, request.body)
        })
        .collect()
}

async fn received_packets(server: &MockServer) -> Vec<Packet> {
    received(server)
        .await
        .iter()
        .map(|(content_type, body)| decode_payload(body, content_type).unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_special_fields() {
    let (server, dsn) = start_sentry(200).await;
    let hook = Arc::new(hook_for(&dsn));

    let request = http::Request::builder()
        .method("GET")
        .uri("http://example.com/Test/")
        .body(())
        .unwrap();
    let entry = LogEntry::new(LogLevel::Error, "error message")
        .with_field("server_name", "testserver.internal")
        .with_field("logger", "test.logger")
        .with_field("http_request", &request);
    fire(hook, entry).await.unwrap();

    let packets = received_packets(&server).await;
    assert_eq!(packets.len(), 1);
    let packet = &packets[0];
    assert_eq!(packet.server_name, "testserver.internal");
    assert_eq!(packet.logger, "test.logger");
    let request = packet.request.as_ref().unwrap();
    assert_eq!(request.url, "http://example.com/Test/");
    assert_eq!(request.method, "GET");
    assert!(packet.extra.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_message_and_level() {
    let (server, dsn) = start_sentry(200).await;
    let hook = Arc::new(hook_for(&dsn));

    fire(hook, LogEntry::new(LogLevel::Error, "error message"))
        .await
        .unwrap();

    let packets = received_packets(&server).await;
    assert_eq!(packets[0].message, "error message");
    assert_eq!(packets[0].level, "error");
    assert_eq!(packets[0].platform, "rust");
    assert_eq!(packets[0].logger, "root");
    assert_eq!(packets[0].event_id.len(), 32);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_culprit_from_error() {
    let (server, dsn) = start_sentry(200).await;
    let hook = Arc::new(hook_for(&dsn));

    fire(
        hook,
        LogEntry::new(LogLevel::Error, "error message").with_error(TestError),
    )
    .await
    .unwrap();

    let packets = received_packets(&server).await;
    assert_eq!(packets[0].culprit, "error message");
    assert!(packets[0].exception.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tags_are_sent_as_pairs() {
    let (server, dsn) = start_sentry(200).await;
    let hook = SentryHook::with_tags(&dsn, [("site", "test")], &[LogLevel::Error]).unwrap();

    fire(Arc::new(hook), LogEntry::new(LogLevel::Error, "error message"))
        .await
        .unwrap();

    let requests = received(&server).await;
    assert_eq!(requests[0].0, JSON_CONTENT_TYPE);
    let body: Value = serde_json::from_slice(&requests[0].1).unwrap();
    assert_eq!(body["tags"], json!([["site", "test"]]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_entry_tags_override_static_tags() {
    let (server, dsn) = start_sentry(200).await;
    let hook = SentryHook::with_tags(&dsn, [("site", "test"), ("region", "us")], &[
        LogLevel::Error,
    ])
    .unwrap();

    let entry = LogEntry::new(LogLevel::Error, "error message")
        .with_field("tags", FieldValue::tags([("site", "override")]));
    fire(Arc::new(hook), entry).await.unwrap();

    let packets = received_packets(&server).await;
    assert_eq!(packets[0].tag("site"), Some("override"));
    assert_eq!(packets[0].tag("region"), Some("us"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fingerprint() {
    let (server, dsn) = start_sentry(200).await;
    let hook = Arc::new(hook_for(&dsn));

    let entry = LogEntry::new(LogLevel::Error, "error message")
        .with_field("fingerprint", vec!["fingerprint"]);
    fire(hook, entry).await.unwrap();

    let packets = received_packets(&server).await;
    assert_eq!(packets[0].fingerprint, vec!["fingerprint".to_string()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_error_handler_invoked_on_http_error() {
    let (_server, dsn) = start_sentry(400).await;
    let hook = hook_for(&dsn);

    let calls = Arc::new(AtomicUsize::new(0));
    for _ in 0..2 {
        let calls = Arc::clone(&calls);
        hook.add_error_handler(move |entry, err| {
            assert_eq!(entry.message, "error message");
            assert!(err.to_string().contains("got http status 400"));
            calls.fetch_add(1, Ordering::SeqCst);
        });
    }

    let err = fire(
        Arc::new(hook),
        LogEntry::new(LogLevel::Error, "error message"),
    )
    .await
    .unwrap_err();

    assert_eq!(err.http_status(), Some(400));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_async_hook_reports_through_handlers() {
    let (_server, dsn) = start_sentry(503).await;
    let hook = SentryHook::new_async(&dsn, &[LogLevel::Error]).unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    hook.add_error_handler(move |entry, err| {
        let _ = tx.send((entry.message.clone(), err.http_status()));
    });

    fire(Arc::new(hook), LogEntry::new(LogLevel::Error, "queued"))
        .await
        .unwrap();

    let reported = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reported, ("queued".to_string(), Some(503)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_large_packet_is_compressed() {
    let (server, dsn) = start_sentry(200).await;
    let hook = Arc::new(hook_for(&dsn));

    let entry = LogEntry::new(LogLevel::Error, "error message").with_field("blob", "x".repeat(4096));
    fire(hook, entry).await.unwrap();

    let requests = received(&server).await;
    let (content_type, body) = &requests[0];
    assert_eq!(content_type, COMPRESSED_CONTENT_TYPE);
    let packet = decode_payload(body, content_type).unwrap();
    assert_eq!(packet.extra["blob"], Value::String("x".repeat(4096)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_traced_error_exception() {
    let (server, dsn) = start_sentry(200).await;
    let hook = hook_for(&dsn);
    hook.set_stacktrace_config(StacktraceConfig {
        enable: true,
        ..Default::default()
    });

    let entry =
        LogEntry::new(LogLevel::Error, "error message").with_error(TracedError::new(TestError));
    fire(Arc::new(hook), entry).await.unwrap();

    let packets = received_packets(&server).await;
    let exception = packets[0].exception.as_ref().unwrap();
    assert_eq!(exception.value, "error message");
    assert_eq!(exception.ty, "TestError");
    assert!(packets[0].stacktrace.is_some());
}
