//! Chat streaming and document extraction tests against an in-process
//! gateway.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use secrecy::SecretString;
use serde_json::json;

use lakechat::chat::ChatClient;
use lakechat::config::{DEFAULT_MODEL, ExtractorConfig, GatewayConfig};
use lakechat::error::{ChatError, ExtractError};
use lakechat::extract::DocumentExtractor;

/// Requests the mock gateway has accepted, for post-hoc assertions.
#[derive(Clone, Default)]
struct Recorded {
    requests: Arc<Mutex<Vec<serde_json::Value>>>,
    auth: Arc<Mutex<Option<String>>>,
}

impl Recorded {
    fn push(&self, headers: &HeaderMap, request: serde_json::Value) {
        *self.auth.lock().unwrap() = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.requests.lock().unwrap().push(request);
    }

    fn request(&self, index: usize) -> serde_json::Value {
        self.requests.lock().unwrap()[index].clone()
    }
}

fn sse_body(lines: &[&str]) -> String {
    let mut body = String::new();
    for line in lines {
        body.push_str("data: ");
        body.push_str(line);
        body.push_str("\n\n");
    }
    body
}

fn sse_response(lines: &[&str]) -> Response {
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        sse_body(lines),
    )
        .into_response()
}

async fn stream_reply(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    Json(request): Json<serde_json::Value>,
) -> Response {
    recorded.push(&headers, request);
    sse_response(&[
        r#"{"choices":[{"delta":{"content":"Hello"}}]}"#,
        r#"{"choices":[{"delta":{"content":" from"}}]}"#,
        r#"{"choices":[{"delta":{"content":" the lake"}}]}"#,
        r#"{"choices":[],"usage":{"prompt_tokens":9,"completion_tokens":3}}"#,
        "[DONE]",
    ])
}

async fn garbled_stream_reply() -> Response {
    sse_response(&[
        r#"{"choices":[{"delta":{"content":"Answer: "}}]}"#,
        r#"{"choices": [{"delta""#,
        "[DONE]",
    ])
}

async fn rate_limited_reply() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({"error": {"message": "Too many tokens, please wait before trying again."}})),
    )
        .into_response()
}

async fn blocking_reply(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    Json(request): Json<serde_json::Value>,
) -> Response {
    recorded.push(&headers, request);
    Json(json!({
        "choices": [{"message": {"role": "assistant", "content": "Hi there\n"}}],
        "usage": {"prompt_tokens": 3, "completion_tokens": 4}
    }))
    .into_response()
}

#[derive(Clone)]
struct Flaky {
    calls: Arc<AtomicU32>,
}

async fn flaky_stream_reply(State(flaky): State<Flaky>) -> Response {
    let call = flaky.calls.fetch_add(1, Ordering::SeqCst);
    if call < 2 {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": {"message": "temporarily overloaded"}})),
        )
            .into_response();
    }
    sse_response(&[r#"{"choices":[{"delta":{"content":"Recovered."}}]}"#, "[DONE]"])
}

async fn echo_document(mut multipart: Multipart) -> Response {
    let mut file_name = String::new();
    let mut size = 0;
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() == Some("file") {
            file_name = field.file_name().unwrap_or_default().to_string();
            size = field.bytes().await.unwrap().len();
        }
    }
    Json(json!({"text": format!("{size} bytes from {file_name}")})).into_response()
}

async fn reject_document(_multipart: Multipart) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({"error": {"message": "unsupported format"}})),
    )
        .into_response()
}

async fn start_service(app: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr: SocketAddr = listener.local_addr().expect("listener addr");
    let base_url = format!("http://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve test server");
    });

    (base_url, handle)
}

fn chat_client(base_url: String, retry_attempts: u32) -> ChatClient {
    ChatClient::new(GatewayConfig {
        base_url,
        api_key: SecretString::from("test-key"),
        model: DEFAULT_MODEL.to_string(),
        request_timeout: Duration::from_secs(5),
        retry_attempts,
    })
}

fn extractor(base_url: String) -> DocumentExtractor {
    DocumentExtractor::new(ExtractorConfig {
        base_url,
        request_timeout: Duration::from_secs(5),
    })
}

#[tokio::test]
async fn streamed_reply_is_accumulated_in_order() {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/chat/completions", post(stream_reply))
        .with_state(recorded.clone());
    let (base_url, _server) = start_service(app).await;
    let client = chat_client(base_url, 1);

    let reply = client.send("hi").await.expect("chat should succeed");

    assert_eq!(reply.content, "Hello from the lake");
    assert_eq!(reply.usage.expect("usage chunk").total(), 12);

    let request = recorded.request(0);
    assert_eq!(request["model"], DEFAULT_MODEL);
    assert_eq!(request["messages"][0]["content"], "hi");
    assert_eq!(request["stream"], true);
    assert_eq!(request["max_tokens"], 1000);
    assert_eq!(request["user"], client.session_id().to_string());
    assert_eq!(
        recorded.auth.lock().unwrap().as_deref(),
        Some("Bearer test-key")
    );
}

#[tokio::test]
async fn malformed_chunk_becomes_placeholder_text() {
    let app = Router::new().route("/chat/completions", post(garbled_stream_reply));
    let (base_url, _server) = start_service(app).await;
    let client = chat_client(base_url, 1);

    let reply = client.send("hi").await.expect("stream should still finish");

    assert_eq!(reply.content, "Answer: Error while processing the response!");
}

#[tokio::test]
async fn rate_limited_reply_surfaces_the_gateway_message() {
    let app = Router::new().route("/chat/completions", post(rate_limited_reply));
    let (base_url, _server) = start_service(app).await;
    let client = chat_client(base_url, 1);

    let err = client.send("hi").await.expect_err("gateway should refuse");
    match &err {
        ChatError::RateLimited { message } => {
            assert_eq!(message, "Too many tokens, please wait before trying again.");
        }
        other => panic!("expected rate limit error, got: {other:?}"),
    }
    assert_eq!(
        err.transcript_message(),
        "Too many tokens, please wait before trying again."
    );
}

#[tokio::test]
async fn overloaded_gateway_is_retried_until_it_recovers() {
    let flaky = Flaky {
        calls: Arc::new(AtomicU32::new(0)),
    };
    let app = Router::new()
        .route("/chat/completions", post(flaky_stream_reply))
        .with_state(flaky.clone());
    let (base_url, _server) = start_service(app).await;
    let client = chat_client(base_url, 3);

    let reply = client.send("hi").await.expect("retries should recover");

    assert_eq!(reply.content, "Recovered.");
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn blocking_completion_parses_a_single_body() {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/chat/completions", post(blocking_reply))
        .with_state(recorded.clone());
    let (base_url, _server) = start_service(app).await;
    let client = chat_client(base_url, 1);

    let reply = client.complete("hi").await.expect("completion should succeed");

    assert_eq!(reply.content, "Hi there");
    assert_eq!(reply.usage.expect("usage").total(), 7);
    let request = recorded.request(0);
    assert_eq!(request["stream"], false);
    assert!(request.get("stream_options").is_none());
}

#[tokio::test]
async fn attached_document_rides_along_with_the_message() {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/chat/completions", post(stream_reply))
        .with_state(recorded.clone());
    let (base_url, _server) = start_service(app).await;
    let client = chat_client(base_url, 1);

    client.attach_document("LAKE FACTS").await;
    client.send("What is a lake?").await.expect("chat should succeed");

    let content = recorded.request(0)["messages"][0]["content"]
        .as_str()
        .expect("string content")
        .to_string();
    assert!(content.starts_with("What is a lake?"), "content: {content}");
    assert!(
        content.contains("<document>LAKE FACTS</document>"),
        "content: {content}"
    );

    client.clear_document().await;
    client.send("And now?").await.expect("chat should succeed");
    assert_eq!(recorded.request(1)["messages"][0]["content"], "And now?");
}

#[tokio::test]
async fn session_identity_is_stable_across_requests() {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/chat/completions", post(stream_reply))
        .with_state(recorded.clone());
    let (base_url, _server) = start_service(app).await;
    let client = chat_client(base_url, 1);

    client.send("first").await.expect("chat should succeed");
    client.send("second").await.expect("chat should succeed");

    let first = recorded.request(0)["user"].clone();
    let second = recorded.request(1)["user"].clone();
    assert_eq!(first, second);
    assert_eq!(first, client.session_id().to_string());
}

#[tokio::test]
async fn extraction_round_trips_document_bytes() {
    let app = Router::new().route("/extract", post(echo_document));
    let (base_url, _server) = start_service(app).await;
    let extractor = extractor(base_url);

    let text = extractor
        .extract_bytes(b"PDFDATA".to_vec(), "notes.pdf")
        .await
        .expect("extraction should succeed");

    assert_eq!(text, "7 bytes from notes.pdf");
}

#[tokio::test]
async fn extraction_service_error_is_surfaced() {
    let app = Router::new().route("/extract", post(reject_document));
    let (base_url, _server) = start_service(app).await;
    let extractor = extractor(base_url);

    let err = extractor
        .extract_bytes(b"not a document".to_vec(), "junk.bin")
        .await
        .expect_err("service should refuse");
    match err {
        ExtractError::Service { message } => assert_eq!(message, "unsupported format"),
        other => panic!("expected service error, got: {other:?}"),
    }
}

#[tokio::test]
async fn extract_file_reads_from_disk() {
    let app = Router::new().route("/extract", post(echo_document));
    let (base_url, _server) = start_service(app).await;
    let extractor = extractor(base_url);

    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(b"hello extraction").expect("write");
    file.flush().expect("flush");

    let text = extractor
        .extract_file(file.path())
        .await
        .expect("extraction should succeed");

    assert!(text.starts_with("16 bytes from "), "text: {text}");
}
