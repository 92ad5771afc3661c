use std::net::SocketAddr;
use std::time::Duration;

use iai_anthropic_model::{AnthropicConfigBuilder, AnthropicProvider};
use iai_model::{
    ErrorKind, ModelMessage, ModelProvider, ModelProviderError, ModelRequest,
    StopReason, Usage,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const MESSAGE_BODY: &str = r#"{
  "id": "msg_1",
  "type": "message",
  "role": "assistant",
  "content": [{ "type": "text", "text": "AIMEE is a demo project." }],
  "stop_reason": "end_turn",
  "usage": { "input_tokens": 12, "output_tokens": 7 }
}"#;

fn http_response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut resp = format!(
        "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n",
        body.len()
    );
    for (name, value) in headers {
        resp.push_str(&format!("{name}: {value}\r\n"));
    }
    resp.push_str("\r\n");
    resp.push_str(body);
    resp
}

/// Reads one HTTP request, headers and body, and returns it as text.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let read = socket.read(&mut chunk).await.unwrap();
        if read == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..read]);

        let text = String::from_utf8_lossy(&buf);
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let content_length = text[..header_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= header_end + 4 + content_length {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Serves a single canned response on a local port.
async fn serve_once(response: String) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request
    });
    (addr, handle)
}

fn provider(addr: SocketAddr) -> AnthropicProvider {
    let config = AnthropicConfigBuilder::with_api_key("test-key")
        .with_base_url(format!("http://{addr}/v1/"))
        .with_model("claude-test")
        .build();
    AnthropicProvider::new(config)
}

fn request() -> ModelRequest {
    ModelRequest {
        max_tokens: None,
        system: Some("You are Ignition AI.".to_owned()),
        messages: vec![ModelMessage::user_text("What is aimee?")],
        tools: vec![],
    }
}

#[tokio::test]
async fn test_successful_response() {
    let response = http_response(
        "200 OK",
        &[("content-type", "application/json")],
        MESSAGE_BODY,
    );
    let (addr, server) = serve_once(response).await;

    let resp = provider(addr).send_request(&request()).await.unwrap();
    assert_eq!(resp.text(), "AIMEE is a demo project.");
    assert_eq!(resp.stop_reason, Some(StopReason::EndTurn));
    assert_eq!(resp.usage, Usage::new(12, 7));

    let sent = server.await.unwrap();
    assert!(sent.starts_with("POST /v1/messages HTTP/1.1\r\n"), "{sent}");
    let sent_lower = sent.to_lowercase();
    assert!(sent_lower.contains("x-api-key: test-key\r\n"));
    assert!(sent_lower.contains("anthropic-version: 2023-06-01\r\n"));
    assert!(sent.contains(r#""model":"claude-test""#));
    assert!(sent.contains(r#""max_tokens":4096"#));
    assert!(sent.contains(r#""system":"You are Ignition AI.""#));
}

#[tokio::test]
async fn test_unexpected_content_type() {
    let response = http_response(
        "200 OK",
        &[("content-type", "text/plain")],
        MESSAGE_BODY,
    );
    let (addr, _server) = serve_once(response).await;

    let err = provider(addr).send_request(&request()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    assert!(err.message().contains("content type"), "{}", err.message());
}

#[tokio::test]
async fn test_undecodable_body() {
    let response = http_response(
        "200 OK",
        &[("content-type", "application/json; charset=utf-8")],
        r#"{"content": "not a list"}"#,
    );
    let (addr, _server) = serve_once(response).await;

    let err = provider(addr).send_request(&request()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    assert!(err.message().starts_with("Failed to parse response"));
}

#[tokio::test]
async fn test_rate_limited_with_retry_after() {
    let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#;
    let response = http_response(
        "429 Too Many Requests",
        &[("content-type", "application/json"), ("retry-after", "2")],
        body,
    );
    let (addr, _server) = serve_once(response).await;

    let err = provider(addr).send_request(&request()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    assert_eq!(err.message(), "HTTP 429: rate_limit_error: slow down");
}

#[tokio::test]
async fn test_server_error_is_transport() {
    let response = http_response("503 Service Unavailable", &[], "overloaded");
    let (addr, _server) = serve_once(response).await;

    let err = provider(addr).send_request(&request()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.retry_after(), None);
    assert_eq!(err.message(), "HTTP 503: overloaded");
}

#[tokio::test]
async fn test_connection_refused_is_transport() {
    // The port is released once the listener is dropped.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let err = provider(addr).send_request(&request()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(err.kind().is_retryable());
}
