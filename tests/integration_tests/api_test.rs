//! HTTP surface tests: REST views and the gated routes

use std::io;
use std::sync::{Arc, Mutex};

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use scavenger::coordinator::{CommandTable, CoordinatorConfig, CoordinatorServer};
use serde_json::Value;
use tower::ServiceExt;

use super::fixtures;

fn app() -> Router {
    CoordinatorServer::with_commands(fixtures::config(), CommandTable::builtin()).build_router()
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

/// In-memory sink for formatted log output
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (status, body) = get(app(), "/api/health").await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["status"], "healthy");
    assert_eq!(json["data"]["solved"], false);
}

#[tokio::test]
async fn test_unknown_route() {
    let (status, _) = get(app(), "/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Stats
// ============================================================================

#[tokio::test]
async fn test_stats_endpoint_reflects_router() {
    let server = CoordinatorServer::with_commands(fixtures::config(), CommandTable::builtin());
    let router = server.state().router;
    let _worker = fixtures::worker(&router).await;
    let _observer = fixtures::observer(&router).await;

    let (status, body) = get(server.build_router(), "/api/stats?token=correct-horse").await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["data"]["observers"], 1);
    assert_eq!(json["data"]["workers"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"]["cursor"], fixtures::RANGE_SIZE);
    assert!(json["data"]["uptimeSecs"].is_u64());
    assert!(json["data"]["solution"].is_null());
}

#[tokio::test]
async fn test_stats_without_token_is_rejected() {
    let server = CoordinatorServer::with_commands(fixtures::config(), CommandTable::builtin());
    let _worker = fixtures::worker(&server.state().router).await;

    let (status, body) = get(server.build_router(), "/api/stats").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let text = String::from_utf8_lossy(&body);
    assert!(!text.contains("127.0.0.1"));
    assert!(!text.contains("workers"));
}

// ============================================================================
// Gate
// ============================================================================

#[tokio::test]
async fn test_socket_without_token_is_rejected() {
    let (status, body) = get(app(), "/ws").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Connection did not present a token");
    assert!(!String::from_utf8_lossy(&body).contains("correct-horse"));
}

#[tokio::test]
async fn test_socket_with_wrong_token_is_rejected() {
    let (status, body) = get(app(), "/ws?token=battery-staple").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "Connection presented an invalid token");
}

#[tokio::test]
async fn test_unreadable_query_is_rejected_like_a_missing_token() {
    for uri in ["/ws?token=a&token=b", "/api/stats?token=a&token=b"] {
        let (status, _) = get(app(), uri).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

#[tokio::test]
async fn test_socket_with_token_passes_gate() {
    // Not a real upgrade request, so the handler refuses it, but not with 401
    let (status, _) = get(app(), "/ws?token=correct-horse").await;
    assert_ne!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Request Logging
// ============================================================================

#[tokio::test]
async fn test_request_log_omits_token() {
    let config = CoordinatorConfig::builder()
        .shared_secret("correct-horse")
        .bind_address_str("127.0.0.1:0")
        .unwrap()
        .enable_request_logging(true)
        .build()
        .unwrap();
    let app = CoordinatorServer::with_commands(config, CommandTable::builtin()).build_router();

    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    get(app.clone(), "/ws?token=correct-horse").await;
    get(app.clone(), "/ws?token=wrong-horse").await;
    get(app, "/api/stats?token=correct-horse").await;

    let output = logs.contents();
    assert!(output.contains("path=/ws"), "request span missing: {}", output);
    assert!(output.contains("path=/api/stats"));
    assert!(!output.contains("correct-horse"));
    assert!(!output.contains("wrong-horse"));
    assert!(!output.contains("token="));
}
