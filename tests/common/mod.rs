#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use visual_explain_lib::ai::openrouter::CompletionClient;
use visual_explain_lib::config::AppConfig;
use visual_explain_lib::session::CredentialStore;

pub const TEST_KEY: &str = "sk-or-test-key";
pub const TEST_IMAGE: &str = "data:image/png;base64,iVBORw0KGgo=";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub body: Value,
    pub authorization: Option<String>,
    pub referer: Option<String>,
    pub title: Option<String>,
}

impl RecordedRequest {
    pub fn model(&self) -> &str {
        self.body["model"].as_str().unwrap_or_default()
    }

    /// Text of the single user message, whether it was sent as a string or as parts.
    pub fn prompt_text(&self) -> String {
        let content = &self.body["messages"][0]["content"];
        match content {
            Value::String(s) => s.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }
}

struct Reply {
    status: u16,
    body: String,
    delay: Duration,
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    replies: Arc<Mutex<VecDeque<Reply>>>,
}

/// Scripted stand-in for the chat-completion endpoint. Replies are served in
/// the order they were queued; an unscripted call gets a 500.
pub struct MockUpstream {
    pub addr: SocketAddr,
    state: MockState,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock upstream");
        let addr = listener.local_addr().expect("mock upstream addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock upstream serve");
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}/v1/chat/completions", self.addr)
    }

    pub fn reply(&self, status: u16, body: impl Into<String>) -> &Self {
        self.reply_after(Duration::ZERO, status, body)
    }

    /// Records the request at once but holds the response for `delay`.
    pub fn reply_after(&self, delay: Duration, status: u16, body: impl Into<String>) -> &Self {
        self.state.replies.lock().push_back(Reply {
            status,
            body: body.into(),
            delay,
        });
        self
    }

    pub fn reply_text(&self, text: &str) -> &Self {
        self.reply(200, completion_body(text))
    }

    /// Resolves once at least `count` requests have arrived.
    pub async fn wait_for_requests(&self, count: usize) {
        while self.state.requests.lock().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn config(&self) -> AppConfig {
        AppConfig {
            api_url: self.url(),
            ..AppConfig::default()
        }
    }

    pub fn client(&self) -> CompletionClient {
        CompletionClient::new(&self.config())
    }
}

async fn completions(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.requests.lock().push(RecordedRequest {
        body,
        authorization: header("authorization"),
        referer: header("http-referer"),
        title: header("x-title"),
    });

    let reply = state.replies.lock().pop_front().unwrap_or(Reply {
        status: 500,
        body: "no scripted reply".to_string(),
        delay: Duration::ZERO,
    });
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    let status = StatusCode::from_u16(reply.status).expect("valid scripted status");
    (status, reply.body).into_response()
}

pub fn completion_body(text: &str) -> String {
    json!({
        "id": "gen-test",
        "choices": [
            { "message": { "role": "assistant", "content": text } }
        ]
    })
    .to_string()
}

pub fn credentials_with_key(key: &str) -> Arc<CredentialStore> {
    let store = CredentialStore::open_in_memory().expect("in-memory credential store");
    store.save(Some(key), None).expect("save key");
    Arc::new(store)
}

/// An address nothing is listening on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{}/v1/chat/completions", addr)
}
