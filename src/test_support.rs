//! In-process stand-ins for the oracle, GitHub and the evaluator.
//!
//! One axum server plays all three roles and records every call so tests can
//! assert on what was sent and in which order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::config::{Config, GitHubConfig, LlmConfig};
use crate::notify::RetryPolicy;
use crate::task::TaskRequest;

pub const COMMIT_SHA: &str = "0123456789abcdef0123456789abcdef01234567";

/// A recorded contents-API write.
#[derive(Debug, Clone)]
pub struct Upload {
    pub repo: String,
    pub path: String,
    pub message: String,
    pub content: String,
    pub sha: Option<String>,
}

impl Upload {
    pub fn decoded(&self) -> Vec<u8> {
        STANDARD.decode(&self.content).unwrap()
    }
}

/// Scripted responses plus everything the server has seen.
#[derive(Debug)]
pub struct MockState {
    pub llm_reply: String,
    pub llm_status: u16,
    pub create_status: u16,
    pub put_status: u16,
    pub pages_status: u16,
    /// Statuses for successive notification attempts; `notify_default` once drained.
    pub notify_statuses: VecDeque<u16>,
    pub notify_default: u16,
    pub existing_repos: HashSet<String>,
    /// path -> blob sha
    pub existing_files: HashMap<String, String>,

    pub calls: Vec<String>,
    pub chat_requests: Vec<Value>,
    pub chat_auth: Option<String>,
    pub github_auth: Option<String>,
    pub create_requests: Vec<Value>,
    pub created_repos: Vec<String>,
    pub uploads: Vec<Upload>,
    pub notifications: Vec<Value>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            llm_reply: "[]".to_string(),
            llm_status: 200,
            create_status: 201,
            put_status: 201,
            pages_status: 201,
            notify_statuses: VecDeque::new(),
            notify_default: 200,
            existing_repos: HashSet::new(),
            existing_files: HashMap::new(),
            calls: Vec::new(),
            chat_requests: Vec::new(),
            chat_auth: None,
            github_auth: None,
            create_requests: Vec::new(),
            created_repos: Vec::new(),
            uploads: Vec::new(),
            notifications: Vec::new(),
        }
    }
}

type Shared = Arc<Mutex<MockState>>;

pub struct MockServer {
    pub base_url: String,
    pub state: Shared,
}

impl MockServer {
    pub async fn start(state: MockState) -> Self {
        let state: Shared = Arc::new(Mutex::new(state));
        let app = Router::new()
            .route("/chat/completions", post(chat))
            .route("/user/repos", post(create_repo))
            .route("/repos/:owner/:repo", get(get_repo))
            .route("/repos/:owner/:repo/pages", post(enable_pages))
            .route("/repos/:owner/:repo/commits/:branch", get(get_commit))
            .route(
                "/repos/:owner/:repo/contents/*path",
                get(get_contents).put(put_contents),
            )
            .route("/notify", post(notify))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap()
}

fn auth_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn chat(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut s = state.lock().await;
    s.calls.push("chat".into());
    s.chat_auth = auth_header(&headers);
    s.chat_requests.push(body);

    if s.llm_status != 200 {
        return (status(s.llm_status), Json(json!({"error": "upstream error"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "model": "mock-model",
            "choices": [{
                "message": {"role": "assistant", "content": s.llm_reply},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
        })),
    )
}

async fn create_repo(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut s = state.lock().await;
    s.calls.push("create_repo".into());
    s.github_auth = auth_header(&headers);
    let name = body["name"].as_str().unwrap_or_default().to_string();
    s.create_requests.push(body);

    if s.create_status != 201 {
        return (
            status(s.create_status),
            Json(json!({
                "message": "Repository creation failed.",
                "errors": [{"message": "name already exists on this account"}]
            })),
        );
    }
    s.existing_repos.insert(name.clone());
    s.created_repos.push(name.clone());
    (StatusCode::CREATED, Json(json!({"name": name})))
}

async fn get_repo(
    State(state): State<Shared>,
    Path((_owner, repo)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    let mut s = state.lock().await;
    s.calls.push("get_repo".into());
    if s.existing_repos.contains(&repo) {
        (StatusCode::OK, Json(json!({"name": repo})))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"})))
    }
}

async fn get_contents(
    State(state): State<Shared>,
    Path((_owner, _repo, path)): Path<(String, String, String)>,
) -> (StatusCode, Json<Value>) {
    let mut s = state.lock().await;
    s.calls.push("get_contents".into());
    match s.existing_files.get(&path) {
        Some(sha) => (StatusCode::OK, Json(json!({"path": path, "sha": sha}))),
        None => (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))),
    }
}

async fn put_contents(
    State(state): State<Shared>,
    Path((_owner, repo, path)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut s = state.lock().await;
    s.calls.push("put_contents".into());
    s.uploads.push(Upload {
        repo,
        path: path.clone(),
        message: body["message"].as_str().unwrap_or_default().to_string(),
        content: body["content"].as_str().unwrap_or_default().to_string(),
        sha: body["sha"].as_str().map(str::to_string),
    });

    if s.put_status != 200 && s.put_status != 201 {
        return (
            status(s.put_status),
            Json(json!({"message": "Invalid request."})),
        );
    }
    let sha = format!("blob-{}", s.uploads.len());
    s.existing_files.insert(path, sha.clone());
    (status(s.put_status), Json(json!({"content": {"sha": sha}})))
}

async fn enable_pages(State(state): State<Shared>) -> (StatusCode, Json<Value>) {
    let mut s = state.lock().await;
    s.calls.push("enable_pages".into());
    (status(s.pages_status), Json(json!({"status": "queued"})))
}

async fn get_commit(State(state): State<Shared>) -> (StatusCode, Json<Value>) {
    let mut s = state.lock().await;
    s.calls.push("get_commit".into());
    (StatusCode::OK, Json(json!({"sha": COMMIT_SHA})))
}

async fn notify(State(state): State<Shared>, Json(body): Json<Value>) -> StatusCode {
    let mut s = state.lock().await;
    s.calls.push("notify".into());
    s.notifications.push(body);
    let code = s.notify_statuses.pop_front().unwrap_or(s.notify_default);
    status(code)
}

/// Configuration pointing every collaborator at `base_url`.
pub fn test_config(base_url: &str) -> Config {
    Config {
        host: "127.0.0.1".into(),
        port: 0,
        secret: "S".into(),
        github: GitHubConfig {
            token: "test-token".into(),
            owner: "TestOwner".into(),
            api_url: base_url.to_string(),
            web_url: "https://github.com".into(),
            pages_domain: "github.io".into(),
        },
        llm: LlmConfig {
            api_key: "test-key".into(),
            api_url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: "test-model".into(),
            temperature: 0.3,
            max_tokens: 3000,
        },
        http_timeout: Duration::from_secs(10),
        notify_retry: RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
        },
    }
}

/// The minimal round request used across tests.
pub fn test_request(server: &MockServer, round: i64) -> TaskRequest {
    TaskRequest {
        email: "student@example.com".into(),
        secret: "S".into(),
        task: "t".into(),
        round,
        nonce: "n".into(),
        brief: "b".into(),
        checks: Vec::new(),
        evaluation_url: server.url("/notify"),
        attachments: Vec::new(),
    }
}
