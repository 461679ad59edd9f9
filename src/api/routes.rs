//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::pipeline::Pipeline;

use super::gate::{self, GateResponse};

/// Shared application state.
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Pipeline,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/handle_task", post(handle_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Arc<Config>) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(&config)?;
    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        pipeline,
    });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, finishing in-flight rounds");
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /handle_task - run a round and report the outcome in the body.
///
/// Always answers 200; a body that is not JSON is reported in-payload too.
async fn handle_task(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Json<GateResponse> {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return Json(GateResponse::Error {
                error: format!("Invalid request: {}", rejection.body_text()),
            });
        }
    };

    Json(gate::handle(&state.pipeline, &state.config.secret, body).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_config, test_request, MockServer, MockState};

    async fn spawn_app(server: &MockServer) -> String {
        let config = Arc::new(test_config(&server.base_url));
        let state = Arc::new(AppState {
            pipeline: Pipeline::from_config(&config).unwrap(),
            config,
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_end_to_end_round_one() {
        let server = MockServer::start(MockState {
            llm_reply: r#"[{"name":"index.html","content":"<h1>hi</h1>"}]"#.into(),
            ..MockState::default()
        })
        .await;
        let app = spawn_app(&server).await;

        let response = reqwest::Client::new()
            .post(format!("{}/handle_task", app))
            .json(&test_request(&server, 1))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, serde_json::json!({"message": "Round 1 started"}));

        let state = server.state.lock().await;
        assert_eq!(state.uploads.len(), 1);
        assert_eq!(state.uploads[0].path, "index.html");
        assert_eq!(state.uploads[0].decoded(), b"<h1>hi</h1>");
        assert_eq!(state.notifications.len(), 1);
        assert_eq!(state.notifications[0]["round"], 1);
        assert_eq!(state.notifications[0]["task"], "t");
        assert_eq!(state.notifications[0]["nonce"], "n");
    }

    #[tokio::test]
    async fn test_errors_are_reported_with_status_200() {
        let server = MockServer::start(MockState::default()).await;
        let app = spawn_app(&server).await;
        let client = reqwest::Client::new();

        let mut request = test_request(&server, 1);
        request.secret = "nope".into();
        let response = client
            .post(format!("{}/handle_task", app))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, serde_json::json!({"error": "Invalid secret"}));

        let response = client
            .post(format!("{}/handle_task", app))
            .header("Content-Type", "application/json")
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));
    }

    #[tokio::test]
    async fn test_health() {
        let server = MockServer::start(MockState::default()).await;
        let app = spawn_app(&server).await;

        let body: Value = reqwest::get(format!("{}/api/health", app))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }
}
