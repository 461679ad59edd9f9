//! Request gate: authenticates task requests and dispatches rounds.
//!
//! Every outcome is an in-payload [`GateResponse`]; nothing raised by a round
//! (errors or panics) escapes to the server.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::pipeline::{Pipeline, PipelineError};
use crate::task::{Round, TaskRequest};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Invalid secret")]
    Unauthorized,

    #[error("Invalid round")]
    InvalidRound,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Round aborted unexpectedly: {0}")]
    Panicked(String),
}

/// Body returned for every task request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum GateResponse {
    Message { message: String },
    Error { error: String },
}

impl GateResponse {
    pub fn started(round: Round) -> Self {
        GateResponse::Message {
            message: format!("Round {} started", round),
        }
    }

    pub fn error(err: &GateError) -> Self {
        GateResponse::Error {
            error: err.to_string(),
        }
    }
}

/// Compare secrets without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    if a_bytes.len() != b_bytes.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for i in 0..a_bytes.len() {
        diff |= a_bytes[i] ^ b_bytes[i];
    }
    diff == 0
}

/// Authenticate, validate and run one round.
///
/// Checks happen in order: secret, round number, request shape. No round
/// stage runs unless all three pass.
pub async fn dispatch(
    pipeline: &Pipeline,
    expected_secret: &str,
    body: Value,
) -> Result<Round, GateError> {
    let secret = body.get("secret").and_then(Value::as_str).unwrap_or("");
    if expected_secret.is_empty() || !constant_time_eq(secret, expected_secret) {
        return Err(GateError::Unauthorized);
    }

    let round = body
        .get("round")
        .and_then(Value::as_i64)
        .and_then(Round::from_number)
        .ok_or(GateError::InvalidRound)?;

    let request: TaskRequest =
        serde_json::from_value(body).map_err(|e| GateError::InvalidRequest(e.to_string()))?;

    let outcome = AssertUnwindSafe(pipeline.run_round(&request, round))
        .catch_unwind()
        .await;

    match outcome {
        Ok(result) => {
            let report = result?;
            tracing::info!(
                task = %request.task,
                round = %round,
                repo = %report.artifact.name,
                state = %report.state,
                "Round finished"
            );
            Ok(round)
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(GateError::Panicked(reason))
        }
    }
}

/// [`dispatch`], folded into the response payload.
pub async fn handle(pipeline: &Pipeline, expected_secret: &str, body: Value) -> GateResponse {
    match dispatch(pipeline, expected_secret, body).await {
        Ok(round) => GateResponse::started(round),
        Err(err) => {
            tracing::warn!(error = %err, "Task request rejected or failed");
            GateResponse::error(&err)
        }
    }
}
