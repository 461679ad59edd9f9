//! HTTP front door.
//!
//! - `POST /handle_task` accepts a task request and runs one round
//! - `GET /api/health` reports liveness

pub mod gate;
mod routes;

pub use gate::{GateError, GateResponse};
pub use routes::{router, serve, AppState};
