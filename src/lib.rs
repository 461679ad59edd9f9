//! # pagesmith
//!
//! Turns a coding brief into a published static site.
//!
//! This library provides:
//! - An HTTP gate that authenticates task requests and dispatches rounds
//! - A code generation client backed by an OpenAI-compatible chat endpoint
//! - A GitHub publisher (repository, contents API, Pages)
//! - An evaluator notifier with bounded exponential backoff
//!
//! ## Round Flow
//!
//! ```text
//!   POST /handle_task
//!          │  secret check, round dispatch
//!          ▼
//!   ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//!   │  generator   │───▶│  publisher   │───▶│   notifier   │
//!   │ (LLM oracle) │    │   (GitHub)   │    │ (evaluator)  │
//!   └──────────────┘    └──────────────┘    └──────────────┘
//!          ▲
//!   attachments (data URIs)
//! ```
//!
//! ## Modules
//! - `api`: HTTP routes and the request gate
//! - `pipeline`: round state machine and artifact naming
//! - `generator`: prompt construction and reply parsing
//! - `attachments`: data-URI decoding
//! - `publish`: artifact host trait and the GitHub implementation
//! - `notify`: evaluator notification with retry
//! - `task`: request and file types

pub mod api;
pub mod attachments;
pub mod config;
pub mod generator;
pub mod llm;
pub mod notify;
pub mod pipeline;
pub mod publish;
pub mod task;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use pipeline::Pipeline;
