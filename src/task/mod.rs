//! Task module - inbound requests and the files a round publishes.
//!
//! - `TaskRequest` is consumed once per round and never persisted
//! - `FileSet` is the ordered path -> content mapping handed to the publisher

mod files;
mod request;

pub use files::{File, FileContent, FileSet};
pub use request::{Attachment, Round, TaskRequest};
