use std::fmt;

use serde::{Deserialize, Serialize};

/// An inbound task request.
///
/// `round` is kept raw here; the gate maps it to [`Round`] and rejects
/// anything other than 1 or 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub email: String,
    #[serde(default)]
    pub secret: String,
    pub task: String,
    pub round: i64,
    pub nonce: String,
    #[serde(default)]
    pub brief: String,
    /// Acceptance checks the evaluator will run.
    #[serde(default)]
    pub checks: Vec<String>,
    pub evaluation_url: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A named attachment carried inline as a data URI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    /// `data:<mime>;base64,<payload>`
    pub url: String,
}

/// Which round of a task is being fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Round {
    First,
    Second,
}

impl Round {
    pub fn from_number(n: i64) -> Option<Self> {
        match n {
            1 => Some(Self::First),
            2 => Some(Self::Second),
            _ => None,
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}
