//! Code generation: turns a task and brief into a set of files via the LLM.
//!
//! The oracle is asked for a strict JSON array of `{name, content}` objects.
//! Replies wrapped in a fenced code block are unwrapped before parsing.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::llm::{ChatMessage, ChatOptions, LlmClient, LlmError};
use crate::task::File;

const SYSTEM_PROMPT: &str = "You are a professional coding assistant that writes complete and \
runnable code. Always return valid JSON as output: a JSON array of objects with \"name\" and \
\"content\" string fields, and nothing else.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("LLM request failed: {0}")]
    Llm(#[from] LlmError),

    #[error("LLM reply was empty")]
    EmptyReply,

    #[error("Failed to parse LLM response: {source}; reply: {reply}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
        reply: String,
    },

    #[error("LLM response is not a JSON array: {reply}")]
    NotAnArray { reply: String },

    #[error("LLM response entry {index} is invalid: {reason}")]
    InvalidEntry { index: usize, reason: String },
}

/// Client for the code generation oracle.
pub struct CodeGenerator {
    llm: Arc<dyn LlmClient>,
    model: String,
    options: ChatOptions,
}

impl CodeGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, config: &LlmConfig) -> Self {
        Self {
            llm,
            model: config.model.clone(),
            options: ChatOptions {
                temperature: Some(config.temperature),
                max_tokens: Some(config.max_tokens),
            },
        }
    }

    /// Ask the oracle for a complete artifact. Not retried.
    pub async fn generate(
        &self,
        task: &str,
        brief: &str,
        checks: &[String],
    ) -> Result<Vec<File>, GenerationError> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_user_prompt(task, brief, checks)),
        ];

        let response = self
            .llm
            .chat_completion(&self.model, &messages, self.options.clone())
            .await?;

        if is_truncated(response.finish_reason.as_deref()) {
            tracing::warn!(
                task = %task,
                model = response.model.as_deref().unwrap_or(&self.model),
                "LLM reply hit the token limit; output may be truncated"
            );
        }

        let text = response.content.unwrap_or_default();
        if text.trim().is_empty() {
            return Err(GenerationError::EmptyReply);
        }

        let files = parse_files(&text)?;
        tracing::info!(task = %task, files = files.len(), "Code generated");
        Ok(files)
    }
}

/// Whether the provider stopped because it ran out of output tokens.
fn is_truncated(finish_reason: Option<&str>) -> bool {
    finish_reason == Some("length")
}

/// Build the user instruction embedding the task, brief and checks.
pub fn build_user_prompt(task: &str, brief: &str, checks: &[String]) -> String {
    let mut prompt = format!(
        "You are building code for the following project.\n\n\
         ### Task\n{task}\n\n\
         ### Brief\n{brief}\n\n"
    );

    if !checks.is_empty() {
        prompt.push_str("### Acceptance checks\n");
        for check in checks {
            prompt.push_str("- ");
            prompt.push_str(check);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "### Rules\n\
         1. Write fully functional code. Do NOT return an empty stub.\n\
         2. Include imports, functions, and logic that run end-to-end.\n\
         3. Use standard libraries and well-known packages only.\n\
         4. Files can include index.html, app.js, style.css, or README.md depending on the task.\n\
         5. Return your output strictly as JSON in this format:\n\n\
         [\n  {\"name\": \"index.html\", \"content\": \"<entire code here>\"},\n  \
         {\"name\": \"README.md\", \"content\": \"<documentation here>\"}\n]\n\n\
         Do not include any explanations, markdown formatting, or extra text outside the JSON.\n",
    );
    prompt
}

fn opening_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"^```[A-Za-z0-9_+-]*[ \t]*\r?\n?").expect("valid fence regex")
    })
}

/// Remove a surrounding fenced code block (with optional language tag).
///
/// The body runs to the last closing fence; anything after it is dropped.
/// An unterminated fence keeps everything after the opening line.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(opening) = opening_fence().find(trimmed) else {
        return trimmed;
    };
    let body = &trimmed[opening.end()..];
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Parse an oracle reply into files.
pub fn parse_files(reply: &str) -> Result<Vec<File>, GenerationError> {
    let inner = strip_code_fence(reply);
    let value: Value = serde_json::from_str(inner).map_err(|source| GenerationError::InvalidJson {
        source,
        reply: inner.to_string(),
    })?;

    let Value::Array(entries) = value else {
        return Err(GenerationError::NotAnArray {
            reply: inner.to_string(),
        });
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| parse_entry(index, entry))
        .collect()
}

fn parse_entry(index: usize, entry: Value) -> Result<File, GenerationError> {
    let invalid = |reason: &str| GenerationError::InvalidEntry {
        index,
        reason: reason.to_string(),
    };

    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| invalid("missing \"name\""))?
        .to_string();

    let content = match entry.get("content") {
        Some(Value::String(s)) => s.clone(),
        // Models sometimes inline JSON files (package.json, manifest.json) as objects.
        Some(other @ (Value::Object(_) | Value::Array(_))) => {
            serde_json::to_string_pretty(other).map_err(|e| invalid(&e.to_string()))?
        }
        Some(_) => return Err(invalid("\"content\" must be a string")),
        None => return Err(invalid("missing \"content\"")),
    };

    Ok(File::text(name, content))
}
