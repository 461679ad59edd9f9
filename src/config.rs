//! Process configuration.
//!
//! Read once from the environment at startup, then shared as `Arc<Config>`.
//! Components take what they need in their constructors; nothing below `main`
//! touches the environment.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::notify::RetryPolicy;

const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_GITHUB_WEB_URL: &str = "https://github.com";
const DEFAULT_PAGES_DOMAIN: &str = "github.io";
const DEFAULT_LLM_API_URL: &str = "https://aipipe.org/openai/v1/chat/completions";
const DEFAULT_LLM_MODEL: &str = "gpt-3.5-turbo";

/// Settings for the artifact host.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub token: String,
    /// Namespace repositories are created under.
    pub owner: String,
    pub api_url: String,
    pub web_url: String,
    pub pages_domain: String,
}

/// Settings for the code generation oracle.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    /// Full chat-completions endpoint URL.
    pub api_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u64,
}

/// Immutable process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Expected shared secret on inbound task requests.
    pub secret: String,
    pub github: GitHubConfig,
    pub llm: LlmConfig,
    /// Per-call timeout applied to every outbound HTTP client.
    pub http_timeout: Duration,
    pub notify_retry: RetryPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required: `GITHUB_TOKEN`, `GITHUB_OWNER`, `LLM_API_KEY`, `SECRET`
    /// (the legacy lowercase `secret` is accepted too).
    pub fn from_env() -> Result<Self> {
        let secret = required_any(&["SECRET", "secret"])?;

        let github = GitHubConfig {
            token: required("GITHUB_TOKEN")?,
            owner: required("GITHUB_OWNER")?,
            api_url: optional("GITHUB_API_URL", DEFAULT_GITHUB_API_URL),
            web_url: optional("GITHUB_WEB_URL", DEFAULT_GITHUB_WEB_URL),
            pages_domain: optional("GITHUB_PAGES_DOMAIN", DEFAULT_PAGES_DOMAIN),
        };

        let llm = LlmConfig {
            api_key: required("LLM_API_KEY")?,
            api_url: optional("LLM_API_URL", DEFAULT_LLM_API_URL),
            model: optional("LLM_MODEL", DEFAULT_LLM_MODEL),
            temperature: parsed("LLM_TEMPERATURE", 0.3)?,
            max_tokens: parsed("LLM_MAX_TOKENS", 3000)?,
        };

        let notify_retry = RetryPolicy {
            max_attempts: parsed("NOTIFY_MAX_ATTEMPTS", 5)?,
            initial_delay: Duration::from_millis(parsed("NOTIFY_INITIAL_DELAY_MS", 1000)?),
        };

        Ok(Self {
            host: optional("HOST", "0.0.0.0"),
            port: parsed("PORT", 8000)?,
            secret,
            github,
            llm,
            http_timeout: Duration::from_secs(parsed("HTTP_TIMEOUT_SECS", 60)?),
            notify_retry,
        })
    }

    /// Build an HTTP client with the configured timeout.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.http_timeout)
            .user_agent(concat!("pagesmith/", env!("CARGO_PKG_VERSION")))
            .build()
    }
}

fn required(key: &str) -> Result<String> {
    let value = std::env::var(key).with_context(|| format!("{} must be set", key))?;
    if value.trim().is_empty() {
        anyhow::bail!("{} must not be empty", key);
    }
    Ok(value)
}

/// First non-blank value among `keys`, in order.
fn required_any(keys: &[&str]) -> Result<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty())
        .with_context(|| format!("{} must be set", keys.join(" or ")))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        _ => Ok(default),
    }
}
