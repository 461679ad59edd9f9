//! Send a task request to a running gate and print the JSON reply.
//!
//! Usage: `send-task <request.json> [url]`
//! The URL defaults to `http://localhost:8000/handle_task`.

use anyhow::{Context, Result};
use serde_json::Value;

const DEFAULT_URL: &str = "http://localhost:8000/handle_task";

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .context("usage: send-task <request.json> [url]")?;
    let url = args.next().unwrap_or_else(|| DEFAULT_URL.to_string());

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path))?;
    let payload: Value =
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path))?;

    eprintln!("[send-task] POST {}", url);
    let response = reqwest::Client::new()
        .post(&url)
        .json(&payload)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?;

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<Value>(&text) {
        Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
        Err(e) => {
            eprintln!("[send-task] Failed to parse JSON response ({}): {}", status, e);
            println!("{}", text);
        }
    }

    Ok(())
}
