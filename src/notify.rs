//! Evaluator notification with bounded exponential backoff.
//!
//! Delivery is best-effort: exhausting every attempt is logged and reported
//! in the [`DeliveryReport`], never returned as an error.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// Completion record posted to the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub email: String,
    pub task: String,
    pub round: u8,
    pub nonce: String,
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
}

/// Attempt budget and initial delay. The delay doubles after every failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(31)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Every attempt failed; holds the last failure.
    Exhausted { last_error: String },
}

/// What happened while delivering one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub outcome: DeliveryOutcome,
    pub attempts: u32,
    /// Waits taken between attempts, in order.
    pub delays: Vec<Duration>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> bool {
        self.outcome == DeliveryOutcome::Delivered
    }
}

/// Posts notification records to evaluator URLs.
pub struct Notifier {
    client: Client,
    policy: RetryPolicy,
}

impl Notifier {
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Deliver `record` to `url`. Only HTTP 200 counts as delivered.
    pub async fn send(&self, url: &str, record: &NotificationRecord) -> DeliveryReport {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut delays = Vec::new();
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            match self.client.post(url).json(record).send().await {
                Ok(response) if response.status() == StatusCode::OK => {
                    tracing::info!(
                        task = %record.task,
                        round = record.round,
                        attempt = attempt + 1,
                        "Evaluation notification delivered"
                    );
                    return DeliveryReport {
                        outcome: DeliveryOutcome::Delivered,
                        attempts: attempt + 1,
                        delays,
                    };
                }
                Ok(response) => {
                    last_error = format!("HTTP {}", response.status());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            tracing::warn!(
                task = %record.task,
                round = record.round,
                attempt = attempt + 1,
                error = %last_error,
                "Evaluation POST failed"
            );

            if attempt + 1 < max_attempts {
                let delay = self.policy.delay_for(attempt);
                tokio::time::sleep(delay).await;
                delays.push(delay);
            }
        }

        tracing::error!(
            task = %record.task,
            round = record.round,
            attempts = max_attempts,
            error = %last_error,
            "Evaluation notification exhausted all attempts"
        );

        DeliveryReport {
            outcome: DeliveryOutcome::Exhausted { last_error },
            attempts: max_attempts,
            delays,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockServer, MockState};

    fn record() -> NotificationRecord {
        NotificationRecord {
            email: "student@example.com".into(),
            task: "t".into(),
            round: 1,
            nonce: "n".into(),
            repo_url: "https://github.com/o/r".into(),
            commit_sha: "abc".into(),
            pages_url: "https://o.github.io/r/".into(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
        }
    }

    fn ms(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|v| Duration::from_millis(*v)).collect()
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..5).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[tokio::test]
    async fn test_succeeds_on_fifth_attempt() {
        let server = MockServer::start(MockState {
            notify_statuses: vec![500, 502, 503, 404].into(),
            ..MockState::default()
        })
        .await;
        let notifier = Notifier::new(Client::new(), fast_policy());

        let report = notifier.send(&server.url("/notify"), &record()).await;

        assert!(report.delivered());
        assert_eq!(report.attempts, 5);
        assert_eq!(report.delays, ms(&[1, 2, 4, 8]));
        let state = server.state.lock().await;
        assert_eq!(state.notifications.len(), 5);
        assert_eq!(state.notifications[4]["round"], 1);
        assert_eq!(state.notifications[4]["commit_sha"], "abc");
    }

    #[tokio::test]
    async fn test_always_failing_endpoint_exhausts_without_error() {
        let server = MockServer::start(MockState {
            notify_default: 500,
            ..MockState::default()
        })
        .await;
        let notifier = Notifier::new(Client::new(), fast_policy());

        let report = notifier.send(&server.url("/notify"), &record()).await;

        assert_eq!(report.attempts, 5);
        assert_eq!(report.delays, ms(&[1, 2, 4, 8]));
        assert_eq!(
            report.outcome,
            DeliveryOutcome::Exhausted {
                last_error: "HTTP 500 Internal Server Error".into()
            }
        );
        assert_eq!(server.state.lock().await.notifications.len(), 5);
    }

    #[tokio::test]
    async fn test_non_200_success_code_is_retried() {
        let server = MockServer::start(MockState {
            notify_statuses: vec![202].into(),
            ..MockState::default()
        })
        .await;
        let notifier = Notifier::new(Client::new(), fast_policy());

        let report = notifier.send(&server.url("/notify"), &record()).await;

        assert!(report.delivered());
        assert_eq!(report.attempts, 2);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_retried() {
        let notifier = Notifier::new(
            Client::new(),
            RetryPolicy {
                max_attempts: 2,
                initial_delay: Duration::from_millis(1),
            },
        );

        // Port 1 is reserved and refuses connections.
        let report = notifier.send("http://127.0.0.1:1/notify", &record()).await;

        assert_eq!(report.attempts, 2);
        assert!(!report.delivered());
    }
}
