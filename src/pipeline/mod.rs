//! Round orchestration.
//!
//! A round moves through
//! `Naming -> Provisioning -> Generating -> Merging -> Publishing -> Enabling
//! -> Resolving -> Notifying` and ends in `Done` or `NotifyFailed`. Any failure
//! before `Notifying` aborts the round with a [`PipelineError`]; side effects
//! already performed (repositories, pushed files) are left in place.

mod naming;

pub use naming::{artifact_name, unique_name};

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::attachments::{decode_attachments, DecodeError};
use crate::config::Config;
use crate::generator::{CodeGenerator, GenerationError};
use crate::llm::{LlmClient, OpenAiCompatClient};
use crate::notify::{DeliveryReport, NotificationRecord, Notifier};
use crate::publish::{self, Artifact, ArtifactHost, GitHubHost, Provisioning, PublishError, BRANCH};
use crate::task::{FileSet, Round, TaskRequest};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// States of a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Naming,
    Provisioning,
    Generating,
    Merging,
    Publishing,
    Enabling,
    Resolving,
    Notifying,
    Done,
    /// Artifact published, but the evaluator never acknowledged.
    NotifyFailed,
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoundState::Naming => "naming",
            RoundState::Provisioning => "provisioning",
            RoundState::Generating => "generating",
            RoundState::Merging => "merging",
            RoundState::Publishing => "publishing",
            RoundState::Enabling => "enabling",
            RoundState::Resolving => "resolving",
            RoundState::Notifying => "notifying",
            RoundState::Done => "done",
            RoundState::NotifyFailed => "notify_failed",
        };
        f.write_str(s)
    }
}

/// Outcome of a round that published its artifact.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub round: Round,
    pub artifact: Artifact,
    /// Paths written, in upload order.
    pub files: Vec<String>,
    pub notification: NotificationRecord,
    pub delivery: DeliveryReport,
    /// `Done` or `NotifyFailed`.
    pub state: RoundState,
}

/// Tracks and logs state transitions for one round.
struct RoundTracker<'a> {
    task: &'a str,
    round: Round,
    state: RoundState,
}

impl<'a> RoundTracker<'a> {
    fn new(task: &'a str, round: Round) -> Self {
        let tracker = Self {
            task,
            round,
            state: RoundState::Naming,
        };
        tracing::info!(task = %task, round = %round, state = %tracker.state, "Round started");
        tracker
    }

    fn enter(&mut self, next: RoundState) {
        tracing::info!(
            task = %self.task,
            round = %self.round,
            from = %self.state,
            to = %next,
            "Round state transition"
        );
        self.state = next;
    }

    fn fail(&self, err: &PipelineError) {
        tracing::error!(
            task = %self.task,
            round = %self.round,
            state = %self.state,
            error = %err,
            "Round failed"
        );
    }
}

/// The task fulfillment pipeline.
pub struct Pipeline {
    generator: CodeGenerator,
    host: Arc<dyn ArtifactHost>,
    notifier: Notifier,
}

impl Pipeline {
    pub fn new(generator: CodeGenerator, host: Arc<dyn ArtifactHost>, notifier: Notifier) -> Self {
        Self {
            generator,
            host,
            notifier,
        }
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        let client = config.http_client()?;
        let llm: Arc<dyn LlmClient> = Arc::new(OpenAiCompatClient::new(
            client.clone(),
            config.llm.api_url.clone(),
            config.llm.api_key.clone(),
        ));
        let host: Arc<dyn ArtifactHost> = Arc::new(GitHubHost::new(client.clone(), &config.github));

        Ok(Self::new(
            CodeGenerator::new(llm, &config.llm),
            host,
            Notifier::new(client, config.notify_retry),
        ))
    }

    /// Run one round to completion.
    ///
    /// Round 1 always creates a new location. Round 2 also uses a fresh name
    /// and creates the location unless it already exists.
    pub async fn run_round(
        &self,
        request: &TaskRequest,
        round: Round,
    ) -> Result<RoundReport, PipelineError> {
        let mut tracker = RoundTracker::new(&request.task, round);
        let result = self.execute(request, round, &mut tracker).await;
        if let Err(err) = &result {
            tracker.fail(err);
        }
        result
    }

    async fn execute(
        &self,
        request: &TaskRequest,
        round: Round,
        tracker: &mut RoundTracker<'_>,
    ) -> Result<RoundReport, PipelineError> {
        let name = artifact_name(&request.task, &request.nonce);
        tracing::info!(task = %request.task, round = %round, repo = %name, "Artifact named");

        tracker.enter(RoundState::Provisioning);
        let provisioning = match round {
            Round::First => Provisioning::Create,
            Round::Second => Provisioning::EnsureExists,
        };
        publish::provision(self.host.as_ref(), &name, provisioning).await?;

        tracker.enter(RoundState::Generating);
        let generated = self
            .generator
            .generate(&request.task, &request.brief, &request.checks)
            .await?;
        let attachments = decode_attachments(&request.attachments)?;

        tracker.enter(RoundState::Merging);
        let files = FileSet::merge(generated, attachments);

        tracker.enter(RoundState::Publishing);
        let written = publish::upload_files(self.host.as_ref(), &name, &files).await?;
        tracing::info!(repo = %name, files = written, "Files pushed");

        tracker.enter(RoundState::Enabling);
        self.host.enable_pages(&name, BRANCH).await?;

        tracker.enter(RoundState::Resolving);
        let commit_sha = self.host.latest_commit(&name, BRANCH).await?;
        let artifact = Artifact {
            repo_url: self.host.repo_url(&name),
            pages_url: self.host.pages_url(&name),
            commit_sha,
            name,
        };

        tracker.enter(RoundState::Notifying);
        let notification = NotificationRecord {
            email: request.email.clone(),
            task: request.task.clone(),
            round: round.number(),
            nonce: request.nonce.clone(),
            repo_url: artifact.repo_url.clone(),
            commit_sha: artifact.commit_sha.clone(),
            pages_url: artifact.pages_url.clone(),
        };
        let delivery = self
            .notifier
            .send(&request.evaluation_url, &notification)
            .await;

        tracker.enter(if delivery.delivered() {
            RoundState::Done
        } else {
            RoundState::NotifyFailed
        });

        Ok(RoundReport {
            round,
            files: files.paths().map(str::to_string).collect(),
            artifact,
            notification,
            delivery,
            state: tracker.state,
        })
    }
}
