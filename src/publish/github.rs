//! GitHub REST client for repositories, contents and Pages.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use super::{ArtifactHost, PagesStatus, PublishError};
use crate::config::GitHubConfig;

/// GitHub-backed artifact host.
pub struct GitHubHost {
    client: Client,
    token: String,
    owner: String,
    api_url: String,
    web_url: String,
    pages_domain: String,
}

#[derive(Debug, Deserialize)]
struct ShaResponse {
    sha: Option<String>,
}

impl GitHubHost {
    pub fn new(client: Client, config: &GitHubConfig) -> Self {
        Self {
            client,
            token: config.token.clone(),
            owner: config.owner.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            web_url: config.web_url.trim_end_matches('/').to_string(),
            pages_domain: config.pages_domain.clone(),
        }
    }

    fn repo_api(&self, repo: &str) -> String {
        format!(
            "{}/repos/{}/{}",
            self.api_url,
            urlencoding::encode(&self.owner),
            urlencoding::encode(repo)
        )
    }

    fn contents_url(&self, repo: &str, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!("{}/contents/{}", self.repo_api(repo), encoded.join("/"))
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send(&self, builder: RequestBuilder, action: &str) -> Result<Response, PublishError> {
        self.authed(builder)
            .send()
            .await
            .map_err(|source| PublishError::Transport {
                action: action.to_string(),
                source,
            })
    }

    async fn status_error(response: Response, action: &str) -> PublishError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        PublishError::Status {
            action: action.to_string(),
            status,
            body,
        }
    }

    async fn read_sha(response: Response, action: &str) -> Result<Option<String>, PublishError> {
        let parsed: ShaResponse =
            response
                .json()
                .await
                .map_err(|e| PublishError::InvalidResponse {
                    action: action.to_string(),
                    reason: e.to_string(),
                })?;
        Ok(parsed.sha)
    }
}

#[async_trait]
impl ArtifactHost for GitHubHost {
    async fn create_repository(&self, name: &str) -> Result<(), PublishError> {
        let action = format!("create repo {}", name);
        let body = serde_json::json!({
            "name": name,
            "private": false,
            "auto_init": true,
            "license_template": "mit",
        });

        let response = self
            .send(
                self.client
                    .post(format!("{}/user/repos", self.api_url))
                    .json(&body),
                &action,
            )
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(Self::status_error(response, &action).await);
        }

        tracing::info!(repo = %name, owner = %self.owner, "Repository created");
        Ok(())
    }

    async fn repository_exists(&self, name: &str) -> Result<bool, PublishError> {
        let action = format!("look up repo {}", name);
        let response = self
            .send(self.client.get(self.repo_api(name)), &action)
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::status_error(response, &action).await),
        }
    }

    async fn file_sha(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<Option<String>, PublishError> {
        let action = format!("look up {} in {}", path, repo);
        let response = self
            .send(
                self.client
                    .get(self.contents_url(repo, path))
                    .query(&[("ref", branch)]),
                &action,
            )
            .await?;

        if response.status() != StatusCode::OK {
            // Missing (or unreadable) files are written as new files.
            tracing::debug!(repo = %repo, path = %path, status = %response.status(), "No existing file");
            return Ok(None);
        }

        Self::read_sha(response, &action).await
    }

    async fn put_file(
        &self,
        repo: &str,
        path: &str,
        content: &[u8],
        sha: Option<&str>,
    ) -> Result<(), PublishError> {
        let action = format!("push {}", path);
        let mut body = serde_json::json!({
            "message": format!("Add {}", path),
            "content": STANDARD.encode(content),
        });
        if let Some(sha) = sha {
            body["sha"] = serde_json::Value::String(sha.to_string());
        }

        let response = self
            .send(self.client.put(self.contents_url(repo, path)).json(&body), &action)
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            _ => Err(Self::status_error(response, &action).await),
        }
    }

    async fn enable_pages(&self, repo: &str, branch: &str) -> Result<PagesStatus, PublishError> {
        let action = format!("enable GitHub Pages for {}", repo);
        let body = serde_json::json!({
            "build_type": "legacy",
            "source": { "branch": branch, "path": "/" },
        });

        let response = self
            .send(
                self.client
                    .post(format!("{}/pages", self.repo_api(repo)))
                    .json(&body),
                &action,
            )
            .await?;

        match response.status() {
            StatusCode::CREATED => Ok(PagesStatus::Enabled),
            StatusCode::CONFLICT => {
                tracing::info!(repo = %repo, "GitHub Pages already enabled, continuing");
                Ok(PagesStatus::AlreadyEnabled)
            }
            _ => Err(Self::status_error(response, &action).await),
        }
    }

    async fn latest_commit(&self, repo: &str, branch: &str) -> Result<String, PublishError> {
        let action = format!("get latest commit of {}", repo);
        let response = self
            .send(
                self.client.get(format!(
                    "{}/commits/{}",
                    self.repo_api(repo),
                    urlencoding::encode(branch)
                )),
                &action,
            )
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Self::status_error(response, &action).await);
        }

        Self::read_sha(response, &action)
            .await?
            .ok_or_else(|| PublishError::InvalidResponse {
                action,
                reason: "commit has no sha".to_string(),
            })
    }

    fn repo_url(&self, repo: &str) -> String {
        format!("{}/{}/{}", self.web_url, self.owner, repo)
    }

    fn pages_url(&self, repo: &str) -> String {
        format!(
            "https://{}.{}/{}/",
            self.owner.to_lowercase(),
            self.pages_domain,
            repo
        )
    }
}
