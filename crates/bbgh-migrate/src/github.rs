//! GitHub target adapter and gist-backed blob host.

use crate::config::split_repo;
use crate::error::{MigrationError, Result};
use crate::forge::{
    BlobFile, BlobHost, IssueState, IssueUpdate, LabelCreation, NewIssue, NewPullRequest,
    TargetComment, TargetForge, TargetIssue,
};
use crate::retry::RetryPolicy;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

const PER_PAGE: usize = 100;

/// GitHub API response types
#[derive(Debug, Deserialize)]
struct GitHubIssue {
    number: u64,
    title: String,
    state: IssueState,
    #[serde(default)]
    labels: Vec<GitHubLabel>,
    pull_request: Option<serde_json::Value>,
}

impl From<GitHubIssue> for TargetIssue {
    fn from(issue: GitHubIssue) -> Self {
        TargetIssue {
            number: issue.number,
            title: issue.title,
            state: issue.state,
            labels: issue.labels.into_iter().map(|l| l.name).collect(),
            is_pull_request: issue.pull_request.is_some(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubPullRequest {
    number: u64,
    title: String,
    state: IssueState,
}

#[derive(Debug, Deserialize)]
struct GitHubLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubComment {
    id: u64,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubGistFile {
    raw_url: String,
}

#[derive(Debug, Deserialize)]
struct GitHubGist {
    description: Option<String>,
    files: BTreeMap<String, GitHubGistFile>,
}

#[derive(Debug, Serialize)]
struct GistFileContent<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateGistRequest<'a> {
    description: &'a str,
    public: bool,
    files: BTreeMap<&'a str, GistFileContent<'a>>,
}

#[derive(Debug, Serialize)]
struct CreateLabelRequest<'a> {
    name: &'a str,
    color: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
    has_issues: bool,
    auto_init: bool,
}

/// Client for one GitHub repository.
pub struct GitHubClient {
    client: Client,
    api_url: String,
    token: String,
    repository: String,
    retry: RetryPolicy,
}

impl GitHubClient {
    /// Create a new GitHub client for `owner/repo`.
    pub fn new(api_url: &str, repository: &str, token: &str) -> Result<Self> {
        split_repo(repository)?;

        let client = Client::builder()
            .user_agent("bbgh-migrate")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| MigrationError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            repository: repository.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    fn repo_path(&self, suffix: &str) -> String {
        format!("/repos/{}{suffix}", self.repository)
    }

    fn authorized(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.api_url))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send_once<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        let mut request = self.authorized(method, path);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MigrationError::NetworkError(e.to_string()))?;

        check_status(response, path).await
    }

    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        // Any failure other than a rate-limit rejection may already be committed.
        if method == Method::POST {
            return self
                .retry
                .execute_when(
                    |e| matches!(e, MigrationError::RateLimitExceeded(_)),
                    || self.send_once(method.clone(), path, body),
                )
                .await;
        }
        self.retry
            .execute(|| self.send_once(method.clone(), path, body))
            .await
    }

    async fn github_json<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let response = self.send(method, path, body).await?;
        let status = response.status().as_u16();
        response.json().await.map_err(|e| MigrationError::ApiError {
            status,
            message: format!("Invalid GitHub response: {e}"),
        })
    }

    async fn github_get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.github_json::<T, ()>(Method::GET, path, None).await
    }

    async fn github_get_paginated<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut all_items = Vec::new();
        let mut page = 1;
        let separator = if path.contains('?') { '&' } else { '?' };

        loop {
            let url = format!("{path}{separator}page={page}&per_page={PER_PAGE}");
            let items: Vec<T> = self.github_get(&url).await?;

            let count = items.len();
            all_items.extend(items);

            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(all_items)
    }

    /// Whether the repository exists and is accessible.
    pub async fn repository_exists(&self) -> Result<bool> {
        match self.github_get::<serde_json::Value>(&self.repo_path("")).await {
            Ok(_) => Ok(true),
            Err(MigrationError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create the repository as a private repository of its organization.
    pub async fn create_repository(&self, description: &str) -> Result<()> {
        let (owner, name) = split_repo(&self.repository)?;
        let _: serde_json::Value = self
            .github_json(
                Method::POST,
                &format!("/orgs/{owner}/repos"),
                Some(&CreateRepoRequest {
                    name,
                    description,
                    private: true,
                    has_issues: true,
                    auto_init: false,
                }),
            )
            .await?;
        Ok(())
    }
}

fn header_u64(response: &Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

async fn check_status(response: Response, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        return Err(MigrationError::NotFound(path.to_string()));
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(MigrationError::AuthenticationFailed(
            "Invalid GitHub token".to_string(),
        ));
    }

    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        if let Some(retry_after) = header_u64(&response, "retry-after") {
            return Err(MigrationError::RateLimitExceeded(retry_after));
        }
        if header_u64(&response, "x-ratelimit-remaining") == Some(0) {
            let now = chrono::Utc::now().timestamp().max(0) as u64;
            let reset = header_u64(&response, "x-ratelimit-reset").unwrap_or(now);
            return Err(MigrationError::RateLimitExceeded(reset.saturating_sub(now).max(1)));
        }
        if status == StatusCode::FORBIDDEN {
            return Err(MigrationError::AuthenticationFailed(
                "Access denied. Check your token permissions.".to_string(),
            ));
        }
    }

    let body = response.text().await.unwrap_or_default();
    Err(MigrationError::ApiError {
        status: status.as_u16(),
        message: format!("GitHub API error: {body}"),
    })
}

#[async_trait]
impl TargetForge for GitHubClient {
    async fn list_issues(&self) -> Result<Vec<TargetIssue>> {
        let issues: Vec<GitHubIssue> = self
            .github_get_paginated(&self.repo_path("/issues?state=all&direction=asc"))
            .await?;
        Ok(issues.into_iter().map(Into::into).collect())
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<TargetIssue> {
        let created: GitHubIssue = self
            .github_json(Method::POST, &self.repo_path("/issues"), Some(issue))
            .await?;
        debug!(number = created.number, "Created GitHub issue");
        Ok(created.into())
    }

    async fn update_issue(&self, number: u64, update: &IssueUpdate) -> Result<()> {
        let _: serde_json::Value = self
            .github_json(
                Method::PATCH,
                &self.repo_path(&format!("/issues/{number}")),
                Some(update),
            )
            .await?;
        Ok(())
    }

    async fn list_comments(&self, number: u64) -> Result<Vec<TargetComment>> {
        let comments: Vec<GitHubComment> = self
            .github_get_paginated(&self.repo_path(&format!("/issues/{number}/comments")))
            .await?;
        Ok(comments
            .into_iter()
            .map(|c| TargetComment {
                id: c.id,
                body: c.body.unwrap_or_default(),
            })
            .collect())
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<()> {
        let _: serde_json::Value = self
            .github_json(
                Method::POST,
                &self.repo_path(&format!("/issues/{number}/comments")),
                Some(&CreateCommentRequest { body }),
            )
            .await?;
        Ok(())
    }

    async fn create_pull_request(&self, pull: &NewPullRequest) -> Result<TargetIssue> {
        let created: GitHubPullRequest = self
            .github_json(Method::POST, &self.repo_path("/pulls"), Some(pull))
            .await?;
        Ok(TargetIssue {
            number: created.number,
            title: created.title,
            state: created.state,
            labels: Vec::new(),
            is_pull_request: true,
        })
    }

    async fn request_reviewers(&self, number: u64, reviewers: &[String]) -> Result<()> {
        #[derive(Serialize)]
        struct ReviewersRequest<'a> {
            reviewers: &'a [String],
        }

        let _: serde_json::Value = self
            .github_json(
                Method::POST,
                &self.repo_path(&format!("/pulls/{number}/requested_reviewers")),
                Some(&ReviewersRequest { reviewers }),
            )
            .await?;
        Ok(())
    }

    async fn merge_pull_request(&self, number: u64) -> Result<()> {
        let _: serde_json::Value = self
            .github_json(
                Method::PUT,
                &self.repo_path(&format!("/pulls/{number}/merge")),
                Some(&serde_json::json!({})),
            )
            .await?;
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<String>> {
        let labels: Vec<GitHubLabel> = self.github_get_paginated(&self.repo_path("/labels")).await?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }

    async fn create_label(&self, name: &str, color: &str) -> Result<LabelCreation> {
        let result = self
            .send(
                Method::POST,
                &self.repo_path("/labels"),
                Some(&CreateLabelRequest { name, color }),
            )
            .await;

        match result {
            Ok(_) => Ok(LabelCreation::Created),
            Err(MigrationError::ApiError { status: 422, .. }) => Ok(LabelCreation::AlreadyExists),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl BlobHost for GitHubClient {
    async fn find_bundle(&self, description: &str) -> Result<Option<BTreeMap<String, String>>> {
        let gists: Vec<GitHubGist> = self.github_get_paginated("/gists").await?;
        Ok(gists
            .into_iter()
            .find(|g| g.description.as_deref() == Some(description))
            .map(|g| {
                g.files
                    .into_iter()
                    .map(|(name, file)| (name, file.raw_url))
                    .collect()
            }))
    }

    async fn publish(&self, description: &str, files: &[BlobFile]) -> Result<BTreeMap<String, String>> {
        let request = CreateGistRequest {
            description,
            public: false,
            files: files
                .iter()
                .map(|f| {
                    (
                        f.name.as_str(),
                        GistFileContent {
                            content: &f.content,
                        },
                    )
                })
                .collect(),
        };

        let gist: GitHubGist = self
            .github_json(Method::POST, "/gists", Some(&request))
            .await
            .map_err(|e| MigrationError::AttachmentUploadFailed(e.to_string()))?;

        Ok(gist
            .files
            .into_iter()
            .map(|(name, file)| (name, file.raw_url))
            .collect())
    }
}
