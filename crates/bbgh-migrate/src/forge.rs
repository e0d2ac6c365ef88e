//! Adapter seams between the engine and the two forges.
//!
//! The Bitbucket client implements [`SourceForge`]; the GitHub client
//! implements [`TargetForge`] and [`BlobHost`]. Tests substitute
//! in-memory implementations.

use crate::error::Result;
use crate::model::{EntityRef, SourceEntity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Read-only access to the source forge.
#[async_trait]
pub trait SourceForge: Send + Sync {
    /// Ids of every issue, ascending. Empty when the tracker is disabled.
    async fn issue_ids(&self) -> Result<Vec<u64>>;

    /// Issue with its comments, change events and attachment list.
    async fn fetch_issue(&self, id: u64) -> Result<SourceEntity>;

    /// Ids of every pull request in any state, ascending.
    async fn pull_request_ids(&self) -> Result<Vec<u64>>;

    /// Pull request with its comments and activity.
    async fn fetch_pull_request(&self, id: u64) -> Result<SourceEntity>;

    /// Raw bytes of one attachment.
    async fn attachment_content(&self, owner: EntityRef, name: &str) -> Result<Vec<u8>>;
}

/// Open/closed state on GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

/// A GitHub issue, or the issue side of a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetIssue {
    pub number: u64,
    pub title: String,
    pub state: IssueState,
    pub labels: Vec<String>,
    pub is_pull_request: bool,
}

/// Comment already present on a GitHub issue or pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetComment {
    pub id: u64,
    pub body: String,
}

/// Payload for a new issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assignees: Vec<String>,
}

/// Partial update of an issue; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<IssueState>,
    /// Replaces the whole label set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<String>>,
}

impl IssueUpdate {
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.labels.is_none() && self.assignees.is_none()
    }
}

/// Payload for a new pull request over already-pushed branches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// Result of a label creation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelCreation {
    Created,
    /// The label existed already (conflict treated as success).
    AlreadyExists,
}

/// Mutating and listing access to the target forge.
#[async_trait]
pub trait TargetForge: Send + Sync {
    /// Every issue and pull request of the repository, any state.
    async fn list_issues(&self) -> Result<Vec<TargetIssue>>;

    async fn create_issue(&self, issue: &NewIssue) -> Result<TargetIssue>;

    async fn update_issue(&self, number: u64, update: &IssueUpdate) -> Result<()>;

    /// Comments in creation order.
    async fn list_comments(&self, number: u64) -> Result<Vec<TargetComment>>;

    async fn create_comment(&self, number: u64, body: &str) -> Result<()>;

    async fn create_pull_request(&self, pull: &NewPullRequest) -> Result<TargetIssue>;

    async fn request_reviewers(&self, number: u64, reviewers: &[String]) -> Result<()>;

    async fn merge_pull_request(&self, number: u64) -> Result<()>;

    async fn list_labels(&self) -> Result<Vec<String>>;

    async fn create_label(&self, name: &str, color: &str) -> Result<LabelCreation>;
}

/// One file published to the blob host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobFile {
    pub name: String,
    pub content: String,
}

/// External facility hosting relocated attachments (GitHub gists).
#[async_trait]
pub trait BlobHost: Send + Sync {
    /// Files of an existing bundle whose description matches exactly.
    async fn find_bundle(&self, description: &str) -> Result<Option<BTreeMap<String, String>>>;

    /// Publish files and return file name to durable URL.
    async fn publish(&self, description: &str, files: &[BlobFile]) -> Result<BTreeMap<String, String>>;
}
