//! Normalized source entity model.
//!
//! The Bitbucket adapter decodes API payloads into these types; the
//! engine never sees raw JSON. Entities are immutable once fetched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which Bitbucket id space an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Bitbucket issue.
    Issue,
    /// Bitbucket pull request.
    PullRequest,
}

impl EntityKind {
    /// Tag used inside cross-reference markers.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::PullRequest => "pr",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Issue => write!(f, "issue"),
            Self::PullRequest => write!(f, "pull request"),
        }
    }
}

/// A (kind, id) pair identifying one source entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: u64,
}

impl EntityRef {
    pub fn issue(id: u64) -> Self {
        Self {
            kind: EntityKind::Issue,
            id,
        }
    }

    pub fn pull_request(id: u64) -> Self {
        Self {
            kind: EntityKind::PullRequest,
            id,
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind.tag(), self.id)
    }
}

/// A Bitbucket account as it appears on an entity or activity.
///
/// `nickname` is `None` when the account has been deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUser {
    pub nickname: Option<String>,
    pub display_name: Option<String>,
}

impl SourceUser {
    pub fn new(nickname: impl Into<String>) -> Self {
        Self {
            nickname: Some(nickname.into()),
            display_name: None,
        }
    }
}

/// Code location of an inline pull request comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineLocation {
    pub path: String,
    pub from: Option<u64>,
    pub to: Option<u64>,
    pub outdated: bool,
}

/// One field change inside an issue change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

/// What an activity carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityPayload {
    /// A user comment, optionally anchored to code.
    Comment {
        text: String,
        inline: Option<InlineLocation>,
    },
    /// A set of issue field changes made at once.
    Changes(Vec<FieldChange>),
    /// A pull request approval.
    Approval,
    /// A pull request state transition (merge, decline, ...).
    StateUpdate { state: String },
}

/// A comment or state-transition event attached to a source entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Stable key, unique within the owning entity (e.g. `comment-345`).
    pub key: String,
    pub author: Option<SourceUser>,
    pub created_on: DateTime<Utc>,
    pub payload: ActivityPayload,
}

/// Attachment descriptor; content is fetched lazily from the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
}

/// Participant of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user: Option<SourceUser>,
    pub reviewer: bool,
    pub approved: bool,
}

/// Branch and commit on one side of a pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEndpoint {
    pub branch: Option<String>,
    pub commit: Option<String>,
    /// `workspace/repo` of the endpoint, when Bitbucket reports it.
    pub repository: Option<String>,
}

/// Pull-request-only attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestDetails {
    pub source: PullRequestEndpoint,
    pub destination: PullRequestEndpoint,
    pub merge_commit: Option<String>,
    pub participants: Vec<Participant>,
    pub reviewers: Vec<SourceUser>,
}

/// An issue or pull request read from Bitbucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntity {
    pub reference: EntityRef,
    pub title: String,
    pub body: String,
    pub author: Option<SourceUser>,
    pub assignee: Option<SourceUser>,
    /// Raw Bitbucket state (`new`, `open`, `resolved`, `MERGED`, ...).
    pub state: String,
    /// Issue kind (`bug`, `enhancement`, ...); `None` for pull requests.
    pub issue_kind: Option<String>,
    pub priority: Option<String>,
    pub component: Option<String>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    /// Activities in non-decreasing `created_on` order.
    pub activities: Vec<Activity>,
    pub attachments: Vec<Attachment>,
    pub pull_request: Option<PullRequestDetails>,
}

impl SourceEntity {
    pub fn is_pull_request(&self) -> bool {
        self.reference.kind == EntityKind::PullRequest
    }
}

/// Sort activities into replay order: creation time, then key.
pub fn sort_activities(activities: &mut [Activity]) {
    activities.sort_by(|a, b| a.created_on.cmp(&b.created_on).then_with(|| a.key.cmp(&b.key)));
}
