//! In-memory forges for end-to-end reconciliation tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bbgh_migrate::forge::{
    BlobFile, BlobHost, IssueState, IssueUpdate, LabelCreation, NewIssue, NewPullRequest,
    SourceForge, TargetComment, TargetForge, TargetIssue,
};
use bbgh_migrate::model::{
    Activity, ActivityPayload, Attachment, EntityRef, PullRequestDetails, PullRequestEndpoint,
    SourceEntity, SourceUser,
};
use bbgh_migrate::{
    migrate_discussions, Forges, MigrationError, MigrationOptions, MigrationProgress,
    RepositoryReport, Result, Settings,
};
use chrono::{TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

pub const BITBUCKET_REPO: &str = "team/app";
pub const GITHUB_REPO: &str = "org/app";

// ============================================================================
// Source fixtures
// ============================================================================

pub fn settings() -> Settings {
    Settings::default()
        .with_user("jdoe", "john-doe")
        .with_user("rev", "reviewer-gh")
        .with_repo(BITBUCKET_REPO, GITHUB_REPO)
}

pub fn issue(id: u64, title: &str) -> SourceEntity {
    SourceEntity {
        reference: EntityRef::issue(id),
        title: title.to_string(),
        body: format!("Body of {title}"),
        author: Some(SourceUser::new("jdoe")),
        assignee: None,
        state: "open".to_string(),
        issue_kind: Some("bug".to_string()),
        priority: Some("major".to_string()),
        component: None,
        created_on: Utc.with_ymd_and_hms(2020, 5, 1, 9, 0, 0).unwrap(),
        updated_on: Utc.with_ymd_and_hms(2020, 5, 2, 9, 0, 0).unwrap(),
        activities: Vec::new(),
        attachments: Vec::new(),
        pull_request: None,
    }
}

pub fn comment(id: u64, minute: u32, text: &str) -> Activity {
    Activity {
        key: format!("comment-{id}"),
        author: Some(SourceUser::new("jdoe")),
        created_on: Utc.with_ymd_and_hms(2020, 5, 3, 10, minute, 0).unwrap(),
        payload: ActivityPayload::Comment {
            text: text.to_string(),
            inline: None,
        },
    }
}

pub fn with_attachments(mut entity: SourceEntity, names: &[&str]) -> SourceEntity {
    entity.attachments = names
        .iter()
        .map(|name| Attachment {
            name: name.to_string(),
        })
        .collect();
    entity
}

pub fn pull_request(id: u64, title: &str, state: &str) -> SourceEntity {
    let endpoint = |branch: &str| PullRequestEndpoint {
        branch: Some(branch.to_string()),
        commit: Some("abcdef1".to_string()),
        repository: Some(BITBUCKET_REPO.to_string()),
    };
    SourceEntity {
        reference: EntityRef::pull_request(id),
        state: state.to_string(),
        issue_kind: None,
        priority: None,
        pull_request: Some(PullRequestDetails {
            source: endpoint("feature"),
            destination: endpoint("main"),
            merge_commit: None,
            participants: Vec::new(),
            reviewers: vec![SourceUser::new("rev")],
        }),
        ..issue(id, title)
    }
}

// ============================================================================
// Fake Bitbucket
// ============================================================================

#[derive(Default)]
struct SourceState {
    issues: BTreeMap<u64, SourceEntity>,
    pulls: BTreeMap<u64, SourceEntity>,
    attachments: BTreeMap<(EntityRef, String), Vec<u8>>,
    broken: BTreeSet<EntityRef>,
    fetched: Vec<EntityRef>,
    listings: usize,
}

/// Bitbucket stand-in; entities can be changed between runs.
#[derive(Default)]
pub struct FakeBitbucket {
    state: Mutex<SourceState>,
}

impl FakeBitbucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, entity: SourceEntity) {
        let mut state = self.state.lock().unwrap();
        let id = entity.reference.id;
        if entity.is_pull_request() {
            state.pulls.insert(id, entity);
        } else {
            state.issues.insert(id, entity);
        }
    }

    pub fn put_attachment(&self, owner: EntityRef, name: &str, content: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .attachments
            .insert((owner, name.to_string()), content.to_vec());
    }

    /// Make fetching this entity fail as malformed.
    pub fn break_entity(&self, reference: EntityRef) {
        self.state.lock().unwrap().broken.insert(reference);
    }

    pub fn fetched(&self) -> Vec<EntityRef> {
        self.state.lock().unwrap().fetched.clone()
    }

    pub fn listings(&self) -> usize {
        self.state.lock().unwrap().listings
    }

    fn fetch(&self, reference: EntityRef) -> Result<SourceEntity> {
        let mut state = self.state.lock().unwrap();
        state.fetched.push(reference);
        if state.broken.contains(&reference) {
            return Err(MigrationError::MalformedSourceEntity {
                reference: reference.to_string(),
                reason: "missing field `title`".to_string(),
            });
        }
        let table = match reference.kind {
            bbgh_migrate::model::EntityKind::Issue => &state.issues,
            bbgh_migrate::model::EntityKind::PullRequest => &state.pulls,
        };
        table
            .get(&reference.id)
            .cloned()
            .ok_or_else(|| MigrationError::NotFound(reference.to_string()))
    }
}

#[async_trait]
impl SourceForge for FakeBitbucket {
    async fn issue_ids(&self) -> Result<Vec<u64>> {
        let mut state = self.state.lock().unwrap();
        state.listings += 1;
        Ok(state.issues.keys().copied().collect())
    }

    async fn fetch_issue(&self, id: u64) -> Result<SourceEntity> {
        self.fetch(EntityRef::issue(id))
    }

    async fn pull_request_ids(&self) -> Result<Vec<u64>> {
        let mut state = self.state.lock().unwrap();
        state.listings += 1;
        Ok(state.pulls.keys().copied().collect())
    }

    async fn fetch_pull_request(&self, id: u64) -> Result<SourceEntity> {
        self.fetch(EntityRef::pull_request(id))
    }

    async fn attachment_content(&self, owner: EntityRef, name: &str) -> Result<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .attachments
            .get(&(owner, name.to_string()))
            .cloned()
            .ok_or_else(|| MigrationError::NotFound(name.to_string()))
    }
}

// ============================================================================
// Fake GitHub
// ============================================================================

/// One issue or pull request as stored by the fake.
#[derive(Debug, Clone)]
pub struct StoredIssue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: IssueState,
    pub labels: BTreeSet<String>,
    pub assignees: Vec<String>,
    pub is_pull_request: bool,
    pub head: Option<String>,
    pub base: Option<String>,
    pub reviewers: Vec<String>,
    pub merged: bool,
    pub comments: Vec<String>,
}

impl StoredIssue {
    fn target(&self) -> TargetIssue {
        TargetIssue {
            number: self.number,
            title: self.title.clone(),
            state: self.state,
            labels: self.labels.iter().cloned().collect(),
            is_pull_request: self.is_pull_request,
        }
    }
}

#[derive(Default)]
struct TargetState {
    issues: Vec<StoredIssue>,
    labels: BTreeSet<String>,
    created_labels: Vec<String>,
    gists: Vec<(String, BTreeMap<String, String>)>,
    fail_gists: bool,
    mutations: Vec<String>,
}

/// GitHub stand-in recording every mutating call.
#[derive(Default)]
pub struct FakeGitHub {
    state: Mutex<TargetState>,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels(self, labels: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .labels
            .extend(labels.iter().map(|l| l.to_string()));
        self
    }

    pub fn fail_gists(&self) {
        self.state.lock().unwrap().fail_gists = true;
    }

    /// Seed an issue as if created by an earlier run or by hand.
    pub fn seed(&self, title: &str, comments: &[String]) -> u64 {
        let mut state = self.state.lock().unwrap();
        let number = state.issues.len() as u64 + 1;
        state.issues.push(StoredIssue {
            number,
            title: title.to_string(),
            body: String::new(),
            state: IssueState::Open,
            labels: BTreeSet::new(),
            assignees: Vec::new(),
            is_pull_request: false,
            head: None,
            base: None,
            reviewers: Vec::new(),
            merged: false,
            comments: comments.to_vec(),
        });
        number
    }

    pub fn seed_pull_request(&self, title: &str) -> u64 {
        let number = self.seed(title, &[]);
        let mut state = self.state.lock().unwrap();
        state.issues[number as usize - 1].is_pull_request = true;
        number
    }

    pub fn issues(&self) -> Vec<StoredIssue> {
        self.state.lock().unwrap().issues.clone()
    }

    pub fn issue(&self, number: u64) -> StoredIssue {
        self.state.lock().unwrap().issues[number as usize - 1].clone()
    }

    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn created_labels(&self) -> Vec<String> {
        self.state.lock().unwrap().created_labels.clone()
    }

    pub fn gists(&self) -> Vec<(String, BTreeMap<String, String>)> {
        self.state.lock().unwrap().gists.clone()
    }

    fn stored(&self, state: &mut TargetState, number: u64) -> Result<usize> {
        state
            .issues
            .iter()
            .position(|i| i.number == number)
            .ok_or_else(|| MigrationError::NotFound(format!("issue {number}")))
    }
}

#[async_trait]
impl TargetForge for FakeGitHub {
    async fn list_issues(&self) -> Result<Vec<TargetIssue>> {
        Ok(self.state.lock().unwrap().issues.iter().map(StoredIssue::target).collect())
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<TargetIssue> {
        let mut state = self.state.lock().unwrap();
        let number = state.issues.len() as u64 + 1;
        state.mutations.push(format!("create_issue {number}"));
        let stored = StoredIssue {
            number,
            title: issue.title.clone(),
            body: issue.body.clone(),
            state: IssueState::Open,
            labels: issue.labels.iter().cloned().collect(),
            assignees: issue.assignees.clone(),
            is_pull_request: false,
            head: None,
            base: None,
            reviewers: Vec::new(),
            merged: false,
            comments: Vec::new(),
        };
        let target = stored.target();
        state.issues.push(stored);
        Ok(target)
    }

    async fn update_issue(&self, number: u64, update: &IssueUpdate) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.mutations.push(format!("update_issue {number}"));
        let at = self.stored(&mut state, number)?;
        let issue = &mut state.issues[at];
        if let Some(new_state) = update.state {
            issue.state = new_state;
        }
        if let Some(labels) = &update.labels {
            issue.labels = labels.iter().cloned().collect();
        }
        if let Some(assignees) = &update.assignees {
            issue.assignees = assignees.clone();
        }
        Ok(())
    }

    async fn list_comments(&self, number: u64) -> Result<Vec<TargetComment>> {
        let mut state = self.state.lock().unwrap();
        let at = self.stored(&mut state, number)?;
        Ok(state.issues[at]
            .comments
            .iter()
            .enumerate()
            .map(|(i, body)| TargetComment {
                id: i as u64 + 1,
                body: body.clone(),
            })
            .collect())
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.mutations.push(format!("create_comment {number}"));
        let at = self.stored(&mut state, number)?;
        state.issues[at].comments.push(body.to_string());
        Ok(())
    }

    async fn create_pull_request(&self, pull: &NewPullRequest) -> Result<TargetIssue> {
        let mut state = self.state.lock().unwrap();
        let number = state.issues.len() as u64 + 1;
        state.mutations.push(format!("create_pull_request {number}"));
        let stored = StoredIssue {
            number,
            title: pull.title.clone(),
            body: pull.body.clone(),
            state: IssueState::Open,
            labels: BTreeSet::new(),
            assignees: Vec::new(),
            is_pull_request: true,
            head: Some(pull.head.clone()),
            base: Some(pull.base.clone()),
            reviewers: Vec::new(),
            merged: false,
            comments: Vec::new(),
        };
        let target = stored.target();
        state.issues.push(stored);
        Ok(target)
    }

    async fn request_reviewers(&self, number: u64, reviewers: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.mutations.push(format!("request_reviewers {number}"));
        let at = self.stored(&mut state, number)?;
        state.issues[at].reviewers.extend(reviewers.iter().cloned());
        Ok(())
    }

    async fn merge_pull_request(&self, number: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.mutations.push(format!("merge_pull_request {number}"));
        let at = self.stored(&mut state, number)?;
        let issue = &mut state.issues[at];
        issue.merged = true;
        issue.state = IssueState::Closed;
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().labels.iter().cloned().collect())
    }

    async fn create_label(&self, name: &str, _color: &str) -> Result<LabelCreation> {
        let mut state = self.state.lock().unwrap();
        state.mutations.push(format!("create_label {name}"));
        state.created_labels.push(name.to_string());
        if state.labels.insert(name.to_string()) {
            Ok(LabelCreation::Created)
        } else {
            Ok(LabelCreation::AlreadyExists)
        }
    }
}

#[async_trait]
impl BlobHost for FakeGitHub {
    async fn find_bundle(&self, description: &str) -> Result<Option<BTreeMap<String, String>>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .gists
            .iter()
            .find(|(d, _)| d == description)
            .map(|(_, files)| files.clone()))
    }

    async fn publish(&self, description: &str, files: &[BlobFile]) -> Result<BTreeMap<String, String>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_gists {
            return Err(MigrationError::AttachmentUploadFailed("gist quota exceeded".to_string()));
        }
        let id = state.gists.len() + 1;
        state.mutations.push(format!("publish_gist {id}"));
        let urls: BTreeMap<String, String> = files
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    format!("https://gist.example/{id}/raw/{}", f.name),
                )
            })
            .collect();
        state.gists.push((description.to_string(), urls.clone()));
        Ok(urls)
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Run one migration of the fake repository.
pub async fn run(
    source: &FakeBitbucket,
    target: &FakeGitHub,
    settings: &Settings,
    options: &MigrationOptions,
) -> RepositoryReport {
    let mut report = RepositoryReport::new(BITBUCKET_REPO, GITHUB_REPO);
    let forges = Forges {
        source,
        target,
        blobs: target,
    };
    migrate_discussions(
        forges,
        Arc::new(settings.clone()),
        options,
        GITHUB_REPO,
        &MigrationProgress::new(),
        &mut report,
    )
    .await
    .expect("repository migration");
    report
}

/// Options for discussion-only runs.
pub fn options() -> MigrationOptions {
    MigrationOptions::default().with_clone(false)
}
