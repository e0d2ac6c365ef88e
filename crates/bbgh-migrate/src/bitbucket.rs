//! Bitbucket Cloud source adapter.

use crate::error::{MigrationError, Result};
use crate::forge::SourceForge;
use crate::model::{
    sort_activities, Activity, ActivityPayload, Attachment, EntityKind, EntityRef, FieldChange,
    InlineLocation, Participant, PullRequestDetails, PullRequestEndpoint, SourceEntity, SourceUser,
};
use crate::retry::RetryPolicy;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};
use url::Url;

/// Bitbucket API response types
#[derive(Debug, Deserialize)]
struct BitbucketPaginated<T> {
    values: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BitbucketId {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct BitbucketUser {
    nickname: Option<String>,
    display_name: Option<String>,
}

impl From<BitbucketUser> for SourceUser {
    fn from(user: BitbucketUser) -> Self {
        SourceUser {
            nickname: user.nickname,
            display_name: user.display_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BitbucketContent {
    raw: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BitbucketNamed {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketIssue {
    id: u64,
    title: String,
    content: Option<BitbucketContent>,
    state: String,
    kind: Option<String>,
    priority: Option<String>,
    component: Option<BitbucketNamed>,
    reporter: Option<BitbucketUser>,
    assignee: Option<BitbucketUser>,
    created_on: DateTime<Utc>,
    updated_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct BitbucketInline {
    path: String,
    from: Option<u64>,
    to: Option<u64>,
    #[serde(default)]
    outdated: bool,
}

#[derive(Debug, Deserialize)]
struct BitbucketComment {
    id: u64,
    content: Option<BitbucketContent>,
    user: Option<BitbucketUser>,
    created_on: DateTime<Utc>,
    #[serde(default)]
    deleted: bool,
    inline: Option<BitbucketInline>,
}

#[derive(Debug, Deserialize)]
struct BitbucketChangeValue {
    old: Option<serde_json::Value>,
    new: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BitbucketChange {
    id: u64,
    created_on: DateTime<Utc>,
    user: Option<BitbucketUser>,
    #[serde(default)]
    changes: BTreeMap<String, BitbucketChangeValue>,
}

#[derive(Debug, Deserialize)]
struct BitbucketHash {
    hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BitbucketRepoName {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct BitbucketPRBranch {
    branch: Option<BitbucketBranchInfo>,
    commit: Option<BitbucketHash>,
    repository: Option<BitbucketRepoName>,
}

#[derive(Debug, Deserialize)]
struct BitbucketBranchInfo {
    name: Option<String>,
}

impl From<BitbucketPRBranch> for PullRequestEndpoint {
    fn from(side: BitbucketPRBranch) -> Self {
        PullRequestEndpoint {
            branch: side.branch.and_then(|b| b.name),
            commit: side.commit.and_then(|c| c.hash),
            repository: side.repository.map(|r| r.full_name),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BitbucketParticipant {
    user: Option<BitbucketUser>,
    role: Option<String>,
    #[serde(default)]
    approved: bool,
}

#[derive(Debug, Deserialize)]
struct BitbucketPullRequest {
    id: u64,
    title: String,
    description: Option<String>,
    state: String,
    author: Option<BitbucketUser>,
    created_on: DateTime<Utc>,
    updated_on: Option<DateTime<Utc>>,
    source: BitbucketPRBranch,
    destination: BitbucketPRBranch,
    merge_commit: Option<BitbucketHash>,
    #[serde(default)]
    participants: Vec<BitbucketParticipant>,
    #[serde(default)]
    reviewers: Vec<BitbucketUser>,
}

#[derive(Debug, Deserialize)]
struct BitbucketApproval {
    date: DateTime<Utc>,
    user: Option<BitbucketUser>,
}

#[derive(Debug, Deserialize)]
struct BitbucketUpdate {
    date: DateTime<Utc>,
    author: Option<BitbucketUser>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BitbucketActivity {
    approval: Option<BitbucketApproval>,
    update: Option<BitbucketUpdate>,
}

/// Source adapter reading one Bitbucket repository.
pub struct BitbucketClient {
    client: Client,
    username: String,
    app_password: String,
    repo_url: Url,
    repository: String,
    retry: RetryPolicy,
}

impl BitbucketClient {
    /// Create a new Bitbucket client.
    ///
    /// # Arguments
    ///
    /// * `api_url` - Bitbucket API root, e.g. `https://api.bitbucket.org/2.0`
    /// * `repository` - `workspace/repo`
    /// * `username` - Bitbucket username
    /// * `app_password` - Bitbucket app password
    pub fn new(api_url: &str, repository: &str, username: &str, app_password: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent("bbgh-migrate")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| MigrationError::NetworkError(e.to_string()))?;

        let repo_url = Url::parse(&format!(
            "{}/repositories/{repository}/",
            api_url.trim_end_matches('/')
        ))
        .map_err(|e| MigrationError::InvalidConfig(format!("Bitbucket API URL: {e}")))?;

        Ok(Self {
            client,
            username: username.to_string(),
            app_password: app_password.to_string(),
            repo_url,
            repository: repository.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Full name of the repository this client reads.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Url {
        let mut url = self.repo_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.app_password))
            .send()
            .await
            .map_err(|e| MigrationError::NetworkError(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(MigrationError::NotFound(url.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                MigrationError::AuthenticationFailed("Invalid Bitbucket credentials".to_string()),
            ),
            status if status.is_success() => Ok(response),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(MigrationError::ApiError {
                    status: status.as_u16(),
                    message: format!("Bitbucket API error: {body}"),
                })
            }
        }
    }

    async fn bitbucket_get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.retry
            .execute(|| async {
                let response = self.send(url).await?;
                let status = response.status().as_u16();
                response.json().await.map_err(|e| MigrationError::ApiError {
                    status,
                    message: format!("Invalid Bitbucket response: {e}"),
                })
            })
            .await
    }

    async fn bitbucket_get_paginated<T: DeserializeOwned>(&self, initial_url: Url) -> Result<Vec<T>> {
        let mut all_items = Vec::new();
        let mut url = Some(initial_url.to_string());

        while let Some(current_url) = url {
            debug!(url = %current_url, "Fetching Bitbucket page");
            let page: BitbucketPaginated<T> = self.bitbucket_get(&current_url).await?;
            all_items.extend(page.values);
            url = page.next;
        }

        Ok(all_items)
    }

    /// Decode one entity payload; failures are per-entity.
    async fn fetch_entity<T: DeserializeOwned>(&self, reference: EntityRef, url: Url) -> Result<T> {
        let value: serde_json::Value = self.bitbucket_get(url.as_str()).await?;
        serde_json::from_value(value).map_err(|e| MigrationError::MalformedSourceEntity {
            reference: reference.to_string(),
            reason: e.to_string(),
        })
    }

    async fn fetch_comments(&self, kind: &str, id: u64) -> Result<Vec<Activity>> {
        let url = self.endpoint(&[kind, &id.to_string(), "comments"], &[]);
        let comments: Vec<BitbucketComment> = self.bitbucket_get_paginated(url).await?;

        Ok(comments.into_iter().filter_map(comment_activity).collect())
    }

    async fn fetch_issue_changes(&self, id: u64) -> Result<Vec<Activity>> {
        let url = self.endpoint(&["issues", &id.to_string(), "changes"], &[]);
        let changes: Vec<BitbucketChange> = self.bitbucket_get_paginated(url).await?;

        Ok(changes.into_iter().filter_map(change_activity).collect())
    }

    async fn fetch_issue_attachments(&self, id: u64) -> Result<Vec<Attachment>> {
        let url = self.endpoint(&["issues", &id.to_string(), "attachments"], &[]);
        let attachments: Vec<BitbucketNamed> = self.bitbucket_get_paginated(url).await?;

        Ok(attachments
            .into_iter()
            .map(|a| Attachment { name: a.name })
            .collect())
    }

    async fn fetch_pull_request_activity(&self, id: u64) -> Result<Vec<Activity>> {
        let url = self.endpoint(&["pullrequests", &id.to_string(), "activity"], &[]);
        let activity: Vec<BitbucketActivity> = self.bitbucket_get_paginated(url).await?;

        Ok(pull_request_events(activity))
    }
}

fn comment_activity(comment: BitbucketComment) -> Option<Activity> {
    if comment.deleted {
        return None;
    }
    let text = comment.content.and_then(|c| c.raw)?;

    Some(Activity {
        key: format!("comment-{}", comment.id),
        author: comment.user.map(Into::into),
        created_on: comment.created_on,
        payload: ActivityPayload::Comment {
            text,
            inline: comment.inline.map(|i| InlineLocation {
                path: i.path,
                from: i.from,
                to: i.to,
                outdated: i.outdated,
            }),
        },
    })
}

fn change_value(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn change_activity(change: BitbucketChange) -> Option<Activity> {
    let fields: Vec<FieldChange> = change
        .changes
        .into_iter()
        .filter(|(field, _)| field != "assignee_account_id")
        .map(|(field, value)| FieldChange {
            field,
            old: change_value(value.old),
            new: change_value(value.new),
        })
        .collect();

    if fields.is_empty() {
        return None;
    }

    Some(Activity {
        key: format!("change-{}", change.id),
        author: change.user.map(Into::into),
        created_on: change.created_on,
        payload: ActivityPayload::Changes(fields),
    })
}

/// Approvals and real state transitions, oldest first.
fn pull_request_events(activity: Vec<BitbucketActivity>) -> Vec<Activity> {
    let mut approvals = Vec::new();
    let mut updates = Vec::new();

    for entry in activity {
        if let Some(approval) = entry.approval {
            let who = approval
                .user
                .as_ref()
                .and_then(|u| u.nickname.clone())
                .unwrap_or_else(|| "deleted".to_string());
            approvals.push(Activity {
                key: format!("approval-{}-{who}", approval.date.timestamp()),
                author: approval.user.map(Into::into),
                created_on: approval.date,
                payload: ActivityPayload::Approval,
            });
        } else if let Some(update) = entry.update {
            if let Some(state) = update.state {
                updates.push((update.date, update.author, state));
            }
        }
    }

    // Bitbucket emits an update on every push; keep transitions only.
    updates.sort_by_key(|(date, _, _)| *date);
    let mut previous: Option<String> = None;
    let mut used_keys: HashMap<String, usize> = HashMap::new();
    let mut events = approvals;
    for (date, author, state) in updates {
        let changed = previous.as_deref().is_some_and(|p| p != state);
        if changed {
            // Timestamps have second resolution; repeats get a sequence suffix.
            let base = format!("update-{}-{}", date.timestamp(), state.to_lowercase());
            let seen = used_keys.entry(base.clone()).or_insert(0);
            let key = if *seen == 0 {
                base
            } else {
                format!("{base}-{seen}")
            };
            *seen += 1;
            events.push(Activity {
                key,
                author: author.map(Into::into),
                created_on: date,
                payload: ActivityPayload::StateUpdate {
                    state: state.clone(),
                },
            });
        }
        previous = Some(state);
    }

    events
}

#[async_trait]
impl SourceForge for BitbucketClient {
    async fn issue_ids(&self) -> Result<Vec<u64>> {
        let url = self.endpoint(&["issues"], &[("fields", "values.id,next"), ("pagelen", "50")]);
        match self.bitbucket_get_paginated::<BitbucketId>(url).await {
            Ok(ids) => {
                let mut ids: Vec<u64> = ids.into_iter().map(|i| i.id).collect();
                ids.sort_unstable();
                Ok(ids)
            }
            Err(MigrationError::NotFound(_)) => {
                info!(repository = %self.repository, "Issue tracker not enabled, skipping issues");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_issue(&self, id: u64) -> Result<SourceEntity> {
        let reference = EntityRef::issue(id);
        let issue: BitbucketIssue = self
            .fetch_entity(reference, self.endpoint(&["issues", &id.to_string()], &[]))
            .await?;

        let mut activities = self.fetch_comments("issues", id).await?;
        activities.extend(self.fetch_issue_changes(id).await?);
        sort_activities(&mut activities);

        let attachments = self.fetch_issue_attachments(id).await?;

        Ok(SourceEntity {
            reference: EntityRef::issue(issue.id),
            title: issue.title,
            body: issue.content.and_then(|c| c.raw).unwrap_or_default(),
            author: issue.reporter.map(Into::into),
            assignee: issue.assignee.map(Into::into),
            state: issue.state,
            issue_kind: issue.kind,
            priority: issue.priority,
            component: issue.component.map(|c| c.name),
            created_on: issue.created_on,
            updated_on: issue.updated_on.unwrap_or(issue.created_on),
            activities,
            attachments,
            pull_request: None,
        })
    }

    async fn pull_request_ids(&self) -> Result<Vec<u64>> {
        let url = self.endpoint(
            &["pullrequests"],
            &[
                ("state", "MERGED"),
                ("state", "SUPERSEDED"),
                ("state", "OPEN"),
                ("state", "DECLINED"),
                ("fields", "values.id,next"),
                ("pagelen", "50"),
            ],
        );
        let mut ids: Vec<u64> = self
            .bitbucket_get_paginated::<BitbucketId>(url)
            .await?
            .into_iter()
            .map(|i| i.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn fetch_pull_request(&self, id: u64) -> Result<SourceEntity> {
        let reference = EntityRef::pull_request(id);
        let pull: BitbucketPullRequest = self
            .fetch_entity(reference, self.endpoint(&["pullrequests", &id.to_string()], &[]))
            .await?;

        let mut activities = self.fetch_comments("pullrequests", id).await?;
        activities.extend(self.fetch_pull_request_activity(id).await?);
        sort_activities(&mut activities);

        let details = PullRequestDetails {
            source: pull.source.into(),
            destination: pull.destination.into(),
            merge_commit: pull.merge_commit.and_then(|c| c.hash),
            participants: pull
                .participants
                .into_iter()
                .map(|p| Participant {
                    user: p.user.map(Into::into),
                    reviewer: p.role.as_deref() == Some("REVIEWER"),
                    approved: p.approved,
                })
                .collect(),
            reviewers: pull.reviewers.into_iter().map(Into::into).collect(),
        };

        Ok(SourceEntity {
            reference: EntityRef {
                kind: EntityKind::PullRequest,
                id: pull.id,
            },
            title: pull.title,
            body: pull.description.unwrap_or_default(),
            author: pull.author.map(Into::into),
            assignee: None,
            state: pull.state,
            issue_kind: None,
            priority: None,
            component: None,
            created_on: pull.created_on,
            updated_on: pull.updated_on.unwrap_or(pull.created_on),
            activities,
            attachments: Vec::new(),
            pull_request: Some(details),
        })
    }

    async fn attachment_content(&self, owner: EntityRef, name: &str) -> Result<Vec<u8>> {
        let kind = match owner.kind {
            EntityKind::Issue => "issues",
            EntityKind::PullRequest => "pullrequests",
        };
        let url = self.endpoint(&[kind, &owner.id.to_string(), "attachments", name], &[]);

        self.retry
            .execute(|| async {
                let response = self.send(url.as_str()).await?;
                response
                    .bytes()
                    .await
                    .map(|b| b.to_vec())
                    .map_err(|e| MigrationError::NetworkError(e.to_string()))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> BitbucketClient {
        BitbucketClient::new(&server.uri(), "team/app", "user", "pass")
            .unwrap()
            .with_retry(RetryPolicy::immediate(3))
    }

    fn page(values: serde_json::Value) -> serde_json::Value {
        json!({ "values": values })
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let client = BitbucketClient::new("https://api.bitbucket.org/2.0/", "team/app", "u", "p").unwrap();
        let url = client.endpoint(&["issues", "3", "attachments", "my file.png"], &[]);
        assert_eq!(
            url.as_str(),
            "https://api.bitbucket.org/2.0/repositories/team/app/issues/3/attachments/my%20file.png"
        );
    }

    #[tokio::test]
    async fn test_issue_ids_follow_pagination() {
        let server = MockServer::start().await;
        let second = format!("{}/repositories/team/app/issues?page=2", server.uri());

        Mock::given(method("GET"))
            .and(path("/repositories/team/app/issues"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([{ "id": 1 }]))))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repositories/team/app/issues"))
            .and(query_param("pagelen", "50"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "values": [{ "id": 3 }, { "id": 2 }], "next": second })),
            )
            .mount(&server)
            .await;

        let ids = client(&server).await.issue_ids().await.unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_disabled_issue_tracker_yields_no_issues() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repositories/team/app/issues"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client(&server).await.issue_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_issue_with_activities() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repositories/team/app/issues/12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 12,
                "title": "Crash on start",
                "content": { "raw": "It crashes." },
                "state": "open",
                "kind": "bug",
                "priority": "major",
                "component": null,
                "reporter": { "nickname": "jdoe", "display_name": "John" },
                "assignee": null,
                "created_on": "2020-01-01T10:00:00.000000+00:00",
                "updated_on": "2020-01-02T10:00:00+00:00"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repositories/team/app/issues/12/comments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([
                { "id": 8, "content": { "raw": "second" }, "user": null,
                  "created_on": "2020-01-03T00:00:00+00:00" },
                { "id": 7, "content": { "raw": "first" }, "user": { "nickname": "alice" },
                  "created_on": "2020-01-01T11:00:00+00:00" },
                { "id": 9, "content": { "raw": null }, "user": null,
                  "created_on": "2020-01-04T00:00:00+00:00" }
            ]))))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repositories/team/app/issues/12/changes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([
                { "id": 4, "created_on": "2020-01-02T00:00:00+00:00", "user": { "nickname": "jdoe" },
                  "changes": { "state": { "old": "new", "new": "open" } } },
                { "id": 5, "created_on": "2020-01-02T01:00:00+00:00", "user": null,
                  "changes": { "assignee_account_id": { "old": "", "new": "abc" } } }
            ]))))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repositories/team/app/issues/12/attachments"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page(json!([{ "name": "trace.log" }]))),
            )
            .mount(&server)
            .await;

        let issue = client(&server).await.fetch_issue(12).await.unwrap();

        assert_eq!(issue.reference, EntityRef::issue(12));
        assert_eq!(issue.issue_kind.as_deref(), Some("bug"));
        assert_eq!(issue.author.unwrap().nickname.as_deref(), Some("jdoe"));
        assert_eq!(issue.attachments, vec![Attachment { name: "trace.log".to_string() }]);

        let keys: Vec<_> = issue.activities.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, vec!["comment-7", "change-4", "comment-8"]);
    }

    #[tokio::test]
    async fn test_malformed_issue_is_reported_per_entity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repositories/team/app/issues/5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 5,
                "state": "open",
                "created_on": "2020-01-01T10:00:00+00:00"
            })))
            .mount(&server)
            .await;

        let err = client(&server).await.fetch_issue(5).await.unwrap_err();
        assert!(matches!(
            err,
            MigrationError::MalformedSourceEntity { ref reference, .. } if reference == "issue#5"
        ));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repositories/team/app/pullrequests"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repositories/team/app/pullrequests"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([{ "id": 4 }]))))
            .mount(&server)
            .await;

        let ids = client(&server).await.pull_request_ids().await.unwrap();
        assert_eq!(ids, vec![4]);
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server).await.pull_request_ids().await.unwrap_err();
        assert!(matches!(err, MigrationError::AuthenticationFailed(_)));
    }

    #[test]
    fn test_transitions_in_the_same_second_get_distinct_keys() {
        let activity: Vec<BitbucketActivity> = serde_json::from_value(json!([
            { "update": { "date": "2020-01-01T00:00:00+00:00", "author": null, "state": "OPEN" } },
            { "update": { "date": "2020-01-02T00:00:00.100+00:00", "author": null, "state": "DECLINED" } },
            { "update": { "date": "2020-01-02T00:00:00.400+00:00", "author": null, "state": "OPEN" } },
            { "update": { "date": "2020-01-02T00:00:00.700+00:00", "author": null, "state": "DECLINED" } }
        ]))
        .unwrap();

        let events = pull_request_events(activity);
        let keys: Vec<_> = events.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "update-1577923200-declined",
                "update-1577923200-open",
                "update-1577923200-declined-1",
            ]
        );
    }

    #[test]
    fn test_pull_request_events_keep_transitions_only() {
        let activity: Vec<BitbucketActivity> = serde_json::from_value(json!([
            { "update": { "date": "2020-01-03T00:00:00+00:00", "author": null, "state": "MERGED" } },
            { "approval": { "date": "2020-01-02T12:00:00+00:00", "user": { "nickname": "bob" } } },
            { "update": { "date": "2020-01-02T00:00:00+00:00", "author": null, "state": "OPEN" } },
            { "update": { "date": "2020-01-01T00:00:00+00:00", "author": null, "state": "OPEN" } },
            { "comment": { "id": 1 } }
        ]))
        .unwrap();

        let mut events = pull_request_events(activity);
        sort_activities(&mut events);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload, ActivityPayload::Approval);
        assert_eq!(
            events[1].payload,
            ActivityPayload::StateUpdate {
                state: "MERGED".to_string()
            }
        );
    }
}
