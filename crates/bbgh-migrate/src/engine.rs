//! Idempotent reconciliation of one source entity with the target.
//!
//! For every Bitbucket issue or pull request the engine looks up the
//! GitHub entity whose title carries the entity's marker, then either
//! creates it, leaves it alone, or brings its labels, state and comments
//! up to date. Nothing here mutates the target while dry-run is active.

use crate::attachments::{AttachmentRelocator, RelocatedAttachments};
use crate::config::Settings;
use crate::error::Result;
use crate::forge::{
    BlobHost, IssueState, IssueUpdate, NewIssue, NewPullRequest, SourceForge, TargetForge,
    TargetIssue,
};
use crate::identity::IdentityResolver;
use crate::labels::{LabelMapper, LabelRegistry};
use crate::ledger::{CommentScanLedger, ReplayLedger};
use crate::marker::CrossReferenceMarker;
use crate::model::{Activity, SourceEntity};
use crate::render::{LinkRewriter, Renderer};
use crate::types::{EntityRecord, MigrationOptions, Outcome};

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bitbucket pull request state that merges the GitHub pull request.
const MERGED_STATE: &str = "MERGED";

/// Target issues and pull requests of one repository, listed once per run.
#[derive(Debug, Clone, Default)]
pub struct TargetIndex {
    issues: Vec<TargetIssue>,
}

impl TargetIndex {
    pub fn new(mut issues: Vec<TargetIssue>) -> Self {
        issues.sort_by_key(|i| i.number);
        Self { issues }
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Target entity whose title contains `marker`, lowest number first.
    pub fn find(&self, marker: &CrossReferenceMarker) -> Option<&TargetIssue> {
        let mut matches = self.issues.iter().filter(|i| marker.is_in(&i.title));
        let first = matches.next()?;
        if let Some(duplicate) = matches.next() {
            warn!(
                marker = %marker,
                number = first.number,
                duplicate = duplicate.number,
                "Marker found on more than one target entity, using the first"
            );
        }
        Some(first)
    }

    fn upsert(&mut self, issue: TargetIssue) {
        match self.issues.iter_mut().find(|i| i.number == issue.number) {
            Some(existing) => *existing = issue,
            None => {
                let at = self.issues.partition_point(|i| i.number < issue.number);
                self.issues.insert(at, issue);
            }
        }
    }
}

/// Adapters one reconciler talks to.
#[derive(Clone, Copy)]
pub struct Forges<'a> {
    pub source: &'a dyn SourceForge,
    pub target: &'a dyn TargetForge,
    pub blobs: &'a dyn BlobHost,
}

/// Per-repository reconciliation engine.
///
/// Holds the per-run caches (labels, attachments, target index), so one
/// instance must process the entities of a repository sequentially.
pub struct Reconciler<'a> {
    forges: Forges<'a>,
    settings: Arc<Settings>,
    dry_run: bool,
    update: bool,
    renderer: Renderer,
    mapper: LabelMapper,
    labels: LabelRegistry,
    attachments: AttachmentRelocator,
    ledger: Box<dyn ReplayLedger + 'a>,
    index: TargetIndex,
}

/// What the target should look like for one source entity.
struct Desired {
    labels: BTreeSet<String>,
    state: IssueState,
    assignees: Vec<String>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        forges: Forges<'a>,
        settings: Arc<Settings>,
        options: &MigrationOptions,
        github_repo: &str,
        index: TargetIndex,
    ) -> Self {
        let identity = IdentityResolver::new(settings.clone(), options.identity_mode);
        let renderer = Renderer::new(identity, LinkRewriter::new(&settings), github_repo);

        Self {
            forges,
            dry_run: options.dry_run,
            update: options.update,
            renderer,
            mapper: LabelMapper::new(settings.clone()),
            labels: LabelRegistry::new(settings.clone()),
            attachments: AttachmentRelocator::new(
                github_repo,
                options.skip_attachments,
                options.dry_run,
            ),
            ledger: Box::new(CommentScanLedger),
            index,
            settings,
        }
    }

    /// Replace the activity ledger.
    pub fn with_ledger(mut self, ledger: impl ReplayLedger + 'a) -> Self {
        self.ledger = Box::new(ledger);
        self
    }

    pub fn index(&self) -> &TargetIndex {
        &self.index
    }

    /// Reconcile one entity. Failures are captured in the record.
    pub async fn reconcile(&mut self, entity: &SourceEntity) -> EntityRecord {
        let mut warnings = Vec::new();
        let outcome = match self.try_reconcile(entity, &mut warnings).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    kind = %entity.reference.kind,
                    id = entity.reference.id,
                    error = %e,
                    "Failed to migrate entity"
                );
                Outcome::Failed {
                    category: e.category().to_string(),
                    reason: e.to_string(),
                }
            }
        };

        EntityRecord {
            reference: entity.reference,
            outcome,
            warnings,
        }
    }

    async fn try_reconcile(
        &mut self,
        entity: &SourceEntity,
        warnings: &mut Vec<String>,
    ) -> Result<Outcome> {
        let marker = CrossReferenceMarker::new(entity.reference);

        let existing = self.index.find(&marker).cloned();
        if let Some(existing) = &existing {
            if !self.update {
                info!(marker = %marker, number = existing.number, "Already migrated, skipping");
                return Ok(Outcome::Skipped {
                    number: existing.number,
                });
            }
        }

        self.check_identities(entity)?;
        let desired = self.desired(entity);
        self.labels
            .ensure(self.forges.target, &desired.labels, self.dry_run)
            .await?;

        match existing {
            None => self.create(entity, &marker, desired, warnings).await,
            Some(existing) => self.refresh(entity, &marker, existing, desired, warnings).await,
        }
    }

    /// Strict mode fails the entity here, before anything is written.
    fn check_identities(&self, entity: &SourceEntity) -> Result<()> {
        let identity = self.renderer.identity();
        identity.require(entity.author.as_ref())?;
        identity.require(entity.assignee.as_ref())?;
        for activity in &entity.activities {
            identity.require(activity.author.as_ref())?;
        }
        if let Some(details) = &entity.pull_request {
            for reviewer in &details.reviewers {
                identity.require(Some(reviewer))?;
            }
        }
        Ok(())
    }

    fn desired(&self, entity: &SourceEntity) -> Desired {
        let labels = self.mapper.labels(
            &entity.state,
            entity.issue_kind.as_deref(),
            entity.priority.as_deref(),
            entity.component.as_deref(),
            entity.is_pull_request(),
        );
        let state = if self.settings.is_open_state(&entity.state) {
            IssueState::Open
        } else {
            IssueState::Closed
        };
        // Pull requests are assigned to their author.
        let assignee = if entity.is_pull_request() {
            entity.author.as_ref()
        } else {
            entity.assignee.as_ref()
        };
        let assignees = self.renderer.identity().login(assignee).into_iter().collect();

        Desired {
            labels,
            state,
            assignees,
        }
    }

    /// Branches of an open pull request that can become a GitHub pull request.
    fn pull_request_branches<'e>(&self, entity: &'e SourceEntity) -> Option<(&'e str, &'e str)> {
        let details = entity.pull_request.as_ref()?;
        if !self.settings.is_open_state(&entity.state) {
            return None;
        }
        let head = details.source.branch.as_deref();
        let base = details.destination.branch.as_deref();
        let same_repository = match (&details.source.repository, &details.destination.repository) {
            (Some(source), Some(destination)) => source == destination,
            _ => true,
        };

        match (head, base) {
            (Some(head), Some(base)) if same_repository => Some((head, base)),
            _ => {
                warn!(
                    id = entity.reference.id,
                    "Open pull request without usable source and destination branches, migrating as issue"
                );
                None
            }
        }
    }

    fn comment_body(
        &self,
        marker: &CrossReferenceMarker,
        activity: &Activity,
        attachments: &RelocatedAttachments,
    ) -> String {
        let body = attachments.rewrite(&self.renderer.activity_body(activity));
        format!("{body}{}", marker.activity(&activity.key).footer())
    }

    async fn create(
        &mut self,
        entity: &SourceEntity,
        marker: &CrossReferenceMarker,
        desired: Desired,
        warnings: &mut Vec<String>,
    ) -> Result<Outcome> {
        let attachments = self
            .attachments
            .relocate(self.forges.source, self.forges.blobs, entity)
            .await;
        warnings.extend(attachments.problems());

        let title = marker.decorate_title(&entity.title);
        let body = format!(
            "{}{}",
            attachments.rewrite(&self.renderer.entity_body(entity)),
            attachments.listing()
        );
        let comments: Vec<String> = entity
            .activities
            .iter()
            .map(|a| self.comment_body(marker, a, &attachments))
            .collect();

        if self.dry_run {
            info!(
                marker = %marker,
                title = %title,
                comments = comments.len(),
                "Would create target entity"
            );
            return Ok(Outcome::Created {
                number: None,
                activities_appended: comments.len(),
            });
        }

        let target = self.forges.target;
        let labels: Vec<String> = desired.labels.iter().cloned().collect();

        let mut created = match self.pull_request_branches(entity) {
            Some((head, base)) => {
                let pull = target
                    .create_pull_request(&NewPullRequest {
                        title,
                        body,
                        head: head.to_string(),
                        base: base.to_string(),
                    })
                    .await?;
                let update = IssueUpdate {
                    labels: Some(labels.clone()),
                    assignees: (!desired.assignees.is_empty()).then(|| desired.assignees.clone()),
                    ..Default::default()
                };
                target.update_issue(pull.number, &update).await?;
                self.request_reviewers(entity, pull.number, warnings).await;
                pull
            }
            None => {
                target
                    .create_issue(&NewIssue {
                        title,
                        body,
                        labels: labels.clone(),
                        assignees: desired.assignees.clone(),
                    })
                    .await?
            }
        };
        info!(marker = %marker, number = created.number, "Created target entity");

        created.labels = labels;
        if created.state != desired.state && !created.is_pull_request {
            let update = IssueUpdate {
                state: Some(desired.state),
                ..Default::default()
            };
            target.update_issue(created.number, &update).await?;
            created.state = desired.state;
        }
        let number = created.number;
        self.index.upsert(created);

        for body in &comments {
            target.create_comment(number, body).await?;
        }

        Ok(Outcome::Created {
            number: Some(number),
            activities_appended: comments.len(),
        })
    }

    async fn request_reviewers(&self, entity: &SourceEntity, number: u64, warnings: &mut Vec<String>) {
        let identity = self.renderer.identity();
        let author = identity.login(entity.author.as_ref());
        let reviewers: Vec<String> = entity
            .pull_request
            .iter()
            .flat_map(|d| d.reviewers.iter())
            .filter_map(|r| identity.login(Some(r)))
            .filter(|login| Some(login) != author.as_ref())
            .collect();
        if reviewers.is_empty() {
            return;
        }

        if let Err(e) = self.forges.target.request_reviewers(number, &reviewers).await {
            warn!(number, error = %e, "Could not request reviewers");
            warnings.push(format!("reviewers not requested: {e}"));
        }
    }

    async fn refresh(
        &mut self,
        entity: &SourceEntity,
        marker: &CrossReferenceMarker,
        mut existing: TargetIssue,
        desired: Desired,
        warnings: &mut Vec<String>,
    ) -> Result<Outcome> {
        let target = self.forges.target;
        let number = existing.number;

        let current: BTreeSet<String> = existing.labels.iter().cloned().collect();
        let labels_changed = current != desired.labels;
        let state_changed = existing.state != desired.state;
        let merge = state_changed
            && existing.is_pull_request
            && desired.state == IssueState::Closed
            && entity.state == MERGED_STATE;

        let update = IssueUpdate {
            labels: labels_changed.then(|| desired.labels.iter().cloned().collect()),
            state: (state_changed && !merge).then_some(desired.state),
            ..Default::default()
        };

        let plan = self
            .ledger
            .replay_plan(target, number, marker, &entity.activities)
            .await?;
        for key in &plan.missing_before {
            warn!(marker = %marker, activity = %key, "Earlier activity missing on target, not replaying it");
            warnings.push(format!("activity {key} missing on target"));
        }
        let pending = plan.pending(&entity.activities);

        let comments: Vec<String> = if pending.is_empty() {
            Vec::new()
        } else {
            let attachments = self
                .attachments
                .relocate(self.forges.source, self.forges.blobs, entity)
                .await;
            warnings.extend(attachments.problems());
            pending
                .iter()
                .map(|a| self.comment_body(marker, a, &attachments))
                .collect()
        };

        if self.dry_run {
            info!(
                marker = %marker,
                number,
                labels_changed,
                state_changed,
                comments = comments.len(),
                "Would update target entity"
            );
        } else {
            if merge {
                target.merge_pull_request(number).await?;
                info!(number, "Merged pull request");
            }
            if !update.is_empty() {
                target.update_issue(number, &update).await?;
                debug!(number, ?update, "Updated target entity");
            }
            for body in &comments {
                target.create_comment(number, body).await?;
            }

            existing.labels = desired.labels.into_iter().collect();
            existing.state = desired.state;
            self.index.upsert(existing);
            info!(marker = %marker, number, appended = comments.len(), "Updated target entity");
        }

        Ok(Outcome::Updated {
            number,
            labels_changed,
            state_changed,
            activities_appended: comments.len(),
        })
    }
}
