//! Common types for migration operations.

use crate::model::{EntityKind, EntityRef};
use chrono::{DateTime, Utc};
use console::style;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How unmapped Bitbucket identities are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    /// Unmapped identity fails the owning entity.
    Strict,
    /// Unmapped identity is attributed inline and processing continues.
    #[default]
    Lenient,
}

impl std::str::FromStr for IdentityMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            other => Err(format!("unknown identity mode '{other}'")),
        }
    }
}

/// Options for controlling what gets migrated.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Ensure the GitHub repository exists and mirror the git data first.
    pub clone: bool,

    /// Migrate issues.
    pub migrate_issues: bool,

    /// Migrate pull requests.
    pub migrate_pull_requests: bool,

    /// Restrict issues to these ids (`None` means all).
    pub specific_issues: Option<BTreeSet<u64>>,

    /// Restrict pull requests to these ids (`None` means all).
    pub specific_pulls: Option<BTreeSet<u64>>,

    /// Report what would change without mutating anything.
    pub dry_run: bool,

    /// Update entities that were already migrated.
    pub update: bool,

    /// Do not upload attachments; substitute placeholders.
    pub skip_attachments: bool,

    pub identity_mode: IdentityMode,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            clone: true,
            migrate_issues: true,
            migrate_pull_requests: true,
            specific_issues: None,
            specific_pulls: None,
            dry_run: false,
            update: true,
            skip_attachments: false,
            identity_mode: IdentityMode::Lenient,
        }
    }
}

impl MigrationOptions {
    /// Enable or disable the clone/push step.
    pub fn with_clone(mut self, clone: bool) -> Self {
        self.clone = clone;
        self
    }

    /// Enable or disable issue migration.
    pub fn with_issues(mut self, migrate: bool) -> Self {
        self.migrate_issues = migrate;
        self
    }

    /// Enable or disable pull request migration.
    pub fn with_pull_requests(mut self, migrate: bool) -> Self {
        self.migrate_pull_requests = migrate;
        self
    }

    /// Restrict the issues visited.
    pub fn with_specific_issues(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.specific_issues = Some(ids.into_iter().collect());
        self
    }

    /// Restrict the pull requests visited.
    pub fn with_specific_pulls(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.specific_pulls = Some(ids.into_iter().collect());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    pub fn with_skip_attachments(mut self, skip: bool) -> Self {
        self.skip_attachments = skip;
        self
    }

    pub fn with_identity_mode(mut self, mode: IdentityMode) -> Self {
        self.identity_mode = mode;
        self
    }
}

/// Result of reconciling one source entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// A target entity was created (or would be, in dry-run).
    Created {
        /// GitHub number; `None` in dry-run.
        number: Option<u64>,
        activities_appended: usize,
    },
    /// An existing target entity was brought up to date.
    Updated {
        number: u64,
        labels_changed: bool,
        state_changed: bool,
        activities_appended: usize,
    },
    /// An existing target entity was left untouched.
    Skipped { number: u64 },
    /// The entity could not be migrated.
    Failed { category: String, reason: String },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Outcome for one entity, with its source reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub reference: EntityRef,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Non-fatal problems (missing attachments, unreplayable activities).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Report for one repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryReport {
    pub bitbucket_repo: String,
    pub github_repo: String,

    /// Whether the git data was mirrored in this run.
    pub git_mirrored: bool,

    /// Fatal error that stopped this repository, if any.
    pub error: Option<String>,

    pub entities: Vec<EntityRecord>,
}

impl RepositoryReport {
    pub fn new(bitbucket_repo: impl Into<String>, github_repo: impl Into<String>) -> Self {
        Self {
            bitbucket_repo: bitbucket_repo.into(),
            github_repo: github_repo.into(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, record: EntityRecord) {
        self.entities.push(record);
    }

    /// Number of records whose outcome has the given label.
    pub fn count(&self, outcome: &str) -> usize {
        self.entities
            .iter()
            .filter(|r| r.outcome.label() == outcome)
            .count()
    }

    pub fn count_kind(&self, kind: EntityKind, outcome: &str) -> usize {
        self.entities
            .iter()
            .filter(|r| r.reference.kind == kind && r.outcome.label() == outcome)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entities
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed { .. }))
    }
}

/// Report of a completed migration run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationReport {
    pub dry_run: bool,

    pub repositories: Vec<RepositoryReport>,

    /// Start time of migration.
    pub started_at: Option<DateTime<Utc>>,

    /// End time of migration.
    pub completed_at: Option<DateTime<Utc>>,
}

impl MigrationReport {
    /// Create a new empty report.
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Mark the migration as complete.
    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// No repository-level error and no failed entity.
    pub fn is_successful(&self) -> bool {
        self.repositories
            .iter()
            .all(|r| r.error.is_none() && r.count("failed") == 0)
    }

    /// Total entities with the given outcome across all repositories.
    pub fn total(&self, outcome: &str) -> usize {
        self.repositories.iter().map(|r| r.count(outcome)).sum()
    }

    /// Get the duration of the migration.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Print a summary of the migration.
    pub fn print_summary(&self) {
        println!("\n=== Migration Summary ===\n");
        if self.dry_run {
            println!("{}", style("DRY RUN: nothing was written to GitHub").yellow());
        }

        for repo in &self.repositories {
            println!("{} -> {}", repo.bitbucket_repo, repo.github_repo);
            println!(
                "  Git data mirrored:  {}",
                if repo.git_mirrored { "✓" } else { "-" }
            );
            if let Some(error) = &repo.error {
                println!("  {} {error}", style("[CRITICAL]").red());
                continue;
            }

            for kind in [EntityKind::Issue, EntityKind::PullRequest] {
                println!(
                    "  {:<14} created {}, updated {}, skipped {}, failed {}",
                    format!("{kind}s:"),
                    repo.count_kind(kind, "created"),
                    repo.count_kind(kind, "updated"),
                    repo.count_kind(kind, "skipped"),
                    repo.count_kind(kind, "failed"),
                );
            }

            for record in &repo.entities {
                let line = match &record.outcome {
                    Outcome::Created { number: Some(n), activities_appended } => {
                        format!("created #{n} ({activities_appended} activities)")
                    }
                    Outcome::Created { number: None, activities_appended } => {
                        format!("would create ({activities_appended} activities)")
                    }
                    Outcome::Updated {
                        number,
                        activities_appended,
                        ..
                    } => {
                        let verb = if self.dry_run { "would update" } else { "updated" };
                        format!("{verb} #{number} (+{activities_appended} activities)")
                    }
                    Outcome::Skipped { number } => format!("skipped #{number}"),
                    Outcome::Failed { category, reason } => {
                        format!("{} [{category}] {reason}", style("FAILED").red())
                    }
                };
                println!("    {:<10} {line}", record.reference.to_string());
                for warning in &record.warnings {
                    println!("               {} {warning}", style("warning:").yellow());
                }
            }
        }

        if let Some(duration) = self.duration() {
            println!("\nCompleted in {} seconds", duration.num_seconds());
        }

        let status = if self.is_successful() {
            style("SUCCESS").green()
        } else {
            style("COMPLETED WITH FAILURES").red()
        };
        println!("\nOverall Status: {status}");
    }
}
