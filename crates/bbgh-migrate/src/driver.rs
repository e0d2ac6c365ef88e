//! Migration driver: repositories in, report out.
//!
//! The driver validates the requested repositories, optionally mirrors
//! their git data, then hands every selected issue and pull request to a
//! [`Reconciler`]. It owns no migration logic of its own.

use crate::bitbucket::BitbucketClient;
use crate::config::Settings;
use crate::engine::{Forges, Reconciler, TargetIndex};
use crate::error::{MigrationError, Result};
use crate::github::GitHubClient;
use crate::mirror::RepositoryMirror;
use crate::model::{EntityRef, SourceEntity};
use crate::progress::{MigrationPhase, MigrationProgress};
use crate::retry::RetryPolicy;
use crate::types::{EntityRecord, MigrationOptions, MigrationReport, Outcome, RepositoryReport};

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Credentials for both forges.
#[derive(Clone)]
pub struct Credentials {
    pub bitbucket_username: String,
    pub bitbucket_password: String,
    pub github_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("bitbucket_username", &self.bitbucket_username)
            .finish_non_exhaustive()
    }
}

/// Runs a migration over a list of Bitbucket repositories.
pub struct MigrationDriver {
    settings: Arc<Settings>,
    credentials: Credentials,
    progress: Arc<MigrationProgress>,
    retry: RetryPolicy,
}

impl MigrationDriver {
    /// Create a driver. Settings are validated here.
    pub fn new(settings: Arc<Settings>, credentials: Credentials) -> Result<Self> {
        settings.validate()?;
        for (name, value) in [
            ("Bitbucket username", &credentials.bitbucket_username),
            ("Bitbucket password", &credentials.bitbucket_password),
            ("GitHub access token", &credentials.github_token),
        ] {
            if value.trim().is_empty() {
                return Err(MigrationError::InvalidConfig(format!("{name} is required")));
            }
        }

        Ok(Self {
            settings,
            credentials,
            progress: Arc::new(MigrationProgress::new()),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_progress(mut self, progress: Arc<MigrationProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// GitHub repository for each requested Bitbucket repository.
    ///
    /// Unknown repositories are a startup error: nothing is migrated.
    pub fn resolve_repositories(&self, repositories: &[String]) -> Result<Vec<(String, String)>> {
        if repositories.is_empty() {
            return Err(MigrationError::InvalidConfig(
                "No repository to migrate".to_string(),
            ));
        }
        repositories
            .iter()
            .map(|bb| match self.settings.github_repo_for(bb) {
                Some(gh) => Ok((bb.clone(), gh.to_string())),
                None => Err(MigrationError::InvalidConfig(format!(
                    "Repository '{bb}' has no entry in repo_mapping"
                ))),
            })
            .collect()
    }

    /// Migrate every repository. Only startup problems return `Err`.
    pub async fn run(
        &self,
        repositories: &[String],
        options: &MigrationOptions,
    ) -> Result<MigrationReport> {
        let pairs = self.resolve_repositories(repositories)?;
        let mut report = MigrationReport::new(options.dry_run);

        info!(
            repositories = pairs.len(),
            dry_run = options.dry_run,
            "Starting migration"
        );
        for (bitbucket_repo, github_repo) in pairs {
            let repo_report = self
                .migrate_repository(&bitbucket_repo, &github_repo, options)
                .await;
            report.repositories.push(repo_report);
        }

        self.progress.set_phase(MigrationPhase::Complete, 0);
        report.complete();
        Ok(report)
    }

    async fn migrate_repository(
        &self,
        bitbucket_repo: &str,
        github_repo: &str,
        options: &MigrationOptions,
    ) -> RepositoryReport {
        let mut report = RepositoryReport::new(bitbucket_repo, github_repo);
        info!(from = %bitbucket_repo, to = %github_repo, "Migrating repository");

        let clients = BitbucketClient::new(
            &self.settings.bitbucket_api_url,
            bitbucket_repo,
            &self.credentials.bitbucket_username,
            &self.credentials.bitbucket_password,
        )
        .and_then(|bb| {
            GitHubClient::new(
                &self.settings.github_api_url,
                github_repo,
                &self.credentials.github_token,
            )
            .map(|gh| (bb.with_retry(self.retry.clone()), gh.with_retry(self.retry.clone())))
        });
        let (bitbucket, github) = match clients {
            Ok(clients) => clients,
            Err(e) => {
                report.error = Some(e.to_string());
                return report;
            }
        };

        if options.clone {
            if options.dry_run {
                info!(repo = %github_repo, "Would mirror git repository");
            } else if let Err(e) = self.mirror(&github, bitbucket_repo, github_repo).await {
                warn!(repo = %bitbucket_repo, error = %e, "Mirroring failed, skipping discussions");
                report.error = Some(e.to_string());
                return report;
            } else {
                report.git_mirrored = true;
            }
        }

        let forges = Forges {
            source: &bitbucket,
            target: &github,
            blobs: &github,
        };
        if let Err(e) = migrate_discussions(
            forges,
            self.settings.clone(),
            options,
            github_repo,
            &self.progress,
            &mut report,
        )
        .await
        {
            warn!(repo = %bitbucket_repo, error = %e, "Repository migration aborted");
            report.error = Some(e.to_string());
        }

        report
    }

    async fn mirror(&self, github: &GitHubClient, bitbucket_repo: &str, github_repo: &str) -> Result<()> {
        self.progress.set_phase(MigrationPhase::Mirroring, 1);

        if !github.repository_exists().await? {
            info!(repo = %github_repo, "Creating GitHub repository");
            github
                .create_repository(&format!(
                    "Migrated from Bitbucket https://bitbucket.org/{bitbucket_repo}"
                ))
                .await?;
        }

        let mirror = RepositoryMirror::new(
            &self.credentials.bitbucket_username,
            &self.credentials.bitbucket_password,
            &self.credentials.github_token,
        );
        self.progress.message("cloning from Bitbucket");
        let stats = mirror.mirror(bitbucket_repo, github_repo).await?;
        info!(branches = stats.branches, tags = stats.tags, "Git repository mirrored");
        self.progress.increment(Some(github_repo));
        Ok(())
    }
}

/// Reconcile the issues and pull requests of one repository.
///
/// Per-entity failures are recorded in `report`; an `Err` means the
/// repository as a whole could not be processed (e.g. the target index
/// could not be listed).
pub async fn migrate_discussions(
    forges: Forges<'_>,
    settings: Arc<Settings>,
    options: &MigrationOptions,
    github_repo: &str,
    progress: &MigrationProgress,
    report: &mut RepositoryReport,
) -> Result<()> {
    progress.set_phase(MigrationPhase::Indexing, 1);
    let existing = match forges.target.list_issues().await {
        Ok(existing) => existing,
        // In a dry run the mirror step did not create the repository.
        Err(MigrationError::NotFound(_)) if options.dry_run && options.clone => {
            info!(repo = %github_repo, "GitHub repository does not exist yet");
            Vec::new()
        }
        Err(e) => return Err(e),
    };
    let index = TargetIndex::new(existing);
    info!(existing = index.len(), "Indexed GitHub issues and pull requests");
    progress.increment(Some(github_repo));

    let mut reconciler = Reconciler::new(forges, settings, options, github_repo, index);

    if options.migrate_issues {
        let ids = selected_ids(options.specific_issues.as_ref(), || forges.source.issue_ids()).await?;
        progress.set_phase(MigrationPhase::MigratingIssues, ids.len() as u64);
        for id in ids {
            let fetched = forges.source.fetch_issue(id).await;
            let record = reconcile_fetched(&mut reconciler, EntityRef::issue(id), fetched).await;
            finish(progress, report, record);
        }
    }

    if options.migrate_pull_requests {
        let ids =
            selected_ids(options.specific_pulls.as_ref(), || forges.source.pull_request_ids()).await?;
        progress.set_phase(MigrationPhase::MigratingPullRequests, ids.len() as u64);
        for id in ids {
            let fetched = forges.source.fetch_pull_request(id).await;
            let record =
                reconcile_fetched(&mut reconciler, EntityRef::pull_request(id), fetched).await;
            finish(progress, report, record);
        }
    }

    Ok(())
}

/// Explicit ids are used as given; only without a filter is the source listed.
async fn selected_ids<F, Fut>(specific: Option<&BTreeSet<u64>>, list: F) -> Result<Vec<u64>>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<u64>>>,
{
    match specific {
        Some(ids) => Ok(ids.iter().copied().collect()),
        None => list().await,
    }
}

async fn reconcile_fetched(
    reconciler: &mut Reconciler<'_>,
    reference: EntityRef,
    fetched: Result<SourceEntity>,
) -> EntityRecord {
    match fetched {
        Ok(entity) => reconciler.reconcile(&entity).await,
        Err(e) => {
            warn!(kind = %reference.kind, id = reference.id, error = %e, "Failed to fetch entity");
            EntityRecord {
                reference,
                outcome: Outcome::Failed {
                    category: e.category().to_string(),
                    reason: e.to_string(),
                },
                warnings: Vec::new(),
            }
        }
    }
}

fn finish(progress: &MigrationProgress, report: &mut RepositoryReport, record: EntityRecord) {
    let item = record.reference.to_string();
    if !matches!(record.outcome, Outcome::Failed { .. }) {
        info!(entity = %item, outcome = record.outcome.label(), "Reconciled");
    }
    report.record(record);
    progress.increment(Some(&item));
}
