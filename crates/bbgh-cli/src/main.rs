//! bbgh - migrate Bitbucket issues and pull requests to GitHub.

use anyhow::{Context, Result};
use bbgh_migrate::{
    ConsoleProgressReporter, Credentials, IdentityMode, MigrationDriver, MigrationOptions,
    MigrationProgress, MigrationReport, Settings,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

mod logging;

use logging::LogFormat;

/// Migrate Bitbucket repositories to GitHub. Safe to re-run.
#[derive(Parser, Debug)]
#[command(name = "bbgh")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Bitbucket repositories to migrate (workspace/repo)
    #[arg(required = true)]
    repositories: Vec<String>,

    /// YAML file with user, repository and label mappings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mirror the git repository before migrating discussions (default)
    #[arg(long, overrides_with = "no_clone")]
    clone: bool,
    #[arg(long, overrides_with = "clone", hide = true)]
    no_clone: bool,

    /// Migrate issues (default)
    #[arg(long, overrides_with = "no_migrate_issues")]
    migrate_issues: bool,
    #[arg(long, overrides_with = "migrate_issues", hide = true)]
    no_migrate_issues: bool,

    /// Migrate pull requests (default)
    #[arg(long, overrides_with = "no_migrate_pull_requests")]
    migrate_pull_requests: bool,
    #[arg(long, overrides_with = "migrate_pull_requests", hide = true)]
    no_migrate_pull_requests: bool,

    /// Only migrate these issue ids (comma separated)
    #[arg(long, value_delimiter = ',')]
    specific_issues: Vec<u64>,

    /// Only migrate these pull request ids (comma separated)
    #[arg(long, value_delimiter = ',')]
    specific_pulls: Vec<u64>,

    /// Report what would change without writing to GitHub
    #[arg(long, overrides_with = "no_dry_run")]
    dry_run: bool,
    #[arg(long, overrides_with = "dry_run", hide = true)]
    no_dry_run: bool,

    /// Update entities that were already migrated (default)
    #[arg(long, overrides_with = "no_update")]
    update: bool,
    #[arg(long, overrides_with = "update", hide = true)]
    no_update: bool,

    /// Do not upload attachments
    #[arg(long, overrides_with = "no_skip_attachments")]
    skip_attachments: bool,
    #[arg(long, overrides_with = "skip_attachments", hide = true)]
    no_skip_attachments: bool,

    /// How unmapped Bitbucket users are handled (strict or lenient)
    #[arg(long, default_value = "lenient")]
    identity_mode: IdentityMode,

    /// GitHub personal access token
    #[arg(long, env = "GITHUB_ACCESS_TOKEN", hide_env_values = true)]
    github_access_token: Option<String>,

    /// Bitbucket username
    #[arg(long, env = "BITBUCKET_USERNAME")]
    bitbucket_username: Option<String>,

    /// Bitbucket app password
    #[arg(long, env = "BITBUCKET_PASSWORD", hide_env_values = true)]
    bitbucket_password: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

/// Resolve a `--flag`/`--no-flag` pair; the last one given wins.
fn switch(on: bool, off: bool, default: bool) -> bool {
    if on {
        true
    } else if off {
        false
    } else {
        default
    }
}

impl Cli {
    fn options(&self) -> MigrationOptions {
        let defaults = MigrationOptions::default();
        let mut options = MigrationOptions::default()
            .with_clone(switch(self.clone, self.no_clone, defaults.clone))
            .with_issues(switch(
                self.migrate_issues,
                self.no_migrate_issues,
                defaults.migrate_issues,
            ))
            .with_pull_requests(switch(
                self.migrate_pull_requests,
                self.no_migrate_pull_requests,
                defaults.migrate_pull_requests,
            ))
            .with_dry_run(switch(self.dry_run, self.no_dry_run, defaults.dry_run))
            .with_update(switch(self.update, self.no_update, defaults.update))
            .with_skip_attachments(switch(
                self.skip_attachments,
                self.no_skip_attachments,
                defaults.skip_attachments,
            ))
            .with_identity_mode(self.identity_mode);

        if !self.specific_issues.is_empty() {
            options = options.with_specific_issues(self.specific_issues.iter().copied());
        }
        if !self.specific_pulls.is_empty() {
            options = options.with_specific_pulls(self.specific_pulls.iter().copied());
        }
        options
    }

    fn credentials(&self) -> Credentials {
        Credentials {
            bitbucket_username: self.bitbucket_username.clone().unwrap_or_default(),
            bitbucket_password: self.bitbucket_password.clone().unwrap_or_default(),
            github_token: self.github_access_token.clone().unwrap_or_default(),
        }
    }
}

async fn run(cli: &Cli) -> Result<MigrationReport> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Settings::default(),
    };
    let options = cli.options();

    let reporter = ConsoleProgressReporter::new();
    let progress = Arc::new(MigrationProgress::with_callback(reporter.callback()));
    let driver = MigrationDriver::new(Arc::new(settings), cli.credentials())
        .context("Invalid migration setup")?
        .with_progress(progress);

    let report = driver.run(&cli.repositories, &options).await;
    reporter.finish();
    report.context("Migration could not start")
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(logging::level_for(cli.verbose), cli.log_format);
    tracing::info!(version = bbgh_migrate::VERSION, "Starting bbgh");

    match run(&cli).await {
        // Entity failures are in the summary; they do not change the exit code.
        Ok(report) => {
            report.print_summary();
            if !report.is_successful() {
                tracing::warn!("Migration finished with failures");
            }
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bbgh").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let options = parse(&["team/app"]).options();
        let defaults = MigrationOptions::default();

        assert_eq!(options.clone, defaults.clone);
        assert!(options.migrate_issues);
        assert!(options.migrate_pull_requests);
        assert!(options.update);
        assert!(!options.dry_run);
        assert!(!options.skip_attachments);
        assert!(options.specific_issues.is_none());
        assert_eq!(options.identity_mode, IdentityMode::Lenient);
    }

    #[test]
    fn test_negated_flags() {
        let options = parse(&[
            "team/app",
            "--no-clone",
            "--no-migrate-pull-requests",
            "--no-update",
            "--dry-run",
            "--skip-attachments",
        ])
        .options();

        assert!(!options.clone);
        assert!(!options.migrate_pull_requests);
        assert!(!options.update);
        assert!(options.dry_run);
        assert!(options.skip_attachments);
    }

    #[test]
    fn test_last_flag_wins() {
        let options = parse(&["team/app", "--dry-run", "--no-dry-run"]).options();
        assert!(!options.dry_run);

        let options = parse(&["team/app", "--no-clone", "--clone"]).options();
        assert!(options.clone);
    }

    #[test]
    fn test_specific_ids() {
        let options = parse(&["team/app", "--specific-issues", "12,47", "--specific-pulls", "3"])
            .options();

        assert_eq!(
            options.specific_issues.map(|ids| ids.into_iter().collect::<Vec<_>>()),
            Some(vec![12, 47])
        );
        assert_eq!(
            options.specific_pulls.map(|ids| ids.into_iter().collect::<Vec<_>>()),
            Some(vec![3])
        );
    }

    #[test]
    fn test_identity_mode_and_log_format() {
        let cli = parse(&["team/app", "--identity-mode", "strict", "--log-format", "json", "-vv"]);

        assert_eq!(cli.options().identity_mode, IdentityMode::Strict);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_repository_required() {
        assert!(Cli::try_parse_from(["bbgh"]).is_err());
    }
}
