//! # Bitbucket to GitHub Migration
//!
//! This crate migrates the issues, pull requests, comments, activity and
//! attachments of Bitbucket repositories to GitHub, and can be re-run
//! safely: every GitHub entity carries a marker pointing back at its
//! Bitbucket origin, so a second run updates instead of duplicating.
//!
//! ## Features
//!
//! - **Idempotent reconciliation**: create, skip or update per entity
//! - **Ordered activity replay**: only activities not yet on GitHub are appended
//! - **Label mapping**: state, kind, priority and component become labels
//! - **Attachment relocation**: files are published as gists and links rewritten
//! - **Pull requests**: open pull requests become GitHub pull requests
//! - **Dry run**: report what would change without writing anything
//!
//! ## Example
//!
//! ```rust,ignore
//! use bbgh_migrate::{Credentials, MigrationDriver, MigrationOptions, Settings};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::default().with_repo("team/app", "org/app");
//!     let credentials = Credentials {
//!         bitbucket_username: "jdoe".to_string(),
//!         bitbucket_password: "app-password".to_string(),
//!         github_token: "ghp_xxx".to_string(),
//!     };
//!
//!     let options = MigrationOptions::default()
//!         .with_clone(false)
//!         .with_dry_run(true);
//!
//!     let driver = MigrationDriver::new(Arc::new(settings), credentials)?;
//!     let report = driver.run(&["team/app".to_string()], &options).await?;
//!
//!     report.print_summary();
//!     Ok(())
//! }
//! ```

pub mod attachments;
pub mod bitbucket;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod forge;
pub mod github;
pub mod identity;
pub mod labels;
pub mod ledger;
pub mod marker;
pub mod mirror;
pub mod model;
pub mod progress;
pub mod render;
pub mod retry;
pub mod types;

// Re-export main types
pub use bitbucket::BitbucketClient;
pub use config::Settings;
pub use driver::{migrate_discussions, Credentials, MigrationDriver};
pub use engine::{Forges, Reconciler, TargetIndex};
pub use error::{MigrationError, Result};
pub use forge::{BlobHost, SourceForge, TargetForge};
pub use github::GitHubClient;
pub use marker::CrossReferenceMarker;
pub use progress::{ConsoleProgressReporter, MigrationPhase, MigrationProgress, ProgressCallback};
pub use retry::RetryPolicy;
pub use types::*;

/// Version of the migration tool.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
