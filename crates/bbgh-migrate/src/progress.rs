//! Progress tracking for migration runs.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Progress update information.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current phase of the run.
    pub phase: MigrationPhase,

    /// Entity or repository just processed.
    pub current_item: Option<String>,

    /// Items completed in current phase.
    pub completed: u64,

    /// Total items in current phase.
    pub total: u64,

    /// Optional message.
    pub message: Option<String>,
}

/// Phases of a repository migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MigrationPhase {
    Initializing = 0,
    /// Cloning from Bitbucket and pushing to GitHub.
    Mirroring = 1,
    /// Listing existing GitHub issues and pull requests.
    Indexing = 2,
    MigratingIssues = 3,
    MigratingPullRequests = 4,
    Complete = 5,
}

impl From<u8> for MigrationPhase {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Initializing,
            1 => Self::Mirroring,
            2 => Self::Indexing,
            3 => Self::MigratingIssues,
            4 => Self::MigratingPullRequests,
            _ => Self::Complete,
        }
    }
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "Initializing"),
            Self::Mirroring => write!(f, "Mirroring git repository"),
            Self::Indexing => write!(f, "Indexing GitHub issues"),
            Self::MigratingIssues => write!(f, "Migrating issues"),
            Self::MigratingPullRequests => write!(f, "Migrating pull requests"),
            Self::Complete => write!(f, "Complete"),
        }
    }
}

/// Progress tracker shared by the driver and its observers.
pub struct MigrationProgress {
    phase: AtomicU8,
    completed: AtomicU64,
    total: AtomicU64,
    callback: Option<Arc<ProgressCallback>>,
}

impl MigrationProgress {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(MigrationPhase::Initializing as u8),
            completed: AtomicU64::new(0),
            total: AtomicU64::new(0),
            callback: None,
        }
    }

    /// Create a progress tracker with a callback.
    pub fn with_callback(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
            ..Self::new()
        }
    }

    /// Enter `phase`, expecting `total` items.
    pub fn set_phase(&self, phase: MigrationPhase, total: u64) {
        self.phase.store(phase as u8, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
        self.notify(None, None);
    }

    pub fn increment(&self, item: Option<&str>) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.notify(item.map(|s| s.to_string()), None);
    }

    pub fn message(&self, msg: &str) {
        self.notify(None, Some(msg.to_string()));
    }

    pub fn percentage(&self) -> f64 {
        let total = self.total.load(Ordering::SeqCst);
        if total == 0 {
            return 0.0;
        }
        let completed = self.completed.load(Ordering::SeqCst);
        (completed as f64 / total as f64) * 100.0
    }

    pub fn current_phase(&self) -> MigrationPhase {
        MigrationPhase::from(self.phase.load(Ordering::SeqCst))
    }

    fn notify(&self, current_item: Option<String>, message: Option<String>) {
        if let Some(callback) = &self.callback {
            callback(ProgressUpdate {
                phase: self.current_phase(),
                current_item,
                completed: self.completed.load(Ordering::SeqCst),
                total: self.total.load(Ordering::SeqCst),
                message,
            });
        }
    }
}

impl Default for MigrationProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal progress bar fed by [`MigrationProgress`] updates.
pub struct ConsoleProgressReporter {
    progress_bar: indicatif::ProgressBar,
}

impl ConsoleProgressReporter {
    pub fn new() -> Self {
        let progress_bar = indicatif::ProgressBar::new(0);
        let style = indicatif::ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
            .progress_chars("#>-");
        progress_bar.set_style(style);

        Self { progress_bar }
    }

    /// Callback to hand to [`MigrationProgress::with_callback`].
    pub fn callback(&self) -> ProgressCallback {
        let pb = self.progress_bar.clone();
        Box::new(move |update: ProgressUpdate| {
            pb.set_length(update.total);
            pb.set_position(update.completed);

            let mut msg = update.phase.to_string();
            if let Some(item) = &update.current_item {
                msg = format!("{msg}: {item}");
            }
            if let Some(message) = &update.message {
                msg = format!("{msg} - {message}");
            }
            pb.set_message(msg);
        })
    }

    /// Clear the bar so the summary prints on a clean terminal.
    pub fn finish(&self) {
        self.progress_bar.finish_and_clear();
    }
}

impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_tracker() {
        let progress = MigrationProgress::new();
        assert_eq!(progress.current_phase(), MigrationPhase::Initializing);

        progress.set_phase(MigrationPhase::MigratingPullRequests, 4);
        assert_eq!(progress.current_phase(), MigrationPhase::MigratingPullRequests);
        assert_eq!(progress.percentage(), 0.0);

        progress.increment(Some("pr#1"));
        assert!((progress.percentage() - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_callback_receives_items() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let progress = MigrationProgress::with_callback(Box::new(move |update| {
            if let Some(item) = update.current_item {
                sink.lock().unwrap().push((update.phase, item, update.completed));
            }
        }));

        progress.set_phase(MigrationPhase::MigratingIssues, 2);
        progress.increment(Some("issue#1"));
        progress.increment(Some("issue#2"));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (MigrationPhase::MigratingIssues, "issue#1".to_string(), 1),
                (MigrationPhase::MigratingIssues, "issue#2".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_phase_roundtrip() {
        for phase in [
            MigrationPhase::Mirroring,
            MigrationPhase::Indexing,
            MigrationPhase::Complete,
        ] {
            assert_eq!(MigrationPhase::from(phase as u8), phase);
        }
    }
}
