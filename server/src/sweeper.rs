use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use kernel::{CleanupReport, FileSummary, StorageStats, SweepStats};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const SECS_PER_HOUR: u64 = 3600;
/// Longest pause between two background sweeps.
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(365 * 24 * SECS_PER_HOUR);
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Deletes every regular file in `dir` whose mtime is strictly older than
/// `now - retention`.
///
/// Per-file failures are counted, never propagated. A missing directory is
/// an empty one.
pub async fn sweep(dir: &Path, retention: Duration, now: SystemTime) -> SweepStats {
    let mut stats = SweepStats::default();
    let Some(mut entries) = open_dir(dir).await else {
        return stats;
    };
    let cutoff = now.checked_sub(retention);

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "directory listing interrupted");
                stats.errors += 1;
                break;
            }
        };
        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(file = %entry.path().display(), error = %e, "cannot stat file");
                stats.total_files += 1;
                stats.errors += 1;
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }
        stats.total_files += 1;

        let modified = match meta.modified() {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!(file = %entry.path().display(), error = %e, "file has no mtime");
                stats.errors += 1;
                continue;
            }
        };
        if !cutoff.is_some_and(|cutoff| modified < cutoff) {
            continue;
        }

        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => {
                tracing::debug!(file = %entry.path().display(), size = meta.len(), "expired file removed");
                stats.deleted_files += 1;
                stats.freed_space += meta.len();
            }
            // Deleted concurrently by another sweep
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(file = %entry.path().display(), error = %e, "cannot remove file");
                stats.errors += 1;
            }
        }
    }

    if stats.deleted_files > 0 || stats.errors > 0 {
        tracing::info!(
            dir = %dir.display(),
            total = stats.total_files,
            deleted = stats.deleted_files,
            errors = stats.errors,
            freed = stats.freed_space,
            "sweep finished"
        );
    }
    stats
}

/// Read-only snapshot of the regular files in `dir`.
pub async fn storage_stats(dir: &Path) -> StorageStats {
    let mut stats = StorageStats::default();
    let Some(mut entries) = open_dir(dir).await else {
        return stats;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let Ok(modified) = meta.modified() else {
            continue;
        };
        let summary = FileSummary {
            name: entry.file_name().to_string_lossy().into_owned(),
            mtime: DateTime::<Utc>::from(modified),
            size: meta.len(),
        };

        stats.total_files += 1;
        stats.total_size += summary.size;
        if stats.oldest_file.as_ref().map_or(true, |f| summary.mtime < f.mtime) {
            stats.oldest_file = Some(summary.clone());
        }
        if stats.newest_file.as_ref().map_or(true, |f| summary.mtime > f.mtime) {
            stats.newest_file = Some(summary);
        }
    }
    stats
}

async fn open_dir(dir: &Path) -> Option<tokio::fs::ReadDir> {
    match tokio::fs::read_dir(dir).await {
        Ok(entries) => Some(entries),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot read storage directory");
            None
        }
    }
}

#[must_use]
pub fn hours(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(SECS_PER_HOUR))
}

/// Retention policy bound to one storage directory.
#[derive(Debug, Clone)]
pub struct Sweeper {
    dir: PathBuf,
    retention: Duration,
}

impl Sweeper {
    pub fn new(dir: impl Into<PathBuf>, retention: Duration) -> Self {
        Self {
            dir: dir.into(),
            retention,
        }
    }

    #[must_use]
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Sweeps now, optionally with a different retention in hours, and
    /// reports the storage left behind.
    pub async fn cleanup(&self, retention_hours: Option<u64>) -> CleanupReport {
        let retention = retention_hours.map_or(self.retention, hours);
        let sweep = sweep(&self.dir, retention, SystemTime::now()).await;
        let storage_stats = storage_stats(&self.dir).await;
        CleanupReport {
            sweep,
            storage_stats,
        }
    }

    pub async fn stats(&self) -> StorageStats {
        storage_stats(&self.dir).await
    }

    /// Sweeps every `every` until `token` is cancelled. The first sweep runs
    /// one full interval after the call. `every` is clamped to
    /// [`MAX_SWEEP_INTERVAL`].
    pub fn spawn(self: Arc<Self>, every: Duration, token: CancellationToken) -> JoinHandle<()> {
        let every = every.clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(
                dir = %self.dir.display(),
                interval_secs = every.as_secs(),
                retention_secs = self.retention.as_secs(),
                "sweeper started"
            );
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        sweep(&self.dir, self.retention, SystemTime::now()).await;
                    }
                }
            }
            tracing::info!("sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs::File;

    fn write_aged(dir: &Path, name: &str, size: usize, age: Duration, now: SystemTime) {
        let path = dir.join(name);
        std::fs::write(&path, vec![7u8; size]).unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(now - age)
            .unwrap();
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_files() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        write_aged(dir.path(), "fresh.jpeg", 10, hours(1), now);
        write_aged(dir.path(), "stale.jpeg", 20, hours(25), now);
        write_aged(dir.path(), "ancient.jpeg", 30, hours(48), now);

        // Act
        let stats = sweep(dir.path(), hours(24), now).await;

        // Assert
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.deleted_files, 2);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.freed_space, 50);
        assert!(dir.path().join("fresh.jpeg").exists());
        assert!(!dir.path().join("stale.jpeg").exists());
    }

    #[tokio::test]
    async fn second_sweep_deletes_nothing() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        write_aged(dir.path(), "fresh.jpeg", 10, hours(1), now);
        write_aged(dir.path(), "stale.jpeg", 20, hours(25), now);
        sweep(dir.path(), hours(24), now).await;

        // Act
        let stats = sweep(dir.path(), hours(24), now).await;

        // Assert
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.deleted_files, 0);
        assert_eq!(stats.freed_space, 0);
    }

    #[rstest]
    #[case(Duration::from_secs(3599), 0)]
    #[case(Duration::from_secs(3601), 1)]
    #[trace]
    #[tokio::test]
    async fn retention_boundary_is_strict(#[case] age: Duration, #[case] expected: usize) {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        write_aged(dir.path(), "edge.png", 1, age, now);

        // Act
        let stats = sweep(dir.path(), hours(1), now).await;

        // Assert
        assert_eq!(stats.deleted_files, expected);
    }

    #[tokio::test]
    async fn sweep_skips_directories() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write_aged(dir.path(), "stale.png", 5, hours(30), now);

        // Act
        let stats = sweep(dir.path(), hours(24), now).await;

        // Assert
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.deleted_files, 1);
        assert!(dir.path().join("nested").is_dir());
    }

    #[tokio::test]
    async fn missing_directory_yields_zeros() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");

        // Act
        let swept = sweep(&missing, hours(24), SystemTime::now()).await;
        let stats = storage_stats(&missing).await;

        // Assert
        assert_eq!(swept, SweepStats::default());
        assert_eq!(stats, StorageStats::default());
    }

    #[tokio::test]
    async fn stats_report_oldest_and_newest() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        write_aged(dir.path(), "middle.png", 2, hours(5), now);
        write_aged(dir.path(), "newest.png", 3, hours(1), now);
        write_aged(dir.path(), "oldest.png", 4, hours(9), now);

        // Act
        let stats = storage_stats(dir.path()).await;

        // Assert
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.total_size, 9);
        assert_eq!(stats.oldest_file.unwrap().name, "oldest.png");
        assert_eq!(stats.newest_file.unwrap().name, "newest.png");
    }

    #[tokio::test]
    async fn stats_do_not_modify_storage() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        write_aged(dir.path(), "stale.png", 2, hours(100), now);

        // Act
        let first = storage_stats(dir.path()).await;
        let second = storage_stats(dir.path()).await;

        // Assert
        assert_eq!(first, second);
        assert!(dir.path().join("stale.png").exists());
    }

    #[tokio::test]
    async fn cleanup_override_uses_given_hours() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        write_aged(dir.path(), "two_hours.png", 8, hours(2), now);
        write_aged(dir.path(), "ten_minutes.png", 4, Duration::from_secs(600), now);
        let sweeper = Sweeper::new(dir.path(), hours(24));

        // Act
        let report = sweeper.cleanup(Some(1)).await;

        // Assert
        assert_eq!(report.sweep.deleted_files, 1);
        assert_eq!(report.sweep.freed_space, 8);
        assert_eq!(report.storage_stats.total_files, 1);
        assert_eq!(report.storage_stats.newest_file.unwrap().name, "ten_minutes.png");
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweeper_stops_on_cancel() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let sweeper = Arc::new(Sweeper::new(dir.path(), hours(24)));
        let token = CancellationToken::new();
        let handle = sweeper.spawn(Duration::from_secs(60), token.clone());

        // Act
        time::sleep(Duration::from_secs(130)).await;
        token.cancel();

        // Assert
        assert!(handle.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn huge_interval_does_not_overflow() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let sweeper = Arc::new(Sweeper::new(dir.path(), hours(24)));
        let token = CancellationToken::new();

        // Act
        let handle = sweeper.spawn(Duration::from_secs(u64::MAX), token.clone());
        time::sleep(Duration::from_secs(1)).await;
        token.cancel();

        // Assert
        assert!(handle.await.is_ok());
    }
}
