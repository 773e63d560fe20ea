//! Artifact directory helpers
//!
//! Every file a job writes is named `<job id>.<rest>`, so lookup and cleanup
//! work by prefix. The directory is shared by all jobs.

use crate::error::Result;
use crate::types::JobId;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Whether `name` belongs to the job or bundle `id`
fn owned_by(name: &str, id: &str) -> bool {
    name == id
        || name
            .strip_prefix(id)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Intermediate files that are never served as the artifact
///
/// Covers `.part`/`.ytdl` download state, per-format fragments like `.f137.`
/// and split parts like `.part001.`.
fn is_transient(name: &str) -> bool {
    name.split('.').skip(1).any(|segment| {
        segment == "part"
            || segment == "ytdl"
            || segment == "temp"
            || segment
                .strip_prefix("part")
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            || segment
                .strip_prefix('f')
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
    })
}

async fn file_names(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push((name.to_string(), entry.path()));
        }
    }
    names.sort();
    Ok(names)
}

/// Create the directory if needed
pub async fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).await?;
    Ok(())
}

/// Locate the finished file for `id`
///
/// Transient files are skipped; among several candidates the
/// lexicographically first wins so lookups are stable.
pub async fn find_by_prefix(dir: &Path, id: &str) -> Result<Option<PathBuf>> {
    Ok(file_names(dir)
        .await?
        .into_iter()
        .find(|(name, _)| owned_by(name, id) && !is_transient(name))
        .map(|(_, path)| path))
}

/// Delete every file owned by `id`, returning how many were removed
pub async fn remove_with_prefix(dir: &Path, id: &JobId) -> Result<usize> {
    let mut removed = 0;
    for (name, path) in file_names(dir).await? {
        if !owned_by(&name, id.as_str()) {
            continue;
        }
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(job_id = %id, ?path, "removed job file");
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(job_id = %id, ?path, error = %e, "failed to remove job file"),
        }
    }
    Ok(removed)
}

/// Delete every file in the directory
///
/// Run before a new job starts; earlier artifacts disappear with it.
pub async fn clear_all(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for (_, path) in file_names(dir).await? {
        match fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(e) => warn!(?path, error = %e, "failed to remove file"),
        }
    }
    if removed > 0 {
        info!(dir = ?dir, removed, "cleared downloads directory");
    }
    Ok(removed)
}

/// Delete files whose modification time is older than `max_age`
pub async fn sweep_older_than(dir: &Path, max_age: Duration) -> Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;

    for (_, path) in file_names(dir).await? {
        let modified = match fs::metadata(&path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                warn!(?path, error = %e, "failed to read file age");
                continue;
            }
        };
        // Clock skew leaves future timestamps alone
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= max_age {
            continue;
        }
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(?path, age_secs = age.as_secs(), "swept expired file");
                removed += 1;
            }
            Err(e) => warn!(?path, error = %e, "failed to sweep file"),
        }
    }

    if removed > 0 {
        info!(dir = ?dir, removed, "age-based sweep complete");
    }
    Ok(removed)
}

/// Retention for `days` of validity
pub fn validity(days: u64) -> Duration {
    Duration::from_secs(days.saturating_mul(24 * 60 * 60))
}

/// Run the age-based sweep now and then every `interval` until cancelled
pub fn spawn_sweeper(
    dir: PathBuf,
    max_age: Duration,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = sweep_older_than(&dir, max_age).await {
                        warn!(dir = ?dir, error = %e, "age-based sweep failed");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
        debug!("sweeper stopped");
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn ownership_requires_dot_boundary() {
        assert!(owned_by("abc.mp4", "abc"));
        assert!(owned_by("abc.part001.mp4", "abc"));
        assert!(owned_by("abc", "abc"));
        assert!(!owned_by("abcd.mp4", "abc"));
        assert!(!owned_by("xabc.mp4", "abc"));
    }

    #[test]
    fn transient_names() {
        assert!(is_transient("abc.mp4.part"));
        assert!(is_transient("abc.f137.mp4"));
        assert!(is_transient("abc.part002.mp4"));
        assert!(is_transient("abc.mp4.ytdl"));
        assert!(!is_transient("abc.mp4"));
        assert!(!is_transient("abc.webm"));
        assert!(!is_transient("abc.zip"));
    }

    #[tokio::test]
    async fn find_skips_fragments_and_other_jobs() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "job1.f137.mp4");
        touch(dir.path(), "job1.mp4.part");
        touch(dir.path(), "job10.mp4");
        touch(dir.path(), "job1.mp4");

        let found = find_by_prefix(dir.path(), "job1").await.unwrap();
        assert_eq!(found, Some(dir.path().join("job1.mp4")));
        assert_eq!(find_by_prefix(dir.path(), "job2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn find_in_missing_directory_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert_eq!(find_by_prefix(&missing, "job").await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_with_prefix_leaves_other_jobs() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "job1.mp4.part");
        touch(dir.path(), "job1.f140.m4a");
        touch(dir.path(), "job10.mp4");

        let id = JobId::parse("job1").unwrap();
        assert_eq!(remove_with_prefix(dir.path(), &id).await.unwrap(), 2);
        assert!(dir.path().join("job10.mp4").exists());
    }

    #[tokio::test]
    async fn clear_all_removes_files_only() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.mp4");
        touch(dir.path(), "b.zip");
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        assert_eq!(clear_all(dir.path()).await.unwrap(), 2);
        assert!(dir.path().join("sub").exists());
    }

    #[tokio::test]
    async fn sweep_keeps_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "fresh.mp4");

        assert_eq!(
            sweep_older_than(dir.path(), validity(3)).await.unwrap(),
            0
        );
        assert!(dir.path().join("fresh.mp4").exists());
    }

    #[tokio::test]
    async fn sweep_removes_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "old.mp4");
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(
            sweep_older_than(dir.path(), Duration::from_millis(1))
                .await
                .unwrap(),
            1
        );
        assert!(!dir.path().join("old.mp4").exists());
    }

    #[tokio::test]
    async fn sweeper_runs_immediately_and_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "old.mp4");
        tokio::time::sleep(Duration::from_millis(20)).await;

        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(
            dir.path().to_path_buf(),
            Duration::from_millis(1),
            Duration::from_secs(3600),
            cancel.clone(),
        );

        for _ in 0..100 {
            if !dir.path().join("old.mp4").exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!dir.path().join("old.mp4").exists());

        cancel.cancel();
        handle.await.unwrap();
    }
}
