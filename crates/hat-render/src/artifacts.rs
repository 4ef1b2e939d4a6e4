//! Expiry sweep over the render working directory.

use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result};
use hat_core::{system_time_to_unix_ms, wait_for_shutdown};
use tokio::{sync::watch, time::MissedTickBehavior};

/// A file left in the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl Artifact {
    /// Zero when the modification time lies in the future.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.modified).unwrap_or_default()
    }

    pub fn is_expired(&self, now: SystemTime, expiration: Duration) -> bool {
        self.age(now) > expiration
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactSweeperConfig {
    pub dir: PathBuf,
    pub interval: Duration,
    /// Must exceed the longest possible render job.
    pub expiration: Duration,
}

impl Default for ArtifactSweeperConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("assets/tex/temp"),
            interval: Duration::from_secs(60 * 60),
            expiration: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Lists regular files in `dir`. Entries that vanish while listing are skipped.
pub fn list_artifacts(dir: &Path) -> Result<Vec<Artifact>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    let mut artifacts = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else {
            continue;
        };
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        artifacts.push(Artifact {
            path: entry.path(),
            modified,
        });
    }
    artifacts.sort_by(|left, right| left.path.cmp(&right.path));
    Ok(artifacts)
}

/// Deletes every artifact in `dir` older than `expiration` at `now`.
pub fn sweep_expired_artifacts(
    dir: &Path,
    expiration: Duration,
    now: SystemTime,
) -> Result<SweepReport> {
    let artifacts = list_artifacts(dir)?;
    let mut report = SweepReport {
        scanned: artifacts.len(),
        ..SweepReport::default()
    };
    for artifact in artifacts
        .iter()
        .filter(|artifact| artifact.is_expired(now, expiration))
    {
        match std::fs::remove_file(&artifact.path) {
            Ok(()) => {
                report.removed += 1;
                tracing::debug!(
                    path = %artifact.path.display(),
                    modified_unix_ms = system_time_to_unix_ms(artifact.modified),
                    "expired artifact removed"
                );
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %artifact.path.display(), "artifact vanished before removal");
            }
            Err(error) => {
                report.failed += 1;
                tracing::warn!(path = %artifact.path.display(), %error, "failed to remove expired artifact");
            }
        }
    }
    Ok(report)
}

/// Sweeps immediately, then once per interval, until shutdown.
pub async fn run_artifact_sweeper(
    config: ArtifactSweeperConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(
        dir = %config.dir.display(),
        interval_secs = config.interval.as_secs(),
        expiration_secs = config.expiration.as_secs(),
        "artifact sweeper started"
    );
    loop {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }
        match sweep_expired_artifacts(&config.dir, config.expiration, SystemTime::now()) {
            Ok(report) if report.removed > 0 || report.failed > 0 => {
                tracing::info!(
                    scanned = report.scanned,
                    removed = report.removed,
                    failed = report.failed,
                    "artifact sweep finished"
                );
            }
            Ok(_) => {}
            Err(error) => tracing::warn!(%error, "artifact sweep failed"),
        }
    }
    tracing::info!("artifact sweeper stopped");
}
