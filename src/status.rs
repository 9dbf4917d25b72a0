//! Status snapshot: the file-based substitute for the HTTP health/status
//! endpoint §6 describes as "exposed by the Scheduler" but leaves
//! unspecified in shape — HTTP admin endpoints are out of scope per §1,
//! so this is written to `config.status_path` on a cadence instead.
//! Grounded on the teacher's periodic structured-snapshot pattern in
//! `commands/run/monitoring.rs`.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything an out-of-process consumer (dashboard, reporting layer)
/// would want to poll without querying the database directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub tick_count: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_flush_at: Option<DateTime<Utc>>,
    pub pending_batch_size: usize,
    pub flights_tracked: usize,
    pub controllers_tracked: usize,
    pub landings_detected: u64,
    pub completions_detected: u64,
    pub timeouts_detected: u64,
    pub circuit_breaker_trips: u64,
    pub last_error: Option<String>,
}

impl StatusSnapshot {
    /// Atomically write the snapshot: write to a sibling temp file, then
    /// rename over the target, so a reader never observes a partial
    /// write.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create status directory {parent:?}"))?;
        }

        let tmp_path = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(self).context("failed to serialize status snapshot")?;
        std::fs::write(&tmp_path, body)
            .with_context(|| format!("failed to write status snapshot to {tmp_path:?}"))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to publish status snapshot to {path:?}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("status.json");

        let snapshot = StatusSnapshot {
            tick_count: 42,
            last_tick_at: Some(Utc::now()),
            pending_batch_size: 7,
            flights_tracked: 3,
            ..Default::default()
        };
        snapshot.write_to(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: StatusSnapshot = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.tick_count, 42);
        assert_eq!(parsed.flights_tracked, 3);
    }

    #[test]
    fn no_leftover_tmp_file_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        StatusSnapshot::default().write_to(&path).unwrap();
        assert!(!dir.path().join("status.json.tmp").exists());
        assert!(path.exists());
    }
}
