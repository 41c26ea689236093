//! Record of what a batch run did.
//!
//! Counts recordings processed, skipped and failed along with the files
//! written, so a run can be audited after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

/// Counters of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    pub run_id: Uuid,
    /// Subcommand that produced the run
    pub stage: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub recordings_processed: u64,
    pub recordings_skipped: u64,
    pub recordings_failed: u64,
    pub windows_written: u64,
    pub leftovers_written: u64,
    pub frames_annotated: u64,
    pub windows_graded: u64,
    /// One line per failed recording
    pub failures: Vec<String>,
    #[serde(skip)]
    persist_path: Option<PathBuf>,
}

impl RunLog {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            stage: stage.into(),
            started_at: Utc::now(),
            finished_at: None,
            recordings_processed: 0,
            recordings_skipped: 0,
            recordings_failed: 0,
            windows_written: 0,
            leftovers_written: 0,
            frames_annotated: 0,
            windows_graded: 0,
            failures: Vec::new(),
            persist_path: None,
        }
    }

    /// Create a run log saved to `path` by [`RunLog::save`].
    pub fn with_persistence(stage: impl Into<String>, path: PathBuf) -> Self {
        let mut log = Self::new(stage);
        log.persist_path = Some(path);
        log
    }

    pub fn record_processed(&mut self) {
        self.recordings_processed += 1;
    }

    pub fn record_skipped(&mut self) {
        self.recordings_skipped += 1;
    }

    pub fn record_failure(&mut self, recording: &str, error: &dyn std::fmt::Display) {
        self.recordings_failed += 1;
        self.failures.push(format!("{recording}: {error}"));
    }

    pub fn record_windows_written(&mut self, count: u64) {
        self.windows_written += count;
    }

    pub fn record_leftover_written(&mut self) {
        self.leftovers_written += 1;
    }

    pub fn record_frames_annotated(&mut self, count: u64) {
        self.frames_annotated += count;
    }

    pub fn record_windows_graded(&mut self, count: u64) {
        self.windows_graded += count;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Run {} ({}):\n\
             - Recordings processed: {}\n\
             - Recordings skipped (missing input): {}\n\
             - Recordings failed: {}\n\
             - Windows written: {}\n\
             - Leftover runs written: {}\n\
             - Frames annotated: {}\n\
             - Windows graded: {}",
            self.run_id,
            self.stage,
            self.recordings_processed,
            self.recordings_skipped,
            self.recordings_failed,
            self.windows_written,
            self.leftovers_written,
            self.frames_annotated,
            self.windows_graded,
        );
        for failure in &self.failures {
            summary.push_str("\n  ! ");
            summary.push_str(failure);
        }
        summary
    }

    /// Save to disk if persistence is enabled.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load a saved run log.
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        let mut log: RunLog = serde_json::from_str(&content).map_err(std::io::Error::other)?;
        log.persist_path = Some(path.to_path_buf());
        Ok(log)
    }

    /// Finish and save, logging instead of failing.
    pub fn close(&mut self) {
        self.finish();
        if let Err(e) = self.save() {
            warn!("could not save run log: {e}");
        }
    }
}
