//! Detection sources.
//!
//! Object detection and video decoding run outside this crate. Anything
//! that can answer "what is in frame N" implements [`DetectionSource`];
//! [`DetectionLog`] replays detections exported as JSON Lines.

use crate::gaze::detection::Detection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GazeError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} line {line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
    #[error("detection source failed: {0}")]
    Source(String),
}

/// Per-frame detections supplied by an external detector.
pub trait DetectionSource {
    /// Detections for a video frame, or `None` when the frame does not exist.
    fn detections(&mut self, frame: u64) -> Result<Option<Vec<Detection>>, GazeError>;
}

/// One line of a detection log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameDetections {
    pub frame: u64,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// Detections replayed from a JSON Lines export.
#[derive(Debug, Default)]
pub struct DetectionLog {
    frames: HashMap<u64, Vec<Detection>>,
}

impl DetectionLog {
    pub fn open(path: &Path) -> Result<Self, GazeError> {
        let file = std::fs::File::open(path).map_err(|source| GazeError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut log = Self::default();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| GazeError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: FrameDetections =
                serde_json::from_str(&line).map_err(|source| GazeError::Parse {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    source,
                })?;
            log.insert(entry);
        }

        Ok(log)
    }

    pub fn insert(&mut self, entry: FrameDetections) {
        self.frames.insert(entry.frame, entry.detections);
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl FromIterator<FrameDetections> for DetectionLog {
    fn from_iter<I: IntoIterator<Item = FrameDetections>>(iter: I) -> Self {
        let mut log = Self::default();
        for entry in iter {
            log.insert(entry);
        }
        log
    }
}

impl DetectionSource for DetectionLog {
    fn detections(&mut self, frame: u64) -> Result<Option<Vec<Detection>>, GazeError> {
        Ok(self.frames.get(&frame).cloned())
    }
}
