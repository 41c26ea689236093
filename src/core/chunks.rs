//! Persistence of event windows as per-recording chunk files.
//!
//! Layout: `<root>/chunks_<recording>/chunk_<n>.csv`, plus `leftover.csv`
//! for an active run that was still open when the ride ended.

use crate::core::windowing::{EventWindow, LeftoverRun};
use crate::telemetry::types::{Channel, FrameSeries, RecordingId};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const FRAME_COLUMN: &str = "FRAME";
pub const TIMESTAMP_COLUMN: &str = "TIMESTAMP";
pub const LEFTOVER_FILE: &str = "leftover.csv";

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV error on {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("{path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

/// Chunk files of one recording.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    dir: PathBuf,
}

impl ChunkStore {
    /// Store for `recording` below the shared chunk root.
    pub fn new(root: &Path, recording: &RecordingId) -> Self {
        Self {
            dir: root.join(format!("chunks_{recording}")),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn chunk_path(&self, sequence: usize) -> PathBuf {
        self.dir.join(format!("chunk_{sequence}.csv"))
    }

    pub fn leftover_path(&self) -> PathBuf {
        self.dir.join(LEFTOVER_FILE)
    }

    /// Create the directory hierarchy. Existing directories are fine.
    pub fn ensure_dir(&self) -> Result<(), ChunkError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ChunkError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    /// Remove the chunks and leftover of an earlier split, then make sure
    /// the directory exists. Other files in the directory are kept.
    pub fn reset(&self) -> Result<(), ChunkError> {
        if self.dir.is_dir() {
            let stale = self.list_chunks()?.into_iter().map(|(_, path)| path);
            for path in stale.chain(std::iter::once(self.leftover_path())) {
                match std::fs::remove_file(&path) {
                    Ok(()) => debug!(path = %path.display(), "removed stale chunk"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(source) => return Err(ChunkError::Io { path, source }),
                }
            }
        }
        self.ensure_dir()
    }

    /// Write the frames of `window` to `chunk_<sequence>.csv`.
    pub fn write_window(&self, series: &FrameSeries, window: &EventWindow) -> Result<PathBuf, ChunkError> {
        let path = self.chunk_path(window.sequence);
        write_frames(&path, &series.slice(window.range()))?;
        debug!(path = %path.display(), frames = window.len(), "wrote chunk");
        Ok(path)
    }

    /// Write an unterminated run to `leftover.csv`.
    pub fn write_leftover(&self, series: &FrameSeries, leftover: &LeftoverRun) -> Result<PathBuf, ChunkError> {
        let path = self.leftover_path();
        write_frames(&path, &series.slice(leftover.range()))?;
        Ok(path)
    }

    /// Chunk files in sequence order (`chunk_2` before `chunk_10`).
    pub fn list_chunks(&self) -> Result<Vec<(usize, PathBuf)>, ChunkError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| ChunkError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut chunks = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| ChunkError::Io {
                    path: self.dir.clone(),
                    source,
                })?
                .path();
            let sequence = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix("chunk_"))
                .and_then(|s| s.parse::<usize>().ok());
            if let Some(sequence) = sequence {
                if path.extension().and_then(|e| e.to_str()) == Some("csv") {
                    chunks.push((sequence, path));
                }
            }
        }

        chunks.sort_by_key(|(sequence, _)| *sequence);
        Ok(chunks)
    }

    /// Read every chunk back, in sequence order.
    pub fn read_all(&self) -> Result<Vec<(usize, FrameSeries)>, ChunkError> {
        self.list_chunks()?
            .into_iter()
            .map(|(sequence, path)| read_frames(&path).map(|frames| (sequence, frames)))
            .collect()
    }
}

/// Write frames as a comma-delimited table with `FRAME` and `TIMESTAMP` first.
///
/// Floats use the shortest representation that parses back to the same bits.
pub fn write_frames(path: &Path, series: &FrameSeries) -> Result<(), ChunkError> {
    let csv_error = |source| ChunkError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;

    let mut header = vec![FRAME_COLUMN, TIMESTAMP_COLUMN];
    header.extend(series.channel_names());
    writer.write_record(&header).map_err(csv_error)?;

    for i in 0..series.len() {
        let mut row = Vec::with_capacity(series.channels.len() + 2);
        row.push(series.frames[i].to_string());
        row.push(series.timestamps_ms[i].to_string());
        row.extend(series.channels.iter().map(|c| c.values[i].to_string()));
        writer.write_record(&row).map_err(csv_error)?;
    }

    writer.flush().map_err(|source| ChunkError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a table written by [`write_frames`].
pub fn read_frames(path: &Path) -> Result<FrameSeries, ChunkError> {
    let csv_error = |source| ChunkError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let malformed = |message: String| ChunkError::Malformed {
        path: path.to_path_buf(),
        message,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    let headers = reader.headers().map_err(csv_error)?.clone();
    if headers.get(0) != Some(FRAME_COLUMN) || headers.get(1) != Some(TIMESTAMP_COLUMN) {
        return Err(malformed(format!(
            "expected '{FRAME_COLUMN},{TIMESTAMP_COLUMN}' leading columns"
        )));
    }

    let mut series = FrameSeries {
        frames: Vec::new(),
        timestamps_ms: Vec::new(),
        channels: headers
            .iter()
            .skip(2)
            .map(|name| Channel::new(name, Vec::new()))
            .collect(),
    };

    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(csv_error)?;
        let field = |idx: usize| record.get(idx).unwrap_or("");

        let frame = field(0)
            .parse::<u64>()
            .map_err(|_| malformed(format!("row {}: bad frame '{}'", row + 2, field(0))))?;
        series.frames.push(frame);

        for idx in 1..headers.len() {
            let value = field(idx).parse::<f64>().map_err(|_| {
                malformed(format!("row {}: bad value '{}'", row + 2, field(idx)))
            })?;
            if idx == 1 {
                series.timestamps_ms.push(value);
            } else {
                series.channels[idx - 2].values.push(value);
            }
        }
    }

    Ok(series)
}
