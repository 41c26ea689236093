//! Per-frame annotation of event windows with gaze targets and driving mode.

use crate::config::{ChannelMap, EventConfig, GazeConfig};
use crate::gaze::detection::seen_objects;
use crate::gaze::replay::{DetectionSource, GazeError};
use crate::telemetry::types::{FrameSeries, RecordingId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

const CHUNK_COLUMN: &str = "CHUNK";
const FRAME_COLUMN: &str = "FRAME";
const MODE_COLUMN: &str = "DRIVING_MODE";
const SEEN_COLUMN: &str = "SEEN_OBJECTS";
const FIXED_COLUMNS: usize = 4;

/// Automation state of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DrivingMode {
    Automatic,
    Manual,
}

impl DrivingMode {
    pub fn from_value(value: f64, automatic_mode_value: f64) -> Self {
        if value >= automatic_mode_value {
            DrivingMode::Automatic
        } else {
            DrivingMode::Manual
        }
    }
}

impl fmt::Display for DrivingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrivingMode::Automatic => write!(f, "AUTOMATIC"),
            DrivingMode::Manual => write!(f, "MANUAL"),
        }
    }
}

impl FromStr for DrivingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AUTOMATIC" => Ok(DrivingMode::Automatic),
            "MANUAL" => Ok(DrivingMode::Manual),
            other => Err(format!("unknown driving mode '{other}'")),
        }
    }
}

/// One video frame inside an event window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedFrame {
    /// Event window the frame belongs to
    pub chunk: usize,
    pub frame: u64,
    pub driving_mode: DrivingMode,
    /// Objects the driver looked at
    pub seen_objects: Vec<String>,
    /// Channel values, parallel to [`AnnotatedRide::signal_names`]
    pub signals: Vec<f64>,
}

/// All annotated frames of one ride.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedRide {
    pub recording: RecordingId,
    pub signal_names: Vec<String>,
    pub frames: Vec<AnnotatedFrame>,
}

impl AnnotatedRide {
    pub fn new(recording: RecordingId, signal_names: Vec<String>) -> Self {
        Self {
            recording,
            signal_names,
            frames: Vec::new(),
        }
    }

    pub fn signal_index(&self, name: &str) -> Option<usize> {
        self.signal_names.iter().position(|n| n == name)
    }

    /// Frames grouped by event window, in window order.
    pub fn windows(&self) -> Vec<(usize, &[AnnotatedFrame])> {
        let mut groups = Vec::new();
        let mut start = 0;
        for i in 1..=self.frames.len() {
            if i == self.frames.len() || self.frames[i].chunk != self.frames[start].chunk {
                groups.push((self.frames[start].chunk, &self.frames[start..i]));
                start = i;
            }
        }
        groups
    }
}

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error(transparent)]
    Gaze(#[from] GazeError),
    #[error("chunk {chunk} has no '{channel}' channel")]
    MissingChannel { chunk: usize, channel: String },
    #[error("chunk {chunk} carries different channels than the first chunk")]
    InconsistentChannels { chunk: usize },
    #[error("CSV error on {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("{path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

/// Annotates chunk frames from a detection source.
pub struct Annotator<'a> {
    gaze: &'a GazeConfig,
    channels: &'a ChannelMap,
    events: &'a EventConfig,
}

impl<'a> Annotator<'a> {
    pub fn new(gaze: &'a GazeConfig, channels: &'a ChannelMap, events: &'a EventConfig) -> Self {
        Self {
            gaze,
            channels,
            events,
        }
    }

    /// Annotate one chunk. Stops at the first frame the source cannot provide.
    pub fn annotate_chunk(
        &self,
        chunk: usize,
        series: &FrameSeries,
        source: &mut dyn DetectionSource,
    ) -> Result<Vec<AnnotatedFrame>, AnnotateError> {
        let mode = series
            .channel(&self.channels.driving_mode)
            .ok_or_else(|| AnnotateError::MissingChannel {
                chunk,
                channel: self.channels.driving_mode.clone(),
            })?;

        let mut frames = Vec::with_capacity(series.len());
        for i in 0..series.len() {
            let frame = series.frames[i];
            let Some(detections) = source.detections(frame)? else {
                warn!(chunk, frame, "frame unavailable, cutting chunk short");
                break;
            };

            frames.push(AnnotatedFrame {
                chunk,
                frame,
                driving_mode: DrivingMode::from_value(mode[i], self.events.automatic_mode_value),
                seen_objects: seen_objects(&detections, self.gaze.min_confidence),
                signals: series.channels.iter().map(|c| c.values[i]).collect(),
            });
        }

        Ok(frames)
    }

    /// Annotate every chunk of a ride.
    pub fn annotate_ride(
        &self,
        recording: RecordingId,
        chunks: &[(usize, FrameSeries)],
        source: &mut dyn DetectionSource,
    ) -> Result<AnnotatedRide, AnnotateError> {
        let signal_names = chunks
            .first()
            .map(|(_, series)| series.channel_names().map(str::to_string).collect())
            .unwrap_or_default();
        let mut ride = AnnotatedRide::new(recording, signal_names);

        for (chunk, series) in chunks {
            let names: Vec<&str> = series.channel_names().collect();
            if names != ride.signal_names.iter().map(String::as_str).collect::<Vec<_>>() {
                return Err(AnnotateError::InconsistentChannels { chunk: *chunk });
            }
            ride.frames.extend(self.annotate_chunk(*chunk, series, source)?);
        }

        Ok(ride)
    }
}

/// Write a ride as a semicolon-delimited table.
pub fn write_annotated(path: &Path, ride: &AnnotatedRide) -> Result<(), AnnotateError> {
    let csv_error = |source| AnnotateError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .map_err(csv_error)?;

    let mut header = vec![CHUNK_COLUMN, FRAME_COLUMN, MODE_COLUMN, SEEN_COLUMN];
    header.extend(ride.signal_names.iter().map(String::as_str));
    writer.write_record(&header).map_err(csv_error)?;

    for frame in &ride.frames {
        let mut row = vec![
            frame.chunk.to_string(),
            frame.frame.to_string(),
            frame.driving_mode.to_string(),
            frame.seen_objects.join(","),
        ];
        row.extend(frame.signals.iter().map(|v| v.to_string()));
        writer.write_record(&row).map_err(csv_error)?;
    }

    writer.flush().map_err(|e| csv_error(e.into()))
}

/// Read a table written by [`write_annotated`].
pub fn read_annotated(path: &Path, recording: RecordingId) -> Result<AnnotatedRide, AnnotateError> {
    let csv_error = |source| AnnotateError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let malformed = |message: String| AnnotateError::Malformed {
        path: path.to_path_buf(),
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .map_err(csv_error)?;
    let headers = reader.headers().map_err(csv_error)?.clone();
    let fixed: Vec<&str> = headers.iter().take(FIXED_COLUMNS).collect();
    if fixed != [CHUNK_COLUMN, FRAME_COLUMN, MODE_COLUMN, SEEN_COLUMN] {
        return Err(malformed(format!("unexpected leading columns {fixed:?}")));
    }

    let signal_names = headers.iter().skip(FIXED_COLUMNS).map(str::to_string).collect();
    let mut ride = AnnotatedRide::new(recording, signal_names);

    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(csv_error)?;
        let line = row + 2;
        let field = |idx: usize| record.get(idx).unwrap_or("");
        let bad = |idx: usize| {
            malformed(format!("row {line}: bad {} '{}'", &headers[idx], field(idx)))
        };

        let chunk = field(0).parse().map_err(|_| bad(0))?;
        let frame = field(1).parse().map_err(|_| bad(1))?;
        let driving_mode = field(2).parse().map_err(|_| bad(2))?;
        let seen_objects = field(3)
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let signals = (FIXED_COLUMNS..headers.len())
            .map(|idx| field(idx).parse::<f64>().map_err(|_| bad(idx)))
            .collect::<Result<Vec<_>, _>>()?;

        ride.frames.push(AnnotatedFrame {
            chunk,
            frame,
            driving_mode,
            seen_objects,
            signals,
        });
    }

    Ok(ride)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaze::detection::{BoundingBox, Detection, VIEW_MARKER};
    use crate::gaze::replay::{DetectionLog, FrameDetections};
    use crate::telemetry::types::Channel;

    fn chunk_series(frames: Vec<u64>, modes: Vec<f64>) -> FrameSeries {
        let n = frames.len();
        FrameSeries {
            timestamps_ms: frames.iter().map(|&f| f as f64 * 20.0).collect(),
            frames,
            channels: vec![
                Channel::new("AUTO_DRIVE", modes),
                Channel::new("SPEED", vec![30.0; n]),
            ],
        }
    }

    fn looking_at(frame: u64, label: &str) -> FrameDetections {
        FrameDetections {
            frame,
            detections: vec![
                Detection::new(label, 0.9, BoundingBox::new(0.0, 0.0, 0.5, 0.5)),
                Detection::new(VIEW_MARKER, 0.9, BoundingBox::new(0.2, 0.2, 0.3, 0.3)),
            ],
        }
    }

    #[test]
    fn test_driving_mode_threshold() {
        assert_eq!(DrivingMode::from_value(4.0, 4.0), DrivingMode::Automatic);
        assert_eq!(DrivingMode::from_value(3.5, 4.0), DrivingMode::Manual);
        assert_eq!("MANUAL".parse::<DrivingMode>().unwrap(), DrivingMode::Manual);
        assert!("PARKED".parse::<DrivingMode>().is_err());
    }

    #[test]
    fn test_annotate_stops_at_missing_frame() {
        let config = (GazeConfig::default(), ChannelMap::default(), EventConfig::default());
        let annotator = Annotator::new(&config.0, &config.1, &config.2);
        let mut log: DetectionLog = vec![looking_at(10, "road"), looking_at(11, "dashboard")]
            .into_iter()
            .collect();

        let series = chunk_series(vec![10, 11, 12], vec![4.0, 4.0, 0.0]);
        let frames = annotator.annotate_chunk(3, &series, &mut log).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].chunk, 3);
        assert_eq!(frames[0].driving_mode, DrivingMode::Automatic);
        assert_eq!(frames[0].seen_objects, vec!["road".to_string()]);
        assert_eq!(frames[1].seen_objects, vec!["dashboard".to_string()]);
        assert_eq!(frames[1].signals, vec![4.0, 30.0]);
    }

    #[test]
    fn test_windows_group_by_chunk() {
        let mut ride = AnnotatedRide::new(RecordingId::new("1", 1), vec![]);
        for (chunk, frame) in [(0, 1), (0, 2), (1, 9), (2, 20), (2, 21)] {
            ride.frames.push(AnnotatedFrame {
                chunk,
                frame,
                driving_mode: DrivingMode::Manual,
                seen_objects: vec![],
                signals: vec![],
            });
        }
        let sizes: Vec<(usize, usize)> = ride.windows().iter().map(|(c, f)| (*c, f.len())).collect();
        assert_eq!(sizes, vec![(0, 2), (1, 1), (2, 2)]);
        assert!(AnnotatedRide::new(RecordingId::new("1", 1), vec![]).windows().is_empty());
    }

    #[test]
    fn test_write_and_read_annotated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_1_s1.csv");
        let id = RecordingId::new("1", 1);

        let mut ride = AnnotatedRide::new(id.clone(), vec!["AUTO_DRIVE".into(), "SPEED".into()]);
        ride.frames.push(AnnotatedFrame {
            chunk: 0,
            frame: 5,
            driving_mode: DrivingMode::Automatic,
            seen_objects: vec!["road".into(), "left_mirror".into()],
            signals: vec![4.0, 31.25],
        });
        ride.frames.push(AnnotatedFrame {
            chunk: 0,
            frame: 6,
            driving_mode: DrivingMode::Manual,
            seen_objects: vec![],
            signals: vec![0.0, 30.0],
        });

        write_annotated(&path, &ride).unwrap();
        assert_eq!(read_annotated(&path, id).unwrap(), ride);
    }
}
