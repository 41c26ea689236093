//! Batch driver: runs each stage over every recording of every scenario.
//!
//! Recordings are processed one at a time. A recording with missing input
//! is skipped; any other error is logged and counted, and the batch moves
//! on to the next recording.

use crate::audit::RunLog;
use crate::config::Config;
use crate::core::chunks::{ChunkError, ChunkStore};
use crate::core::grading::{grade_ride, write_grading_csv, write_grading_json, GradeError, RideGrades};
use crate::core::resample::{resample, trim_to_video_start, ResampleError};
use crate::core::windowing::{extract_windows, EventCondition, MissingChannel};
use crate::gaze::annotate::{read_annotated, write_annotated, AnnotateError, Annotator};
use crate::gaze::replay::{DetectionLog, DetectionSource, GazeError};
use crate::telemetry::reader::{read_reference_timestamp, read_signal_table, TelemetryError};
use crate::telemetry::types::RecordingId;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing input {}", .0.display())]
    MissingInput(PathBuf),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Resample(#[from] ResampleError),
    #[error(transparent)]
    Events(#[from] MissingChannel),
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error(transparent)]
    Gaze(#[from] GazeError),
    #[error(transparent)]
    Annotate(#[from] AnnotateError),
    #[error(transparent)]
    Grade(#[from] GradeError),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What splitting one recording produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutcome {
    pub frames: usize,
    pub windows: usize,
    pub leftover: Option<PathBuf>,
}

fn require(path: PathBuf) -> Result<PathBuf, PipelineError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(PipelineError::MissingInput(path))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PipelineError + '_ {
    move |source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Recordings to process: configured users (or those found in the telemetry
/// directory) crossed with the configured scenarios.
pub fn discover_recordings(config: &Config) -> Result<Vec<RecordingId>, PipelineError> {
    let users: BTreeSet<String> = match &config.user_ids_file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(io_error(path))?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        None => {
            let dir = config.telemetry_dir();
            let entries = std::fs::read_dir(&dir).map_err(io_error(&dir))?;
            let mut users = BTreeSet::new();
            for entry in entries {
                let path = entry.map_err(io_error(&dir))?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                    continue;
                }
                if let Some(id) = RecordingId::from_path(&path) {
                    users.insert(id.user);
                }
            }
            users
        }
    };

    let mut recordings = Vec::new();
    for &scenario in &config.scenarios {
        for user in &users {
            recordings.push(RecordingId::new(user.clone(), scenario));
        }
    }
    Ok(recordings)
}

/// Resample one recording, cut it into event windows and write the chunks.
pub fn split_recording(config: &Config, id: &RecordingId) -> Result<SplitOutcome, PipelineError> {
    let telemetry_path = require(config.telemetry_dir().join(format!("{id}.csv")))?;
    let reference_path = require(config.timestamps_dir().join(format!("{id}.txt")))?;

    let table = read_signal_table(&telemetry_path, &config.telemetry)?;
    let reference_ms = read_reference_timestamp(&reference_path)?;

    let resampled = resample(&table, config.telemetry.frame_step_ms())?;
    let series = trim_to_video_start(&resampled, reference_ms)?;
    debug!(
        recording = %id,
        samples = table.len(),
        frames = series.len(),
        dropped = resampled.len() - series.len(),
        "resampled to video frames"
    );

    let condition = EventCondition::new(&config.channels, &config.events);
    let flags = condition.flags(&series)?;
    let segmentation = extract_windows(&flags, config.events.lookahead_frames);
    if segmentation.absorbed_onsets > 0 {
        warn!(
            recording = %id,
            absorbed = segmentation.absorbed_onsets,
            "event onsets fell inside a lookahead and were merged into the previous window"
        );
    }

    let store = ChunkStore::new(&config.chunks_dir(), id);
    store.reset()?;
    for window in &segmentation.windows {
        store.write_window(&series, window)?;
    }

    let leftover = match &segmentation.leftover {
        Some(run) => {
            let path = store.write_leftover(&series, run)?;
            warn!(
                recording = %id,
                start = run.start,
                frames = run.end - run.start,
                "ride ended during an active event, kept as leftover"
            );
            Some(path)
        }
        None => None,
    };

    Ok(SplitOutcome {
        frames: series.len(),
        windows: segmentation.windows.len(),
        leftover,
    })
}

/// Annotate the chunks of one recording from a detection source.
pub fn annotate_recording(
    config: &Config,
    id: &RecordingId,
    source: &mut dyn DetectionSource,
) -> Result<usize, PipelineError> {
    let store = ChunkStore::new(&config.chunks_dir(), id);
    if !store.dir().is_dir() {
        return Err(PipelineError::MissingInput(store.dir().to_path_buf()));
    }
    let chunks = store.read_all()?;

    let annotator = Annotator::new(&config.gaze, &config.channels, &config.events);
    let ride = annotator.annotate_ride(id.clone(), &chunks, source)?;

    let out_dir = config.video_analysis_dir();
    std::fs::create_dir_all(&out_dir).map_err(io_error(&out_dir))?;
    write_annotated(&out_dir.join(format!("{id}.csv")), &ride)?;

    Ok(ride.frames.len())
}

/// Grade one annotated recording.
pub fn grade_recording(config: &Config, id: &RecordingId) -> Result<RideGrades, PipelineError> {
    let path = require(config.video_analysis_dir().join(format!("{id}.csv")))?;
    let ride = read_annotated(&path, id.clone())?;
    Ok(grade_ride(
        &ride,
        &config.grading,
        &config.channels,
        config.telemetry.target_fps,
    )?)
}

/// Run `step` on every recording, isolating failures.
fn for_each_recording<F>(recordings: &[RecordingId], log: &mut RunLog, mut step: F)
where
    F: FnMut(&RecordingId, &mut RunLog) -> Result<(), PipelineError>,
{
    for id in recordings {
        match step(id, log) {
            Ok(()) => log.record_processed(),
            Err(PipelineError::MissingInput(path)) => {
                warn!(recording = %id, missing = %path.display(), "skipping recording");
                log.record_skipped();
            }
            Err(e) => {
                warn!(recording = %id, error = %e, "recording failed");
                log.record_failure(&id.to_string(), &e);
            }
        }
    }
}

/// Split every recording.
pub fn split_all(config: &Config, recordings: &[RecordingId], log: &mut RunLog) {
    for_each_recording(recordings, log, |id, log| {
        let outcome = split_recording(config, id)?;
        info!(recording = %id, frames = outcome.frames, windows = outcome.windows, "split");
        log.record_windows_written(outcome.windows as u64);
        if outcome.leftover.is_some() {
            log.record_leftover_written();
        }
        Ok(())
    });
}

/// Annotate every recording from its detection log.
pub fn annotate_all(config: &Config, recordings: &[RecordingId], log: &mut RunLog) {
    for_each_recording(recordings, log, |id, log| {
        let detections = require(config.detections_dir().join(format!("{id}.jsonl")))?;
        let mut source = DetectionLog::open(&detections)?;
        let frames = annotate_recording(config, id, &mut source)?;
        info!(recording = %id, frames, "annotated");
        log.record_frames_annotated(frames as u64);
        Ok(())
    });
}

/// Grade every annotated recording and write the grading tables.
pub fn grade_all(
    config: &Config,
    recordings: &[RecordingId],
    log: &mut RunLog,
) -> Result<Vec<RideGrades>, PipelineError> {
    let mut rides = Vec::new();
    for_each_recording(recordings, log, |id, log| {
        let grades = grade_recording(config, id)?;
        if let Some(expected) = config.grading.expected_windows {
            if grades.windows.len() != expected {
                warn!(
                    recording = %id,
                    windows = grades.windows.len(),
                    expected,
                    "unexpected number of transitions"
                );
            }
        }
        log.record_windows_graded(grades.windows.len() as u64);
        rides.push(grades);
        Ok(())
    });

    let dir = config.grading_dir();
    std::fs::create_dir_all(&dir).map_err(io_error(&dir))?;
    write_grading_csv(&dir.join("grading_data.csv"), &rides)?;
    write_grading_json(&dir.join("grading_data.json"), &rides)?;

    Ok(rides)
}
