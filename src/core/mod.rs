//! Core analysis for handover awareness.
//!
//! This module contains:
//! - Resampling of telemetry onto the video frame grid
//! - Event window extraction around automation transitions
//! - Chunk persistence of event windows
//! - Grading of annotated windows

pub mod chunks;
pub mod grading;
pub mod resample;
pub mod windowing;

// Re-export commonly used types
pub use chunks::{read_frames, write_frames, ChunkError, ChunkStore};
pub use grading::{
    grade_ride, read_grading_json, write_grading_csv, write_grading_json, GazeShare, GradeError,
    RideGrader, RideGrades, WindowGrade,
};
pub use resample::{resample, trim_to_video_start, ResampleError};
pub use windowing::{
    extract_windows, EventCondition, EventFlag, EventWindow, LeftoverRun, Segmentation,
    WindowExtractor,
};
