//! Gaze annotation of event windows.
//!
//! This module contains:
//! - Detection types and the view-marker heuristics
//! - Detection sources (the external detector boundary)
//! - Frame annotation and its tabular storage

pub mod annotate;
pub mod detection;
pub mod replay;

// Re-export commonly used types
pub use annotate::{
    read_annotated, write_annotated, AnnotateError, AnnotatedFrame, AnnotatedRide, Annotator,
    DrivingMode,
};
pub use detection::{seen_objects, BoundingBox, Detection};
pub use replay::{DetectionLog, DetectionSource, FrameDetections, GazeError};
