//! Handover Awareness - offline analysis of driver attention around
//! automated-driving handovers.
//!
//! This library turns driving-simulator telemetry and dashcam detections
//! into per-transition scores of how attentive the driver was when the
//! automation asked for (or handed back) control.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Handover Awareness                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │  Telemetry  │──▶│  Resample   │──▶│  Windowing  │       │
//! │  │  (csv, µs)  │   │ (video fps) │   │ (+lookahead)│       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                                             │               │
//! │                                             ▼               │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Report    │◀──│   Grading   │◀──│    Gaze     │       │
//! │  │   (text)    │   │  (ADL/TOR)  │   │ (detections)│       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use handover_awareness::{audit::RunLog, config::Config, pipeline};
//!
//! let config = Config::default();
//! let recordings = pipeline::discover_recordings(&config).expect("no telemetry directory");
//!
//! let mut log = RunLog::new("split");
//! pipeline::split_all(&config, &recordings, &mut log);
//! println!("{}", log.summary());
//! ```

pub mod audit;
pub mod config;
pub mod core;
pub mod gaze;
pub mod pipeline;
pub mod report;
pub mod telemetry;

// Re-export key types at crate root for convenience
pub use audit::RunLog;
pub use config::{Config, ConfigError};
pub use core::{
    extract_windows, grade_ride, resample, trim_to_video_start, ChunkStore, EventFlag,
    EventWindow, RideGrades, WindowGrade,
};
pub use gaze::{AnnotatedRide, Annotator, Detection, DetectionLog, DetectionSource};
pub use pipeline::PipelineError;
pub use report::GazeReport;
pub use telemetry::{FrameSeries, RecordingId, SignalTable};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Input layout expected under the data directory.
pub const DATA_LAYOUT: &str = r#"
Expected data layout:

  <data_dir>/user_data/user_<id>_s<scenario>.csv    telemetry, ';' delimited, µs timestamps
  <data_dir>/timestamps/user_<id>_s<scenario>.txt   video start, µs
  <data_dir>/detections/user_<id>_s<scenario>.jsonl one {"frame", "detections"} per line

Outputs under the output directory:

  chunks/chunks_user_<id>_s<scenario>/chunk_<n>.csv  event windows (+ leftover.csv)
  video_analysis/user_<id>_s<scenario>.csv           annotated frames
  grading/grading_data.csv, grading_data.json        per-window scores
  run_log.json                                       last run's counters
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_layout_contents() {
        assert!(DATA_LAYOUT.contains("user_data"));
        assert!(DATA_LAYOUT.contains("leftover.csv"));
        assert!(DATA_LAYOUT.contains("grading_data.csv"));
    }
}
