//! Telemetry ingestion.
//!
//! This module provides the signal types and the readers for the raw
//! simulator tables and the video start reference.

pub mod reader;
pub mod types;

// Re-export commonly used types
pub use reader::{read_reference_timestamp, read_signal_table, TelemetryError};
pub use types::{Channel, FrameSeries, RecordingId, SignalTable};
