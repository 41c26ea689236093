//! Resampling of irregular telemetry onto the video frame grid.
//!
//! All channels of a recording are interpolated onto one shared grid
//! `t_0, t_0 + Δ, t_0 + 2Δ, ...` that stops before the last original
//! timestamp, so frame `k` means the same instant in every channel.

use crate::telemetry::types::{Channel, FrameSeries, SignalTable};
use thiserror::Error;

/// Slack for floating point noise when counting grid points.
const GRID_EPSILON: f64 = 1e-9;

/// Errors from resampling and video synchronisation.
#[derive(Debug, Error, PartialEq)]
pub enum ResampleError {
    #[error("insufficient data: {0} timestamp(s), at least 2 are needed")]
    InsufficientData(usize),
    #[error("timestamps are not strictly increasing at sample {index}")]
    NotIncreasing { index: usize },
    #[error("channel '{channel}' has {actual} values for {expected} timestamps")]
    LengthMismatch {
        channel: String,
        expected: usize,
        actual: usize,
    },
    #[error("frame step must be positive and finite, got {0}")]
    InvalidStep(f64),
    #[error("video starts at {reference_ms} ms, after the last frame at {last_ms} ms")]
    VideoStartAfterRecording { reference_ms: f64, last_ms: f64 },
}

/// Interpolate every channel of `table` onto a grid spaced `step_ms` apart.
///
/// The grid holds `floor((t_last - t_0) / step_ms)` points starting at `t_0`.
/// Frames are numbered from 0.
pub fn resample(table: &SignalTable, step_ms: f64) -> Result<FrameSeries, ResampleError> {
    if !(step_ms.is_finite() && step_ms > 0.0) {
        return Err(ResampleError::InvalidStep(step_ms));
    }
    validate_timestamps(&table.timestamps_ms)?;
    for channel in &table.channels {
        if channel.values.len() != table.len() {
            return Err(ResampleError::LengthMismatch {
                channel: channel.name.clone(),
                expected: table.len(),
                actual: channel.values.len(),
            });
        }
    }

    let grid = frame_grid(&table.timestamps_ms, step_ms);
    let channels = table
        .channels
        .iter()
        .map(|c| Channel::new(c.name.clone(), interpolate(&table.timestamps_ms, &c.values, &grid)))
        .collect();

    Ok(FrameSeries {
        frames: (0..grid.len() as u64).collect(),
        timestamps_ms: grid,
        channels,
    })
}

/// Drop frames recorded before the video started and renumber from 0.
///
/// Trimming an already trimmed series against the same reference is a no-op.
pub fn trim_to_video_start(
    series: &FrameSeries,
    reference_ms: f64,
) -> Result<FrameSeries, ResampleError> {
    let first = series
        .timestamps_ms
        .iter()
        .position(|&t| t >= reference_ms)
        .ok_or(ResampleError::VideoStartAfterRecording {
            reference_ms,
            last_ms: series.timestamps_ms.last().copied().unwrap_or(f64::NAN),
        })?;

    let mut trimmed = series.slice(first..series.len());
    trimmed.frames = (0..trimmed.len() as u64).collect();
    Ok(trimmed)
}

fn validate_timestamps(timestamps: &[f64]) -> Result<(), ResampleError> {
    if timestamps.len() < 2 {
        return Err(ResampleError::InsufficientData(timestamps.len()));
    }
    // `!(a < b)` also rejects NaN.
    if let Some(index) = timestamps
        .windows(2)
        .position(|pair| !(pair[0] < pair[1]))
    {
        return Err(ResampleError::NotIncreasing { index: index + 1 });
    }
    Ok(())
}

fn frame_grid(timestamps: &[f64], step_ms: f64) -> Vec<f64> {
    let start = timestamps[0];
    let end = timestamps[timestamps.len() - 1];
    let count = ((end - start) / step_ms + GRID_EPSILON).floor() as usize;

    (0..count).map(|k| start + k as f64 * step_ms).collect()
}

/// Piecewise-linear interpolation of `values` at increasing `grid` points
/// that all lie within `[timestamps[0], timestamps[last])`.
fn interpolate(timestamps: &[f64], values: &[f64], grid: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(grid.len());
    let mut segment = 0;

    for &t in grid {
        while segment + 2 < timestamps.len() && timestamps[segment + 1] <= t {
            segment += 1;
        }

        let (t0, t1) = (timestamps[segment], timestamps[segment + 1]);
        let (v0, v1) = (values[segment], values[segment + 1]);
        let value = if t == t0 {
            v0
        } else {
            v0 + (v1 - v0) * (t - t0) / (t1 - t0)
        };
        out.push(value);
    }

    out
}
