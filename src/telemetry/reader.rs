//! Reading raw simulator telemetry and the video start reference.

use crate::config::TelemetryConfig;
use crate::telemetry::types::{Channel, SignalTable};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Raw timestamps are microseconds; everything downstream works in milliseconds.
const MICROS_PER_MILLI: f64 = 1000.0;

/// Errors while reading telemetry inputs.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed table {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("{path} has no column '{column}'")]
    MissingColumn { path: PathBuf, column: String },
    #[error("{path} row {row}: column '{column}' holds '{value}', not a number")]
    InvalidValue {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },
    #[error("{path} does not hold an integer timestamp: '{content}'")]
    InvalidReference { path: PathBuf, content: String },
}

/// Read the timestamp column and the configured channels of a telemetry table.
pub fn read_signal_table(path: &Path, config: &TelemetryConfig) -> Result<SignalTable, TelemetryError> {
    let csv_error = |source| TelemetryError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter as u8)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_error)?;

    let headers = reader.headers().map_err(csv_error)?.clone();
    let column_index = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| TelemetryError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
    };

    let timestamp_idx = column_index(&config.timestamp_column)?;
    let channel_idx = config
        .channels
        .iter()
        .map(|name| column_index(name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut table = SignalTable {
        timestamps_ms: Vec::new(),
        channels: config
            .channels
            .iter()
            .map(|name| Channel::new(name.clone(), Vec::new()))
            .collect(),
    };

    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(csv_error)?;
        // Header is line 1.
        let line = row + 2;

        let parse = |idx: usize, column: &str| -> Result<f64, TelemetryError> {
            let raw = record.get(idx).unwrap_or("");
            raw.parse::<f64>().map_err(|_| TelemetryError::InvalidValue {
                path: path.to_path_buf(),
                row: line,
                column: column.to_string(),
                value: raw.to_string(),
            })
        };

        let timestamp = parse(timestamp_idx, &config.timestamp_column)?;
        table.timestamps_ms.push(timestamp / MICROS_PER_MILLI);

        for (channel, &idx) in table.channels.iter_mut().zip(&channel_idx) {
            let value = parse(idx, &channel.name)?;
            channel.values.push(value);
        }
    }

    debug!(path = %path.display(), rows = table.len(), "read telemetry");
    Ok(table)
}

/// Read the video start timestamp (microseconds) and return it in milliseconds.
pub fn read_reference_timestamp(path: &Path) -> Result<f64, TelemetryError> {
    let content = std::fs::read_to_string(path).map_err(|source| TelemetryError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let micros: i64 = content
        .trim()
        .parse()
        .map_err(|_| TelemetryError::InvalidReference {
            path: path.to_path_buf(),
            content: content.trim().to_string(),
        })?;

    Ok(micros as f64 / MICROS_PER_MILLI)
}
