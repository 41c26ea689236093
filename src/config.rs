//! Configuration for the handover analysis.
//!
//! Every domain constant (frame rate, lookahead, thresholds) lives here with
//! a documented default, so a study can be re-run with different policy
//! without touching the pipeline code.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main configuration for the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the simulator data (`user_data/`, `timestamps/`, `detections/`)
    pub data_dir: PathBuf,

    /// Root for everything the analysis writes
    pub output_dir: PathBuf,

    /// Optional file listing user ids, one per line
    pub user_ids_file: Option<PathBuf>,

    /// Scenarios processed for every user
    pub scenarios: Vec<u32>,

    pub telemetry: TelemetryConfig,
    pub channels: ChannelMap,
    pub events: EventConfig,
    pub gaze: GazeConfig,
    pub grading: GradingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("simulator_data"),
            output_dir: PathBuf::from("post_analysis"),
            user_ids_file: None,
            scenarios: vec![1, 3],
            telemetry: TelemetryConfig::default(),
            channels: ChannelMap::default(),
            events: EventConfig::default(),
            gaze: GazeConfig::default(),
            grading: GradingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the given file.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get the path to the default configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("handover-awareness")
            .join("config.json")
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.telemetry.target_fps.is_finite() && self.telemetry.target_fps > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "target_fps must be positive, got {}",
                self.telemetry.target_fps
            )));
        }
        if !(0.0..=1.0).contains(&self.gaze.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "min_confidence must be within [0, 1], got {}",
                self.gaze.min_confidence
            )));
        }
        if self.telemetry.delimiter.len_utf8() != 1 {
            return Err(ConfigError::Invalid(
                "telemetry delimiter must be a single-byte character".to_string(),
            ));
        }
        Ok(())
    }

    /// Ensure the output directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    pub fn telemetry_dir(&self) -> PathBuf {
        self.data_dir.join("user_data")
    }

    pub fn timestamps_dir(&self) -> PathBuf {
        self.data_dir.join("timestamps")
    }

    pub fn detections_dir(&self) -> PathBuf {
        self.data_dir.join("detections")
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.output_dir.join("chunks")
    }

    pub fn video_analysis_dir(&self) -> PathBuf {
        self.output_dir.join("video_analysis")
    }

    pub fn grading_dir(&self) -> PathBuf {
        self.output_dir.join("grading")
    }

    pub fn run_log_path(&self) -> PathBuf {
        self.output_dir.join("run_log.json")
    }
}

/// How raw telemetry is read and resampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Field delimiter of the raw telemetry file
    pub delimiter: char,
    /// Name of the microsecond timestamp column
    pub timestamp_column: String,
    /// Channels carried through resampling, windowing and annotation
    pub channels: Vec<String>,
    /// Video frame rate the telemetry is resampled to
    pub target_fps: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            delimiter: ';',
            timestamp_column: "TIMESTAMP".to_string(),
            channels: [
                "AUTO_DRIVE",
                "LEAD_TIME",
                "HUD_5019",
                "STEERING_WHEEL_ANGLE",
                "SPEED",
                "SPEED_LIMIT",
                "ACCELERATION",
                "ACCELERATION_Y",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            target_fps: 50.0,
        }
    }
}

impl TelemetryConfig {
    /// Frame spacing in milliseconds.
    pub fn frame_step_ms(&self) -> f64 {
        1000.0 / self.target_fps
    }
}

/// Which channel plays which role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelMap {
    /// Positive while a take-over request is shown
    pub take_over: String,
    /// Positive while an auto-drive request is shown
    pub auto_drive_request: String,
    /// Automation state, `automatic_mode_value` when fully automatic
    pub driving_mode: String,
    pub speed: String,
    pub speed_limit: String,
    pub acceleration: String,
    pub lateral_acceleration: String,
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self {
            take_over: "LEAD_TIME".to_string(),
            auto_drive_request: "HUD_5019".to_string(),
            driving_mode: "AUTO_DRIVE".to_string(),
            speed: "SPEED".to_string(),
            speed_limit: "SPEED_LIMIT".to_string(),
            acceleration: "ACCELERATION".to_string(),
            lateral_acceleration: "ACCELERATION_Y".to_string(),
        }
    }
}

/// Event detection and window policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Driving-mode value meaning "fully automatic"
    pub automatic_mode_value: f64,
    /// Frames appended after every active run
    pub lookahead_frames: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            automatic_mode_value: 4.0,
            lookahead_frames: 100,
        }
    }
}

/// Gaze annotation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    /// Detections below this confidence are ignored
    pub min_confidence: f32,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
        }
    }
}

/// Scoring thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    /// Span inspected after a transition (seconds)
    pub window_secs: f64,
    /// Speeding when speed exceeds the limit times this factor
    pub speeding_factor: f64,
    /// Longitudinal acceleration threshold (m/s²)
    pub acceleration_threshold: f64,
    /// Longitudinal deceleration threshold (m/s², negative)
    pub deceleration_threshold: f64,
    /// Absolute lateral acceleration threshold (m/s²)
    pub lateral_threshold: f64,
    /// Reactions faster than this answered the visual warning (seconds)
    pub visual_response_secs: f64,
    /// Reactions faster than this answered the auditory warning (seconds)
    pub auditory_response_secs: f64,
    /// Number of transitions a complete ride contains
    pub expected_windows: Option<usize>,
    /// Scenarios driven with the head-up display
    pub hud_scenarios: Vec<u32>,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            window_secs: 5.0,
            speeding_factor: 1.10,
            acceleration_threshold: 1.0,
            deceleration_threshold: -2.0,
            lateral_threshold: 0.5,
            visual_response_secs: 10.0,
            auditory_response_secs: 15.0,
            expected_windows: Some(8),
            hud_scenarios: vec![1],
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(serde_json::Error),
    #[error("Serialize error: {0}")]
    Serialize(serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
