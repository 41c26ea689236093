//! Scoring of annotated event windows.
//!
//! A window opened in manual mode is an auto-drive (ADL) transition, one
//! opened in automatic mode a take-over (TOR). ADL windows are scored on how
//! quickly the driver engaged the automation and where they looked right
//! after; TOR windows on reaction time, where the driver looked while the
//! request was pending, and how they drove right after taking over.

use crate::config::{ChannelMap, GradingConfig};
use crate::gaze::annotate::{AnnotatedFrame, AnnotatedRide, DrivingMode};
use crate::gaze::detection::{LEFT_MIRROR, MIRROR, REARVIEW_MIRROR, RIGHT_MIRROR, ROAD};
use crate::telemetry::types::RecordingId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Placeholder for values that do not apply to a window.
const NOT_APPLICABLE: &str = "-";

#[derive(Debug, Error)]
pub enum GradeError {
    #[error("{recording} has no '{channel}' channel")]
    MissingChannel {
        recording: RecordingId,
        channel: String,
    },
    #[error("CSV error on {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("JSON error on {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Kind of automation transition a window covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    AutoDrive,
    TakeOver,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::AutoDrive => write!(f, "AUTO_DRIVE"),
            RequestKind::TakeOver => write!(f, "TAKE_OVER"),
        }
    }
}

/// Which warning the driver reacted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TorResponse {
    Visual,
    Auditory,
    NoResponse,
}

impl fmt::Display for TorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorResponse::Visual => write!(f, "VISUAL"),
            TorResponse::Auditory => write!(f, "AUDITORY"),
            TorResponse::NoResponse => write!(f, "NO_RESPONSE"),
        }
    }
}

/// Where a frame's gaze is attributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GazeTarget {
    Road,
    Distraction,
    Mirror,
    Dashboard,
    Hud,
    Other,
}

impl GazeTarget {
    fn matches(self, label: &str) -> bool {
        match self {
            GazeTarget::Road => label == ROAD,
            GazeTarget::Distraction => label == "distraction",
            GazeTarget::Mirror => matches!(
                label,
                MIRROR | LEFT_MIRROR | RIGHT_MIRROR | REARVIEW_MIRROR
            ),
            GazeTarget::Dashboard => label == "dashboard",
            GazeTarget::Hud => label == "header_display",
            GazeTarget::Other => false,
        }
    }
}

/// Gaze after an auto-drive request: road first, then distraction.
const ADL_PRIORITY: [GazeTarget; 2] = [GazeTarget::Road, GazeTarget::Distraction];

/// Gaze during a take-over request.
const TOR_PRIORITY: [GazeTarget; 4] = [
    GazeTarget::Road,
    GazeTarget::Mirror,
    GazeTarget::Dashboard,
    GazeTarget::Hud,
];

/// Attribute a frame to the first target in `priority` the driver looked at.
pub fn classify_gaze(seen_objects: &[String], priority: &[GazeTarget]) -> GazeTarget {
    priority
        .iter()
        .copied()
        .find(|target| seen_objects.iter().any(|label| target.matches(label)))
        .unwrap_or(GazeTarget::Other)
}

/// Share of frames per gaze target (0-1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GazeShare {
    pub road: f64,
    pub distraction: f64,
    pub mirrors: f64,
    pub dashboard: f64,
    pub hud: f64,
    pub other: f64,
}

impl GazeShare {
    /// Shares over `frames`, or `None` when there are no frames.
    pub fn from_frames<'f>(
        frames: impl IntoIterator<Item = &'f AnnotatedFrame>,
        priority: &[GazeTarget],
    ) -> Option<Self> {
        let mut counts = [0usize; 6];
        let mut total = 0usize;
        for frame in frames {
            let slot = match classify_gaze(&frame.seen_objects, priority) {
                GazeTarget::Road => 0,
                GazeTarget::Distraction => 1,
                GazeTarget::Mirror => 2,
                GazeTarget::Dashboard => 3,
                GazeTarget::Hud => 4,
                GazeTarget::Other => 5,
            };
            counts[slot] += 1;
            total += 1;
        }

        if total == 0 {
            return None;
        }
        let share = |n: usize| n as f64 / total as f64;
        Some(Self {
            road: share(counts[0]),
            distraction: share(counts[1]),
            mirrors: share(counts[2]),
            dashboard: share(counts[3]),
            hud: share(counts[4]),
            other: share(counts[5]),
        })
    }

    /// Values in display order: road, distraction, mirrors, dashboard, HUD, other.
    pub fn values(&self) -> [f64; 6] {
        [
            self.road,
            self.distraction,
            self.mirrors,
            self.dashboard,
            self.hud,
            self.other,
        ]
    }
}

/// Auto-drive transition scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdlGrade {
    /// Automation engaged within the inspection span
    pub under_threshold: bool,
    /// Gaze during the first seconds of automatic driving
    pub gaze: Option<GazeShare>,
}

/// Driving quality right after a take-over (shares of frames).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AfterTakeover {
    pub speeding: f64,
    pub acceleration: f64,
    pub deceleration: f64,
    pub lateral: f64,
}

/// Take-over transition scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorGrade {
    pub reaction_time_secs: f64,
    pub response: TorResponse,
    /// Gaze while the request was pending
    pub gaze: Option<GazeShare>,
    pub after_takeover: Option<AfterTakeover>,
}

/// Scores of one event window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowGrade {
    pub user: String,
    pub scenario: u32,
    pub hud: bool,
    pub window: usize,
    pub request: RequestKind,
    /// The ride did not contain the expected number of transitions
    pub adl_fail: bool,
    pub adl: Option<AdlGrade>,
    pub tor: Option<TorGrade>,
}

/// Immutable scores of one ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideGrades {
    pub recording: RecordingId,
    pub windows: Vec<WindowGrade>,
}

struct SignalColumns {
    speed: usize,
    speed_limit: usize,
    acceleration: usize,
    lateral: usize,
}

/// Builds the grades of one ride. Created fresh per ride.
pub struct RideGrader<'a> {
    config: &'a GradingConfig,
    fps: f64,
    recording: RecordingId,
    hud: bool,
    columns: SignalColumns,
    windows: Vec<WindowGrade>,
}

impl<'a> RideGrader<'a> {
    pub fn new(
        ride: &AnnotatedRide,
        config: &'a GradingConfig,
        channels: &ChannelMap,
        fps: f64,
    ) -> Result<Self, GradeError> {
        let column = |name: &str| {
            ride.signal_index(name)
                .ok_or_else(|| GradeError::MissingChannel {
                    recording: ride.recording.clone(),
                    channel: name.to_string(),
                })
        };

        Ok(Self {
            config,
            fps,
            hud: config.hud_scenarios.contains(&ride.recording.scenario),
            recording: ride.recording.clone(),
            columns: SignalColumns {
                speed: column(&channels.speed)?,
                speed_limit: column(&channels.speed_limit)?,
                acceleration: column(&channels.acceleration)?,
                lateral: column(&channels.lateral_acceleration)?,
            },
            windows: Vec::new(),
        })
    }

    /// Frames covering the inspection span.
    fn span_frames(&self) -> usize {
        (self.config.window_secs * self.fps).round() as usize
    }

    /// Score one window. Empty windows are ignored.
    pub fn grade_window(&mut self, window: usize, frames: &[AnnotatedFrame]) {
        let Some(first) = frames.first() else {
            return;
        };

        let (request, adl, tor) = match first.driving_mode {
            DrivingMode::Manual => (RequestKind::AutoDrive, Some(self.grade_adl(frames)), None),
            DrivingMode::Automatic => (RequestKind::TakeOver, None, Some(self.grade_tor(frames))),
        };

        self.windows.push(WindowGrade {
            user: self.recording.user_label(),
            scenario: self.recording.scenario,
            hud: self.hud,
            window,
            request,
            adl_fail: false,
            adl,
            tor,
        });
    }

    /// Finish the ride. Flags every window when the transition count is off.
    pub fn finish(mut self) -> RideGrades {
        let adl_fail = self
            .config
            .expected_windows
            .is_some_and(|expected| expected != self.windows.len());
        for grade in &mut self.windows {
            grade.adl_fail = adl_fail;
        }

        RideGrades {
            recording: self.recording,
            windows: self.windows,
        }
    }

    fn grade_adl(&self, frames: &[AnnotatedFrame]) -> AdlGrade {
        let span = self.span_frames();
        let manual = frames
            .iter()
            .filter(|f| f.driving_mode == DrivingMode::Manual)
            .count();
        let automatic = frames
            .iter()
            .filter(|f| f.driving_mode == DrivingMode::Automatic)
            .take(span);

        AdlGrade {
            under_threshold: manual < span,
            gaze: GazeShare::from_frames(automatic, &ADL_PRIORITY),
        }
    }

    fn grade_tor(&self, frames: &[AnnotatedFrame]) -> TorGrade {
        let automatic: Vec<&AnnotatedFrame> = frames
            .iter()
            .filter(|f| f.driving_mode == DrivingMode::Automatic)
            .collect();
        let reaction_time_secs = automatic.len() as f64 / self.fps;

        let response = if reaction_time_secs < self.config.visual_response_secs {
            TorResponse::Visual
        } else if reaction_time_secs < self.config.auditory_response_secs {
            TorResponse::Auditory
        } else {
            TorResponse::NoResponse
        };

        TorGrade {
            reaction_time_secs,
            response,
            gaze: GazeShare::from_frames(automatic, &TOR_PRIORITY),
            after_takeover: self.after_takeover(frames),
        }
    }

    fn after_takeover(&self, frames: &[AnnotatedFrame]) -> Option<AfterTakeover> {
        let manual: Vec<&AnnotatedFrame> = frames
            .iter()
            .filter(|f| f.driving_mode == DrivingMode::Manual)
            .take(self.span_frames())
            .collect();
        if manual.is_empty() {
            return None;
        }

        let c = &self.columns;
        let share = |predicate: &dyn Fn(&AnnotatedFrame) -> bool| {
            manual.iter().filter(|f| predicate(f)).count() as f64 / manual.len() as f64
        };

        Some(AfterTakeover {
            speeding: share(&|f: &AnnotatedFrame| {
                f.signals[c.speed] > f.signals[c.speed_limit] * self.config.speeding_factor
            }),
            acceleration: share(&|f: &AnnotatedFrame| f.signals[c.acceleration] > self.config.acceleration_threshold),
            deceleration: share(&|f: &AnnotatedFrame| f.signals[c.acceleration] < self.config.deceleration_threshold),
            lateral: share(&|f: &AnnotatedFrame| f.signals[c.lateral].abs() > self.config.lateral_threshold),
        })
    }
}

/// Grade every window of a ride.
pub fn grade_ride(
    ride: &AnnotatedRide,
    config: &GradingConfig,
    channels: &ChannelMap,
    fps: f64,
) -> Result<RideGrades, GradeError> {
    let mut grader = RideGrader::new(ride, config, channels, fps)?;
    for (window, frames) in ride.windows() {
        grader.grade_window(window, frames);
    }
    Ok(grader.finish())
}

const GRADING_HEADER: [&str; 21] = [
    "USER",
    "SCENARIO",
    "HUD",
    "WINDOW",
    "REQUEST_TYPE",
    "ADL_UNDER_THRESHOLD",
    "ADL_FAIL",
    "ADL_ROAD",
    "ADL_DISTRACTION",
    "ADL_OTHER_OR_UNDEFINED",
    "TOR_RT",
    "TOR_RESPONSE",
    "TOR_MIRRORS",
    "TOR_ROAD",
    "TOR_DASHBOARD",
    "TOR_HUD",
    "TOR_OTHER_OR_UNDEFINED",
    "TOR_SPEEDING",
    "TOR_ACC",
    "TOR_DCC",
    "TOR_ACC_Y",
];

fn cell<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| NOT_APPLICABLE.to_string(), |v| v.to_string())
}

fn grading_row(grade: &WindowGrade) -> Vec<String> {
    let adl = grade.adl.as_ref();
    let adl_gaze = adl.and_then(|a| a.gaze);
    let tor = grade.tor.as_ref();
    let tor_gaze = tor.and_then(|t| t.gaze);
    let after = tor.and_then(|t| t.after_takeover);

    vec![
        grade.user.clone(),
        grade.scenario.to_string(),
        grade.hud.to_string(),
        grade.window.to_string(),
        grade.request.to_string(),
        cell(adl.map(|a| a.under_threshold)),
        grade.adl_fail.to_string(),
        cell(adl_gaze.map(|g| g.road)),
        cell(adl_gaze.map(|g| g.distraction)),
        cell(adl_gaze.map(|g| g.other)),
        cell(tor.map(|t| t.reaction_time_secs)),
        cell(tor.map(|t| t.response)),
        cell(tor_gaze.map(|g| g.mirrors)),
        cell(tor_gaze.map(|g| g.road)),
        cell(tor_gaze.map(|g| g.dashboard)),
        cell(tor_gaze.map(|g| g.hud)),
        cell(tor_gaze.map(|g| g.other)),
        cell(after.map(|a| a.speeding)),
        cell(after.map(|a| a.acceleration)),
        cell(after.map(|a| a.deceleration)),
        cell(after.map(|a| a.lateral)),
    ]
}

/// Write all window grades as one semicolon-delimited table.
pub fn write_grading_csv(path: &Path, rides: &[RideGrades]) -> Result<(), GradeError> {
    let csv_error = |source| GradeError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .map_err(csv_error)?;

    writer.write_record(GRADING_HEADER).map_err(csv_error)?;
    for grade in rides.iter().flat_map(|r| &r.windows) {
        writer.write_record(grading_row(grade)).map_err(csv_error)?;
    }

    writer.flush().map_err(|source| GradeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_grading_json(path: &Path, rides: &[RideGrades]) -> Result<(), GradeError> {
    let json = serde_json::to_string_pretty(rides).map_err(|source| GradeError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| GradeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_grading_json(path: &Path) -> Result<Vec<RideGrades>, GradeError> {
    let content = std::fs::read_to_string(path).map_err(|source| GradeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| GradeError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FPS: f64 = 10.0;

    fn signal_names() -> Vec<String> {
        ["SPEED", "SPEED_LIMIT", "ACCELERATION", "ACCELERATION_Y"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn frame(chunk: usize, mode: DrivingMode, seen: &[&str], signals: [f64; 4]) -> AnnotatedFrame {
        AnnotatedFrame {
            chunk,
            frame: 0,
            driving_mode: mode,
            seen_objects: seen.iter().map(|s| s.to_string()).collect(),
            signals: signals.to_vec(),
        }
    }

    fn calm() -> [f64; 4] {
        [50.0, 50.0, 0.0, 0.0]
    }

    fn config() -> GradingConfig {
        GradingConfig {
            expected_windows: Some(2),
            ..GradingConfig::default()
        }
    }

    #[test]
    fn test_classify_gaze_priority() {
        let seen = vec!["dashboard".to_string(), "left_mirror".to_string()];
        assert_eq!(classify_gaze(&seen, &TOR_PRIORITY), GazeTarget::Mirror);
        assert_eq!(classify_gaze(&seen, &ADL_PRIORITY), GazeTarget::Other);
        assert_eq!(classify_gaze(&[], &TOR_PRIORITY), GazeTarget::Other);
        let seen = vec!["distraction".to_string(), "road".to_string()];
        assert_eq!(classify_gaze(&seen, &ADL_PRIORITY), GazeTarget::Road);
    }

    #[test]
    fn test_take_over_window() {
        let mut ride = AnnotatedRide::new(RecordingId::new("9", 1), signal_names());
        // 12 automatic frames (1.2 s) then 4 manual frames after the take-over.
        for i in 0..12 {
            let seen: &[&str] = if i < 6 { &["road"] } else { &["header_display"] };
            ride.frames.push(frame(0, DrivingMode::Automatic, seen, calm()));
        }
        ride.frames.push(frame(0, DrivingMode::Manual, &[], [60.0, 50.0, 1.5, 0.0]));
        ride.frames.push(frame(0, DrivingMode::Manual, &[], [50.0, 50.0, -3.0, 0.6]));
        ride.frames.push(frame(0, DrivingMode::Manual, &[], calm()));
        ride.frames.push(frame(0, DrivingMode::Manual, &[], [50.0, 50.0, 0.0, -0.7]));

        let grades = grade_ride(&ride, &config(), &ChannelMap::default(), FPS).unwrap();
        assert_eq!(grades.windows.len(), 1);
        let window = &grades.windows[0];
        assert_eq!(window.request, RequestKind::TakeOver);
        assert!(window.hud);
        assert!(window.adl_fail);
        assert!(window.adl.is_none());

        let tor = window.tor.as_ref().unwrap();
        assert!((tor.reaction_time_secs - 1.2).abs() < 1e-12);
        assert_eq!(tor.response, TorResponse::Visual);
        let gaze = tor.gaze.unwrap();
        assert_eq!(gaze.road, 0.5);
        assert_eq!(gaze.hud, 0.5);
        assert_eq!(gaze.other, 0.0);

        let after = tor.after_takeover.unwrap();
        assert_eq!(after.speeding, 0.25);
        assert_eq!(after.acceleration, 0.25);
        assert_eq!(after.deceleration, 0.25);
        assert_eq!(after.lateral, 0.5);
    }

    #[test]
    fn test_auto_drive_window() {
        let mut ride = AnnotatedRide::new(RecordingId::new("9", 3), signal_names());
        for _ in 0..20 {
            ride.frames.push(frame(0, DrivingMode::Manual, &["road"], calm()));
        }
        // Span is 5 s * 10 fps = 50 frames; only the first 50 automatic frames count.
        for i in 0..60 {
            let seen: &[&str] = if i < 10 { &["distraction"] } else { &["road"] };
            ride.frames.push(frame(0, DrivingMode::Automatic, seen, calm()));
        }
        for _ in 0..5 {
            ride.frames.push(frame(1, DrivingMode::Manual, &[], calm()));
        }

        let grades = grade_ride(&ride, &config(), &ChannelMap::default(), FPS).unwrap();
        assert_eq!(grades.windows.len(), 2);
        assert!(!grades.windows[0].adl_fail);
        assert!(!grades.windows[0].hud);

        let adl = grades.windows[0].adl.as_ref().unwrap();
        assert!(adl.under_threshold);
        let gaze = adl.gaze.unwrap();
        assert_eq!(gaze.distraction, 0.2);
        assert_eq!(gaze.road, 0.8);

        // Second window never reached automatic mode.
        let adl = grades.windows[1].adl.as_ref().unwrap();
        assert!(adl.under_threshold);
        assert!(adl.gaze.is_none());
    }

    #[test]
    fn test_reaction_buckets() {
        let mut ride = AnnotatedRide::new(RecordingId::new("9", 1), signal_names());
        for _ in 0..120 {
            ride.frames.push(frame(0, DrivingMode::Automatic, &[], calm()));
        }
        for _ in 0..200 {
            ride.frames.push(frame(1, DrivingMode::Automatic, &[], calm()));
        }
        let grades = grade_ride(&ride, &config(), &ChannelMap::default(), FPS).unwrap();
        let tor0 = grades.windows[0].tor.as_ref().unwrap();
        let tor1 = grades.windows[1].tor.as_ref().unwrap();
        assert_eq!(tor0.response, TorResponse::Auditory);
        assert_eq!(tor1.response, TorResponse::NoResponse);
        assert!(tor1.after_takeover.is_none());
    }

    #[test]
    fn test_missing_signal_channel() {
        let ride = AnnotatedRide::new(RecordingId::new("9", 1), vec!["SPEED".to_string()]);
        let config = config();
        assert!(matches!(
            RideGrader::new(&ride, &config, &ChannelMap::default(), FPS),
            Err(GradeError::MissingChannel { .. })
        ));
    }

    #[test]
    fn test_grading_row_placeholders() {
        let grade = WindowGrade {
            user: "user_9".to_string(),
            scenario: 3,
            hud: false,
            window: 4,
            request: RequestKind::AutoDrive,
            adl_fail: false,
            adl: Some(AdlGrade {
                under_threshold: true,
                gaze: None,
            }),
            tor: None,
        };
        let row = grading_row(&grade);
        assert_eq!(row.len(), GRADING_HEADER.len());
        assert_eq!(row[4], "AUTO_DRIVE");
        assert_eq!(row[5], "true");
        assert_eq!(row[7], "-");
        assert_eq!(row[10], "-");
    }

    #[test]
    fn test_grading_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut ride = AnnotatedRide::new(RecordingId::new("9", 1), signal_names());
        ride.frames.push(frame(0, DrivingMode::Automatic, &["road"], calm()));
        ride.frames.push(frame(0, DrivingMode::Manual, &[], calm()));
        let grades = vec![grade_ride(&ride, &config(), &ChannelMap::default(), FPS).unwrap()];

        let csv_path = dir.path().join("grading_data.csv");
        write_grading_csv(&csv_path, &grades).unwrap();
        let content = std::fs::read_to_string(&csv_path).unwrap();
        assert!(content.starts_with("USER;SCENARIO;HUD;WINDOW;REQUEST_TYPE"));
        assert_eq!(content.lines().count(), 2);

        let json_path = dir.path().join("grading_data.json");
        write_grading_json(&json_path, &grades).unwrap();
        assert_eq!(read_grading_json(&json_path).unwrap(), grades);
    }
}
