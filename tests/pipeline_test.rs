//! End-to-end run of split, annotate, grade and report on a synthetic ride.

use handover_awareness::audit::RunLog;
use handover_awareness::config::Config;
use handover_awareness::core::grading::{RequestKind, TorResponse};
use handover_awareness::core::{read_grading_json, ChunkStore};
use handover_awareness::pipeline;
use handover_awareness::report::GazeReport;
use handover_awareness::telemetry::RecordingId;
use std::fmt::Write as _;
use std::path::Path;

const HEADER: &str = "TIMESTAMP;AUTO_DRIVE;LEAD_TIME;HUD_5019;STEERING_WHEEL_ANGLE;SPEED;SPEED_LIMIT;ACCELERATION;ACCELERATION_Y";

/// Raw samples recorded before the video started.
const PRE_ROLL: usize = 10;
const FRAMES: usize = 49;

/// Channel values of video frame `f`.
///
/// - frames 5..8: auto-drive requested in manual mode, automation on from 8
/// - frames 20..24: take-over requested, driver takes over at 22 and speeds
/// - frames 45..: a take-over request still pending when the ride ends
fn sample(f: usize) -> (f64, f64, f64, f64) {
    let auto_drive = if (8..22).contains(&f) { 4.0 } else { 0.0 };
    let lead_time = if (20..24).contains(&f) || f >= 45 { 1.0 } else { 0.0 };
    let hud = if (5..8).contains(&f) { 1.0 } else { 0.0 };
    let speed = if (22..29).contains(&f) { 40.0 } else { 30.0 };
    (auto_drive, lead_time, hud, speed)
}

fn write_telemetry(config: &Config, id: &RecordingId) {
    write_telemetry_with(config, id, sample);
}

fn write_telemetry_with(config: &Config, id: &RecordingId, sample: fn(usize) -> (f64, f64, f64, f64)) {
    // One raw sample per 100 ms; the last one only closes the grid.
    let mut csv = format!("{HEADER}\n");
    for i in 0..PRE_ROLL + FRAMES + 1 {
        let (auto_drive, lead_time, hud, speed) = if i < PRE_ROLL {
            (0.0, 0.0, 0.0, 30.0)
        } else {
            sample((i - PRE_ROLL).min(FRAMES - 1))
        };
        writeln!(
            csv,
            "{};{auto_drive};{lead_time};{hud};0;{speed};30;0;0",
            i * 100_000
        )
        .unwrap();
    }

    std::fs::create_dir_all(config.telemetry_dir()).unwrap();
    std::fs::write(config.telemetry_dir().join(format!("{id}.csv")), csv).unwrap();

    std::fs::create_dir_all(config.timestamps_dir()).unwrap();
    std::fs::write(
        config.timestamps_dir().join(format!("{id}.txt")),
        (PRE_ROLL * 100_000).to_string(),
    )
    .unwrap();
}

/// The driver looks at the road, except at frames 11 and 12.
fn write_detections(config: &Config, id: &RecordingId) {
    let mut jsonl = String::new();
    for f in 0..FRAMES {
        let marker = if f == 11 || f == 12 {
            "[0.4, 0.7, 0.5, 0.8]"
        } else {
            "[0.4, 0.2, 0.5, 0.3]"
        };
        let line = format!(
            r#"{{"frame": {f}, "detections": [
                {{"label": "marker", "confidence": 0.9, "bbox": [0.0, 0.0, 1.0, 0.5]}},
                {{"label": "distraction", "confidence": 0.8, "bbox": [0.3, 0.6, 0.6, 0.9]}},
                {{"label": "view_marker", "confidence": 0.95, "bbox": {marker}}}
            ]}}"#
        );
        writeln!(jsonl, "{}", line.replace('\n', " ")).unwrap();
    }

    std::fs::create_dir_all(config.detections_dir()).unwrap();
    std::fs::write(config.detections_dir().join(format!("{id}.jsonl")), jsonl).unwrap();
}

fn test_config(root: &Path) -> Config {
    let mut config = Config {
        data_dir: root.join("simulator_data"),
        output_dir: root.join("post_analysis"),
        scenarios: vec![1],
        ..Config::default()
    };
    config.telemetry.target_fps = 10.0;
    config.events.lookahead_frames = 5;
    config.grading.window_secs = 1.0;
    config.grading.expected_windows = Some(2);
    config
}

#[test]
fn test_split_annotate_grade() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let id = RecordingId::new("1", 1);
    write_telemetry(&config, &id);
    write_detections(&config, &id);

    // A second user without data is skipped, not fatal.
    let recordings = vec![id.clone(), RecordingId::new("2", 1)];

    let mut split_log = RunLog::new("split");
    pipeline::split_all(&config, &recordings, &mut split_log);
    assert_eq!(split_log.recordings_processed, 1);
    assert_eq!(split_log.recordings_skipped, 1);
    assert_eq!(split_log.windows_written, 2);
    assert_eq!(split_log.leftovers_written, 1);

    let store = ChunkStore::new(&config.chunks_dir(), &id);
    let chunks = store.read_all().unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].1.frames, (5..13).collect::<Vec<u64>>());
    assert_eq!(chunks[1].1.frames, (20..29).collect::<Vec<u64>>());
    assert!(store.leftover_path().is_file());

    let mut annotate_log = RunLog::new("annotate");
    pipeline::annotate_all(&config, &recordings, &mut annotate_log);
    assert_eq!(annotate_log.recordings_processed, 1);
    assert_eq!(annotate_log.frames_annotated, 17);

    let mut grade_log = RunLog::new("grade");
    let rides = pipeline::grade_all(&config, &recordings, &mut grade_log).unwrap();
    assert_eq!(rides.len(), 1);
    assert_eq!(grade_log.windows_graded, 2);

    let windows = &rides[0].windows;
    assert_eq!(windows.len(), 2);
    assert!(windows.iter().all(|w| w.hud && !w.adl_fail));

    let adl = windows[0].adl.as_ref().unwrap();
    assert_eq!(windows[0].request, RequestKind::AutoDrive);
    assert!(adl.under_threshold);
    let gaze = adl.gaze.unwrap();
    assert!((gaze.road - 0.6).abs() < 1e-9);
    assert!((gaze.distraction - 0.4).abs() < 1e-9);

    let tor = windows[1].tor.as_ref().unwrap();
    assert_eq!(windows[1].request, RequestKind::TakeOver);
    assert!((tor.reaction_time_secs - 0.2).abs() < 1e-9);
    assert_eq!(tor.response, TorResponse::Visual);
    assert!((tor.gaze.unwrap().road - 1.0).abs() < 1e-9);
    let after = tor.after_takeover.unwrap();
    assert!((after.speeding - 1.0).abs() < 1e-9);
    assert_eq!(after.lateral, 0.0);

    let table = std::fs::read_to_string(config.grading_dir().join("grading_data.csv")).unwrap();
    let mut lines = table.lines();
    assert!(lines.next().unwrap().starts_with("USER;SCENARIO;HUD;WINDOW;REQUEST_TYPE"));
    assert!(lines.next().unwrap().starts_with("user_1;1;true;0;AUTO_DRIVE;true;false"));
    assert!(lines.next().unwrap().contains(";-;-;-;"));

    let stored = read_grading_json(&config.grading_dir().join("grading_data.json")).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].recording, id);
    assert_eq!(stored[0].windows.len(), 2);

    let report = GazeReport::from_rides(&stored, "1", 1).unwrap().render();
    assert!(report.contains("ADL transition 1: Road 60.0% | Distraction 40.0%"));
    assert!(report.contains("TOR transition 1: Road 100.0%"));
}

#[test]
fn test_split_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let id = RecordingId::new("7", 1);
    write_telemetry(&config, &id);

    let first = pipeline::split_recording(&config, &id).unwrap();
    let second = pipeline::split_recording(&config, &id).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.frames, FRAMES);
    assert_eq!(first.windows, 2);

    // Same ride with only the auto-drive request left.
    write_telemetry_with(&config, &id, |f| {
        if f < 20 {
            sample(f)
        } else {
            (0.0, 0.0, 0.0, 30.0)
        }
    });
    let third = pipeline::split_recording(&config, &id).unwrap();
    assert_eq!(third.windows, 1);
    assert!(third.leftover.is_none());

    let store = ChunkStore::new(&config.chunks_dir(), &id);
    let chunks = store.read_all().unwrap();
    assert_eq!(chunks.len(), third.windows);
    assert_eq!(chunks[0].1.frames, (5..13).collect::<Vec<u64>>());
    assert!(!store.leftover_path().exists());
}

#[test]
fn test_annotate_without_chunks_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let id = RecordingId::new("3", 1);
    write_detections(&config, &id);

    let mut log = RunLog::new("annotate");
    pipeline::annotate_all(&config, &[id], &mut log);
    assert_eq!(log.recordings_skipped, 1);
    assert_eq!(log.recordings_failed, 0);
}
