//! Textual summary of where one driver looked during one scenario.
//!
//! Per transition, the gaze shares above 10% are listed; below that, the
//! mean share of every target across the transitions of each kind is drawn
//! as a horizontal bar.

use crate::core::grading::{GazeShare, RequestKind, RideGrades};
use statrs::statistics::Statistics;
use std::fmt;

/// Gaze targets in the order of [`GazeShare::values`].
pub const GAZE_LABELS: [&str; 6] = [
    "Road",
    "Distraction",
    "Mirrors",
    "Dashboard",
    "HUD",
    "Other/Undefined",
];

/// Shares at or below this are left out of the per-transition lines.
const HIDDEN_SHARE: f64 = 0.10;

const BAR_WIDTH: usize = 40;

/// Gaze shares of one ride, split by transition kind.
#[derive(Debug, Clone, PartialEq)]
pub struct GazeReport {
    pub user: String,
    pub scenario: u32,
    pub hud: bool,
    /// One entry per auto-drive window, `None` when it had no frames to score
    pub adl: Vec<Option<GazeShare>>,
    /// One entry per take-over window
    pub tor: Vec<Option<GazeShare>>,
}

impl GazeReport {
    /// Build the report of `user` in `scenario`, if that ride was graded.
    pub fn from_rides(rides: &[RideGrades], user: &str, scenario: u32) -> Option<Self> {
        let ride = rides
            .iter()
            .find(|r| r.recording.user == user && r.recording.scenario == scenario)?;

        let mut report = Self {
            user: ride.recording.user_label(),
            scenario,
            hud: ride.windows.first().is_some_and(|w| w.hud),
            adl: Vec::new(),
            tor: Vec::new(),
        };
        for window in &ride.windows {
            match window.request {
                RequestKind::AutoDrive => report.adl.push(window.adl.as_ref().and_then(|a| a.gaze)),
                RequestKind::TakeOver => report.tor.push(window.tor.as_ref().and_then(|t| t.gaze)),
            }
        }
        Some(report)
    }

    pub fn mean_adl(&self) -> Option<[f64; 6]> {
        mean_shares(&self.adl)
    }

    pub fn mean_tor(&self) -> Option<[f64; 6]> {
        mean_shares(&self.tor)
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "Gaze report for {}, scenario {}{}\n",
            self.user,
            self.scenario,
            if self.hud { " (HUD)" } else { "" }
        );

        out.push('\n');
        for (i, share) in self.adl.iter().enumerate() {
            out.push_str(&format!("ADL transition {}: {}\n", i + 1, share_line(share.as_ref())));
        }
        for (i, share) in self.tor.iter().enumerate() {
            out.push_str(&format!("TOR transition {}: {}\n", i + 1, share_line(share.as_ref())));
        }

        out.push_str("\nMean share of seen objects before ADL\n");
        out.push_str(&bar_chart(self.mean_adl()));
        out.push_str("\nMean share of seen objects after TOR\n");
        out.push_str(&bar_chart(self.mean_tor()));
        out
    }
}

impl fmt::Display for GazeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Per-target mean over the windows that had frames.
fn mean_shares(shares: &[Option<GazeShare>]) -> Option<[f64; 6]> {
    let scored: Vec<[f64; 6]> = shares.iter().flatten().map(GazeShare::values).collect();
    if scored.is_empty() {
        return None;
    }

    let mut means = [0.0; 6];
    for (slot, mean) in means.iter_mut().enumerate() {
        *mean = scored.iter().map(|values| values[slot]).mean();
    }
    Some(means)
}

fn share_line(share: Option<&GazeShare>) -> String {
    let Some(share) = share else {
        return "no frames".to_string();
    };

    let shown: Vec<String> = GAZE_LABELS
        .iter()
        .zip(share.values())
        .filter(|(_, value)| *value > HIDDEN_SHARE)
        .map(|(label, value)| format!("{label} {:.1}%", value * 100.0))
        .collect();

    if shown.is_empty() {
        "no target above 10%".to_string()
    } else {
        shown.join(" | ")
    }
}

fn bar_chart(values: Option<[f64; 6]>) -> String {
    let Some(values) = values else {
        return "  (no transitions)\n".to_string();
    };

    let mut out = String::new();
    for (label, value) in GAZE_LABELS.iter().zip(values) {
        let filled = (value.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize;
        out.push_str(&format!(
            "  {label:<16}|{}{}| {:>5.1}%\n",
            "█".repeat(filled),
            " ".repeat(BAR_WIDTH - filled),
            value * 100.0
        ));
    }
    out
}
