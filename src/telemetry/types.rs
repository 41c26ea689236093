//! Signal types shared by the resampler, the window extractor and the chunk store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;

/// Identity of one ride: a user driving one scenario.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordingId {
    pub user: String,
    pub scenario: u32,
}

impl RecordingId {
    pub fn new(user: impl Into<String>, scenario: u32) -> Self {
        Self {
            user: user.into(),
            scenario,
        }
    }

    /// Parse the id from a file name such as `user_151_s3.csv`.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_stem()?.to_str()?.parse().ok()
    }

    /// User label as it appears in grading output (`user_151`).
    pub fn user_label(&self) -> String {
        format!("user_{}", self.user)
    }
}

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user_{}_s{}", self.user, self.scenario)
    }
}

impl FromStr for RecordingId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("user_")
            .ok_or_else(|| format!("'{s}' does not start with 'user_'"))?;
        let (user, scenario) = rest
            .rsplit_once("_s")
            .ok_or_else(|| format!("'{s}' has no scenario suffix"))?;
        if user.is_empty() {
            return Err(format!("'{s}' has an empty user id"));
        }
        let scenario = scenario
            .parse()
            .map_err(|_| format!("'{s}' has a non-numeric scenario"))?;
        Ok(Self::new(user, scenario))
    }
}

/// A named numeric signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub values: Vec<f64>,
}

impl Channel {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Raw telemetry: irregular timestamps (ms) with parallel channel values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignalTable {
    pub timestamps_ms: Vec<f64>,
    pub channels: Vec<Channel>,
}

impl SignalTable {
    pub fn len(&self) -> usize {
        self.timestamps_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps_ms.is_empty()
    }
}

/// Telemetry on the uniform video frame grid.
///
/// `frames`, `timestamps_ms` and every channel's values are parallel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameSeries {
    pub frames: Vec<u64>,
    pub timestamps_ms: Vec<f64>,
    pub channels: Vec<Channel>,
}

impl FrameSeries {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Values of the named channel.
    pub fn channel(&self, name: &str) -> Option<&[f64]> {
        self.channels
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.name.as_str())
    }

    /// Copy of the frames in `range`, keeping their frame numbers.
    pub fn slice(&self, range: Range<usize>) -> FrameSeries {
        FrameSeries {
            frames: self.frames[range.clone()].to_vec(),
            timestamps_ms: self.timestamps_ms[range.clone()].to_vec(),
            channels: self
                .channels
                .iter()
                .map(|c| Channel::new(c.name.clone(), c.values[range.clone()].to_vec()))
                .collect(),
        }
    }
}
