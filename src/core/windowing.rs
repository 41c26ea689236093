//! Segmentation of a ride into event windows around automation transitions.
//!
//! Frames are fed in order. A run of active frames opens a window; the first
//! inactive frame closes the run, after which `lookahead` frames (starting
//! with that inactive frame) are appended to capture post-event behavior.
//! Frames consumed as lookahead are not scanned for new events, so windows
//! never overlap.

use crate::config::{ChannelMap, EventConfig};
use crate::telemetry::types::FrameSeries;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;
use tracing::debug;

/// What a frame signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventFlag {
    Inactive,
    /// The automation asks the driver to take over
    TakeOver,
    /// The automation offers auto-drive while not fully automatic
    AutoDriveRequest,
}

impl EventFlag {
    pub fn is_active(self) -> bool {
        self != EventFlag::Inactive
    }
}

/// Derives per-frame event flags from the request and mode channels.
#[derive(Debug, Clone)]
pub struct EventCondition {
    take_over: String,
    auto_drive_request: String,
    driving_mode: String,
    automatic_mode_value: f64,
}

#[derive(Debug, Error, PartialEq)]
#[error("event channel '{0}' is missing from the frame series")]
pub struct MissingChannel(pub String);

impl EventCondition {
    pub fn new(channels: &ChannelMap, events: &EventConfig) -> Self {
        Self {
            take_over: channels.take_over.clone(),
            auto_drive_request: channels.auto_drive_request.clone(),
            driving_mode: channels.driving_mode.clone(),
            automatic_mode_value: events.automatic_mode_value,
        }
    }

    /// Classify a single frame.
    pub fn classify(&self, take_over: f64, auto_drive_request: f64, driving_mode: f64) -> EventFlag {
        if take_over > 0.0 {
            EventFlag::TakeOver
        } else if auto_drive_request > 0.0 && driving_mode < self.automatic_mode_value {
            EventFlag::AutoDriveRequest
        } else {
            EventFlag::Inactive
        }
    }

    /// Flags for every frame of the series.
    pub fn flags(&self, series: &FrameSeries) -> Result<Vec<EventFlag>, MissingChannel> {
        let lookup = |name: &str| {
            series
                .channel(name)
                .ok_or_else(|| MissingChannel(name.to_string()))
        };
        let take_over = lookup(&self.take_over)?;
        let request = lookup(&self.auto_drive_request)?;
        let mode = lookup(&self.driving_mode)?;

        Ok(take_over
            .iter()
            .zip(request)
            .zip(mode)
            .map(|((&t, &r), &m)| self.classify(t, r, m))
            .collect())
    }
}

/// A bounded frame range around one transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWindow {
    /// Position within the ride, from 0
    pub sequence: usize,
    /// First frame of the active run (series position)
    pub start: usize,
    /// One past the last active frame
    pub active_end: usize,
    /// One past the last lookahead frame
    pub end: usize,
    /// What the onset frame signalled
    pub kind: EventFlag,
}

impl EventWindow {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Number of frames appended after the active run.
    pub fn lookahead_len(&self) -> usize {
        self.end - self.active_end
    }
}

/// An active run still open when the ride ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeftoverRun {
    pub start: usize,
    pub end: usize,
    pub kind: EventFlag,
}

impl LeftoverRun {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Result of segmenting a whole ride.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmentation {
    pub windows: Vec<EventWindow>,
    pub leftover: Option<LeftoverRun>,
    /// Event onsets that fell inside a lookahead and joined the previous window
    pub absorbed_onsets: usize,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    Active {
        start: usize,
        kind: EventFlag,
    },
    Closing {
        start: usize,
        active_end: usize,
        kind: EventFlag,
        remaining: usize,
    },
}

/// Turns a stream of event flags into event windows.
pub struct WindowExtractor {
    /// Frames appended after each active run
    lookahead: usize,
    /// Position of the next frame
    position: usize,
    state: State,
    /// Completed windows ready for persistence
    completed_windows: Vec<EventWindow>,
    next_sequence: usize,
    previous: EventFlag,
    absorbed_onsets: usize,
}

impl WindowExtractor {
    pub fn new(lookahead: usize) -> Self {
        Self {
            lookahead,
            position: 0,
            state: State::Idle,
            completed_windows: Vec::new(),
            next_sequence: 0,
            previous: EventFlag::Inactive,
            absorbed_onsets: 0,
        }
    }

    /// Process the next frame's flag.
    pub fn process(&mut self, flag: EventFlag) {
        let position = self.position;
        self.position += 1;
        let onset = flag.is_active() && !self.previous.is_active();
        self.previous = flag;

        match self.state {
            State::Idle => {
                if flag.is_active() {
                    self.state = State::Active {
                        start: position,
                        kind: flag,
                    };
                }
            }
            State::Active { start, kind } => {
                if !flag.is_active() {
                    self.state = State::Closing {
                        start,
                        active_end: position,
                        kind,
                        remaining: self.lookahead,
                    };
                    // The closing frame is the first lookahead frame.
                    self.consume_lookahead(position);
                }
            }
            State::Closing { .. } => {
                if onset {
                    self.absorbed_onsets += 1;
                    debug!(frame = position, kind = ?flag, "event onset inside lookahead, absorbed");
                }
                self.consume_lookahead(position);
            }
        }
    }

    /// Close the stream. A window in its lookahead is clipped to the end;
    /// an open active run is returned as leftover.
    pub fn finish(&mut self) -> Option<LeftoverRun> {
        let end = self.position;
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => None,
            State::Active { start, kind } => Some(LeftoverRun { start, end, kind }),
            State::Closing {
                start,
                active_end,
                kind,
                ..
            } => {
                self.complete(start, active_end, end, kind);
                None
            }
        }
    }

    /// Get and remove completed windows.
    pub fn take_completed_windows(&mut self) -> Vec<EventWindow> {
        std::mem::take(&mut self.completed_windows)
    }

    pub fn completed_window_count(&self) -> usize {
        self.completed_windows.len()
    }

    /// Onsets seen so far while a window was in its lookahead.
    pub fn absorbed_onsets(&self) -> usize {
        self.absorbed_onsets
    }

    fn consume_lookahead(&mut self, position: usize) {
        if let State::Closing {
            start,
            active_end,
            kind,
            remaining,
        } = self.state
        {
            if remaining == 0 {
                // Zero lookahead. The closing frame is inactive, so idling is enough.
                self.complete(start, active_end, active_end, kind);
                self.state = State::Idle;
            } else if remaining == 1 {
                self.complete(start, active_end, position + 1, kind);
                self.state = State::Idle;
            } else {
                self.state = State::Closing {
                    start,
                    active_end,
                    kind,
                    remaining: remaining - 1,
                };
            }
        }
    }

    fn complete(&mut self, start: usize, active_end: usize, end: usize, kind: EventFlag) {
        self.completed_windows.push(EventWindow {
            sequence: self.next_sequence,
            start,
            active_end,
            end,
            kind,
        });
        self.next_sequence += 1;
    }
}

/// Segment a complete flag sequence.
pub fn extract_windows(flags: &[EventFlag], lookahead: usize) -> Segmentation {
    let mut extractor = WindowExtractor::new(lookahead);
    for &flag in flags {
        extractor.process(flag);
    }
    let leftover = extractor.finish();

    Segmentation {
        windows: extractor.take_completed_windows(),
        leftover,
        absorbed_onsets: extractor.absorbed_onsets(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::types::Channel;

    fn flags(bits: &[u8]) -> Vec<EventFlag> {
        bits.iter()
            .map(|&b| {
                if b == 1 {
                    EventFlag::TakeOver
                } else {
                    EventFlag::Inactive
                }
            })
            .collect()
    }

    #[test]
    fn test_two_windows_second_clipped() {
        let result = extract_windows(&flags(&[0, 0, 1, 1, 1, 0, 0, 0, 1, 0, 0]), 2);

        assert_eq!(result.windows.len(), 2);
        assert_eq!(result.windows[0].range(), 2..7);
        assert_eq!(result.windows[0].active_end, 5);
        assert_eq!(result.windows[0].sequence, 0);
        assert_eq!(result.windows[1].range(), 8..11);
        assert_eq!(result.windows[1].sequence, 1);
        assert!(result.leftover.is_none());
    }

    #[test]
    fn test_no_active_frames() {
        let result = extract_windows(&flags(&[0, 0, 0, 0]), 100);
        assert!(result.windows.is_empty());
        assert!(result.leftover.is_none());

        let result = extract_windows(&[], 100);
        assert_eq!(result, Segmentation::default());
    }

    #[test]
    fn test_trailing_run_is_leftover() {
        let result = extract_windows(&flags(&[1, 0, 0, 0, 1, 1]), 1);
        assert_eq!(result.windows.len(), 1);
        assert_eq!(result.windows[0].range(), 0..2);
        assert_eq!(
            result.leftover,
            Some(LeftoverRun {
                start: 4,
                end: 6,
                kind: EventFlag::TakeOver
            })
        );
    }

    #[test]
    fn test_active_frames_inside_lookahead_are_absorbed() {
        let result = extract_windows(&flags(&[1, 0, 1, 1, 0, 0, 0, 1, 0]), 3);
        assert_eq!(result.windows.len(), 2);
        assert_eq!(result.windows[0].range(), 0..4);
        // Frame 3 ends the first window; the next scan starts at frame 4.
        assert_eq!(result.windows[1].range(), 7..9);
        assert_eq!(result.absorbed_onsets, 1);
    }

    #[test]
    fn test_absorbed_onsets_are_counted_once_per_run() {
        // Two separate runs inside one long lookahead.
        let result = extract_windows(&flags(&[1, 0, 1, 1, 0, 1, 0, 0]), 10);
        assert_eq!(result.windows.len(), 1);
        assert_eq!(result.windows[0].range(), 0..8);
        assert_eq!(result.absorbed_onsets, 2);

        let result = extract_windows(&flags(&[1, 0, 0, 0, 1, 0]), 2);
        assert_eq!(result.windows.len(), 2);
        assert_eq!(result.absorbed_onsets, 0);
    }

    #[test]
    fn test_windows_never_overlap_or_exceed_bounds() {
        let bits: Vec<u8> = (0..500).map(|i| ((i * 7919) % 13 < 4) as u8).collect();
        for lookahead in [0, 1, 5, 40] {
            let result = extract_windows(&flags(&bits), lookahead);
            let mut last_end = 0;
            for (i, window) in result.windows.iter().enumerate() {
                assert_eq!(window.sequence, i);
                assert!(window.start >= last_end);
                assert!(window.start < window.active_end);
                assert!(window.end <= bits.len());
                assert!(window.lookahead_len() <= lookahead);
                last_end = window.end;
            }
            if let Some(leftover) = result.leftover {
                assert!(leftover.start >= last_end);
                assert_eq!(leftover.end, bits.len());
            }
        }
    }

    #[test]
    fn test_zero_lookahead_ends_at_run() {
        let result = extract_windows(&flags(&[1, 1, 0, 1, 0]), 0);
        assert_eq!(result.windows.len(), 2);
        assert_eq!(result.windows[0].range(), 0..2);
        assert_eq!(result.windows[1].range(), 3..4);
    }

    #[test]
    fn test_onset_kind_is_recorded() {
        let input = [
            EventFlag::AutoDriveRequest,
            EventFlag::TakeOver,
            EventFlag::Inactive,
        ];
        let result = extract_windows(&input, 1);
        assert_eq!(result.windows[0].kind, EventFlag::AutoDriveRequest);
    }

    #[test]
    fn test_event_condition() {
        let condition = EventCondition::new(&ChannelMap::default(), &EventConfig::default());
        assert_eq!(condition.classify(1.5, 0.0, 4.0), EventFlag::TakeOver);
        assert_eq!(condition.classify(0.0, 1.0, 2.0), EventFlag::AutoDriveRequest);
        assert_eq!(condition.classify(0.0, 1.0, 4.0), EventFlag::Inactive);
        assert_eq!(condition.classify(0.0, 0.0, 0.0), EventFlag::Inactive);
        assert_eq!(condition.classify(2.0, 1.0, 0.0), EventFlag::TakeOver);

        let series = FrameSeries {
            frames: vec![0, 1],
            timestamps_ms: vec![0.0, 20.0],
            channels: vec![
                Channel::new("LEAD_TIME", vec![0.0, 3.0]),
                Channel::new("HUD_5019", vec![0.0, 0.0]),
                Channel::new("AUTO_DRIVE", vec![4.0, 4.0]),
            ],
        };
        assert_eq!(
            condition.flags(&series).unwrap(),
            vec![EventFlag::Inactive, EventFlag::TakeOver]
        );

        let mut missing = series.clone();
        missing.channels.pop();
        assert_eq!(
            condition.flags(&missing),
            Err(MissingChannel("AUTO_DRIVE".to_string()))
        );
    }
}
