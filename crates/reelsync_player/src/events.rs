// SPDX-License-Identifier: MIT OR Apache-2.0
//! Event payloads and the controller's subscriber hub.

use crate::observer::Observers;
use reelsync_timeline::{SegmentId, TransitionEvent};

/// Coarse playback status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    /// Stopped at the beginning
    #[default]
    Idle,
    /// Virtual clock running
    Playing,
    /// Virtual clock frozen mid-program
    Paused,
    /// Reached the end of the program
    Completed,
}

impl PlaybackStatus {
    /// Whether the virtual clock is running
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }

    /// Get a status string for display
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Stopped",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
            Self::Completed => "Ended",
        }
    }
}

/// Playback state delivered with play/pause/stop notifications
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSnapshot {
    /// Status after the change
    pub status: PlaybackStatus,
    /// Virtual time at the change
    pub virtual_time: f64,
    /// Program length
    pub duration: f64,
    /// Playback rate
    pub playback_rate: f64,
}

/// Status transition, for global UI reconciliation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateChange {
    /// Previous status
    pub from: PlaybackStatus,
    /// New status
    pub to: PlaybackStatus,
    /// Virtual time at the change
    pub virtual_time: f64,
}

/// Per-frame payload for overlay renderers.
///
/// Payloads come from a small pool and are reused once every subscriber has
/// seen them; copy out anything you need to keep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameUpdate {
    /// Virtual time of the newest sample
    pub virtual_time: f64,
    /// Real time the player should be showing
    pub real_time: Option<f64>,
    /// Active segment
    pub segment_id: Option<SegmentId>,
    /// Playback rate
    pub playback_rate: f64,
    /// Virtual times of older samples folded into this payload
    pub coalesced: Vec<f64>,
}

impl FrameUpdate {
    /// Number of reconciled frames this payload stands for
    pub fn sample_count(&self) -> usize {
        self.coalesced.len() + 1
    }
}

/// Current virtual time, sent on throttled frames and on every seek
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUpdate {
    /// Virtual time
    pub virtual_time: f64,
    /// Program length
    pub duration: f64,
}

/// A seek about to be issued to the player
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekRequest {
    /// Time the caller asked for
    pub requested: f64,
    /// Virtual time after clamping and gap snapping
    pub virtual_time: f64,
    /// Real time sent to the player
    pub real_time: f64,
}

/// Result of a completed seek
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekOutcome {
    /// Real time the player was sent to
    pub real_time: f64,
    /// Virtual time the clock now shows
    pub virtual_time: f64,
    /// False when the player never confirmed and the wait timed out
    pub acknowledged: bool,
}

/// Playback jumped over a region not covered by any segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapSkipped {
    /// Virtual time where the gap was hit
    pub from: f64,
    /// Virtual time playback resumed at
    pub to: f64,
    /// Segment playback resumed in
    pub segment_id: SegmentId,
}

/// A new timeline snapshot was picked up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineChange {
    /// New revision
    pub revision: u64,
    /// New program length
    pub duration: f64,
    /// Number of enabled segments
    pub segment_count: usize,
}

/// Playback reached the end of the program
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Completion {
    /// Virtual time at completion (the program length)
    pub virtual_time: f64,
}

/// A notification queued while the controller state was locked
#[derive(Debug)]
pub(crate) enum Notification {
    Frame(FrameUpdate),
    TimeUpdate(TimeUpdate),
    Play(PlaybackSnapshot),
    Pause(PlaybackSnapshot),
    Stop(PlaybackSnapshot),
    Seek(SeekRequest),
    Seeked(SeekOutcome),
    TimelineChanged(TimelineChange),
    GapSkipped(GapSkipped),
    StateChanged(StateChange),
    Completed(Completion),
    Transition(TransitionEvent),
}

/// Every observer list the controller publishes to
pub(crate) struct EventHub {
    pub frame: Observers<FrameUpdate>,
    pub time_update: Observers<TimeUpdate>,
    pub play: Observers<PlaybackSnapshot>,
    pub pause: Observers<PlaybackSnapshot>,
    pub stop: Observers<PlaybackSnapshot>,
    pub seek: Observers<SeekRequest>,
    pub seeked: Observers<SeekOutcome>,
    pub timeline_change: Observers<TimelineChange>,
    pub gap_skipped: Observers<GapSkipped>,
    pub state_change: Observers<StateChange>,
    pub complete: Observers<Completion>,
    pub transition: Observers<TransitionEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            frame: Observers::new("frame"),
            time_update: Observers::new("time-update"),
            play: Observers::new("play"),
            pause: Observers::new("pause"),
            stop: Observers::new("stop"),
            seek: Observers::new("seek"),
            seeked: Observers::new("seeked"),
            timeline_change: Observers::new("timeline-change"),
            gap_skipped: Observers::new("gap-skipped"),
            state_change: Observers::new("playback-state"),
            complete: Observers::new("complete"),
            transition: Observers::new("segment-transition"),
        }
    }

    /// Deliver queued notifications in order.
    ///
    /// Returns the frame payloads so they can go back to the pool.
    pub fn dispatch(&self, notifications: Vec<Notification>) -> Vec<FrameUpdate> {
        let mut spent = Vec::new();

        for notification in notifications {
            match notification {
                Notification::Frame(frame) => {
                    self.frame.emit(&frame);
                    spent.push(frame);
                }
                Notification::TimeUpdate(update) => {
                    self.time_update.emit(&update);
                }
                Notification::Play(snapshot) => {
                    self.play.emit(&snapshot);
                }
                Notification::Pause(snapshot) => {
                    self.pause.emit(&snapshot);
                }
                Notification::Stop(snapshot) => {
                    self.stop.emit(&snapshot);
                }
                Notification::Seek(request) => {
                    self.seek.emit(&request);
                }
                Notification::Seeked(outcome) => {
                    self.seeked.emit(&outcome);
                }
                Notification::TimelineChanged(change) => {
                    self.timeline_change.emit(&change);
                }
                Notification::GapSkipped(gap) => {
                    self.gap_skipped.emit(&gap);
                }
                Notification::StateChanged(change) => {
                    self.state_change.emit(&change);
                }
                Notification::Completed(completion) => {
                    self.complete.emit(&completion);
                }
                Notification::Transition(event) => {
                    self.transition.emit(&event);
                }
            }
        }

        spent
    }
}
