// SPDX-License-Identifier: MIT OR Apache-2.0
//! Segment transition tracking.
//!
//! Classifies position reports against the previous one and turns them into
//! transition events. Reports that arrive in quick succession after a
//! transition are absorbed by a debounce window instead of each producing
//! an event; once the window closes, a single event catches up with
//! wherever the position settled.

use crate::segment::SegmentId;
use crate::timeline::VirtualTimeline;
use std::time::Duration;

/// Default debounce window
pub const DEFAULT_TRANSITION_DEBOUNCE: Duration = Duration::from_millis(100);

/// Tracker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerState {
    /// No report seen since the last reset
    #[default]
    Idle,
    /// Following a settled position
    Tracking,
    /// A transition was published recently
    Transitioning {
        /// When the transition was published
        since: Duration,
    },
}

/// Where a report landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Inside a segment
    Segment(SegmentId),
    /// Not covered by any enabled segment
    Gap,
    /// Past the end of the last enabled segment
    End,
}

/// Classification of a report relative to the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionClass {
    /// Still in the same segment
    SameSegment(SegmentId),
    /// Moved into a different segment
    SegmentChanged {
        /// Previous segment, if the previous report was inside one
        from: Option<SegmentId>,
        /// New segment
        to: SegmentId,
    },
    /// Moved into a gap
    EnteredGap {
        /// Previous segment, if any
        previous: Option<SegmentId>,
    },
    /// Past the last enabled segment
    EndOfTimeline,
}

/// A published transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionEvent {
    /// What happened
    pub class: PositionClass,
    /// Virtual time of the report that triggered it
    pub virtual_time: f64,
    /// Clock time of that report
    pub at: Duration,
}

/// Result of feeding one report to the tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerOutput {
    /// Classification of this report
    pub class: PositionClass,
    /// Transition to publish, if any
    pub transition: Option<TransitionEvent>,
    /// True exactly once when the end of the program is passed
    pub completed: bool,
}

/// Debounced segment transition state machine
#[derive(Debug, Clone)]
pub struct SegmentTransitionTracker {
    state: TrackerState,
    /// Position of the latest report
    current: Option<Position>,
    /// Position last published in an event
    announced: Option<Position>,
    /// Debounce window
    debounce: Duration,
    /// Whether completion was already signalled
    completed: bool,
}

impl SegmentTransitionTracker {
    /// Create a tracker with the given debounce window
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: TrackerState::Idle,
            current: None,
            announced: None,
            debounce,
            completed: false,
        }
    }

    /// Current state
    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Segment of the latest report
    pub fn current_segment(&self) -> Option<SegmentId> {
        match self.current {
            Some(Position::Segment(id)) => Some(id),
            _ => None,
        }
    }

    /// Whether completion has been signalled since the last reset
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Forget everything, re-arming completion
    pub fn reset(&mut self) {
        self.state = TrackerState::Idle;
        self.current = None;
        self.announced = None;
        self.completed = false;
    }

    /// Classify a virtual time against a timeline and feed it to the tracker
    pub fn observe_timeline(
        &mut self,
        timeline: &VirtualTimeline,
        virtual_time: f64,
        now: Duration,
    ) -> TrackerOutput {
        let position = classify(timeline, virtual_time);
        self.observe(position, virtual_time, now)
    }

    /// Feed an already resolved position to the tracker
    pub fn observe(&mut self, position: Position, virtual_time: f64, now: Duration) -> TrackerOutput {
        let previous = self.current.replace(position);
        let class = class_for(previous, position);

        let completed = if position == Position::End {
            !std::mem::replace(&mut self.completed, true)
        } else {
            self.completed = false;
            false
        };

        if let TrackerState::Transitioning { since } = self.state {
            if now.saturating_sub(since) >= self.debounce {
                self.state = TrackerState::Tracking;
            }
        }

        let transition = match self.state {
            TrackerState::Transitioning { .. } => None,
            TrackerState::Idle | TrackerState::Tracking => {
                if self.announced == Some(position) {
                    self.state = TrackerState::Tracking;
                    None
                } else {
                    // Catch up from the last published position, not the
                    // last report, so debounced hops collapse into one event
                    let settled = class_for(self.announced, position);
                    self.announced = Some(position);
                    self.state = TrackerState::Transitioning { since: now };
                    Some(TransitionEvent {
                        class: settled,
                        virtual_time,
                        at: now,
                    })
                }
            }
        };

        TrackerOutput {
            class,
            transition,
            completed,
        }
    }
}

impl Default for SegmentTransitionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSITION_DEBOUNCE)
    }
}

/// Resolve where a virtual time falls on a timeline
pub fn classify(timeline: &VirtualTimeline, virtual_time: f64) -> Position {
    match timeline.last_enabled() {
        None => Position::End,
        Some(last) if virtual_time >= last.virtual_end => Position::End,
        Some(_) => timeline
            .segment_at(virtual_time)
            .map_or(Position::Gap, |seg| Position::Segment(seg.id)),
    }
}

fn class_for(previous: Option<Position>, position: Position) -> PositionClass {
    let from = match previous {
        Some(Position::Segment(id)) => Some(id),
        _ => None,
    };

    match position {
        Position::Segment(id) if from == Some(id) => PositionClass::SameSegment(id),
        Position::Segment(to) => PositionClass::SegmentChanged { from, to },
        Position::Gap => PositionClass::EnteredGap { previous: from },
        Position::End => PositionClass::EndOfTimeline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{ClipId, VirtualSegment};

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn two_segments() -> (VirtualTimeline, SegmentId, SegmentId) {
        let clip = ClipId::new();
        let a = VirtualSegment::new(clip, 0.0, 0.0, 2.0);
        let b = VirtualSegment::new(clip, 2.0, 10.0, 13.0);
        let (ida, idb) = (a.id, b.id);
        let timeline = VirtualTimeline::from_segments(vec![a, b], vec![clip], 1).unwrap();
        (timeline, ida, idb)
    }

    #[test]
    fn test_classification() {
        let (timeline, a, b) = two_segments();
        let mut tracker = SegmentTransitionTracker::new(ms(100));

        let first = tracker.observe_timeline(&timeline, 0.5, ms(0));
        assert_eq!(first.class, PositionClass::SegmentChanged { from: None, to: a });
        assert!(first.transition.is_some());

        let same = tracker.observe_timeline(&timeline, 1.0, ms(200));
        assert_eq!(same.class, PositionClass::SameSegment(a));
        assert!(same.transition.is_none());

        let changed = tracker.observe_timeline(&timeline, 2.5, ms(400));
        assert_eq!(changed.class, PositionClass::SegmentChanged { from: Some(a), to: b });
        assert!(changed.transition.is_some());
        assert_eq!(tracker.current_segment(), Some(b));
    }

    #[test]
    fn test_debounce_collapses_rapid_hops() {
        let (timeline, a, b) = two_segments();
        let mut tracker = SegmentTransitionTracker::new(ms(100));

        assert!(tracker.observe_timeline(&timeline, 0.5, ms(0)).transition.is_some());
        assert!(matches!(tracker.state(), TrackerState::Transitioning { .. }));

        // Noisy reports bouncing across the boundary inside the window
        assert!(tracker.observe_timeline(&timeline, 2.1, ms(20)).transition.is_none());
        assert!(tracker.observe_timeline(&timeline, 1.9, ms(40)).transition.is_none());
        assert!(tracker.observe_timeline(&timeline, 2.2, ms(60)).transition.is_none());

        // Window closes: one event from the last published segment
        let settled = tracker.observe_timeline(&timeline, 2.3, ms(150)).transition.unwrap();
        assert_eq!(settled.class, PositionClass::SegmentChanged { from: Some(a), to: b });
    }

    #[test]
    fn test_debounce_settles_back() {
        let (timeline, _, _) = two_segments();
        let mut tracker = SegmentTransitionTracker::new(ms(100));

        tracker.observe_timeline(&timeline, 0.5, ms(0));
        tracker.observe_timeline(&timeline, 2.1, ms(20));
        let back = tracker.observe_timeline(&timeline, 1.5, ms(150));
        assert!(back.transition.is_none());
        assert_eq!(tracker.state(), TrackerState::Tracking);
    }

    #[test]
    fn test_gap_detection() {
        let clip = ClipId::new();
        let a = VirtualSegment::new(clip, 0.0, 0.0, 2.0);
        let b = VirtualSegment::new(clip, 3.0, 10.0, 12.0);
        let ida = a.id;
        let timeline = VirtualTimeline::from_segments(vec![a, b], vec![clip], 1).unwrap();
        let mut tracker = SegmentTransitionTracker::new(ms(100));

        tracker.observe_timeline(&timeline, 1.0, ms(0));
        let gap = tracker.observe_timeline(&timeline, 2.5, ms(500));
        assert_eq!(gap.class, PositionClass::EnteredGap { previous: Some(ida) });
        assert!(gap.transition.is_some());
    }

    #[test]
    fn test_completion_fires_once() {
        let (timeline, _, _) = two_segments();
        let mut tracker = SegmentTransitionTracker::new(ms(100));

        tracker.observe_timeline(&timeline, 4.9, ms(0));
        let end = tracker.observe_timeline(&timeline, 5.0, ms(10));
        assert_eq!(end.class, PositionClass::EndOfTimeline);
        assert!(end.completed);

        assert!(!tracker.observe_timeline(&timeline, 5.0, ms(500)).completed);
        assert!(tracker.is_completed());

        // Moving back before the end re-arms completion
        tracker.observe_timeline(&timeline, 1.0, ms(600));
        assert!(tracker.observe_timeline(&timeline, 5.0, ms(800)).completed);
    }

    #[test]
    fn test_empty_timeline_is_end() {
        let timeline = VirtualTimeline::empty();
        assert_eq!(classify(&timeline, 0.0), Position::End);
    }
}
