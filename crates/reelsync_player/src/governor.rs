// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adaptive processing rate.
//!
//! Watches the spacing of incoming frame callbacks and moves the processing
//! interval between a floor and a ceiling. When the host can't keep up the
//! controller does less work per second instead of falling further behind.

use std::collections::VecDeque;
use std::time::Duration;

/// Average above this multiple of the target raises it
const RAISE_RATIO: f64 = 1.5;
/// Average below this multiple of the target lowers it
const LOWER_RATIO: f64 = 0.9;
/// A single frame above this multiple of the target counts as slow
const SLOW_FRAME_RATIO: f64 = 2.0;
/// Growth factor when raising, as a fraction
const RAISE_FACTOR: (u32, u32) = (3, 2);
/// Shrink factor when lowering, as a fraction
const LOWER_FACTOR: (u32, u32) = (4, 5);

/// Direction of a target change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Interval grew
    Raised,
    /// Interval shrank
    Lowered,
}

/// Rolling-window governor for the processing interval
#[derive(Debug, Clone)]
pub struct FrameRateGovernor {
    floor: Duration,
    ceiling: Duration,
    target: Duration,
    window: VecDeque<Duration>,
    window_size: usize,
    slow_streak: u32,
    streak_limit: u32,
}

impl FrameRateGovernor {
    /// Create a governor starting at the floor
    pub fn new(floor: Duration, ceiling: Duration, window_size: usize, streak_limit: u32) -> Self {
        let window_size = window_size.max(1);
        Self {
            floor,
            ceiling: ceiling.max(floor),
            target: floor,
            window: VecDeque::with_capacity(window_size),
            window_size,
            slow_streak: 0,
            streak_limit: streak_limit.max(1),
        }
    }

    /// Current processing interval
    pub fn target(&self) -> Duration {
        self.target
    }

    /// Lower bound
    pub fn floor(&self) -> Duration {
        self.floor
    }

    /// Upper bound
    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Record the gap between two frame callbacks
    pub fn record(&mut self, interval: Duration) -> Option<Adjustment> {
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(interval);

        if interval > self.target.mul_f64(SLOW_FRAME_RATIO) {
            self.slow_streak += 1;
        } else {
            self.slow_streak = 0;
        }

        if self.slow_streak >= self.streak_limit {
            self.slow_streak = 0;
            return self.raise();
        }

        if self.window.len() < self.window_size {
            return None;
        }

        let average = self.average();
        if average > self.target.mul_f64(RAISE_RATIO) {
            self.raise()
        } else if average < self.target.mul_f64(LOWER_RATIO) {
            self.lower()
        } else {
            None
        }
    }

    /// Whether enough time has passed since the last processed frame.
    ///
    /// `slack` lets a frame that arrives a hair early still count.
    pub fn should_process(&self, since_last: Duration, slack: Duration) -> bool {
        since_last + slack >= self.target
    }

    /// Back to the floor with an empty window
    pub fn reset(&mut self) {
        self.target = self.floor;
        self.window.clear();
        self.slow_streak = 0;
    }

    fn average(&self) -> Duration {
        let total: Duration = self.window.iter().sum();
        total / self.window.len().max(1) as u32
    }

    fn raise(&mut self) -> Option<Adjustment> {
        let next = scale(self.target, RAISE_FACTOR).min(self.ceiling);
        self.apply(next, Adjustment::Raised)
    }

    fn lower(&mut self) -> Option<Adjustment> {
        let next = scale(self.target, LOWER_FACTOR).max(self.floor);
        self.apply(next, Adjustment::Lowered)
    }

    fn apply(&mut self, next: Duration, direction: Adjustment) -> Option<Adjustment> {
        // Judge the new target on fresh samples only
        self.window.clear();
        if next == self.target {
            return None;
        }

        tracing::trace!("Processing interval {:?} -> {:?}", self.target, next);
        self.target = next;
        Some(direction)
    }
}

fn scale(duration: Duration, (num, den): (u32, u32)) -> Duration {
    duration * num / den
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn governor() -> FrameRateGovernor {
        FrameRateGovernor::new(ms(16), ms(100), 10, 3)
    }

    #[test]
    fn test_slow_frames_raise_target() {
        let mut gov = governor();
        for _ in 0..10 {
            gov.record(ms(48));
        }
        assert!(gov.target() > ms(16));
    }

    #[test]
    fn test_streak_raises_immediately() {
        let mut gov = governor();
        assert_eq!(gov.record(ms(40)), None);
        assert_eq!(gov.record(ms(40)), None);
        assert_eq!(gov.record(ms(40)), Some(Adjustment::Raised));
        assert_eq!(gov.target(), ms(24));
    }

    #[test]
    fn test_streak_broken_by_normal_frame() {
        let mut gov = governor();
        gov.record(ms(40));
        gov.record(ms(40));
        gov.record(ms(16));
        assert_eq!(gov.record(ms(40)), None);
        assert_eq!(gov.target(), ms(16));
    }

    #[test]
    fn test_fast_frames_lower_back_to_floor() {
        let mut gov = governor();
        for _ in 0..30 {
            gov.record(ms(48));
        }
        let raised = gov.target();
        assert!(raised > ms(24));

        for _ in 0..100 {
            gov.record(ms(16));
        }
        assert_eq!(gov.target(), ms(16));
    }

    #[test]
    fn test_target_stays_within_bounds() {
        let mut gov = governor();
        for _ in 0..200 {
            gov.record(ms(500));
        }
        assert_eq!(gov.target(), ms(100));

        for _ in 0..200 {
            gov.record(ms(1));
        }
        assert_eq!(gov.target(), ms(16));
    }

    #[test]
    fn test_should_process() {
        let mut gov = governor();
        assert!(gov.should_process(ms(16), ms(0)));
        assert!(gov.should_process(ms(15), ms(2)));
        assert!(!gov.should_process(ms(10), ms(2)));

        gov.record(ms(40));
        gov.record(ms(40));
        gov.record(ms(40));
        assert!(!gov.should_process(ms(17), ms(2)));
        assert!(gov.should_process(ms(33), ms(2)));

        gov.reset();
        assert_eq!(gov.target(), ms(16));
    }
}
