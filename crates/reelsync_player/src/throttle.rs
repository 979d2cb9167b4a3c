// SPDX-License-Identifier: MIT OR Apache-2.0
//! Notification throttling and frame payload reuse.
//!
//! The controller reconciles on every presented frame, but subscribers only
//! hear about it at a fixed minimum spacing. Samples that arrive before the
//! next slot are folded into the pending payload instead of being dropped.

use crate::events::FrameUpdate;
use reelsync_timeline::SegmentId;
use std::time::Duration;

/// State of one reconciled frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSample {
    /// Virtual time
    pub virtual_time: f64,
    /// Real time the player should show
    pub real_time: Option<f64>,
    /// Active segment
    pub segment_id: Option<SegmentId>,
    /// Playback rate
    pub playback_rate: f64,
}

/// Free list of frame payloads
#[derive(Debug)]
pub struct FramePool {
    free: Vec<FrameUpdate>,
    capacity: usize,
    allocated: usize,
}

impl FramePool {
    /// Create a pool keeping at most `capacity` idle payloads
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Vec::with_capacity(capacity),
            capacity,
            allocated: 0,
        }
    }

    /// Take a payload, allocating only when the pool is empty
    pub fn acquire(&mut self) -> FrameUpdate {
        self.free.pop().unwrap_or_else(|| {
            self.allocated += 1;
            FrameUpdate::default()
        })
    }

    /// Give a payload back
    pub fn release(&mut self, mut frame: FrameUpdate) {
        if self.free.len() < self.capacity {
            frame.coalesced.clear();
            self.free.push(frame);
        }
    }

    /// Payloads waiting for reuse
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    /// Payloads allocated over the pool's lifetime
    pub fn allocated(&self) -> usize {
        self.allocated
    }
}

/// Spaces out frame notifications
#[derive(Debug)]
pub struct UpdateThrottle {
    interval: Duration,
    last_emit: Option<Duration>,
    pending: Option<FrameUpdate>,
}

impl UpdateThrottle {
    /// Create a throttle emitting at most once per `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            pending: None,
        }
    }

    /// Offer a sample; returns a payload when one is due
    pub fn offer(
        &mut self,
        pool: &mut FramePool,
        sample: FrameSample,
        now: Duration,
    ) -> Option<FrameUpdate> {
        match self.pending.as_mut() {
            Some(frame) => {
                frame.coalesced.push(frame.virtual_time);
                fill(frame, sample);
            }
            None => {
                let mut frame = pool.acquire();
                fill(&mut frame, sample);
                self.pending = Some(frame);
            }
        }

        let due = self
            .last_emit
            .map_or(true, |last| now.saturating_sub(last) >= self.interval);

        if due {
            self.flush(now)
        } else {
            None
        }
    }

    /// Take whatever is pending regardless of spacing
    pub fn flush(&mut self, now: Duration) -> Option<FrameUpdate> {
        let frame = self.pending.take()?;
        self.last_emit = Some(now);
        Some(frame)
    }

    /// Drop pending samples and forget the last emission time
    pub fn reset(&mut self, pool: &mut FramePool) {
        if let Some(frame) = self.pending.take() {
            pool.release(frame);
        }
        self.last_emit = None;
    }

    /// Whether a payload is waiting
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

fn fill(frame: &mut FrameUpdate, sample: FrameSample) {
    frame.virtual_time = sample.virtual_time;
    frame.real_time = sample.real_time;
    frame.segment_id = sample.segment_id;
    frame.playback_rate = sample.playback_rate;
}
