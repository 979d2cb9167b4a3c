// SPDX-License-Identifier: MIT OR Apache-2.0
//! Segment definitions for the virtual timeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Allowed difference between a segment's virtual and real span lengths, in seconds
pub const SPAN_TOLERANCE: f64 = 1e-6;

/// Unique identifier for a timeline segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId(pub Uuid);

impl SegmentId {
    /// Create a new random segment ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a source clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipId(pub Uuid);

impl ClipId {
    /// Create a new random clip ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

/// How a segment came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SegmentKind {
    /// Untouched retained footage
    #[default]
    Normal,
    /// Produced by splitting a longer span
    Split,
    /// Reordered away from its original position
    Moved,
}

/// A contiguous span mapping one virtual interval to one real interval on a source clip.
///
/// Covers `[virtual_start, virtual_end)` in the edited program and
/// `[real_start, real_end)` in the original recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualSegment {
    /// Unique segment ID
    pub id: SegmentId,
    /// Start in the edited program
    pub virtual_start: f64,
    /// End in the edited program
    pub virtual_end: f64,
    /// Start in the original recording
    pub real_start: f64,
    /// End in the original recording
    pub real_end: f64,
    /// Clip this segment was cut from
    pub source_clip_id: ClipId,
    /// Whether the segment plays
    pub enabled: bool,
    /// Segment origin
    pub kind: SegmentKind,
}

impl VirtualSegment {
    /// Create an enabled segment of normal kind
    pub fn new(
        source_clip_id: ClipId,
        virtual_start: f64,
        real_start: f64,
        real_end: f64,
    ) -> Self {
        Self {
            id: SegmentId::new(),
            virtual_start,
            virtual_end: virtual_start + (real_end - real_start),
            real_start,
            real_end,
            source_clip_id,
            enabled: true,
            kind: SegmentKind::Normal,
        }
    }

    /// Set the segment ID
    pub fn with_id(mut self, id: SegmentId) -> Self {
        self.id = id;
        self
    }

    /// Set the segment kind
    pub fn with_kind(mut self, kind: SegmentKind) -> Self {
        self.kind = kind;
        self
    }

    /// Mark the segment disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Length of the virtual span
    pub fn virtual_duration(&self) -> f64 {
        self.virtual_end - self.virtual_start
    }

    /// Length of the real span
    pub fn real_duration(&self) -> f64 {
        self.real_end - self.real_start
    }

    /// Whether virtual and real spans have the same length
    pub fn preserves_speed(&self) -> bool {
        (self.virtual_duration() - self.real_duration()).abs() < SPAN_TOLERANCE
    }

    /// Whether the virtual time falls inside this segment
    pub fn contains_virtual(&self, virtual_time: f64) -> bool {
        virtual_time >= self.virtual_start && virtual_time < self.virtual_end
    }

    /// Whether the real time falls inside this segment
    pub fn contains_real(&self, real_time: f64) -> bool {
        real_time >= self.real_start && real_time < self.real_end
    }

    /// Fraction of the segment elapsed at a virtual time, clamped to `[0, 1]`
    pub fn progress_at(&self, virtual_time: f64) -> f64 {
        let span = self.virtual_duration();
        if span <= 0.0 {
            return 0.0;
        }
        ((virtual_time - self.virtual_start) / span).clamp(0.0, 1.0)
    }

    /// Real time corresponding to a virtual time inside this segment
    pub fn real_at(&self, virtual_time: f64) -> f64 {
        self.real_start + self.progress_at(virtual_time) * self.real_duration()
    }

    /// Virtual time corresponding to a real time inside this segment
    pub fn virtual_at(&self, real_time: f64) -> f64 {
        let span = self.real_duration();
        if span <= 0.0 {
            return self.virtual_start;
        }
        let t = ((real_time - self.real_start) / span).clamp(0.0, 1.0);
        self.virtual_start + t * self.virtual_duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_segment_preserves_speed() {
        let seg = VirtualSegment::new(ClipId::new(), 2.0, 10.0, 13.0);
        assert_eq!(seg.virtual_end, 5.0);
        assert!(seg.preserves_speed());
        assert!(seg.enabled);
    }

    #[test]
    fn test_interpolation() {
        let seg = VirtualSegment::new(ClipId::new(), 2.0, 10.0, 13.0);
        assert!((seg.real_at(2.1) - 10.1).abs() < 1e-9);
        assert!((seg.virtual_at(12.5) - 4.5).abs() < 1e-9);
        assert!((seg.progress_at(3.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_half_open_bounds() {
        let seg = VirtualSegment::new(ClipId::new(), 0.0, 0.0, 2.0);
        assert!(seg.contains_virtual(0.0));
        assert!(seg.contains_virtual(1.999));
        assert!(!seg.contains_virtual(2.0));
    }
}
