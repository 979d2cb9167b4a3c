// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline mapper: builds the virtual timeline from edit state and answers
//! time mapping queries against it.
//!
//! The mapper owns the current timeline snapshot. Every rebuild publishes a
//! brand new `Arc<VirtualTimeline>` with a higher revision, so readers holding
//! an older snapshot keep a consistent view.

use crate::edit::EditState;
use crate::segment::{SegmentId, VirtualSegment};
use crate::timeline::{MappedTime, Result, VirtualTimeline};
use crate::ClipId;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Builds and publishes virtual timelines
pub struct TimelineMapper {
    /// Current snapshot
    timeline: RwLock<Arc<VirtualTimeline>>,
    /// Last revision handed out
    last_revision: AtomicU64,
}

impl TimelineMapper {
    /// Create a mapper holding an empty timeline
    pub fn new() -> Self {
        Self {
            timeline: RwLock::new(Arc::new(VirtualTimeline::empty())),
            last_revision: AtomicU64::new(0),
        }
    }

    /// Create a mapper and build its first timeline
    pub fn from_edit_state(edit: &EditState) -> Result<Self> {
        let mapper = Self::new();
        mapper.initialize(edit)?;
        Ok(mapper)
    }

    /// Rebuild the timeline from edit state.
    ///
    /// Always a full, deterministic rebuild: enabled spans of enabled clips
    /// are laid out back to back in clip order, everything else becomes a
    /// zero-length disabled segment at the current position. On error the
    /// previous timeline stays published.
    pub fn initialize(&self, edit: &EditState) -> Result<Arc<VirtualTimeline>> {
        let mut segments = Vec::new();
        let mut cursor = 0.0;

        for clip in edit.clips.values() {
            for span in &clip.spans {
                let plays = clip.enabled && span.enabled;
                let length = if plays { span.duration() } else { 0.0 };

                segments.push(VirtualSegment {
                    id: span.id,
                    virtual_start: cursor,
                    virtual_end: cursor + length,
                    real_start: span.real_start,
                    real_end: span.real_end,
                    source_clip_id: clip.id,
                    enabled: plays,
                    kind: span.kind,
                });

                cursor += length;
            }
        }

        let clip_order = edit.clips.keys().copied().collect();
        self.publish_segments(segments, clip_order)
    }

    /// Publish an explicit segment list.
    ///
    /// Used when an edit has just been applied and the segments may not yet
    /// tile the program; gaps are tolerated by readers.
    pub fn publish_segments(
        &self,
        segments: Vec<VirtualSegment>,
        clip_order: Vec<ClipId>,
    ) -> Result<Arc<VirtualTimeline>> {
        let mut guard = self.timeline.write();

        let revision = self.last_revision.load(Ordering::Acquire) + 1;
        let timeline = Arc::new(VirtualTimeline::from_segments(segments, clip_order, revision)?);
        self.last_revision.store(revision, Ordering::Release);
        *guard = Arc::clone(&timeline);

        tracing::debug!(
            "Published timeline r{}: {} segments, {:.3}s",
            revision,
            timeline.segments().len(),
            timeline.duration
        );

        Ok(timeline)
    }

    /// Current timeline snapshot
    pub fn timeline(&self) -> Arc<VirtualTimeline> {
        Arc::clone(&self.timeline.read())
    }

    /// Revision of the current snapshot
    pub fn revision(&self) -> u64 {
        self.last_revision.load(Ordering::Acquire)
    }

    /// Total program length
    pub fn duration(&self) -> f64 {
        self.timeline.read().duration
    }

    /// Map a real time to virtual time, `None` when no segment covers it
    pub fn to_virtual(&self, real_time: f64) -> Option<MappedTime> {
        self.timeline.read().to_virtual(real_time, None)
    }

    /// Map a real time to virtual time, preferring the hinted segment
    pub fn to_virtual_near(&self, real_time: f64, hint: Option<SegmentId>) -> Option<MappedTime> {
        self.timeline.read().to_virtual(real_time, hint)
    }

    /// Map a virtual time to real time, `None` inside a gap or past the end
    pub fn to_real(&self, virtual_time: f64) -> Option<MappedTime> {
        self.timeline.read().to_real(virtual_time)
    }

    /// Enabled segment covering a virtual time
    pub fn active_segment(&self, virtual_time: f64) -> Option<VirtualSegment> {
        self.timeline.read().segment_at(virtual_time).cloned()
    }
}

impl Default for TimelineMapper {
    fn default() -> Self {
        Self::new()
    }
}
