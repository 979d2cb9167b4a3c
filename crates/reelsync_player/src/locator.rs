// SPDX-License-Identifier: MIT OR Apache-2.0
//! Active segment lookup for the per-frame path.
//!
//! Lookups go through three tiers, cheapest first:
//! 1. The neighbor cache: the last resolved segment and the ones on either
//!    side of it. Natural playback almost always lands here.
//! 2. A single-slot cache holding the segment that was current before the
//!    last jump, so seeking away and back stays cheap.
//! 3. A binary search over an index of enabled segments sorted by virtual
//!    start. The index is rebuilt lazily when the timeline revision changes.

use reelsync_timeline::{VirtualSegment, VirtualTimeline};

/// Hit and miss counters per tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupStats {
    /// Resolved from the neighbor cache
    pub neighbor_hits: u64,
    /// Resolved from the single-slot cache
    pub cache_hits: u64,
    /// Resolved by searching the index
    pub index_hits: u64,
    /// No segment covered the time
    pub misses: u64,
    /// Index rebuilds
    pub rebuilds: u64,
}

impl LookupStats {
    /// Total lookups
    pub fn lookups(&self) -> u64 {
        self.neighbor_hits + self.cache_hits + self.index_hits + self.misses
    }
}

/// Cached segment resolver
#[derive(Debug, Clone, Default)]
pub struct SegmentLocator {
    /// Revision the index was built for
    revision: Option<u64>,
    /// Positions in `timeline.segments()` of playable segments
    index: Vec<usize>,
    /// Index slot of the last resolved segment
    cursor: Option<usize>,
    /// Index slot that was current before the last jump
    slot: Option<usize>,
    stats: LookupStats,
}

impl SegmentLocator {
    /// Create an empty locator
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters so far
    pub fn stats(&self) -> LookupStats {
        self.stats
    }

    /// Forget cached positions, keeping the index
    pub fn reset(&mut self) {
        self.cursor = None;
        self.slot = None;
    }

    /// Find the enabled segment covering `virtual_time`
    pub fn locate<'a>(
        &mut self,
        timeline: &'a VirtualTimeline,
        virtual_time: f64,
    ) -> Option<&'a VirtualSegment> {
        self.sync(timeline);
        let segments = timeline.segments();
        let covers = |index: &[usize], slot: usize| segments[index[slot]].contains_virtual(virtual_time);

        if let Some(cursor) = self.cursor {
            let neighbors = [Some(cursor), cursor.checked_add(1), cursor.checked_sub(1)];
            for slot in neighbors.into_iter().flatten() {
                if slot < self.index.len() && covers(&self.index, slot) {
                    self.stats.neighbor_hits += 1;
                    return Some(self.settle(segments, slot));
                }
            }
        }

        if let Some(slot) = self.slot.filter(|&slot| covers(&self.index, slot)) {
            self.stats.cache_hits += 1;
            return Some(self.settle(segments, slot));
        }

        let after = self
            .index
            .partition_point(|&i| segments[i].virtual_start <= virtual_time);
        if let Some(slot) = after.checked_sub(1).filter(|&slot| covers(&self.index, slot)) {
            self.stats.index_hits += 1;
            return Some(self.settle(segments, slot));
        }

        self.stats.misses += 1;
        None
    }

    /// First playable segment starting strictly after `virtual_time`
    pub fn next_after<'a>(
        &mut self,
        timeline: &'a VirtualTimeline,
        virtual_time: f64,
    ) -> Option<&'a VirtualSegment> {
        self.sync(timeline);
        let segments = timeline.segments();
        let after = self
            .index
            .partition_point(|&i| segments[i].virtual_start <= virtual_time);
        self.index.get(after).map(|&i| &segments[i])
    }

    fn settle<'a>(&mut self, segments: &'a [VirtualSegment], slot: usize) -> &'a VirtualSegment {
        if let Some(cursor) = self.cursor {
            if cursor.abs_diff(slot) > 1 {
                self.slot = Some(cursor);
            }
        }
        self.cursor = Some(slot);
        &segments[self.index[slot]]
    }

    fn sync(&mut self, timeline: &VirtualTimeline) {
        if self.revision == Some(timeline.revision()) {
            return;
        }

        self.index = timeline
            .segments()
            .iter()
            .enumerate()
            .filter(|(_, seg)| seg.enabled && seg.virtual_duration() > 0.0)
            .map(|(i, _)| i)
            .collect();
        self.index.sort_by(|&a, &b| {
            let segments = timeline.segments();
            segments[a].virtual_start.total_cmp(&segments[b].virtual_start)
        });
        self.revision = Some(timeline.revision());
        self.cursor = None;
        self.slot = None;
        self.stats.rebuilds += 1;
    }
}
