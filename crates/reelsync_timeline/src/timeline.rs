// SPDX-License-Identifier: MIT OR Apache-2.0
//! The virtual timeline: an ordered, versioned set of segments.

use crate::segment::{ClipId, SegmentId, VirtualSegment};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timeline errors
#[derive(Debug, Error)]
pub enum TimelineError {
    /// A segment span is negative or not finite
    #[error("Invalid span for segment {id:?}: {reason}")]
    InvalidSpan {
        /// Offending segment
        id: SegmentId,
        /// What is wrong with it
        reason: &'static str,
    },

    /// An enabled segment would change playback speed
    #[error("Segment {id:?} changes playback speed (virtual {virtual_len}s, real {real_len}s)")]
    SpeedMismatch {
        /// Offending segment
        id: SegmentId,
        /// Virtual span length
        virtual_len: f64,
        /// Real span length
        real_len: f64,
    },

    /// RON serialization error
    #[error("RON serialization error: {0}")]
    Ron(#[from] ron::Error),

    /// RON parse error
    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for timeline operations
pub type Result<T> = std::result::Result<T, TimelineError>;

/// A mapped time and the segment that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappedTime {
    /// Mapped time in seconds
    pub time: f64,
    /// Owning segment
    pub segment_id: SegmentId,
}

/// The edited program as a list of segments.
///
/// Instances are immutable once built; every edit produces a new timeline
/// with a higher revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualTimeline {
    /// End of the last enabled segment, in virtual seconds
    pub duration: f64,
    /// Segments sorted by virtual start
    segments: Vec<VirtualSegment>,
    /// Clip order as presented by the editor
    clip_order: Vec<ClipId>,
    /// Change token
    revision: u64,
}

impl VirtualTimeline {
    /// Create an empty timeline
    pub fn empty() -> Self {
        Self {
            duration: 0.0,
            segments: Vec::new(),
            clip_order: Vec::new(),
            revision: 0,
        }
    }

    /// Build a timeline from explicit segments.
    ///
    /// Segments are sorted by virtual start. Enabled segments must keep
    /// their virtual and real spans equal in length; gaps between segments
    /// are allowed.
    pub fn from_segments(
        mut segments: Vec<VirtualSegment>,
        clip_order: Vec<ClipId>,
        revision: u64,
    ) -> Result<Self> {
        for seg in &segments {
            validate_segment(seg)?;
        }

        segments.sort_by(|a, b| a.virtual_start.total_cmp(&b.virtual_start));

        let duration = segments
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.virtual_end)
            .fold(0.0, f64::max);

        Ok(Self {
            duration,
            segments,
            clip_order,
            revision,
        })
    }

    /// All segments, sorted by virtual start
    pub fn segments(&self) -> &[VirtualSegment] {
        &self.segments
    }

    /// Enabled segments only
    pub fn enabled_segments(&self) -> impl Iterator<Item = &VirtualSegment> {
        self.segments.iter().filter(|s| s.enabled)
    }

    /// Clip order
    pub fn clip_order(&self) -> &[ClipId] {
        &self.clip_order
    }

    /// Change token, bumped on every rebuild
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether there is nothing to play
    pub fn is_empty(&self) -> bool {
        self.enabled_segments().next().is_none()
    }

    /// Sum of enabled span lengths
    pub fn retained_duration(&self) -> f64 {
        self.enabled_segments().map(VirtualSegment::virtual_duration).sum()
    }

    /// Get a segment by ID
    pub fn segment(&self, id: SegmentId) -> Option<&VirtualSegment> {
        self.segments.iter().find(|s| s.id == id)
    }

    /// Position of a segment in the sorted list
    pub fn index_of(&self, id: SegmentId) -> Option<usize> {
        self.segments.iter().position(|s| s.id == id)
    }

    /// Enabled segment covering a virtual time.
    ///
    /// Binary search by virtual start, with a direct scan as fallback.
    pub fn segment_at(&self, virtual_time: f64) -> Option<&VirtualSegment> {
        if !virtual_time.is_finite() {
            return None;
        }

        let upper = self
            .segments
            .partition_point(|s| s.virtual_start <= virtual_time);

        for seg in self.segments[..upper].iter().rev() {
            if !seg.enabled {
                continue;
            }
            if seg.contains_virtual(virtual_time) {
                return Some(seg);
            }
            if seg.virtual_end <= virtual_time {
                break;
            }
        }

        self.segments
            .iter()
            .find(|s| s.enabled && s.contains_virtual(virtual_time))
    }

    /// First enabled segment starting strictly after a virtual time
    pub fn next_segment_after(&self, virtual_time: f64) -> Option<&VirtualSegment> {
        self.enabled_segments()
            .find(|s| s.virtual_start > virtual_time)
    }

    /// First enabled segment
    pub fn first_enabled(&self) -> Option<&VirtualSegment> {
        self.enabled_segments().next()
    }

    /// Last enabled segment
    pub fn last_enabled(&self) -> Option<&VirtualSegment> {
        self.segments.iter().rfind(|s| s.enabled)
    }

    /// Enabled segments whose real span contains a real time
    pub fn segments_for_real(&self, real_time: f64) -> impl Iterator<Item = &VirtualSegment> {
        self.enabled_segments()
            .filter(move |s| s.contains_real(real_time))
    }

    /// Map a virtual time to real time inside its owning segment
    pub fn to_real(&self, virtual_time: f64) -> Option<MappedTime> {
        self.segment_at(virtual_time).map(|seg| MappedTime {
            time: seg.real_at(virtual_time),
            segment_id: seg.id,
        })
    }

    /// Map a real time to virtual time.
    ///
    /// Real footage can appear in the program more than once; the hinted
    /// segment wins when it contains the real time, otherwise the earliest
    /// enabled segment in program order does.
    pub fn to_virtual(&self, real_time: f64, hint: Option<SegmentId>) -> Option<MappedTime> {
        if !real_time.is_finite() {
            return None;
        }

        let hinted = hint
            .and_then(|id| self.segment(id))
            .filter(|seg| seg.enabled && seg.contains_real(real_time));

        hinted
            .or_else(|| self.segments_for_real(real_time).next())
            .map(|seg| MappedTime {
                time: seg.virtual_at(real_time),
                segment_id: seg.id,
            })
    }

    /// Serialize to RON
    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Deserialize from RON, re-validating every segment
    pub fn from_ron(s: &str) -> Result<Self> {
        let raw: Self = ron::from_str(s)?;
        Self::from_segments(raw.segments, raw.clip_order, raw.revision)
    }

    /// Describe what the export pipeline has to render
    pub fn to_render_manifest(&self) -> RenderManifest {
        RenderManifest {
            revision: self.revision,
            duration: self.duration,
            entries: self
                .enabled_segments()
                .map(|s| RenderEntry {
                    segment_id: s.id,
                    clip_id: s.source_clip_id,
                    virtual_in: s.virtual_start,
                    real_in: s.real_start,
                    real_out: s.real_end,
                })
                .collect(),
        }
    }
}

impl Default for VirtualTimeline {
    fn default() -> Self {
        Self::empty()
    }
}

fn validate_segment(seg: &VirtualSegment) -> Result<()> {
    let bounds = [seg.virtual_start, seg.virtual_end, seg.real_start, seg.real_end];
    if bounds.iter().any(|v| !v.is_finite()) {
        return Err(TimelineError::InvalidSpan {
            id: seg.id,
            reason: "non-finite bound",
        });
    }
    if seg.virtual_start < 0.0 || seg.real_start < 0.0 {
        return Err(TimelineError::InvalidSpan {
            id: seg.id,
            reason: "negative start",
        });
    }
    if seg.virtual_end < seg.virtual_start || seg.real_end < seg.real_start {
        return Err(TimelineError::InvalidSpan {
            id: seg.id,
            reason: "end before start",
        });
    }
    if seg.enabled && !seg.preserves_speed() {
        return Err(TimelineError::SpeedMismatch {
            id: seg.id,
            virtual_len: seg.virtual_duration(),
            real_len: seg.real_duration(),
        });
    }
    Ok(())
}

/// Ordered list of real-time ranges to render, handed to the export pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderManifest {
    /// Timeline revision this manifest was taken from
    pub revision: u64,
    /// Total program length
    pub duration: f64,
    /// Ranges in program order
    pub entries: Vec<RenderEntry>,
}

/// One range of source footage in a render manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderEntry {
    /// Segment this range came from
    pub segment_id: SegmentId,
    /// Source clip
    pub clip_id: ClipId,
    /// Where the range lands in the program
    pub virtual_in: f64,
    /// Source in point
    pub real_in: f64,
    /// Source out point
    pub real_out: f64,
}

impl RenderManifest {
    /// Serialize to JSON for the export pipeline
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
