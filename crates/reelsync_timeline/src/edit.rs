// SPDX-License-Identifier: MIT OR Apache-2.0
//! Edit state handed over by the editing layer.
//!
//! An edit state is the ordered clip list with the spans of each clip's
//! recording that survived cutting. It is the only input the mapper needs
//! to rebuild the timeline.

use crate::segment::{ClipId, SegmentId, SegmentKind};
use crate::timeline::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A retained span of a clip's original recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetainedSpan {
    /// Stable ID, reused as the segment ID
    pub id: SegmentId,
    /// Start in the original recording
    pub real_start: f64,
    /// End in the original recording
    pub real_end: f64,
    /// Whether the span plays
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How the span was produced
    #[serde(default)]
    pub kind: SegmentKind,
}

fn default_true() -> bool {
    true
}

impl RetainedSpan {
    /// Create an enabled span
    pub fn new(real_start: f64, real_end: f64) -> Self {
        Self {
            id: SegmentId::new(),
            real_start,
            real_end,
            enabled: true,
            kind: SegmentKind::Normal,
        }
    }

    /// Set the span kind
    pub fn with_kind(mut self, kind: SegmentKind) -> Self {
        self.kind = kind;
        self
    }

    /// Mark the span disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Span length
    pub fn duration(&self) -> f64 {
        self.real_end - self.real_start
    }
}

/// Edit state of one clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipEdit {
    /// Clip ID
    pub id: ClipId,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Whether the whole clip plays
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Retained spans in playback order
    pub spans: Vec<RetainedSpan>,
}

impl ClipEdit {
    /// Create an enabled clip with no spans
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ClipId::new(),
            name: name.into(),
            enabled: true,
            spans: Vec::new(),
        }
    }

    /// Add a span
    pub fn with_span(mut self, span: RetainedSpan) -> Self {
        self.spans.push(span);
        self
    }
}

/// Ordered clip list produced by the editor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditState {
    /// Clips in program order
    pub clips: IndexMap<ClipId, ClipEdit>,
}

impl EditState {
    /// Create an empty edit state
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a clip at the end of the program
    pub fn push_clip(&mut self, clip: ClipEdit) -> ClipId {
        let id = clip.id;
        self.clips.insert(id, clip);
        id
    }

    /// Remove a clip, keeping the order of the rest
    pub fn remove_clip(&mut self, id: ClipId) -> Option<ClipEdit> {
        self.clips.shift_remove(&id)
    }

    /// Move a clip to a new position in the program
    pub fn move_clip(&mut self, id: ClipId, to: usize) -> bool {
        let Some(from) = self.clips.get_index_of(&id) else {
            return false;
        };
        let to = to.min(self.clips.len().saturating_sub(1));
        self.clips.move_index(from, to);
        true
    }

    /// Get a clip
    pub fn clip(&self, id: ClipId) -> Option<&ClipEdit> {
        self.clips.get(&id)
    }

    /// Get a mutable clip
    pub fn clip_mut(&mut self, id: ClipId) -> Option<&mut ClipEdit> {
        self.clips.get_mut(&id)
    }

    /// Serialize to RON
    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Deserialize from RON
    pub fn from_ron(s: &str) -> Result<Self> {
        Ok(ron::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_clip() {
        let mut state = EditState::new();
        let a = state.push_clip(ClipEdit::new("a"));
        let b = state.push_clip(ClipEdit::new("b"));
        let c = state.push_clip(ClipEdit::new("c"));

        assert!(state.move_clip(c, 0));
        let order: Vec<ClipId> = state.clips.keys().copied().collect();
        assert_eq!(order, vec![c, a, b]);

        assert!(!state.move_clip(ClipId::new(), 0));
    }

    #[test]
    fn test_ron_roundtrip() {
        let mut state = EditState::new();
        let clip = ClipEdit::new("interview")
            .with_span(RetainedSpan::new(1.0, 4.0).with_kind(SegmentKind::Split));
        state.push_clip(clip);

        let ron = state.to_ron().unwrap();
        let loaded = EditState::from_ron(&ron).unwrap();
        assert_eq!(loaded, state);
    }
}
