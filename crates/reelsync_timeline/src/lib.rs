// SPDX-License-Identifier: MIT OR Apache-2.0
//! Virtual timeline for `ReelSync`.
//!
//! After cuts, deletes, moves and splits, the edited program is described as
//! a list of segments, each tying a span of the edited ("virtual") program to
//! a span of the original ("real") recording. This crate provides:
//! - The segment and timeline model
//! - Edit state input from the editing layer
//! - The timeline mapper (rebuilds, virtual/real mapping)
//! - Debounced segment transition tracking
//!
//! ## Architecture
//!
//! Timelines are immutable snapshots shared as `Arc<VirtualTimeline>`.
//! Every edit produces a new snapshot with a higher revision, which lets
//! readers cache derived data keyed by revision.

pub mod segment;
pub mod timeline;
pub mod edit;
pub mod mapper;
pub mod transition;

pub use segment::{ClipId, SegmentId, SegmentKind, VirtualSegment, SPAN_TOLERANCE};
pub use timeline::{MappedTime, RenderEntry, RenderManifest, Result, TimelineError, VirtualTimeline};
pub use edit::{ClipEdit, EditState, RetainedSpan};
pub use mapper::TimelineMapper;
pub use transition::{
    classify, Position, PositionClass, SegmentTransitionTracker, TrackerOutput, TrackerState,
    TransitionEvent, DEFAULT_TRANSITION_DEBOUNCE,
};
