// SPDX-License-Identifier: MIT OR Apache-2.0
//! Player synchronization for `ReelSync`.
//!
//! Keeps a real media player, which only knows the original recording's
//! time axis, presenting the edited program as one continuous stream.
//! This crate provides:
//! - The sync controller (virtual clock, reconciliation, seeks)
//! - The media player seam and native event types
//! - Adaptive frame pacing and throttled notifications
//! - Controller configuration
//!
//! ## Architecture
//!
//! The controller is driven from outside: the host calls
//! [`SyncController::present_frame`] once per presented frame and forwards
//! native player notifications. Everything else reacts to those calls.

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod governor;
pub mod locator;
pub mod observer;
pub mod player;
pub mod throttle;

#[cfg(test)]
mod mock;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::SyncConfig;
pub use controller::{SyncController, SyncStats};
pub use error::{Result, SyncError};
pub use events::{
    Completion, FrameUpdate, GapSkipped, PlaybackSnapshot, PlaybackStatus, SeekOutcome,
    SeekRequest, StateChange, TimeUpdate, TimelineChange,
};
pub use governor::{Adjustment, FrameRateGovernor};
pub use locator::{LookupStats, SegmentLocator};
pub use observer::{Observers, Subscription};
pub use player::{MediaPlayer, PlayerError, PlayerEvent};
pub use throttle::{FramePool, FrameSample, UpdateThrottle};
