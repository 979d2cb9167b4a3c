// SPDX-License-Identifier: MIT OR Apache-2.0
//! The media player seam.
//!
//! The controller never decodes anything itself. It drives whatever player
//! the host attaches through [`MediaPlayer`], and the host forwards the
//! player's native notifications as [`PlayerEvent`]s.

use futures::future::BoxFuture;
use thiserror::Error;

/// Errors reported by a media player
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    /// A newer play/pause request replaced this one
    #[error("Play request superseded by a newer request")]
    Superseded,

    /// The player refused to start
    #[error("Play request rejected: {0}")]
    Rejected(String),

    /// The player has no media or is gone
    #[error("Player unavailable: {0}")]
    Unavailable(String),
}

/// Native notifications forwarded by the host
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Periodic native position report, in real seconds
    TimeUpdate(f64),
    /// The player reached the end of the media
    Ended,
    /// The player failed
    Error(String),
}

/// A position-settable, play/pause-able handle on the original recording.
///
/// All times are real (native) seconds. Implementations must not call back
/// into the controller synchronously from these methods.
pub trait MediaPlayer: Send + Sync {
    /// Native playback position
    fn current_time(&self) -> f64;

    /// Whether native playback is paused
    fn is_paused(&self) -> bool;

    /// Start native playback
    fn play(&self) -> Result<(), PlayerError>;

    /// Pause native playback
    fn pause(&self);

    /// Move the native position.
    ///
    /// The seek is issued immediately; the returned future resolves when
    /// the player acknowledges it and may be dropped when nobody waits.
    fn seek(&self, real_time: f64) -> BoxFuture<'static, ()>;

    /// Change the native playback rate
    fn set_playback_rate(&self, rate: f64);
}
