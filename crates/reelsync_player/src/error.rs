// SPDX-License-Identifier: MIT OR Apache-2.0
//! Controller errors.

use crate::player::PlayerError;
use reelsync_timeline::TimelineError;
use thiserror::Error;

/// Sync controller errors
#[derive(Debug, Error)]
pub enum SyncError {
    /// The operation needs a media player and none is attached
    #[error("No media player attached")]
    NoPlayerAttached,

    /// The media player refused a request
    #[error("Player error: {0}")]
    Player(#[from] PlayerError),

    /// The edit state could not be turned into a timeline
    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    /// Invalid configuration file
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    /// Configuration could not be written
    #[error("Config serialization error: {0}")]
    ConfigWrite(#[from] ron::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for controller operations
pub type Result<T> = std::result::Result<T, SyncError>;
