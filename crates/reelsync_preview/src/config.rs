// SPDX-License-Identifier: MIT OR Apache-2.0
//! Preview host settings.
//!
//! Loaded from a RON file given on the command line. Controller tuning
//! lives in its own `sync` section so the same file can carry both.

use reelsync_player::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Preview host errors
#[derive(Debug, Error)]
pub enum PreviewError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid settings or edit file
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Settings could not be written
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// Edit state rejected by the timeline
    #[error("Timeline error: {0}")]
    Timeline(#[from] reelsync_timeline::TimelineError),

    /// Controller failure
    #[error("Sync error: {0}")]
    Sync(#[from] reelsync_player::SyncError),

    /// File watcher failure
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Result type for the preview host
pub type Result<T> = std::result::Result<T, PreviewError>;

/// One step of the scripted session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScriptStep {
    /// Start playback
    Play,
    /// Pause playback
    Pause,
    /// Seek to a virtual time
    Seek(f64),
    /// Step by whole frames
    Step(i64),
    /// Change the playback rate
    Rate(f64),
    /// Let playback run for some milliseconds
    Wait(u64),
}

/// Preview host settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Edit state file; a built-in demo edit is used when unset
    pub edit_path: Option<PathBuf>,
    /// Reload the edit state when its file changes
    pub watch_edits: bool,
    /// Debounce for edit file changes
    pub watch_debounce_ms: u64,
    /// Rate of the fallback display loop
    pub display_fps: f64,
    /// Spacing of native time reports from the simulated player
    pub native_report_ms: u64,
    /// Simulated seek acknowledgement latency
    pub seek_latency_ms: u64,
    /// Length of the simulated source recording
    pub media_duration: f64,
    /// Give up waiting for completion after this long
    pub session_timeout_ms: u64,
    /// Steps run before waiting for completion
    pub script: Vec<ScriptStep>,
    /// Controller tuning
    pub sync: SyncConfig,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            edit_path: None,
            watch_edits: true,
            watch_debounce_ms: 250,
            display_fps: 60.0,
            native_report_ms: 250,
            seek_latency_ms: 40,
            media_duration: 60.0,
            session_timeout_ms: 60_000,
            script: vec![
                ScriptStep::Play,
                ScriptStep::Wait(1500),
                ScriptStep::Seek(4.0),
                ScriptStep::Wait(500),
                ScriptStep::Rate(2.0),
            ],
            sync: SyncConfig::default(),
        }
    }
}

impl PreviewConfig {
    /// Display loop period
    pub fn display_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.display_fps.clamp(1.0, 240.0))
    }

    /// Native report period
    pub fn native_report_period(&self) -> Duration {
        Duration::from_millis(self.native_report_ms.max(1))
    }

    /// Seek latency
    pub fn seek_latency(&self) -> Duration {
        Duration::from_millis(self.seek_latency_ms)
    }

    /// Watcher debounce
    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    /// Session timeout
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    /// Load from a RON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = ron::from_str(&content)?;
        tracing::info!("Loaded preview settings from {:?}", path);
        Ok(config)
    }

    /// Save to a RON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
