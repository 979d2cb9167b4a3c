// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tuning knobs for the sync controller.
//!
//! Stored as RON next to the rest of the editor settings. Every field has a
//! default, so partial files are fine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Sync controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Nominal frame rate of the source media
    pub frame_rate: f64,
    /// Divergence, in frame periods, that triggers a corrective seek
    pub drift_correction_frames: f64,
    /// Divergence between native reports and the virtual clock that
    /// corrects the virtual clock
    pub reconcile_threshold_ms: u64,
    /// How long a seek waits for the player's acknowledgement
    pub seek_timeout_ms: u64,
    /// Floor of the adaptive processing interval
    pub min_processing_interval_ms: u64,
    /// Ceiling of the adaptive processing interval
    pub max_processing_interval_ms: u64,
    /// Early-arrival tolerance when deciding to skip a frame
    pub frame_slack_ms: u64,
    /// Frames in the rolling interval window
    pub rate_window: usize,
    /// Consecutive slow frames that raise the interval immediately
    pub slow_frame_streak: u32,
    /// Minimum spacing of frame and time-update notifications
    pub publish_interval_ms: u64,
    /// Segment transition debounce window
    pub transition_debounce_ms: u64,
    /// Frame payloads kept for reuse
    pub frame_pool_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            frame_rate: 30.0,
            drift_correction_frames: 2.0,
            reconcile_threshold_ms: 100,
            seek_timeout_ms: 500,
            min_processing_interval_ms: 16,
            max_processing_interval_ms: 100,
            frame_slack_ms: 2,
            rate_window: 10,
            slow_frame_streak: 3,
            publish_interval_ms: 33,
            transition_debounce_ms: 100,
            frame_pool_capacity: 4,
        }
    }
}

impl SyncConfig {
    /// Length of one frame in seconds
    pub fn frame_period(&self) -> f64 {
        1.0 / self.frame_rate.max(1.0)
    }

    /// Native/expected divergence that triggers a corrective seek, in seconds
    pub fn drift_threshold(&self) -> f64 {
        self.drift_correction_frames * self.frame_period()
    }

    /// Native/virtual divergence that corrects the virtual clock, in seconds
    pub fn reconcile_threshold(&self) -> f64 {
        Duration::from_millis(self.reconcile_threshold_ms).as_secs_f64()
    }

    /// Seek acknowledgement timeout
    pub fn seek_timeout(&self) -> Duration {
        Duration::from_millis(self.seek_timeout_ms)
    }

    /// Adaptive interval floor
    pub fn min_processing_interval(&self) -> Duration {
        Duration::from_millis(self.min_processing_interval_ms)
    }

    /// Adaptive interval ceiling, never below the floor
    pub fn max_processing_interval(&self) -> Duration {
        Duration::from_millis(self.max_processing_interval_ms.max(self.min_processing_interval_ms))
    }

    /// Early-arrival tolerance
    pub fn frame_slack(&self) -> Duration {
        Duration::from_millis(self.frame_slack_ms)
    }

    /// Notification spacing
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    /// Transition debounce window
    pub fn transition_debounce(&self) -> Duration {
        Duration::from_millis(self.transition_debounce_ms)
    }

    /// Parse from RON
    pub fn from_ron(s: &str) -> crate::Result<Self> {
        Ok(ron::from_str(s)?)
    }

    /// Serialize to RON
    pub fn to_ron(&self) -> crate::Result<String> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Load from a RON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }

    /// Save to a RON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }
}
