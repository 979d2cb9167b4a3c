// SPDX-License-Identifier: MIT OR Apache-2.0
//! A media player without media.
//!
//! Advances a native position in real time while playing and acknowledges
//! seeks after a configurable latency. Enough to watch the controller work
//! without a decoder.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use reelsync_player::{MediaPlayer, PlayerError, PlayerEvent};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct NativeState {
    /// Position at the last anchor
    base: f64,
    /// When playback last (re)started
    started: Option<Instant>,
    rate: f64,
    ended: bool,
}

/// Simulated native player
#[derive(Debug)]
pub struct SimulatedPlayer {
    state: Mutex<NativeState>,
    media_duration: f64,
    seek_latency: Duration,
}

impl SimulatedPlayer {
    /// Create a paused player over media of the given length
    pub fn new(media_duration: f64, seek_latency: Duration) -> Self {
        Self {
            state: Mutex::new(NativeState {
                base: 0.0,
                started: None,
                rate: 1.0,
                ended: false,
            }),
            media_duration: media_duration.max(0.0),
            seek_latency,
        }
    }

    fn position(&self, state: &NativeState) -> f64 {
        let elapsed = state
            .started
            .map_or(0.0, |at| at.elapsed().as_secs_f64() * state.rate);
        (state.base + elapsed).min(self.media_duration)
    }

    /// Native notification the host should forward, if any.
    ///
    /// Reports `Ended` once when the media runs out, otherwise the current
    /// position while playing.
    pub fn poll_event(&self) -> Option<PlayerEvent> {
        let mut state = self.state.lock();
        state.started?;

        let position = self.position(&state);
        if position >= self.media_duration {
            state.base = self.media_duration;
            state.started = None;
            if !std::mem::replace(&mut state.ended, true) {
                return Some(PlayerEvent::Ended);
            }
            return None;
        }
        Some(PlayerEvent::TimeUpdate(position))
    }
}

impl MediaPlayer for SimulatedPlayer {
    fn current_time(&self) -> f64 {
        self.position(&self.state.lock())
    }

    fn is_paused(&self) -> bool {
        self.state.lock().started.is_none()
    }

    fn play(&self) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        if self.media_duration <= 0.0 {
            return Err(PlayerError::Unavailable("no media loaded".into()));
        }
        if state.started.is_none() {
            state.started = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        state.base = self.position(&state);
        state.started = None;
    }

    fn seek(&self, real_time: f64) -> BoxFuture<'static, ()> {
        {
            let mut state = self.state.lock();
            state.base = real_time.clamp(0.0, self.media_duration);
            state.ended = false;
            if state.started.is_some() {
                state.started = Some(Instant::now());
            }
        }
        tracing::trace!("Native seek to {:.3}s", real_time);
        tokio::time::sleep(self.seek_latency).boxed()
    }

    fn set_playback_rate(&self, rate: f64) {
        let mut state = self.state.lock();
        state.base = self.position(&state);
        if state.started.is_some() {
            state.started = Some(Instant::now());
        }
        state.rate = rate;
    }
}
