// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scripted media player for controller tests.

use crate::player::{MediaPlayer, PlayerError};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::time::Duration;

/// How the mock answers seeks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Resolve right away
    Immediate,
    /// Resolve after a tokio sleep
    Delayed(Duration),
    /// Never resolve
    Never,
}

#[derive(Debug)]
struct MockState {
    position: f64,
    paused: bool,
    rate: f64,
    seeks: Vec<f64>,
    plays: usize,
    pauses: usize,
    play_result: Result<(), PlayerError>,
    ack: AckMode,
}

/// Player that records every call
#[derive(Debug)]
pub struct MockPlayer {
    state: Mutex<MockState>,
}

impl MockPlayer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                position: 0.0,
                paused: true,
                rate: 1.0,
                seeks: Vec::new(),
                plays: 0,
                pauses: 0,
                play_result: Ok(()),
                ack: AckMode::Immediate,
            }),
        }
    }

    pub fn with_ack(self, ack: AckMode) -> Self {
        self.state.lock().ack = ack;
        self
    }

    pub fn set_position(&self, position: f64) {
        self.state.lock().position = position;
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.lock().paused = paused;
    }

    pub fn fail_play(&self, error: PlayerError) {
        self.state.lock().play_result = Err(error);
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.state.lock().seeks.clone()
    }

    pub fn last_seek(&self) -> Option<f64> {
        self.state.lock().seeks.last().copied()
    }

    pub fn plays(&self) -> usize {
        self.state.lock().plays
    }

    pub fn pauses(&self) -> usize {
        self.state.lock().pauses
    }

    pub fn rate(&self) -> f64 {
        self.state.lock().rate
    }
}

impl MediaPlayer for MockPlayer {
    fn current_time(&self) -> f64 {
        self.state.lock().position
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn play(&self) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        state.plays += 1;
        let result = state.play_result.clone();
        if result.is_ok() {
            state.paused = false;
        }
        result
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        state.pauses += 1;
        state.paused = true;
    }

    fn seek(&self, real_time: f64) -> BoxFuture<'static, ()> {
        let mut state = self.state.lock();
        state.position = real_time;
        state.seeks.push(real_time);

        match state.ack {
            AckMode::Immediate => futures::future::ready(()).boxed(),
            AckMode::Delayed(delay) => tokio::time::sleep(delay).boxed(),
            AckMode::Never => futures::future::pending().boxed(),
        }
    }

    fn set_playback_rate(&self, rate: f64) {
        self.state.lock().rate = rate;
    }
}
