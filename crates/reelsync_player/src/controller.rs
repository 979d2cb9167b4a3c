// SPDX-License-Identifier: MIT OR Apache-2.0
//! Player synchronization controller.
//!
//! Owns the virtual clock and keeps the real player lined up with it:
//! - Per-frame reconciliation through [`SyncController::present_frame`]
//! - Serialized, timeout-bounded seeks through [`SyncController::seek`]
//! - Native position reports through [`SyncController::handle_player_event`]
//!
//! ## Locking
//!
//! All mutable state sits behind one mutex. It is never held while calling
//! the player or a subscriber: player commands and notifications are queued
//! while the lock is held and run after it is released. Seeks additionally
//! take a FIFO async lock so overlapping seek sequences run one at a time.

use crate::clock::{Clock, MonotonicClock};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::events::{
    Completion, EventHub, FrameUpdate, GapSkipped, Notification, PlaybackSnapshot,
    PlaybackStatus, SeekOutcome, SeekRequest, StateChange, TimeUpdate, TimelineChange,
};
use crate::governor::FrameRateGovernor;
use crate::locator::{LookupStats, SegmentLocator};
use crate::observer::Subscription;
use crate::player::{MediaPlayer, PlayerError, PlayerEvent};
use crate::throttle::{FramePool, FrameSample, UpdateThrottle};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use reelsync_timeline::{
    EditState, Position, SegmentId, SegmentTransitionTracker, TimelineMapper, TransitionEvent,
    VirtualSegment, VirtualTimeline,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Diagnostics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SyncStats {
    /// Segment lookup counters
    pub lookups: LookupStats,
    /// Frames that went through reconciliation
    pub frames_processed: u64,
    /// Frames skipped by the adaptive governor
    pub frames_skipped: u64,
    /// Frames ignored because a seek was in flight
    pub frames_during_seek: u64,
    /// Player jumps caused by entering a new segment
    pub segment_jumps: u64,
    /// Player jumps caused by drift
    pub corrective_seeks: u64,
    /// Gaps jumped over
    pub gaps_skipped: u64,
    /// Virtual clock corrections from native reports
    pub reconciliations: u64,
    /// Seeks finished
    pub seeks_completed: u64,
    /// Seeks that finished without an acknowledgement
    pub seek_timeouts: u64,
    /// Current adaptive processing interval
    pub processing_interval: Duration,
    /// Seeks waiting for the seek lock
    pub queued_seeks: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    frames_processed: u64,
    frames_skipped: u64,
    frames_during_seek: u64,
    segment_jumps: u64,
    corrective_seeks: u64,
    gaps_skipped: u64,
    reconciliations: u64,
    seeks_completed: u64,
    seek_timeouts: u64,
}

/// Player call queued under the state lock
#[derive(Debug, Clone, Copy, PartialEq)]
enum PlayerCommand {
    Seek(f64),
    Pause,
    SetRate(f64),
}

/// Work left over once the state lock is released
#[derive(Debug, Default)]
struct Batch {
    notifications: Vec<Notification>,
    commands: Vec<PlayerCommand>,
}

/// Wall-clock timestamp paired with the virtual time it corresponds to
#[derive(Debug, Clone, Copy, Default)]
struct Anchor {
    at: Duration,
    virtual_time: f64,
}

/// A fire-and-forget player jump the player has not confirmed yet
struct PendingJump {
    at: Duration,
    /// `None` until the command has been handed to the player
    ack: Option<BoxFuture<'static, ()>>,
}

/// Where a requested virtual time resolves to
#[derive(Debug, Clone, Copy, PartialEq)]
struct Target {
    virtual_time: f64,
    real_time: f64,
    segment_id: Option<SegmentId>,
}

struct SyncState {
    timeline: Arc<VirtualTimeline>,
    status: PlaybackStatus,
    virtual_time: f64,
    rate: f64,
    anchor: Anchor,
    active_segment: Option<SegmentId>,
    locator: SegmentLocator,
    tracker: SegmentTransitionTracker,
    governor: FrameRateGovernor,
    throttle: UpdateThrottle,
    pool: FramePool,
    last_frame_at: Option<Duration>,
    last_processed_at: Option<Duration>,
    /// Latest unconfirmed jump; native positions are stale until it lands
    pending_jump: Option<PendingJump>,
    seek_in_flight: bool,
    /// Bumped by `stop()` so a finishing seek can tell it lost
    epoch: u64,
    counters: Counters,
    outbox: Vec<Notification>,
    commands: Vec<PlayerCommand>,
}

impl SyncState {
    fn new(config: &SyncConfig, timeline: Arc<VirtualTimeline>) -> Self {
        Self {
            timeline,
            status: PlaybackStatus::Idle,
            virtual_time: 0.0,
            rate: 1.0,
            anchor: Anchor::default(),
            active_segment: None,
            locator: SegmentLocator::new(),
            tracker: SegmentTransitionTracker::new(config.transition_debounce()),
            governor: FrameRateGovernor::new(
                config.min_processing_interval(),
                config.max_processing_interval(),
                config.rate_window,
                config.slow_frame_streak,
            ),
            throttle: UpdateThrottle::new(config.publish_interval()),
            pool: FramePool::new(config.frame_pool_capacity),
            last_frame_at: None,
            last_processed_at: None,
            pending_jump: None,
            seek_in_flight: false,
            epoch: 0,
            counters: Counters::default(),
            outbox: Vec::new(),
            commands: Vec::new(),
        }
    }

    fn take(&mut self) -> Batch {
        Batch {
            notifications: std::mem::take(&mut self.outbox),
            commands: std::mem::take(&mut self.commands),
        }
    }

    /// Virtual time derived from the anchor, without touching state
    fn clock_time(&self, now: Duration) -> f64 {
        if self.status.is_playing() && !self.seek_in_flight {
            let elapsed = now.saturating_sub(self.anchor.at).as_secs_f64();
            (self.anchor.virtual_time + elapsed * self.rate).clamp(0.0, self.timeline.duration)
        } else {
            self.virtual_time
        }
    }

    fn advance(&mut self, now: Duration) {
        self.virtual_time = self.clock_time(now);
    }

    fn reanchor(&mut self, now: Duration) {
        self.anchor = Anchor {
            at: now,
            virtual_time: self.virtual_time,
        };
    }

    /// Forget frame pacing so the next frame is processed right away
    fn restart_pacing(&mut self) {
        self.last_frame_at = None;
        self.last_processed_at = None;
        self.throttle.reset(&mut self.pool);
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            status: self.status,
            virtual_time: self.virtual_time,
            duration: self.timeline.duration,
            playback_rate: self.rate,
        }
    }

    fn set_status(&mut self, status: PlaybackStatus) {
        if self.status == status {
            return;
        }
        self.outbox.push(Notification::StateChanged(StateChange {
            from: self.status,
            to: status,
            virtual_time: self.virtual_time,
        }));
        self.status = status;
    }

    fn jump(&mut self, real_time: f64, now: Duration) {
        self.commands.push(PlayerCommand::Seek(real_time));
        self.pending_jump = Some(PendingJump { at: now, ack: None });
    }

    /// Whether the player's native position reflects the last jump.
    ///
    /// A jump counts as landed once its acknowledgement resolves, or once
    /// `timeout` has passed without one.
    fn settled(&mut self, now: Duration, timeout: Duration) -> bool {
        let Some(pending) = self.pending_jump.as_mut() else {
            return true;
        };

        let landed = now.saturating_sub(pending.at) >= timeout
            || pending
                .ack
                .as_mut()
                .is_some_and(|ack| ack.as_mut().now_or_never().is_some());
        if landed {
            self.pending_jump = None;
        }
        landed
    }

    /// Attach the acknowledgement of an issued jump to the pending jump
    fn track_ack(&mut self, mut ack: BoxFuture<'static, ()>) {
        let Some(pending) = self.pending_jump.as_mut() else {
            return;
        };
        if pending.ack.is_some() {
            return;
        }

        if ack.as_mut().now_or_never().is_some() {
            self.pending_jump = None;
        } else {
            pending.ack = Some(ack);
        }
    }

    fn active(&self) -> Option<&VirtualSegment> {
        self.active_segment.and_then(|id| self.timeline.segment(id))
    }

    /// Pick up a newer timeline snapshot if the mapper published one
    fn sync_timeline(&mut self, mapper: &TimelineMapper) -> bool {
        let latest = mapper.timeline();
        if latest.revision() == self.timeline.revision() {
            return false;
        }

        self.timeline = latest;
        let duration = self.timeline.duration;
        if self.virtual_time > duration {
            self.virtual_time = duration;
        }
        if self.active().map_or(true, |seg| !seg.enabled) {
            self.active_segment = None;
        }

        let change = TimelineChange {
            revision: self.timeline.revision(),
            duration,
            segment_count: self.timeline.enabled_segments().count(),
        };
        tracing::debug!(
            "Timeline r{} picked up: {} segments, {:.3}s",
            change.revision,
            change.segment_count,
            change.duration
        );
        self.outbox.push(Notification::TimelineChanged(change));
        true
    }

    /// Resolve a requested virtual time to a playable position.
    ///
    /// Clamps to the program, then tries the active segment, the locator,
    /// a direct scan and the mapper. A time inside a gap snaps forward to
    /// the next segment; past the last segment it lands on the end.
    fn resolve(&mut self, requested: f64, mapper: &TimelineMapper) -> Target {
        let timeline = Arc::clone(&self.timeline);
        let duration = timeline.duration;
        let virtual_time = if requested.is_finite() {
            requested.clamp(0.0, duration)
        } else {
            0.0
        };

        let cached = self
            .active()
            .filter(|seg| seg.enabled && seg.contains_virtual(virtual_time))
            .map(|seg| seg.id);
        let found = cached
            .and_then(|id| timeline.segment(id))
            .or_else(|| self.locator.locate(&timeline, virtual_time))
            .or_else(|| timeline.segment_at(virtual_time));

        if let Some(seg) = found {
            return Target {
                virtual_time,
                real_time: seg.real_at(virtual_time),
                segment_id: Some(seg.id),
            };
        }

        if let Some(mapped) = mapper.to_real(virtual_time) {
            return Target {
                virtual_time,
                real_time: mapped.time,
                segment_id: Some(mapped.segment_id),
            };
        }

        if let Some(next) = self.locator.next_after(&timeline, virtual_time) {
            return Target {
                virtual_time: next.virtual_start,
                real_time: next.real_start,
                segment_id: Some(next.id),
            };
        }

        match timeline.last_enabled() {
            Some(last) => Target {
                virtual_time: duration,
                real_time: last.real_end,
                segment_id: Some(last.id),
            },
            None => Target {
                virtual_time: 0.0,
                real_time: 0.0,
                segment_id: None,
            },
        }
    }

    fn frame(&mut self, now: Duration, native: Option<f64>, config: &SyncConfig) {
        if self.seek_in_flight {
            self.counters.frames_during_seek += 1;
            return;
        }
        if !self.status.is_playing() {
            self.last_frame_at = None;
            return;
        }

        self.advance(now);

        if let Some(last) = self.last_frame_at {
            self.governor.record(now.saturating_sub(last));
        }
        self.last_frame_at = Some(now);

        if let Some(last) = self.last_processed_at {
            if !self
                .governor
                .should_process(now.saturating_sub(last), config.frame_slack())
            {
                self.counters.frames_skipped += 1;
                tracing::trace!("Frame skipped, interval {:?}", self.governor.target());
                return;
            }
        }
        self.last_processed_at = Some(now);
        self.counters.frames_processed += 1;

        let timeline = Arc::clone(&self.timeline);
        let mut jumped = false;

        let position = if self.virtual_time >= timeline.duration {
            Position::End
        } else if let Some(seg) = self.locator.locate(&timeline, self.virtual_time) {
            if self.active_segment != Some(seg.id) {
                let real = seg.real_at(self.virtual_time);
                tracing::debug!(
                    "Entered segment at {:.3}s, player -> {:.3}s",
                    self.virtual_time,
                    real
                );
                self.active_segment = Some(seg.id);
                self.jump(real, now);
                self.counters.segment_jumps += 1;
                jumped = true;
            }
            Position::Segment(seg.id)
        } else if let Some(next) = self.locator.next_after(&timeline, self.virtual_time) {
            self.skip_gap(next, now);
            jumped = true;
            Position::Segment(next.id)
        } else {
            Position::End
        };

        let output = self.tracker.observe(position, self.virtual_time, now);
        if let Some(event) = output.transition {
            self.outbox.push(Notification::Transition(event));
        }

        if position == Position::End {
            self.virtual_time = timeline.duration;
            self.offer_frame(now);
            self.complete(output.completed, now);
            return;
        }

        let expected = self.active().map(|seg| seg.real_at(self.virtual_time));
        if !jumped && self.settled(now, config.seek_timeout()) {
            if let (Some(native), Some(expected)) = (native, expected) {
                let drift = native - expected;
                if drift.abs() > config.drift_threshold() {
                    tracing::warn!(
                        "Player drifted {:+.3}s from {:.3}s, correcting",
                        drift,
                        expected
                    );
                    self.jump(expected, now);
                    self.counters.corrective_seeks += 1;
                }
            }
        }

        self.offer_frame(now);
    }

    fn skip_gap(&mut self, next: &VirtualSegment, now: Duration) {
        let from = self.virtual_time;
        self.virtual_time = next.virtual_start;
        self.reanchor(now);
        self.active_segment = Some(next.id);
        self.jump(next.real_start, now);
        self.counters.gaps_skipped += 1;

        tracing::debug!(
            "Skipped gap {:.3}s -> {:.3}s, player -> {:.3}s",
            from,
            next.virtual_start,
            next.real_start
        );
        self.outbox.push(Notification::GapSkipped(GapSkipped {
            from,
            to: next.virtual_start,
            segment_id: next.id,
        }));
    }

    fn offer_frame(&mut self, now: Duration) {
        let sample = FrameSample {
            virtual_time: self.virtual_time,
            real_time: self.active().map(|seg| seg.real_at(self.virtual_time)),
            segment_id: self.active_segment,
            playback_rate: self.rate,
        };
        if let Some(frame) = self.throttle.offer(&mut self.pool, sample, now) {
            self.publish_frame(frame);
        }
    }

    fn flush_frame(&mut self, now: Duration) {
        if let Some(frame) = self.throttle.flush(now) {
            self.publish_frame(frame);
        }
    }

    fn publish_frame(&mut self, frame: FrameUpdate) {
        let update = TimeUpdate {
            virtual_time: frame.virtual_time,
            duration: self.timeline.duration,
        };
        self.outbox.push(Notification::Frame(frame));
        self.outbox.push(Notification::TimeUpdate(update));
    }

    fn complete(&mut self, signal: bool, now: Duration) {
        self.virtual_time = self.timeline.duration;
        self.reanchor(now);
        self.flush_frame(now);
        self.commands.push(PlayerCommand::Pause);
        self.set_status(PlaybackStatus::Completed);

        if signal {
            tracing::info!("Playback complete at {:.3}s", self.virtual_time);
            self.outbox.push(Notification::Completed(Completion {
                virtual_time: self.virtual_time,
            }));
        }
    }

    /// Freeze the clock; returns false when not playing
    fn pause_at(&mut self, now: Duration) -> bool {
        if !self.status.is_playing() {
            return false;
        }

        self.advance(now);
        self.reanchor(now);
        self.flush_frame(now);
        self.set_status(PlaybackStatus::Paused);
        self.outbox.push(Notification::Pause(self.snapshot()));
        true
    }

    fn reconcile_native(&mut self, real_time: f64, now: Duration, config: &SyncConfig) {
        if !self.status.is_playing()
            || self.seek_in_flight
            || !self.settled(now, config.seek_timeout())
        {
            return;
        }

        self.advance(now);
        let Some(mapped) = self.timeline.to_virtual(real_time, self.active_segment) else {
            return;
        };

        let drift = mapped.time - self.virtual_time;
        if drift.abs() > config.reconcile_threshold() {
            tracing::debug!(
                "Virtual clock {:+.3}s off native report, correcting to {:.3}s",
                drift,
                mapped.time
            );
            self.virtual_time = mapped.time.min(self.timeline.duration);
            self.active_segment = Some(mapped.segment_id);
            self.reanchor(now);
            self.counters.reconciliations += 1;
        }
    }

    fn native_ended(&mut self, now: Duration) {
        if !self.status.is_playing() {
            return;
        }

        let last = self.timeline.last_enabled().map(|seg| seg.id);
        if self.active_segment.is_some() && self.active_segment == last {
            let output = self
                .tracker
                .observe(Position::End, self.timeline.duration, now);
            self.complete(output.completed, now);
        } else {
            tracing::debug!("Ignoring native end at {:.3}s", self.virtual_time);
        }
    }
}

/// Counts a seek waiting for the seek lock
struct QueuedSeek<'a>(&'a AtomicUsize);

impl<'a> QueuedSeek<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for QueuedSeek<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Clears the in-flight flag even when a seek future is dropped mid-wait
struct SeekInFlight<'a> {
    state: &'a Mutex<SyncState>,
}

impl Drop for SeekInFlight<'_> {
    fn drop(&mut self) {
        self.state.lock().seek_in_flight = false;
    }
}

/// Keeps a real media player in step with the edited program.
///
/// Share it as `Arc<SyncController>` with every component that needs it.
pub struct SyncController {
    config: SyncConfig,
    mapper: Arc<TimelineMapper>,
    clock: Arc<dyn Clock>,
    player: RwLock<Option<Arc<dyn MediaPlayer>>>,
    state: Mutex<SyncState>,
    seek_lock: tokio::sync::Mutex<()>,
    queued_seeks: AtomicUsize,
    events: EventHub,
}

impl SyncController {
    /// Create a controller driven by the monotonic clock
    pub fn new(mapper: Arc<TimelineMapper>, config: SyncConfig) -> Self {
        Self::with_clock(mapper, config, Arc::new(MonotonicClock::new()))
    }

    /// Create a controller driven by a custom clock
    pub fn with_clock(mapper: Arc<TimelineMapper>, config: SyncConfig, clock: Arc<dyn Clock>) -> Self {
        let timeline = mapper.timeline();
        tracing::info!(
            "Sync controller ready: r{} {:.3}s, {} fps",
            timeline.revision(),
            timeline.duration,
            config.frame_rate
        );

        Self {
            state: Mutex::new(SyncState::new(&config, timeline)),
            config,
            mapper,
            clock,
            player: RwLock::new(None),
            seek_lock: tokio::sync::Mutex::new(()),
            queued_seeks: AtomicUsize::new(0),
            events: EventHub::new(),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The timeline mapper this controller reads from
    pub fn mapper(&self) -> &Arc<TimelineMapper> {
        &self.mapper
    }

    // ------------------------------------------------------------------
    // Player attachment
    // ------------------------------------------------------------------

    /// Attach the media player, replacing any previous one
    pub fn attach_player(&self, player: Arc<dyn MediaPlayer>) {
        player.set_playback_rate(self.state.lock().rate);
        *self.player.write() = Some(player);
        tracing::info!("Media player attached");
    }

    /// Detach the media player, pausing playback
    pub fn detach_player(&self) -> Option<Arc<dyn MediaPlayer>> {
        let now = self.clock.now();
        let batch = {
            let mut state = self.state.lock();
            if state.pause_at(now) {
                state.commands.push(PlayerCommand::Pause);
            }
            state.take()
        };

        let previous = self.player.write().take();
        if previous.is_some() {
            tracing::info!("Media player detached");
        }
        self.finish(previous.as_deref(), batch);
        previous
    }

    /// Whether a player is attached
    pub fn has_player(&self) -> bool {
        self.player.read().is_some()
    }

    fn player(&self) -> Option<Arc<dyn MediaPlayer>> {
        self.player.read().clone()
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Start playback from the current virtual time.
    ///
    /// From the end of the program, playback restarts at zero. During a
    /// seek, playback starts from the seek target once it lands. When the
    /// player refuses, the playing flag follows the player's real state;
    /// a request superseded by a newer one is not an error.
    pub fn play(&self) -> Result<()> {
        let player = self.player().ok_or(SyncError::NoPlayerAttached)?;
        let now = self.clock.now();

        let (prepared, batch) = {
            let mut state = self.state.lock();
            state.sync_timeline(&self.mapper);

            let prepared = if state.status.is_playing() {
                None
            } else if state.seek_in_flight {
                // The running seek positions the player and resumes it
                tracing::debug!("Play requested during a seek, starting once it lands");
                state.set_status(PlaybackStatus::Playing);
                let snapshot = state.snapshot();
                state.outbox.push(Notification::Play(snapshot));
                None
            } else {
                if state.status == PlaybackStatus::Completed
                    || state.virtual_time >= state.timeline.duration
                {
                    state.virtual_time = 0.0;
                    state.active_segment = None;
                    state.tracker.reset();
                    state.locator.reset();
                }

                let requested = state.virtual_time;
                let target = state.resolve(requested, &self.mapper);
                state.virtual_time = target.virtual_time;
                state.active_segment = target.segment_id;
                state.pending_jump = Some(PendingJump { at: now, ack: None });
                Some((target, state.epoch))
            };
            (prepared, state.take())
        };
        self.finish(Some(&*player), batch);

        let Some((target, epoch)) = prepared else {
            return Ok(());
        };

        let ack = player.seek(target.real_time);
        self.state.lock().track_ack(ack);
        let result = player.play();
        let playing = result.is_ok() || !player.is_paused();

        let now = now.max(self.clock.now());
        let batch = {
            let mut state = self.state.lock();
            if state.epoch == epoch && playing && !state.status.is_playing() {
                state.reanchor(now);
                state.restart_pacing();
                state.set_status(PlaybackStatus::Playing);
                let snapshot = state.snapshot();
                state.outbox.push(Notification::Play(snapshot));
            }
            state.take()
        };
        self.finish(Some(&*player), batch);

        match result {
            Ok(()) => {
                tracing::info!("Playback started at {:.3}s", target.virtual_time);
                Ok(())
            }
            Err(PlayerError::Superseded) => {
                tracing::debug!("Play request superseded, playing: {}", playing);
                Ok(())
            }
            Err(err) => {
                tracing::warn!("Player rejected play: {}", err);
                Err(err.into())
            }
        }
    }

    /// Freeze the virtual clock and pause the player
    pub fn pause(&self) {
        let now = self.clock.now();
        let batch = {
            let mut state = self.state.lock();
            state.sync_timeline(&self.mapper);
            if state.pause_at(now) {
                state.commands.push(PlayerCommand::Pause);
                tracing::info!("Playback paused at {:.3}s", state.virtual_time);
            }
            state.take()
        };
        self.finish(self.player().as_deref(), batch);
    }

    /// Reset to the beginning and stop.
    ///
    /// Wins over a seek that is still waiting for the player.
    pub fn stop(&self) {
        let batch = {
            let mut state = self.state.lock();
            state.sync_timeline(&self.mapper);
            let changed = state.status != PlaybackStatus::Idle
                || state.virtual_time != 0.0
                || state.seek_in_flight;

            state.epoch += 1;
            state.virtual_time = 0.0;
            state.anchor = Anchor::default();
            state.active_segment = None;
            state.pending_jump = None;
            state.tracker.reset();
            state.locator.reset();
            state.restart_pacing();

            if changed {
                state.set_status(PlaybackStatus::Idle);
                let snapshot = state.snapshot();
                state.outbox.push(Notification::Stop(snapshot));
                state.commands.push(PlayerCommand::Pause);
                if let Some(first) = state.timeline.first_enabled().map(|seg| seg.real_start) {
                    state.commands.push(PlayerCommand::Seek(first));
                }
                tracing::info!("Playback stopped");
            }
            state.take()
        };
        self.finish(self.player().as_deref(), batch);
    }

    /// Pause when playing, play otherwise
    pub fn toggle_playback(&self) -> Result<()> {
        if self.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Change the playback rate; non-positive or non-finite rates are ignored
    pub fn set_playback_rate(&self, rate: f64) {
        if !rate.is_finite() || rate <= 0.0 {
            tracing::warn!("Ignoring invalid playback rate {}", rate);
            return;
        }

        let now = self.clock.now();
        let batch = {
            let mut state = self.state.lock();
            state.advance(now);
            state.reanchor(now);
            state.rate = rate;
            state.commands.push(PlayerCommand::SetRate(rate));
            state.take()
        };
        self.finish(self.player().as_deref(), batch);
    }

    /// Move to a virtual time.
    ///
    /// Seeks run one at a time in submission order. Each one waits for the
    /// player to confirm, but never longer than the configured timeout; an
    /// unconfirmed seek still resolves with `acknowledged: false`.
    pub async fn seek(&self, virtual_time: f64) -> Result<SeekOutcome> {
        if !self.has_player() {
            return Err(SyncError::NoPlayerAttached);
        }

        let queued = QueuedSeek::new(&self.queued_seeks);
        let _permit = self.seek_lock.lock().await;
        drop(queued);

        let player = self.player().ok_or(SyncError::NoPlayerAttached)?;
        let now = self.clock.now();

        let (target, epoch, was_playing, batch) = {
            let mut state = self.state.lock();
            state.sync_timeline(&self.mapper);
            state.advance(now);

            let was_playing = state.status.is_playing();
            let target = state.resolve(virtual_time, &self.mapper);
            state.seek_in_flight = true;
            state.tracker.reset();
            state.restart_pacing();

            state.outbox.push(Notification::Seek(SeekRequest {
                requested: virtual_time,
                virtual_time: target.virtual_time,
                real_time: target.real_time,
            }));
            (target, state.epoch, was_playing, state.take())
        };
        let _in_flight = SeekInFlight { state: &self.state };
        self.finish(Some(&*player), batch);

        tracing::debug!(
            "Seek {:.3}s -> virtual {:.3}s, real {:.3}s",
            virtual_time,
            target.virtual_time,
            target.real_time
        );

        if was_playing {
            player.pause();
        }
        let acknowledged = tokio::time::timeout(self.config.seek_timeout(), player.seek(target.real_time))
            .await
            .is_ok();
        if !acknowledged {
            tracing::warn!(
                "Seek to {:.3}s not acknowledged within {:?}",
                target.real_time,
                self.config.seek_timeout()
            );
        }

        let now = self.clock.now();
        let (outcome, resume, batch) = {
            let mut state = self.state.lock();
            state.seek_in_flight = false;
            state.counters.seeks_completed += 1;
            if !acknowledged {
                state.counters.seek_timeouts += 1;
            }

            let stopped = state.epoch != epoch;
            if !stopped {
                state.virtual_time = target.virtual_time;
                state.active_segment = target.segment_id;
                state.reanchor(now);
                state.pending_jump = None;
                state.restart_pacing();
                if state.status == PlaybackStatus::Completed
                    && target.virtual_time < state.timeline.duration
                {
                    state.set_status(PlaybackStatus::Paused);
                }
            }

            let outcome = SeekOutcome {
                real_time: target.real_time,
                virtual_time: state.virtual_time,
                acknowledged,
            };
            let update = TimeUpdate {
                virtual_time: state.virtual_time,
                duration: state.timeline.duration,
            };
            state.outbox.push(Notification::TimeUpdate(update));
            state.outbox.push(Notification::Seeked(outcome));

            let resume = !stopped && state.status.is_playing();
            (outcome, resume, state.take())
        };
        self.finish(Some(&*player), batch);

        if resume {
            self.resume_after_seek(&*player);
        }
        Ok(outcome)
    }

    fn resume_after_seek(&self, player: &dyn MediaPlayer) {
        let Err(err) = player.play() else {
            return;
        };
        if !player.is_paused() {
            tracing::debug!("Resume after seek reported {}, player is running", err);
            return;
        }

        tracing::warn!("Player did not resume after seek: {}", err);
        let now = self.clock.now();
        let batch = {
            let mut state = self.state.lock();
            state.pause_at(now);
            state.take()
        };
        self.finish(Some(player), batch);
    }

    /// Seek by whole frames from the current position, pausing first
    pub async fn step_frames(&self, frames: i64) -> Result<SeekOutcome> {
        self.pause();
        let target = self.current_time() + frames as f64 * self.config.frame_period();
        self.seek(target).await
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// Run one reconciliation cycle.
    ///
    /// Call from the player's frame-presentation callback, or from a
    /// display loop when the player has none.
    pub fn present_frame(&self) {
        let now = self.clock.now();
        let player = self.player();
        let native = player.as_ref().map(|p| p.current_time());

        let batch = {
            let mut state = self.state.lock();
            state.sync_timeline(&self.mapper);
            state.frame(now, native, &self.config);
            state.take()
        };
        self.finish(player.as_deref(), batch);
    }

    /// Feed a native player notification
    pub fn handle_player_event(&self, event: PlayerEvent) {
        let now = self.clock.now();
        let batch = {
            let mut state = self.state.lock();
            state.sync_timeline(&self.mapper);
            match event {
                PlayerEvent::TimeUpdate(real_time) => {
                    state.reconcile_native(real_time, now, &self.config);
                }
                PlayerEvent::Ended => state.native_ended(now),
                PlayerEvent::Error(message) => {
                    tracing::warn!("Player error: {}", message);
                    state.pause_at(now);
                }
            }
            state.take()
        };
        self.finish(self.player().as_deref(), batch);
    }

    /// Rebuild the timeline from edit state and move the player if needed
    pub fn apply_edit_state(&self, edit: &EditState) -> Result<Arc<VirtualTimeline>> {
        let timeline = self.mapper.initialize(edit)?;
        self.refresh_timeline();
        Ok(timeline)
    }

    /// Pick up whatever timeline the mapper currently publishes
    pub fn refresh_timeline(&self) {
        let now = self.clock.now();
        let batch = {
            let mut state = self.state.lock();
            let changed = state.sync_timeline(&self.mapper);
            if changed && state.status != PlaybackStatus::Idle && !state.seek_in_flight {
                state.advance(now);
                let requested = state.virtual_time;
                let target = state.resolve(requested, &self.mapper);
                state.virtual_time = target.virtual_time;
                state.active_segment = target.segment_id;
                state.reanchor(now);
                state.jump(target.real_time, now);
            }
            state.take()
        };
        self.finish(self.player().as_deref(), batch);
    }

    fn finish(&self, player: Option<&dyn MediaPlayer>, batch: Batch) {
        self.run(player, batch.commands);
        self.dispatch(batch.notifications);
    }

    fn run(&self, player: Option<&dyn MediaPlayer>, commands: Vec<PlayerCommand>) {
        let Some(player) = player else {
            if !commands.is_empty() {
                tracing::trace!("No player, dropped {} commands", commands.len());
            }
            return;
        };

        let mut last_ack = None;
        for command in commands {
            match command {
                PlayerCommand::Seek(real_time) => last_ack = Some(player.seek(real_time)),
                PlayerCommand::Pause => player.pause(),
                PlayerCommand::SetRate(rate) => player.set_playback_rate(rate),
            }
        }

        if let Some(ack) = last_ack {
            self.state.lock().track_ack(ack);
        }
    }

    fn dispatch(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }

        let spent = self.events.dispatch(notifications);
        if !spent.is_empty() {
            let mut state = self.state.lock();
            for frame in spent {
                state.pool.release(frame);
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Current virtual time
    pub fn current_time(&self) -> f64 {
        let now = self.clock.now();
        self.state.lock().clock_time(now)
    }

    /// Program length of the timeline the controller is playing
    pub fn duration(&self) -> f64 {
        self.state.lock().timeline.duration
    }

    /// Whether the virtual clock is running
    pub fn is_playing(&self) -> bool {
        self.state.lock().status.is_playing()
    }

    /// Playback status
    pub fn playback_status(&self) -> PlaybackStatus {
        self.state.lock().status
    }

    /// Status, time, duration and rate in one read
    pub fn playback_snapshot(&self) -> PlaybackSnapshot {
        let now = self.clock.now();
        let state = self.state.lock();
        PlaybackSnapshot {
            virtual_time: state.clock_time(now),
            ..state.snapshot()
        }
    }

    /// Playback rate
    pub fn playback_rate(&self) -> f64 {
        self.state.lock().rate
    }

    /// Segment resolved on the last processed frame or seek
    pub fn active_segment(&self) -> Option<SegmentId> {
        self.state.lock().active_segment
    }

    /// Get a status string for display
    pub fn status_text(&self) -> String {
        let snapshot = self.playback_snapshot();
        format!(
            "{} - {:.2}s / {:.2}s ({:.2}x)",
            snapshot.status.label(),
            snapshot.virtual_time,
            snapshot.duration,
            snapshot.playback_rate
        )
    }

    /// Diagnostics snapshot
    pub fn stats(&self) -> SyncStats {
        let state = self.state.lock();
        let c = state.counters;
        SyncStats {
            lookups: state.locator.stats(),
            frames_processed: c.frames_processed,
            frames_skipped: c.frames_skipped,
            frames_during_seek: c.frames_during_seek,
            segment_jumps: c.segment_jumps,
            corrective_seeks: c.corrective_seeks,
            gaps_skipped: c.gaps_skipped,
            reconciliations: c.reconciliations,
            seeks_completed: c.seeks_completed,
            seek_timeouts: c.seek_timeouts,
            processing_interval: state.governor.target(),
            queued_seeks: self.queued_seeks.load(Ordering::Acquire),
        }
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Throttled per-frame updates for overlay renderers
    pub fn on_frame(&self, f: impl Fn(&FrameUpdate) + Send + Sync + 'static) -> Subscription {
        self.events.frame.subscribe(f)
    }

    /// Playback started
    pub fn on_play(&self, f: impl Fn(&PlaybackSnapshot) + Send + Sync + 'static) -> Subscription {
        self.events.play.subscribe(f)
    }

    /// Playback paused
    pub fn on_pause(&self, f: impl Fn(&PlaybackSnapshot) + Send + Sync + 'static) -> Subscription {
        self.events.pause.subscribe(f)
    }

    /// Playback stopped
    pub fn on_stop(&self, f: impl Fn(&PlaybackSnapshot) + Send + Sync + 'static) -> Subscription {
        self.events.stop.subscribe(f)
    }

    /// A seek is about to be sent to the player
    pub fn on_seek(&self, f: impl Fn(&SeekRequest) + Send + Sync + 'static) -> Subscription {
        self.events.seek.subscribe(f)
    }

    /// A seek finished
    pub fn on_seeked(&self, f: impl Fn(&SeekOutcome) + Send + Sync + 'static) -> Subscription {
        self.events.seeked.subscribe(f)
    }

    /// Virtual time, on throttled frames and after every seek
    pub fn on_time_update(&self, f: impl Fn(&TimeUpdate) + Send + Sync + 'static) -> Subscription {
        self.events.time_update.subscribe(f)
    }

    /// A new timeline was picked up
    pub fn on_timeline_change(
        &self,
        f: impl Fn(&TimelineChange) + Send + Sync + 'static,
    ) -> Subscription {
        self.events.timeline_change.subscribe(f)
    }

    /// Playback jumped over a gap
    pub fn on_gap_skipped(&self, f: impl Fn(&GapSkipped) + Send + Sync + 'static) -> Subscription {
        self.events.gap_skipped.subscribe(f)
    }

    /// Playback status changed
    pub fn on_playback_state_change(
        &self,
        f: impl Fn(&StateChange) + Send + Sync + 'static,
    ) -> Subscription {
        self.events.state_change.subscribe(f)
    }

    /// Playback reached the end of the program
    pub fn on_complete(&self, f: impl Fn(&Completion) + Send + Sync + 'static) -> Subscription {
        self.events.complete.subscribe(f)
    }

    /// Debounced segment transitions
    pub fn on_segment_transition(
        &self,
        f: impl Fn(&TransitionEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.events.transition.subscribe(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mock::{AckMode, MockPlayer};
    use reelsync_timeline::{ClipEdit, ClipId, PositionClass, RetainedSpan};

    struct Harness {
        controller: Arc<SyncController>,
        player: Arc<MockPlayer>,
        clock: Arc<ManualClock>,
    }

    /// Controller over `(virtual_start, real_start, real_end)` segments
    fn harness_with(spans: &[(f64, f64, f64)], player: MockPlayer) -> Harness {
        let clip = ClipId::new();
        let segments = spans
            .iter()
            .map(|&(v, rs, re)| VirtualSegment::new(clip, v, rs, re))
            .collect();
        let mapper = Arc::new(TimelineMapper::new());
        mapper.publish_segments(segments, vec![clip]).unwrap();

        let clock = Arc::new(ManualClock::new());
        let controller = Arc::new(SyncController::with_clock(
            mapper,
            SyncConfig::default(),
            clock.clone(),
        ));
        let player = Arc::new(player);
        controller.attach_player(player.clone());

        Harness {
            controller,
            player,
            clock,
        }
    }

    fn harness(spans: &[(f64, f64, f64)]) -> Harness {
        harness_with(spans, MockPlayer::new())
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (Arc::clone(&count), count)
    }

    /// A = virtual 0-2s on real 0-2s, B = virtual 2-5s on real 10-13s
    const AB: &[(f64, f64, f64)] = &[(0.0, 0.0, 2.0), (2.0, 10.0, 13.0)];

    #[tokio::test(start_paused = true)]
    async fn test_playback_across_segments_never_replays_removed_footage() {
        let h = harness(AB);
        let transitions = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&transitions);
        let _sub = h.controller.on_segment_transition(move |e| sink.lock().push(e.class));

        h.controller.seek(1.9).await.unwrap();
        h.controller.play().unwrap();
        h.clock.advance_secs(0.2);
        h.controller.present_frame();

        let real = h.player.last_seek().unwrap();
        assert!((real - 10.1).abs() < 1e-6, "player sent to {real}");
        assert!(h.player.seeks().iter().all(|t| !(2.0..10.0).contains(t)));
        assert!(matches!(
            transitions.lock().last(),
            Some(PositionClass::SegmentChanged { .. })
        ));
        assert_eq!(h.controller.stats().segment_jumps, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_virtual_gap_is_skipped() {
        let h = harness(&[(0.0, 0.0, 2.0), (3.0, 10.0, 12.0)]);
        let gaps = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&gaps);
        let _sub = h.controller.on_gap_skipped(move |g| sink.lock().push(*g));

        h.controller.seek(1.9).await.unwrap();
        h.controller.play().unwrap();
        h.clock.advance_secs(0.2);
        h.controller.present_frame();

        let gaps = gaps.lock();
        assert_eq!(gaps.len(), 1);
        assert!((gaps[0].from - 2.1).abs() < 1e-9);
        assert_eq!(gaps[0].to, 3.0);
        assert_eq!(h.player.last_seek(), Some(10.0));
        assert_eq!(h.controller.current_time(), 3.0);

        // Progression continues smoothly from the snapped position
        h.clock.advance_secs(0.5);
        assert!((h.controller.current_time() - 3.5).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_fires_once() {
        let h = harness(AB);
        let (completions, sink) = counter();
        let _sub = h.controller.on_complete(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        h.controller.seek(4.95).await.unwrap();
        h.controller.play().unwrap();
        for _ in 0..5 {
            h.clock.advance_secs(0.1);
            h.controller.present_frame();
        }

        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert!(!h.controller.is_playing());
        assert_eq!(h.controller.playback_status(), PlaybackStatus::Completed);
        assert_eq!(h.controller.current_time(), h.controller.duration());
        assert!(h.player.is_paused());
        assert_eq!(h.player.pauses(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_after_completion_restarts() {
        let h = harness(AB);
        h.controller.seek(4.95).await.unwrap();
        h.controller.play().unwrap();
        h.clock.advance_secs(0.1);
        h.controller.present_frame();
        assert_eq!(h.controller.playback_status(), PlaybackStatus::Completed);

        h.controller.play().unwrap();
        assert!(h.controller.is_playing());
        assert_eq!(h.controller.current_time(), 0.0);
        assert_eq!(h.player.last_seek(), Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_seeks_finish_in_order() {
        let h = harness_with(
            &[(0.0, 0.0, 10.0)],
            MockPlayer::new().with_ack(AckMode::Delayed(Duration::from_millis(50))),
        );
        let order = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&order);
        let _sub = h.controller.on_seeked(move |o| sink.lock().push(o.virtual_time));

        let c = &h.controller;
        let (a, b, d) = tokio::join!(c.seek(5.0), c.seek(1.0), c.seek(8.0));

        assert_eq!(a.unwrap().virtual_time, 5.0);
        assert_eq!(b.unwrap().virtual_time, 1.0);
        assert_eq!(d.unwrap().virtual_time, 8.0);
        assert_eq!(*order.lock(), vec![5.0, 1.0, 8.0]);
        assert_eq!(h.player.seeks(), vec![5.0, 1.0, 8.0]);
        assert_eq!(c.stats().queued_seeks, 0);
        assert_eq!(c.current_time(), 8.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_is_idempotent() {
        let h = harness(AB);
        let first = h.controller.seek(3.3).await.unwrap();
        let second = h.controller.seek(3.3).await.unwrap();

        assert_eq!(first, second);
        assert!((first.real_time - 11.3).abs() < 1e-9);
        assert!(first.acknowledged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_clamps_and_snaps() {
        let h = harness(&[(0.0, 0.0, 2.0), (3.0, 10.0, 12.0)]);

        let past = h.controller.seek(99.0).await.unwrap();
        assert_eq!(past.virtual_time, 5.0);
        assert_eq!(past.real_time, 12.0);

        let before = h.controller.seek(-4.0).await.unwrap();
        assert_eq!(before.virtual_time, 0.0);

        let gap = h.controller.seek(2.5).await.unwrap();
        assert_eq!(gap.virtual_time, 3.0);
        assert_eq!(gap.real_time, 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_seek_resolves_best_effort() {
        let h = harness_with(&[(0.0, 0.0, 10.0)], MockPlayer::new().with_ack(AckMode::Never));

        let outcome = h.controller.seek(4.0).await.unwrap();
        assert!(!outcome.acknowledged);
        assert_eq!(outcome.virtual_time, 4.0);
        assert_eq!(outcome.real_time, 4.0);
        assert_eq!(h.controller.stats().seek_timeouts, 1);

        // The queue is not stalled
        let next = h.controller.seek(6.0).await.unwrap();
        assert_eq!(next.virtual_time, 6.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_player_is_an_error() {
        let mapper = Arc::new(TimelineMapper::new());
        let controller = SyncController::new(mapper, SyncConfig::default());

        assert!(matches!(controller.seek(1.0).await, Err(SyncError::NoPlayerAttached)));
        assert!(matches!(controller.play(), Err(SyncError::NoPlayerAttached)));

        // Pause and stop never fail
        controller.pause();
        controller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_wins_over_inflight_seek() {
        let h = harness_with(
            &[(0.0, 0.0, 10.0)],
            MockPlayer::new().with_ack(AckMode::Delayed(Duration::from_millis(100))),
        );
        let c = &h.controller;

        let (outcome, _) = tokio::join!(c.seek(5.0), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            c.stop();
        });

        assert_eq!(outcome.unwrap().virtual_time, 0.0);
        assert_eq!(c.current_time(), 0.0);
        assert_eq!(c.playback_status(), PlaybackStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_seek_from_start_parks_player() {
        let h = harness_with(
            AB,
            MockPlayer::new().with_ack(AckMode::Delayed(Duration::from_millis(100))),
        );
        let (stops, sink) = counter();
        let _sub = h.controller.on_stop(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        let c = &h.controller;

        let (outcome, _) = tokio::join!(c.seek(3.0), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            c.stop();
        });

        assert_eq!(outcome.unwrap().virtual_time, 0.0);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(h.player.seeks(), vec![11.0, 0.0]);
        assert_eq!(h.player.current_time(), 0.0);
        assert!(h.player.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_during_seek_starts_at_seek_target() {
        let h = harness_with(
            AB,
            MockPlayer::new().with_ack(AckMode::Delayed(Duration::from_millis(100))),
        );
        let c = &h.controller;

        let (outcome, played) = tokio::join!(c.seek(3.0), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            c.play()
        });

        assert!(played.is_ok());
        assert_eq!(outcome.unwrap().real_time, 11.0);
        assert_eq!(h.player.seeks(), vec![11.0]);
        assert!(c.is_playing());
        assert_eq!(h.player.plays(), 1);
        assert!(!h.player.is_paused());

        // Playback continues from the seek target, not the old position
        for _ in 0..25 {
            h.clock.advance(Duration::from_millis(16));
            let expected = 11.0 + (c.current_time() - 3.0);
            h.player.set_position(expected);
            c.present_frame();
        }
        assert!((c.current_time() - 3.4).abs() < 1e-9);
        assert_eq!(c.stats().corrective_seeks, 0);
        assert!(h.player.seeks().iter().all(|&t| t >= 10.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_while_playing_resumes() {
        let h = harness(&[(0.0, 0.0, 10.0)]);
        h.controller.play().unwrap();
        h.controller.seek(4.0).await.unwrap();

        assert!(h.controller.is_playing());
        assert_eq!(h.player.plays(), 2);
        assert!(!h.player.is_paused());

        h.clock.advance_secs(1.0);
        assert!((h.controller.current_time() - 5.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_frames() {
        let h = harness(&[(0.0, 0.0, 10.0)]);
        h.controller.seek(1.0).await.unwrap();

        let outcome = h.controller.step_frames(3).await.unwrap();
        assert!((outcome.virtual_time - 1.1).abs() < 1e-9);

        let back = h.controller.step_frames(-30).await.unwrap();
        assert!((back.virtual_time - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_divergence_correction_threshold() {
        let h = harness(&[(0.0, 20.0, 30.0)]);
        h.controller.play().unwrap();
        assert_eq!(h.player.seeks(), vec![20.0]);

        // Within two frames: leave the player alone
        h.clock.advance_secs(0.6);
        h.player.set_position(20.6 + 0.03);
        h.controller.present_frame();
        assert_eq!(h.player.seeks().len(), 1);

        // Beyond two frames: corrective seek
        h.clock.advance_secs(0.1);
        h.player.set_position(20.7 + 0.2);
        h.controller.present_frame();
        let seeks = h.player.seeks();
        assert_eq!(seeks.len(), 2);
        assert!((seeks[1] - 20.7).abs() < 1e-6);
        assert_eq!(h.controller.stats().corrective_seeks, 1);
    }

    #[test]
    fn test_drift_corrected_on_next_frame() {
        let h = harness(&[(0.0, 20.0, 30.0)]);
        h.controller.play().unwrap();

        h.clock.advance_secs(0.1);
        h.player.set_position(21.5);
        h.controller.present_frame();

        assert_eq!(h.controller.stats().corrective_seeks, 1);
        assert!((h.player.last_seek().unwrap() - 20.1).abs() < 1e-6);
    }

    #[test]
    fn test_no_correction_until_jump_lands() {
        let h = harness_with(&[(0.0, 20.0, 30.0)], MockPlayer::new().with_ack(AckMode::Never));
        h.controller.play().unwrap();

        // Native position is stale while the jump is unconfirmed
        h.clock.advance_secs(0.1);
        h.player.set_position(25.0);
        h.controller.present_frame();
        assert_eq!(h.controller.stats().corrective_seeks, 0);

        // Never confirmed: trusted again after the seek timeout
        h.clock.advance_secs(0.5);
        h.controller.present_frame();
        assert_eq!(h.controller.stats().corrective_seeks, 1);
        assert!((h.player.last_seek().unwrap() - 20.6).abs() < 1e-6);
    }

    #[test]
    fn test_short_segment_gets_drift_correction() {
        let h = harness(&[(0.0, 0.0, 0.3), (0.3, 50.0, 60.0)]);
        h.controller.play().unwrap();

        h.clock.advance_secs(0.1);
        h.player.set_position(7.0);
        h.controller.present_frame();

        assert_eq!(h.controller.stats().corrective_seeks, 1);
        assert!((h.player.last_seek().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_duration_follows_adopted_timeline() {
        let h = harness(&[(0.0, 0.0, 10.0)]);
        h.controller.play().unwrap();
        h.clock.advance_secs(9.0);

        let clip = ClipId::new();
        h.controller
            .mapper()
            .publish_segments(vec![VirtualSegment::new(clip, 0.0, 0.0, 4.0)], vec![clip])
            .unwrap();

        // Not adopted yet: both reads still describe the old timeline
        assert_eq!(h.controller.duration(), 10.0);
        assert!(h.controller.current_time() <= h.controller.duration());

        h.controller.refresh_timeline();
        assert_eq!(h.controller.duration(), 4.0);
        assert_eq!(h.controller.current_time(), h.controller.duration());
    }

    #[test]
    fn test_adaptive_processing_interval() {
        let h = harness(&[(0.0, 0.0, 100.0)]);
        h.controller.play().unwrap();
        let floor = h.controller.config().min_processing_interval();

        for _ in 0..11 {
            h.clock.advance(Duration::from_millis(48));
            h.controller.present_frame();
        }
        assert!(h.controller.stats().processing_interval > floor);

        for _ in 0..200 {
            h.clock.advance(Duration::from_millis(16));
            h.controller.present_frame();
        }
        let stats = h.controller.stats();
        assert_eq!(stats.processing_interval, floor);
        assert!(stats.frames_skipped > 0);
    }

    #[test]
    fn test_throttled_frames_batch_every_sample() {
        let h = harness(&[(0.0, 0.0, 100.0)]);
        let (samples, sink) = counter();
        let (emitted, emit_sink) = counter();
        let _sub = h.controller.on_frame(move |frame| {
            sink.fetch_add(frame.sample_count(), Ordering::SeqCst);
            emit_sink.fetch_add(1, Ordering::SeqCst);
        });

        h.controller.play().unwrap();
        for _ in 0..60 {
            h.clock.advance(Duration::from_millis(16));
            h.controller.present_frame();
        }
        h.controller.pause();

        let processed = h.controller.stats().frames_processed as usize;
        assert_eq!(processed, 60);
        assert_eq!(samples.load(Ordering::SeqCst), processed);
        assert!(emitted.load(Ordering::SeqCst) < processed);
    }

    #[test]
    fn test_native_reports_correct_virtual_clock() {
        let h = harness(&[(0.0, 20.0, 30.0)]);
        h.controller.play().unwrap();
        h.clock.advance_secs(1.0);

        h.controller.handle_player_event(PlayerEvent::TimeUpdate(21.5));
        assert!((h.controller.current_time() - 1.5).abs() < 1e-9);
        assert_eq!(h.controller.stats().reconciliations, 1);

        // Small differences are left alone
        h.controller.handle_player_event(PlayerEvent::TimeUpdate(21.55));
        assert!((h.controller.current_time() - 1.5).abs() < 1e-9);
        assert_eq!(h.controller.stats().reconciliations, 1);
    }

    #[test]
    fn test_native_report_ignored_when_paused() {
        let h = harness(&[(0.0, 20.0, 30.0)]);
        h.controller.handle_player_event(PlayerEvent::TimeUpdate(25.0));
        assert_eq!(h.controller.current_time(), 0.0);
    }

    #[test]
    fn test_player_error_pauses() {
        let h = harness(&[(0.0, 0.0, 10.0)]);
        h.controller.play().unwrap();
        h.controller
            .handle_player_event(PlayerEvent::Error("decoder lost".into()));
        assert_eq!(h.controller.playback_status(), PlaybackStatus::Paused);
    }

    #[test]
    fn test_rejected_play_follows_player_state() {
        let h = harness(&[(0.0, 0.0, 10.0)]);
        h.player.fail_play(PlayerError::Rejected("autoplay blocked".into()));

        let result = h.controller.play();
        assert!(matches!(result, Err(SyncError::Player(PlayerError::Rejected(_)))));
        assert!(!h.controller.is_playing());
        assert_eq!(h.controller.playback_status(), PlaybackStatus::Idle);
    }

    #[test]
    fn test_superseded_play_is_not_an_error() {
        let h = harness(&[(0.0, 0.0, 10.0)]);
        h.player.fail_play(PlayerError::Superseded);

        assert!(h.controller.play().is_ok());
        assert!(!h.controller.is_playing());

        // The newer request did start the player
        h.player.set_paused(false);
        assert!(h.controller.play().is_ok());
        assert!(h.controller.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_subscriber_is_isolated() {
        let h = harness(&[(0.0, 0.0, 10.0)]);
        let (updates, sink) = counter();
        let _bad = h.controller.on_time_update(|_| panic!("overlay bug"));
        let _good = h.controller.on_time_update(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        h.controller.seek(1.0).await.unwrap();
        assert_eq!(updates.load(Ordering::SeqCst), 1);

        h.controller.play().unwrap();
        h.clock.advance_secs(0.1);
        h.controller.present_frame();
        assert_eq!(updates.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_state_notifications() {
        let h = harness(&[(0.0, 0.0, 10.0)]);
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        let _sub = h
            .controller
            .on_playback_state_change(move |c| sink.lock().push(c.to));

        h.controller.play().unwrap();
        h.controller.play().unwrap();
        h.controller.pause();
        h.controller.pause();
        h.controller.stop();
        h.controller.stop();

        assert_eq!(
            *changes.lock(),
            vec![
                PlaybackStatus::Playing,
                PlaybackStatus::Paused,
                PlaybackStatus::Idle
            ]
        );
    }

    #[test]
    fn test_timeline_change_notification() {
        let h = harness(&[(0.0, 0.0, 10.0)]);
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        let _sub = h.controller.on_timeline_change(move |c| sink.lock().push(*c));

        let mut edit = EditState::new();
        edit.push_clip(
            ClipEdit::new("take 2")
                .with_span(RetainedSpan::new(1.0, 3.0))
                .with_span(RetainedSpan::new(5.0, 7.0)),
        );
        h.controller.apply_edit_state(&edit).unwrap();

        let changes = changes.lock();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].revision, 2);
        assert_eq!(changes[0].duration, 4.0);
        assert_eq!(changes[0].segment_count, 2);
        assert_eq!(h.controller.duration(), 4.0);
    }

    #[test]
    fn test_edit_while_paused_moves_player() {
        let h = harness(&[(0.0, 0.0, 10.0)]);
        h.controller.play().unwrap();
        h.clock.advance_secs(6.0);
        h.controller.pause();

        let mut edit = EditState::new();
        edit.push_clip(ClipEdit::new("short").with_span(RetainedSpan::new(20.0, 24.0)));
        h.controller.apply_edit_state(&edit).unwrap();

        assert_eq!(h.controller.current_time(), 4.0);
        assert_eq!(h.player.last_seek(), Some(24.0));
    }

    #[test]
    fn test_playback_rate() {
        let h = harness(&[(0.0, 0.0, 10.0)]);
        h.controller.play().unwrap();
        h.controller.set_playback_rate(2.0);
        h.clock.advance_secs(1.0);

        assert!((h.controller.current_time() - 2.0).abs() < 1e-9);
        assert_eq!(h.player.rate(), 2.0);

        h.controller.set_playback_rate(-1.0);
        assert_eq!(h.controller.playback_rate(), 2.0);
    }

    #[test]
    fn test_status_text() {
        let h = harness(&[(0.0, 0.0, 10.0)]);
        assert_eq!(h.controller.status_text(), "Stopped - 0.00s / 10.00s (1.00x)");
    }
}
