// SPDX-License-Identifier: MIT OR Apache-2.0
//! `ReelSync` Preview - headless host for the sync controller
//!
//! Plays an edited program against a simulated player:
//! - Loads an edit state and preview settings from RON files
//! - Drives reconciliation from a fallback display loop
//! - Forwards native position reports from the player
//! - Runs a scripted transport session and waits for completion
//! - Reloads the edit state when its file changes
//!
//! ## Usage
//!
//! `reelsync_preview [settings.ron] [edit.ron]`
//!
//! Without arguments a built-in demo edit is played with default settings.
//! `reelsync_preview --init [settings.ron]` writes the default settings.

mod config;
mod edit_watcher;
mod simulated_player;

use config::{PreviewConfig, Result, ScriptStep};
use edit_watcher::{load_edit_state, EditWatcher};
use reelsync_player::{Subscription, SyncController};
use reelsync_timeline::{ClipEdit, EditState, RetainedSpan, SegmentKind, TimelineMapper};
use simulated_player::SimulatedPlayer;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("reelsync_player=debug,reelsync_preview=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ReelSync Preview v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run() {
        tracing::error!("Preview failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let mut config = match args.next() {
        Some(flag) if flag == "--init" => {
            let path = PathBuf::from(args.next().unwrap_or_else(|| "preview.ron".to_string()));
            PreviewConfig::default().save(&path)?;
            tracing::info!("Wrote default settings to {:?}", path);
            return Ok(());
        }
        Some(path) => PreviewConfig::load(Path::new(&path))?,
        None => PreviewConfig::default(),
    };
    if let Some(edit) = args.next() {
        config.edit_path = Some(PathBuf::from(edit));
    }

    build_runtime()?.block_on(session(config))
}

/// The display loop and native reports share one thread, so player
/// commands reach the player in the order they were queued.
fn build_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

/// Interview with two cuts, a disabled take and a b-roll insert
fn demo_edit() -> EditState {
    let mut edit = EditState::new();
    edit.push_clip(
        ClipEdit::new("interview")
            .with_span(RetainedSpan::new(2.0, 5.5))
            .with_span(RetainedSpan::new(8.0, 9.0).disabled())
            .with_span(RetainedSpan::new(12.0, 15.0).with_kind(SegmentKind::Split)),
    );
    edit.push_clip(
        ClipEdit::new("b-roll").with_span(RetainedSpan::new(40.0, 42.5).with_kind(SegmentKind::Moved)),
    );
    edit
}

/// Frames seen by the overlay subscriber
#[derive(Debug, Default)]
struct OverlayProbe {
    payloads: AtomicU64,
    samples: AtomicU64,
}

async fn session(config: PreviewConfig) -> Result<()> {
    let edit = match &config.edit_path {
        Some(path) => load_edit_state(path)?,
        None => demo_edit(),
    };

    let mapper = Arc::new(TimelineMapper::from_edit_state(&edit)?);
    let controller = Arc::new(SyncController::new(Arc::clone(&mapper), config.sync.clone()));
    let player = Arc::new(SimulatedPlayer::new(config.media_duration, config.seek_latency()));
    controller.attach_player(player.clone());

    let probe = Arc::new(OverlayProbe::default());
    let mut subscriptions = subscribe_logging(&controller, &probe);

    let completed = Arc::new(Notify::new());
    let done = Arc::clone(&completed);
    subscriptions.push(controller.on_complete(move |c| {
        tracing::info!("Program complete at {:.3}s", c.virtual_time);
        done.notify_one();
    }));

    let watcher = match (&config.edit_path, config.watch_edits) {
        (Some(path), true) => {
            let watcher = EditWatcher::new(path, config.watch_debounce())?;
            tracing::debug!("Hot reload enabled for {:?}", watcher.path());
            Some(watcher)
        }
        _ => None,
    };

    let display = tokio::spawn(display_loop(Arc::clone(&controller), config.display_period()));
    let native = tokio::spawn(native_reports(
        Arc::clone(&controller),
        Arc::clone(&player),
        config.native_report_period(),
    ));

    run_script(&controller, &config.script).await?;

    let deadline = tokio::time::sleep(config.session_timeout());
    tokio::pin!(deadline);
    let mut poll = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            _ = completed.notified() => break,
            _ = &mut deadline => {
                tracing::warn!("Session timed out: {}", controller.status_text());
                break;
            }
            _ = poll.tick() => {
                if let Some(edit) = watcher.as_ref().and_then(EditWatcher::poll_reload) {
                    if let Err(e) = controller.apply_edit_state(&edit) {
                        tracing::warn!("Edit rejected: {}", e);
                    }
                }
            }
        }
    }

    display.abort();
    native.abort();

    report(&controller, &probe);
    match mapper.timeline().to_render_manifest().to_json() {
        Ok(json) => tracing::debug!("Render manifest:\n{}", json),
        Err(e) => tracing::warn!("Could not build render manifest: {}", e),
    }

    for subscription in subscriptions {
        subscription.unsubscribe();
    }
    Ok(())
}

fn subscribe_logging(controller: &SyncController, probe: &Arc<OverlayProbe>) -> Vec<Subscription> {
    let overlay = Arc::clone(probe);
    vec![
        controller.on_frame(move |frame| {
            overlay.payloads.fetch_add(1, Ordering::Relaxed);
            overlay
                .samples
                .fetch_add(frame.sample_count() as u64, Ordering::Relaxed);
            tracing::trace!("Overlay at {:.3}s", frame.virtual_time);
        }),
        controller.on_play(|s| tracing::info!("Play at {:.3}s", s.virtual_time)),
        controller.on_pause(|s| tracing::info!("Pause at {:.3}s", s.virtual_time)),
        controller.on_stop(|_| tracing::info!("Stop")),
        controller.on_seek(|r| {
            tracing::debug!("Seek {:.3}s -> {:.3}s", r.requested, r.virtual_time);
        }),
        controller.on_seeked(|o| {
            tracing::info!(
                "Seeked to {:.3}s (real {:.3}s, acknowledged: {})",
                o.virtual_time,
                o.real_time,
                o.acknowledged
            );
        }),
        controller.on_time_update(|u| tracing::trace!("Time {:.3}s / {:.3}s", u.virtual_time, u.duration)),
        controller.on_timeline_change(|c| {
            tracing::info!(
                "Timeline r{}: {} segments, {:.3}s",
                c.revision,
                c.segment_count,
                c.duration
            );
        }),
        controller.on_gap_skipped(|g| {
            tracing::info!("Gap skipped {:.3}s -> {:.3}s", g.from, g.to);
        }),
        controller.on_playback_state_change(|c| {
            tracing::debug!("{} -> {}", c.from.label(), c.to.label());
        }),
        controller.on_segment_transition(|e| {
            tracing::debug!("Transition {:?} at {:.3}s", e.class, e.virtual_time);
        }),
    ]
}

async fn run_script(controller: &SyncController, script: &[ScriptStep]) -> Result<()> {
    for step in script {
        match step {
            ScriptStep::Play => controller.play()?,
            ScriptStep::Pause => controller.pause(),
            ScriptStep::Seek(time) => {
                controller.seek(*time).await?;
            }
            ScriptStep::Step(frames) => {
                controller.step_frames(*frames).await?;
            }
            ScriptStep::Rate(rate) => controller.set_playback_rate(*rate),
            ScriptStep::Wait(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
        }
        tracing::info!("{:?}: {}", step, controller.status_text());
    }
    Ok(())
}

async fn display_loop(controller: Arc<SyncController>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        controller.present_frame();
    }
}

async fn native_reports(controller: Arc<SyncController>, player: Arc<SimulatedPlayer>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Some(event) = player.poll_event() {
            controller.handle_player_event(event);
        }
    }
}

fn report(controller: &SyncController, probe: &OverlayProbe) {
    let stats = controller.stats();
    tracing::info!(
        "Frames: {} processed, {} skipped, {} during seeks",
        stats.frames_processed,
        stats.frames_skipped,
        stats.frames_during_seek
    );
    tracing::info!(
        "Player: {} segment jumps, {} corrective seeks, {} gaps skipped, {} clock corrections",
        stats.segment_jumps,
        stats.corrective_seeks,
        stats.gaps_skipped,
        stats.reconciliations
    );
    tracing::info!(
        "Lookups: {} neighbor, {} cached, {} indexed, {} misses",
        stats.lookups.neighbor_hits,
        stats.lookups.cache_hits,
        stats.lookups.index_hits,
        stats.lookups.misses
    );
    tracing::info!(
        "Overlay: {} payloads for {} samples, interval {:?}",
        probe.payloads.load(Ordering::Relaxed),
        probe.samples.load(Ordering::Relaxed),
        stats.processing_interval
    );
}
