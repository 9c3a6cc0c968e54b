//! Display-rate driver for a playback session.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use mawsooah_common::clock::RateController;

use crate::session::{PlaybackSession, PlaybackState};

/// A session shared between the frame loop and whoever handles user input.
pub type SharedSession = Arc<Mutex<PlaybackSession>>;

/// Tick `session` at `display_fps` until it stops playing.
///
/// `on_frame` runs after every tick with the session locked, typically to
/// call [`PlaybackSession::render_frame`]. The lock is released between
/// frames so pause and seek can get in. Late frames are skipped rather than
/// bunched up. Returns the state that ended the loop.
pub async fn run_frame_loop<F>(
    session: SharedSession,
    display_fps: u32,
    mut on_frame: F,
) -> PlaybackState
where
    F: FnMut(&PlaybackSession) + Send,
{
    let rate = RateController::new(display_fps);
    let mut interval = tokio::time::interval(rate.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::debug!(display_fps, interval_ns = rate.interval_ns(), "Frame loop started");
    let mut frames: u64 = 0;
    loop {
        interval.tick().await;
        let mut guard = session.lock().await;
        let state = guard.tick();
        on_frame(&guard);
        frames += 1;
        if state != PlaybackState::Playing {
            tracing::debug!(frames, ?state, "Frame loop finished");
            return state;
        }
    }
}
