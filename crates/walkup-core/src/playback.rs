//! Playback controller: start a track at an offset without an audible blip.
//!
//! For a non-zero offset the engine is muted before playback starts, we wait
//! (bounded) for it to report a loaded state, seek, then restore the volume.
//! The seek is issued even if the wait ran out; some backends accept it
//! anyway and the worst case is hearing the track from the top.
//!
//! Engine failures are logged and swallowed here. They never escape to the
//! caller as errors; the returned [`PlaybackStatus`] says what happened.

use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::engine::{EngineState, PlaybackEngine};
use crate::settings::clamp_volume;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

impl PlaybackStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
        }
    }
}

pub struct PlaybackController<E> {
    engine: E,
    poll_interval: Duration,
    max_poll_attempts: u32,
    volume: u8,
    status: PlaybackStatus,
}

impl<E: PlaybackEngine> PlaybackController<E> {
    pub fn new(engine: E, ctx: &AppContext, volume: u8) -> Self {
        Self {
            engine,
            poll_interval: ctx.poll_interval,
            max_poll_attempts: ctx.max_poll_attempts,
            volume: volume.min(100),
            status: PlaybackStatus::Stopped,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Play `path` from `start_offset_secs` at `volume`.
    pub async fn play(&mut self, path: &Path, start_offset_secs: u32, volume: u8) -> PlaybackStatus {
        if !path.exists() {
            warn!("File missing: {:?}", path);
            return self.status;
        }

        self.volume = volume.min(100);
        let offset = start_offset_secs > 0;

        if let Err(e) = self.engine.stop().await {
            warn!("playback: stop before play failed: {}", e);
        }
        self.status = PlaybackStatus::Stopped;

        let initial = if offset { 0 } else { self.volume };
        if let Err(e) = self.engine.set_volume(initial).await {
            warn!("playback: set_volume({}) failed: {}", initial, e);
        }

        if let Err(e) = self.engine.load(path).await {
            warn!("playback: load {:?} failed: {}", path, e);
            self.restore_volume(offset).await;
            return self.status;
        }
        if let Err(e) = self.engine.play().await {
            warn!("playback: play failed: {}", e);
            self.restore_volume(offset).await;
            return self.status;
        }
        self.status = PlaybackStatus::Playing;

        let ready = self.wait_until_ready().await;

        if offset {
            if !ready {
                debug!(
                    "playback: engine not ready after {} polls, seeking anyway",
                    self.max_poll_attempts
                );
            }
            let millis = u64::from(start_offset_secs) * 1000;
            if let Err(e) = self.engine.seek(millis).await {
                warn!("playback: seek to {}ms failed: {}", millis, e);
            }
            self.restore_volume(true).await;
        }

        info!("Playing {:?} from {}s", path, start_offset_secs);
        self.status
    }

    async fn restore_volume(&mut self, muted: bool) {
        if !muted {
            return;
        }
        if let Err(e) = self.engine.set_volume(self.volume).await {
            warn!("playback: restoring volume {} failed: {}", self.volume, e);
        }
    }

    /// Poll until the engine reports Playing or Paused, up to the ceiling.
    async fn wait_until_ready(&mut self) -> bool {
        for attempt in 0..self.max_poll_attempts {
            match self.engine.state().await {
                Ok(state) if state.is_ready() => {
                    debug!("playback: ready after {} poll(s)", attempt + 1);
                    return true;
                }
                Ok(_) => {}
                Err(e) => debug!("playback: state poll failed: {}", e),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        false
    }

    pub async fn pause(&mut self) {
        match self.engine.pause().await {
            Ok(()) if self.status == PlaybackStatus::Playing => self.status = PlaybackStatus::Paused,
            Ok(()) => {}
            Err(e) => warn!("playback: pause failed: {}", e),
        }
    }

    pub async fn resume(&mut self) {
        match self.engine.play().await {
            Ok(()) if self.status == PlaybackStatus::Paused => self.status = PlaybackStatus::Playing,
            Ok(()) => {}
            Err(e) => warn!("playback: resume failed: {}", e),
        }
    }

    /// Re-read the engine state; a track that ran out reads as Stopped.
    /// On a failed query the last known status is kept.
    pub async fn refresh_status(&mut self) -> PlaybackStatus {
        match self.engine.state().await {
            Ok(EngineState::Stopped) => self.status = PlaybackStatus::Stopped,
            Ok(EngineState::Playing) => self.status = PlaybackStatus::Playing,
            Ok(EngineState::Paused) => self.status = PlaybackStatus::Paused,
            Err(e) => debug!("playback: state query failed: {}", e),
        }
        self.status
    }

    pub async fn toggle_pause(&mut self) {
        match self.refresh_status().await {
            PlaybackStatus::Playing => self.pause().await,
            PlaybackStatus::Paused => self.resume().await,
            PlaybackStatus::Stopped => debug!("playback: nothing to pause"),
        }
    }

    pub async fn stop(&mut self) {
        if let Err(e) = self.engine.stop().await {
            warn!("playback: stop failed: {}", e);
        }
        self.status = PlaybackStatus::Stopped;
    }

    /// Clamp and apply a new volume. Returns the value applied.
    pub async fn set_volume(&mut self, volume: i64) -> u8 {
        self.volume = clamp_volume(volume);
        if let Err(e) = self.engine.set_volume(self.volume).await {
            warn!("playback: set_volume({}) failed: {}", self.volume, e);
        }
        self.volume
    }
}
