use async_trait::async_trait;
use std::path::Path;

use crate::error::EngineError;

/// State reported by the native playback backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Playing,
    Paused,
}

impl EngineState {
    /// Media is loaded and a seek will be honoured.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

/// Native audio backend. Every call reports failure explicitly; the
/// controller decides what to do about it.
#[async_trait]
pub trait PlaybackEngine: Send {
    async fn load(&mut self, path: &Path) -> Result<(), EngineError>;
    async fn play(&mut self) -> Result<(), EngineError>;
    async fn pause(&mut self) -> Result<(), EngineError>;
    async fn stop(&mut self) -> Result<(), EngineError>;
    /// `volume` is already clamped to 0..=100.
    async fn set_volume(&mut self, volume: u8) -> Result<(), EngineError>;
    async fn state(&mut self) -> Result<EngineState, EngineError>;
    async fn seek(&mut self, millis: u64) -> Result<(), EngineError>;
}
