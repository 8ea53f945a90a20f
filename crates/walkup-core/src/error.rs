//! Error types shared across the roster, import and playback layers.

use std::path::PathBuf;
use thiserror::Error;

/// Failure reading or writing one of the durable JSON stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not a document we understand.
    #[error("corrupt store {path}: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    #[error("failed to serialise {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("jersey {jersey} is already assigned to {holder}")]
    KeyCollision { jersey: u32, holder: String },

    #[error("no player with jersey {0}")]
    NotFound(u32),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure reported by an [`AssetFetcher`](crate::fetch::AssetFetcher).
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("fetch backend not available: {0}")]
    Unavailable(String),

    #[error("failed to run fetch backend: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("fetch backend exited with status {0:?}")]
    ExitStatus(Option<i32>),

    /// The backend ran but no new file with the target extension appeared.
    #[error("no downloaded .{extension} file found in {dir}")]
    NoOutput { dir: PathBuf, extension: String },
}

/// Failure reported by a [`PlaybackEngine`](crate::engine::PlaybackEngine).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("playback engine not available: {0}")]
    Unavailable(String),

    #[error("playback engine I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("playback engine rejected command: {0}")]
    Command(String),
}

/// Why a single import row did not produce a registry entry.
///
/// The first five variants are skips (the row was never attempted); the rest
/// are failures (an attempt was made and went wrong).
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("incomplete row: first, last and song are required")]
    Incomplete,

    #[error("{file} already exists")]
    Exists { file: String },

    #[error("jersey {jersey} already belongs to {holder}")]
    Collision { jersey: u32, holder: String },

    #[error("no jersey number available")]
    NoJersey,

    #[error("no player with jersey {0}")]
    UnknownPlayer(u32),

    #[error("download failed: {0}")]
    FetchFailed(#[from] FetchError),

    #[error("could not move {from} to {to}: {source}")]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not persist registry: {0}")]
    PersistFailed(#[from] StoreError),
}

impl From<RegistryError> for ImportError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::KeyCollision { jersey, holder } => Self::Collision { jersey, holder },
            RegistryError::NotFound(jersey) => Self::UnknownPlayer(jersey),
            RegistryError::Store(s) => Self::PersistFailed(s),
        }
    }
}

impl ImportError {
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::Incomplete
                | Self::Exists { .. }
                | Self::Collision { .. }
                | Self::NoJersey
                | Self::UnknownPlayer(_)
        )
    }

    /// Short tag used in log lines and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::Exists { .. } => "exists",
            Self::Collision { .. } => "collision",
            Self::NoJersey => "no jersey",
            Self::UnknownPlayer(_) => "unknown player",
            Self::FetchFailed(_) => "download",
            Self::RenameFailed { .. } => "rename",
            Self::PersistFailed(_) => "persist",
        }
    }
}
