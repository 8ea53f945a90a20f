//! Walk-up song roster: players, their songs and start offsets, batch import
//! of songs from a spreadsheet, and glitch-free offset playback.

pub mod batch;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod import;
pub mod names;
pub mod platform;
pub mod playback;
pub mod registry;
pub mod settings;

pub use batch::ImportCandidate;
pub use context::AppContext;
pub use engine::{EngineState, PlaybackEngine};
pub use error::{EngineError, FetchError, ImportError, RegistryError, StoreError};
pub use fetch::AssetFetcher;
pub use import::{ImportPipeline, ImportSummary};
pub use playback::{PlaybackController, PlaybackStatus};
pub use registry::{PlayerRecord, Registry};
pub use settings::{Settings, SettingsStore};
