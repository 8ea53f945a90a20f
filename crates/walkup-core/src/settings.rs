//! Small persisted operator settings (`config.json`).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::StoreError;

pub const DEFAULT_VOLUME: u8 = 80;
pub const MAX_VOLUME: u8 = 100;

pub fn clamp_volume(v: i64) -> u8 {
    v.clamp(0, MAX_VOLUME as i64) as u8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_volume", deserialize_with = "lenient_volume")]
    pub volume: u8,
    /// Keys written by other tools are carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            extra: Map::new(),
        }
    }
}

fn default_volume() -> u8 {
    DEFAULT_VOLUME
}

fn lenient_volume<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    let raw = Value::deserialize(d)?;
    Ok(match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .map(clamp_volume)
            .unwrap_or(DEFAULT_VOLUME),
        Value::String(s) => s.trim().parse::<i64>().map(clamp_volume).unwrap_or(DEFAULT_VOLUME),
        _ => DEFAULT_VOLUME,
    })
}

/// JSON-backed settings file.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// Missing or corrupt files yield defaults.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Settings>(&content) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Settings {:?} unreadable, using defaults: {}", path, e);
                    Settings::default()
                }
            },
            Err(e) => {
                debug!("No settings at {:?} ({}), using defaults", path, e);
                Settings::default()
            }
        };
        Self { path, settings }
    }

    pub fn volume(&self) -> u8 {
        self.settings.volume
    }

    /// Clamp, store and persist the volume. Returns the value actually kept.
    pub fn set_volume(&mut self, volume: i64) -> Result<u8, StoreError> {
        self.settings.volume = clamp_volume(volume);
        self.save()?;
        Ok(self.settings.volume)
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.settings).map_err(|source| {
            StoreError::Encode {
                path: self.path.clone(),
                source,
            }
        })?;
        std::fs::write(&self.path, json).map_err(io_err)
    }
}
