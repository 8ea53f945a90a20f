//! Player registry: jersey → [`PlayerRecord`], persisted as one JSON document.
//!
//! ## Store format
//!
//! ```json
//! { "7": { "jersey": 7, "name": "Mike O'Brien", "file": "mike_obrien.mp3", "start": 12 } }
//! ```
//!
//! Older stores were a plain list of records; those are still read. Anything
//! else is reported as [`StoreError::CorruptStore`] by [`Registry::read`] and
//! replaced by an empty registry in [`Registry::load`].
//!
//! Every save rewrites the whole document through a sibling temp file and a
//! rename, so an interrupted write leaves the previous save intact.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{RegistryError, StoreError};
use crate::names;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub jersey: u32,
    pub name: String,
    /// File name relative to the songs directory. Only checked at play time.
    pub file: String,
    #[serde(rename = "start", default, deserialize_with = "lenient_start")]
    pub start_offset_secs: u32,
}

impl PlayerRecord {
    pub fn slug(&self) -> String {
        names::sanitize(&self.name)
    }

    /// Whether `name` refers to the player behind this record: the same
    /// trimmed name, or the same slug. The fallback slug never matches.
    pub fn is_named(&self, name: &str) -> bool {
        if self.name.trim() == name.trim() {
            return true;
        }
        let slug = names::sanitize(name);
        slug != names::FALLBACK_SLUG && slug == self.slug()
    }
}

/// Start offsets stored as negative numbers, floats or strings read as a
/// clamped whole second instead of dropping the record.
fn lenient_start<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let raw = Value::deserialize(d)?;
    let secs = match raw {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    Ok(secs.map(|s| s.clamp(0, i64::from(u32::MAX)) as u32).unwrap_or(0))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    path: PathBuf,
    players: BTreeMap<u32, PlayerRecord>,
}

impl Registry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            players: BTreeMap::new(),
        }
    }

    /// Load the registry, falling back to an empty one when the store is
    /// missing or unreadable. Never fails.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::read(&path) {
            Ok(registry) => {
                info!("Loaded {} player(s) from {:?}", registry.len(), path);
                registry
            }
            Err(e) => {
                warn!("Registry unavailable, starting empty: {}", e);
                Self::new(path)
            }
        }
    }

    /// Strict read. A missing file is an empty registry; a malformed one is
    /// an error.
    pub fn read(path: &Path) -> Result<Self, StoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No registry at {:?}", path);
                return Ok(Self::new(path));
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let corrupt = |reason: String| StoreError::CorruptStore {
            path: path.to_path_buf(),
            reason,
        };

        let doc: Value = serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
        let mut registry = Self::new(path);

        match doc {
            Value::Object(entries) => {
                for (key, value) in entries {
                    let Ok(jersey) = key.trim().parse::<u32>() else {
                        warn!("Registry: ignoring non-numeric key {:?}", key);
                        continue;
                    };
                    match serde_json::from_value::<PlayerRecord>(value) {
                        // The key is authoritative over the embedded jersey field.
                        Ok(record) => {
                            registry.players.insert(jersey, PlayerRecord { jersey, ..record });
                        }
                        Err(e) => warn!("Registry: ignoring malformed entry {}: {}", key, e),
                    }
                }
            }
            // legacy list-of-records layout
            Value::Array(items) => {
                for item in items {
                    match serde_json::from_value::<PlayerRecord>(item) {
                        Ok(record) => {
                            registry.players.insert(record.jersey, record);
                        }
                        Err(e) => warn!("Registry: ignoring malformed legacy entry: {}", e),
                    }
                }
            }
            other => {
                return Err(corrupt(format!(
                    "expected an object or a list, found {}",
                    json_kind(&other)
                )))
            }
        }

        Ok(registry)
    }

    /// Rewrite the whole store.
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

        let doc: BTreeMap<String, &PlayerRecord> = self
            .players
            .iter()
            .map(|(jersey, record)| (jersey.to_string(), record))
            .collect();
        let json = serde_json::to_string_pretty(&doc).map_err(|source| StoreError::Encode {
            path: self.path.clone(),
            source,
        })?;

        let tmp = temp_path(&self.path);
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        debug!("Saved {} player(s) to {:?}", self.players.len(), self.path);
        Ok(())
    }

    pub fn get(&self, jersey: u32) -> Option<&PlayerRecord> {
        self.players.get(&jersey)
    }

    /// Records in jersey order.
    pub fn all(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn find_by_file(&self, file: &str) -> Option<&PlayerRecord> {
        self.players.values().find(|p| p.file == file)
    }

    /// First record whose player answers to `name`.
    pub fn find_by_name(&self, name: &str) -> Option<&PlayerRecord> {
        self.players.values().find(|p| p.is_named(name))
    }

    /// The record holding `jersey`, if it belongs to someone other than `name`.
    pub fn conflicting_holder(&self, jersey: u32, name: &str) -> Option<&PlayerRecord> {
        self.players.get(&jersey).filter(|holder| !holder.is_named(name))
    }

    /// Insert `record` at its jersey, replacing the same player's previous
    /// record there. Records under other jerseys are never touched; moving a
    /// player to a new jersey goes through [`Registry::update`].
    ///
    /// Fails with [`RegistryError::KeyCollision`] when the jersey belongs to
    /// someone else, leaving the registry unchanged.
    pub fn upsert(&mut self, record: PlayerRecord) -> Result<(), RegistryError> {
        if let Some(holder) = self.conflicting_holder(record.jersey, &record.name) {
            return Err(RegistryError::KeyCollision {
                jersey: record.jersey,
                holder: holder.name.clone(),
            });
        }
        self.players.insert(record.jersey, record);
        Ok(())
    }

    /// Replace the record stored under `original` with `record`, which may
    /// carry a new jersey, name or file. Used by the edit operations.
    pub fn update(&mut self, original: u32, record: PlayerRecord) -> Result<(), RegistryError> {
        if !self.players.contains_key(&original) {
            return Err(RegistryError::NotFound(original));
        }
        if record.jersey != original {
            if let Some(holder) = self.players.get(&record.jersey) {
                return Err(RegistryError::KeyCollision {
                    jersey: record.jersey,
                    holder: holder.name.clone(),
                });
            }
        }
        self.players.remove(&original);
        self.players.insert(record.jersey, record);
        Ok(())
    }

    pub fn remove(&mut self, jersey: u32) -> Option<PlayerRecord> {
        self.players.remove(&jersey)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(jersey: u32, name: &str, start: u32) -> PlayerRecord {
        PlayerRecord {
            jersey,
            name: name.to_string(),
            file: format!("{}.mp3", names::sanitize(name)),
            start_offset_secs: start,
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("players.json");

        let mut registry = Registry::new(&path);
        registry.upsert(record(7, "Mike O'Brien", 12)).unwrap();
        registry.upsert(record(21, "Ana Ruiz", 0)).unwrap();
        registry.upsert(record(3, "Lee Park", 45)).unwrap();
        registry.save().unwrap();

        let loaded = Registry::load(&path);
        assert_eq!(loaded, registry);
        let order: Vec<u32> = loaded.all().map(|p| p.jersey).collect();
        assert_eq!(order, vec![3, 7, 21]);
        assert!(!dir.path().join("players.json.tmp").exists());
    }

    #[test]
    fn test_store_uses_string_keys_and_short_field_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("players.json");
        let mut registry = Registry::new(&path);
        registry.upsert(record(7, "Mike O'Brien", 12)).unwrap();
        registry.save().unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["7"]["jersey"], 7);
        assert_eq!(raw["7"]["file"], "mike_obrien.mp3");
        assert_eq!(raw["7"]["start"], 12);
    }

    #[test]
    fn test_missing_and_corrupt_store_yield_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("players.json");
        assert!(Registry::load(&path).is_empty());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Registry::read(&path),
            Err(StoreError::CorruptStore { .. })
        ));
        assert!(Registry::load(&path).is_empty());

        std::fs::write(&path, "42").unwrap();
        assert!(Registry::load(&path).is_empty());
    }

    #[test]
    fn test_legacy_list_and_bad_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("players.json");
        std::fs::write(
            &path,
            r#"[{"jersey": 4, "name": "A B", "file": "a_b.mp3"}, {"name": "no jersey"}]"#,
        )
        .unwrap();
        let registry = Registry::load(&path);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(4).unwrap().start_offset_secs, 0);

        std::fs::write(
            &path,
            r#"{"x": {"jersey": 1, "name": "n", "file": "f"}, "9": {"jersey": 2, "name": "C D", "file": "c_d.mp3", "start": 5}, "10": "junk"}"#,
        )
        .unwrap();
        let registry = Registry::load(&path);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(9).unwrap().jersey, 9);
    }

    #[test]
    fn test_upsert_collision_leaves_registry_unchanged() {
        let mut registry = Registry::new("players.json");
        registry.upsert(record(7, "Mike O'Brien", 0)).unwrap();
        registry.upsert(record(21, "Ana Ruiz", 0)).unwrap();
        let before = registry.clone();

        // Mike moving onto Ana's jersey
        let err = registry.upsert(record(21, "Mike O'Brien", 0)).unwrap_err();
        assert!(matches!(err, RegistryError::KeyCollision { jersey: 21, .. }));
        assert_eq!(registry, before);
    }

    #[test]
    fn test_upsert_keeps_namesakes_under_other_jerseys() {
        let mut registry = Registry::new("players.json");
        registry.upsert(record(5, "Chris Smith", 0)).unwrap();
        registry.upsert(record(12, "Chris Smith", 8)).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(5).unwrap().start_offset_secs, 0);
        assert_eq!(registry.get(12).unwrap().start_offset_secs, 8);

        // same player at the same jersey replaces in place
        registry.upsert(record(12, "chris  smith", 20)).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(12).unwrap().start_offset_secs, 20);
    }

    #[test]
    fn test_fallback_slug_is_not_an_identity() {
        let mut registry = Registry::new("players.json");
        registry.upsert(record(1, "李明", 0)).unwrap();
        registry.upsert(record(2, "王伟", 0)).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(1).unwrap().name, "李明");

        assert_eq!(registry.conflicting_holder(1, "王伟").unwrap().name, "李明");
        assert!(registry.conflicting_holder(1, "李明").is_none());
        let err = registry.upsert(record(1, "王伟", 0)).unwrap_err();
        assert!(matches!(err, RegistryError::KeyCollision { jersey: 1, .. }));
        assert_eq!(registry.get(1).unwrap().name, "李明");
        assert!(registry.find_by_name("张伟").is_none());
    }

    #[test]
    fn test_failed_save_keeps_previous_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("players.json");
        let mut registry = Registry::new(&path);
        registry.upsert(record(7, "Mike O'Brien", 12)).unwrap();
        registry.save().unwrap();
        let first = Registry::read(&path).unwrap();

        // a directory squatting on the temp name makes the write fail
        std::fs::create_dir(dir.path().join("players.json.tmp")).unwrap();
        registry.upsert(record(21, "Ana Ruiz", 0)).unwrap();
        assert!(matches!(registry.save(), Err(StoreError::Io { .. })));

        assert_eq!(Registry::read(&path).unwrap(), first);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_negative_or_odd_start_is_clamped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("players.json");
        std::fs::write(
            &path,
            r#"{"3": {"jersey": 3, "name": "Lee Park", "file": "lee_park.mp3", "start": -5},
                "4": {"jersey": 4, "name": "A B", "file": "a_b.mp3", "start": "12"},
                "5": {"jersey": 5, "name": "C D", "file": "c_d.mp3", "start": 7.6}}"#,
        )
        .unwrap();
        let registry = Registry::read(&path).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(3).unwrap().start_offset_secs, 0);
        assert_eq!(registry.get(4).unwrap().start_offset_secs, 12);
        assert_eq!(registry.get(5).unwrap().start_offset_secs, 8);
    }

    #[test]
    fn test_update_renumber_and_rename() {
        let mut registry = Registry::new("players.json");
        registry.upsert(record(7, "Mike O'Brien", 0)).unwrap();
        registry.upsert(record(21, "Ana Ruiz", 0)).unwrap();

        let mut moved = registry.get(7).unwrap().clone();
        moved.jersey = 21;
        assert!(matches!(
            registry.update(7, moved.clone()),
            Err(RegistryError::KeyCollision { jersey: 21, .. })
        ));

        moved.jersey = 9;
        moved.name = "Michael O'Brien".to_string();
        registry.update(7, moved).unwrap();
        assert!(registry.get(7).is_none());
        assert_eq!(registry.get(9).unwrap().name, "Michael O'Brien");

        assert!(matches!(
            registry.update(99, record(99, "X", 0)),
            Err(RegistryError::NotFound(99))
        ));
        assert!(registry.remove(9).is_some());
        assert_eq!(registry.len(), 1);
    }
}
