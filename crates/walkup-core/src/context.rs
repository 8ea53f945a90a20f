//! Resolved runtime paths and knobs, built once at startup and passed by
//! reference to the import pipeline and the playback controller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct AppContext {
    pub songs_dir: PathBuf,
    pub registry_file: PathBuf,
    pub settings_file: PathBuf,
    pub batch_csv: PathBuf,
    /// Extension (without dot) that fetched assets are expected to have.
    pub audio_ext: String,
    pub query_bias: String,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
}

impl AppContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            songs_dir: config.paths.songs_dir.clone(),
            registry_file: config.paths.registry_file.clone(),
            settings_file: config.paths.settings_file.clone(),
            batch_csv: config.paths.batch_csv.clone(),
            audio_ext: config.fetch.audio_format.trim_start_matches('.').to_lowercase(),
            query_bias: config.fetch.query_bias.clone(),
            poll_interval: config.playback.poll_interval(),
            max_poll_attempts: config.playback.max_poll_attempts,
        }
    }

    /// Context rooted in a single directory; handy for tests and portable runs.
    pub fn rooted(root: &Path) -> Self {
        let mut config = Config::default();
        config.paths.songs_dir = root.join("songs");
        config.paths.registry_file = root.join("players.json");
        config.paths.settings_file = root.join("config.json");
        config.paths.batch_csv = root.join("data").join("batters.csv");
        Self::from_config(&config)
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.songs_dir)?;
        if let Some(parent) = self.registry_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Some(parent) = self.batch_csv.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Absolute path of a file stored in the songs directory.
    pub fn song_path(&self, file: &str) -> PathBuf {
        self.songs_dir.join(file)
    }

    /// Canonical asset path for a slug, e.g. `songs/mike_obrien.mp3`.
    pub fn canonical_path(&self, slug: &str) -> PathBuf {
        self.songs_dir.join(format!("{}.{}", slug, self.audio_ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rooted_context() {
        let ctx = AppContext::rooted(Path::new("/tmp/walkup-test"));
        assert_eq!(ctx.audio_ext, "mp3");
        assert_eq!(ctx.poll_interval, Duration::from_millis(20));
        assert_eq!(
            ctx.canonical_path("mike_obrien"),
            Path::new("/tmp/walkup-test/songs/mike_obrien.mp3")
        );
    }
}
