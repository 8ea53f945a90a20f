//! Import pipeline: batch-sheet rows → downloaded, canonically named songs
//! plus registry entries.
//!
//! Per row, in order: validate → slug → duplicate check → jersey →
//! fetch (snapshot-diff) → move into place → upsert + save. A row that
//! cannot proceed is tallied as skipped or failed and the batch moves on.
//! Rows are processed strictly one at a time; the snapshot-diff detection
//! relies on no other fetch writing into the songs directory concurrently.

use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::batch::ImportCandidate;
use crate::context::AppContext;
use crate::error::{FetchError, ImportError};
use crate::fetch::{self, AssetFetcher};
use crate::names;
use crate::registry::{PlayerRecord, Registry};

/// Aggregate outcome of a batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ImportSummary {
    fn tally(&mut self, outcome: &Result<PlayerRecord, ImportError>) {
        match outcome {
            Ok(_) => self.success += 1,
            Err(e) if e.is_skip() => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

type JerseySource<'a> = Box<dyn FnMut(&ImportCandidate) -> Option<u32> + 'a>;

pub struct ImportPipeline<'a, F> {
    ctx: &'a AppContext,
    fetcher: F,
    /// Asked for a jersey when a row has none.
    jerseys: JerseySource<'a>,
}

impl<'a, F: AssetFetcher> ImportPipeline<'a, F> {
    pub fn new(ctx: &'a AppContext, fetcher: F) -> Self {
        Self {
            ctx,
            fetcher,
            jerseys: Box::new(|_: &ImportCandidate| None),
        }
    }

    /// Supply jerseys for rows that don't carry one (e.g. by prompting).
    pub fn with_jersey_source(
        mut self,
        source: impl FnMut(&ImportCandidate) -> Option<u32> + 'a,
    ) -> Self {
        self.jerseys = Box::new(source);
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Import every row, persisting after each success.
    pub async fn run(
        &mut self,
        rows: &[ImportCandidate],
        registry: &mut Registry,
        overwrite: bool,
    ) -> ImportSummary {
        let mut summary = ImportSummary::default();

        for (idx, row) in rows.iter().enumerate() {
            let outcome = self.import_row(row, registry, overwrite).await;
            match &outcome {
                Ok(record) => info!(
                    "[batch] row {}: saved #{} {} -> {}",
                    idx + 1,
                    record.jersey,
                    record.name,
                    record.file
                ),
                Err(e) if e.is_skip() => {
                    warn!("[batch] row {}: skipping {} ({})", idx + 1, row.display_name().trim(), e)
                }
                Err(e) => error!("[batch] row {}: {} failed: {}", idx + 1, row.display_name(), e),
            }
            summary.tally(&outcome);
        }

        info!(
            "[batch] done: {} imported, {} skipped, {} failed",
            summary.success, summary.skipped, summary.failed
        );
        summary
    }

    pub async fn import_row(
        &mut self,
        row: &ImportCandidate,
        registry: &mut Registry,
        overwrite: bool,
    ) -> Result<PlayerRecord, ImportError> {
        if !row.is_complete() {
            return Err(ImportError::Incomplete);
        }

        let name = row.display_name();
        let slug = names::sanitize(&name);
        let canonical = self.ctx.canonical_path(&slug);
        let canonical_file = file_name(&canonical);

        if !overwrite && (canonical.exists() || registry.find_by_file(&canonical_file).is_some()) {
            return Err(ImportError::Exists {
                file: canonical_file,
            });
        }

        let jersey = match row.jersey {
            Some(j) => j,
            None => self.resolve_jersey(row, registry, overwrite)?,
        };
        if let Some(holder) = registry.conflicting_holder(jersey, &name) {
            return Err(ImportError::Collision {
                jersey,
                holder: holder.name.clone(),
            });
        }

        info!("[batch] Downloading for {} - {} ({})", name, row.song, row.artist);
        let query = fetch::build_query(&[
            row.song.as_str(),
            row.artist.as_str(),
            self.ctx.query_bias.as_str(),
        ]);
        let fetched = self.acquire(&query).await?;
        let file = self.install(&fetched, &slug, overwrite)?;

        let record = PlayerRecord {
            jersey,
            name,
            file,
            start_offset_secs: row.start_offset_secs,
        };
        commit(registry, record)
    }

    fn resolve_jersey(
        &mut self,
        row: &ImportCandidate,
        registry: &Registry,
        overwrite: bool,
    ) -> Result<u32, ImportError> {
        // Re-importing a known player keeps their number.
        if overwrite {
            if let Some(existing) = registry.find_by_name(&row.display_name()) {
                return Ok(existing.jersey);
            }
        }
        (self.jerseys)(row).ok_or(ImportError::NoJersey)
    }

    /// Run one fetch and locate the file it produced.
    pub async fn acquire(&mut self, query: &str) -> Result<PathBuf, ImportError> {
        let dir = &self.ctx.songs_dir;
        let before = fetch::snapshot(dir);

        self.fetcher.fetch(query).await?;

        fetch::detect_output(dir, &before, &self.ctx.audio_ext).ok_or_else(|| {
            ImportError::FetchFailed(FetchError::NoOutput {
                dir: dir.clone(),
                extension: self.ctx.audio_ext.clone(),
            })
        })
    }

    /// Move a fetched file to the slug's path and return its new file name.
    ///
    /// With `overwrite` the canonical path is replaced in place; otherwise a
    /// free `slug_N` variant is chosen when the canonical name is taken.
    pub fn install(&self, fetched: &Path, slug: &str, overwrite: bool) -> Result<String, ImportError> {
        let canonical = self.ctx.canonical_path(slug);
        let target = if overwrite || fetched == canonical {
            canonical
        } else {
            names::allocate(&canonical)
        };

        if fetched != target {
            std::fs::rename(fetched, &target).map_err(|source| ImportError::RenameFailed {
                from: fetched.to_path_buf(),
                to: target.clone(),
                source,
            })?;
            info!("Renamed {:?} -> {:?}", fetched.file_name(), target.file_name());
        }
        Ok(file_name(&target))
    }

    /// Single download: fetch `query` and register it for a named player.
    pub async fn add_one(
        &mut self,
        query: &str,
        name: &str,
        jersey: u32,
        start_offset_secs: u32,
        registry: &mut Registry,
    ) -> Result<PlayerRecord, ImportError> {
        let name = name.trim();
        if name.is_empty() || query.trim().is_empty() {
            return Err(ImportError::Incomplete);
        }
        let slug = names::sanitize(name);
        if let Some(holder) = registry.conflicting_holder(jersey, name) {
            return Err(ImportError::Collision {
                jersey,
                holder: holder.name.clone(),
            });
        }

        let fetched = self.acquire(query).await?;
        let file = self.install(&fetched, &slug, false)?;
        commit(
            registry,
            PlayerRecord {
                jersey,
                name: name.to_string(),
                file,
                start_offset_secs,
            },
        )
    }

    /// Download a new song for an existing player, overwriting their file.
    /// On any failure the current file is left as it was.
    pub async fn replace_song(
        &mut self,
        jersey: u32,
        query: &str,
        registry: &Registry,
    ) -> Result<PlayerRecord, ImportError> {
        let record = registry
            .get(jersey)
            .cloned()
            .ok_or(ImportError::UnknownPlayer(jersey))?;

        let fetched = self.acquire(query).await?;
        let target = self.ctx.song_path(&record.file);
        if fetched != target {
            std::fs::rename(&fetched, &target).map_err(|source| ImportError::RenameFailed {
                from: fetched.clone(),
                to: target.clone(),
                source,
            })?;
        }
        info!("Updated song for #{} ({})", record.jersey, record.file);
        Ok(record)
    }
}

fn commit(registry: &mut Registry, record: PlayerRecord) -> Result<PlayerRecord, ImportError> {
    registry.upsert(record.clone())?;
    registry.save()?;
    Ok(record)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
