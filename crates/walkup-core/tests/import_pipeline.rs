//! End-to-end batch import against stub fetchers in a temp songs directory.

use async_trait::async_trait;
use std::path::PathBuf;
use tempfile::TempDir;
use walkup_core::batch::parse_candidates;
use walkup_core::{
    AppContext, AssetFetcher, FetchError, ImportError, ImportPipeline, ImportSummary,
    PlayerRecord, Registry,
};

/// Writes a freshly named mp3 into the songs dir on every call.
struct WritingFetcher {
    dir: PathBuf,
    queries: Vec<String>,
}

impl WritingFetcher {
    fn new(ctx: &AppContext) -> Self {
        Self {
            dir: ctx.songs_dir.clone(),
            queries: Vec::new(),
        }
    }
}

#[async_trait]
impl AssetFetcher for WritingFetcher {
    async fn fetch(&mut self, query: &str) -> Result<(), FetchError> {
        self.queries.push(query.to_string());
        let path = self
            .dir
            .join(format!("Downloaded Track {}.mp3", self.queries.len()));
        std::fs::write(path, query.as_bytes())?;
        Ok(())
    }
}

struct FailingFetcher;

#[async_trait]
impl AssetFetcher for FailingFetcher {
    async fn fetch(&mut self, _query: &str) -> Result<(), FetchError> {
        Err(FetchError::ExitStatus(Some(1)))
    }
}

/// Claims success but never writes anything.
struct SilentFetcher;

#[async_trait]
impl AssetFetcher for SilentFetcher {
    async fn fetch(&mut self, _query: &str) -> Result<(), FetchError> {
        Ok(())
    }
}

fn setup() -> (TempDir, AppContext, Registry) {
    let dir = TempDir::new().unwrap();
    let ctx = AppContext::rooted(dir.path());
    ctx.ensure_dirs().unwrap();
    let registry = Registry::load(&ctx.registry_file);
    (dir, ctx, registry)
}

fn ana(registry: &mut Registry) {
    registry
        .upsert(PlayerRecord {
            jersey: 21,
            name: "Ana Ruiz".into(),
            file: "ana_ruiz.mp3".into(),
            start_offset_secs: 0,
        })
        .unwrap();
    registry.save().unwrap();
}

#[tokio::test]
async fn test_mixed_batch_counts() {
    let (_dir, ctx, mut registry) = setup();
    ana(&mut registry);

    let rows = parse_candidates(
        "First,Last,Song,Artist,StartSeconds,Jersey\n\
         Lee,Park,,Some Band,5,3\n\
         Ana,Ruiz,Seven Nation Army,The White Stripes,0,21\n\
         Mike,O'Brien,Thunderstruck,AC/DC,12,7\n",
    );
    let mut pipeline = ImportPipeline::new(&ctx, WritingFetcher::new(&ctx));
    let summary = pipeline.run(&rows, &mut registry, false).await;

    assert_eq!(
        summary,
        ImportSummary {
            success: 1,
            skipped: 2,
            failed: 0
        }
    );
    assert_eq!(pipeline.fetcher().queries, vec!["Thunderstruck AC/DC audio"]);

    let mike = registry.get(7).unwrap();
    assert_eq!(mike.file, "mike_obrien.mp3");
    assert_eq!(mike.start_offset_secs, 12);
    assert!(ctx.songs_dir.join("mike_obrien.mp3").exists());
    assert!(!ctx.songs_dir.join("Downloaded Track 1.mp3").exists());

    // persisted after the successful row
    let reloaded = Registry::load(&ctx.registry_file);
    assert_eq!(reloaded, registry);
}

#[tokio::test]
async fn test_failed_fetch_leaves_registry_unchanged() {
    let (_dir, ctx, mut registry) = setup();
    let before = registry.clone();

    let rows = parse_candidates("Mike,O'Brien,Thunderstruck,AC/DC,12,7\n");
    let mut pipeline = ImportPipeline::new(&ctx, FailingFetcher);
    let summary = pipeline.run(&rows, &mut registry, false).await;

    assert_eq!(
        summary,
        ImportSummary {
            success: 0,
            skipped: 0,
            failed: 1
        }
    );
    assert_eq!(registry, before);
    assert!(!ctx.registry_file.exists());
}

#[tokio::test]
async fn test_fetch_without_output_is_a_failure() {
    let (_dir, ctx, mut registry) = setup();
    let rows = parse_candidates("Mike,O'Brien,Thunderstruck,AC/DC,0,7\n");
    let mut pipeline = ImportPipeline::new(&ctx, SilentFetcher);

    let err = pipeline
        .import_row(&rows[0], &mut registry, false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ImportError::FetchFailed(FetchError::NoOutput { .. })
    ));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_missing_jersey_uses_source_or_skips() {
    let (_dir, ctx, mut registry) = setup();
    let rows = parse_candidates("Mike,O'Brien,Thunderstruck,AC/DC,0\n");

    let mut pipeline = ImportPipeline::new(&ctx, WritingFetcher::new(&ctx));
    let err = pipeline
        .import_row(&rows[0], &mut registry, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::NoJersey));
    assert!(pipeline.fetcher().queries.is_empty());

    let mut asked = Vec::new();
    let mut pipeline = ImportPipeline::new(&ctx, WritingFetcher::new(&ctx))
        .with_jersey_source(|row| {
            asked.push(row.display_name());
            Some(44)
        });
    let summary = pipeline.run(&rows, &mut registry, false).await;
    drop(pipeline);

    assert_eq!(summary.success, 1);
    assert_eq!(asked, vec!["Mike O'Brien"]);
    assert_eq!(registry.get(44).unwrap().name, "Mike O'Brien");
}

#[tokio::test]
async fn test_jersey_collision_skips_without_fetching() {
    let (_dir, ctx, mut registry) = setup();
    ana(&mut registry);

    let rows = parse_candidates("Mike,O'Brien,Thunderstruck,AC/DC,0,21\n");
    let mut pipeline = ImportPipeline::new(&ctx, WritingFetcher::new(&ctx));
    let err = pipeline
        .import_row(&rows[0], &mut registry, false)
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::Collision { jersey: 21, .. }));
    assert!(err.is_skip());
    assert!(pipeline.fetcher().queries.is_empty());
    assert_eq!(registry.get(21).unwrap().name, "Ana Ruiz");
}

#[tokio::test]
async fn test_existing_file_skipped_unless_overwrite() {
    let (_dir, ctx, mut registry) = setup();
    let canonical = ctx.songs_dir.join("mike_obrien.mp3");
    std::fs::write(&canonical, b"old").unwrap();
    registry
        .upsert(PlayerRecord {
            jersey: 7,
            name: "Mike O'Brien".into(),
            file: "mike_obrien.mp3".into(),
            start_offset_secs: 0,
        })
        .unwrap();

    // no jersey in the sheet: overwrite reuses the registered one
    let rows = parse_candidates("Mike,O'Brien,Thunderstruck,AC/DC,9\n");
    let mut pipeline = ImportPipeline::new(&ctx, WritingFetcher::new(&ctx));

    let skipped = pipeline.run(&rows, &mut registry, false).await;
    assert_eq!(skipped.skipped, 1);
    assert_eq!(std::fs::read(&canonical).unwrap(), b"old");

    let replaced = pipeline.run(&rows, &mut registry, true).await;
    assert_eq!(replaced.success, 1);
    assert_eq!(
        std::fs::read_to_string(&canonical).unwrap(),
        "Thunderstruck AC/DC audio"
    );
    assert!(!ctx.songs_dir.join("mike_obrien_1.mp3").exists());
    let mike = registry.get(7).unwrap();
    assert_eq!(mike.file, "mike_obrien.mp3");
    assert_eq!(mike.start_offset_secs, 9);
}

#[tokio::test]
async fn test_rename_failure_counts_as_failed() {
    let (_dir, ctx, mut registry) = setup();
    // a directory squatting on the canonical name makes the move fail
    let blocker = ctx.songs_dir.join("mike_obrien.mp3");
    std::fs::create_dir(&blocker).unwrap();
    std::fs::write(blocker.join("keep"), b"x").unwrap();

    let rows = parse_candidates("Mike,O'Brien,Thunderstruck,AC/DC,0,7\n");
    let mut pipeline = ImportPipeline::new(&ctx, WritingFetcher::new(&ctx));
    let summary = pipeline.run(&rows, &mut registry, true).await;

    assert_eq!(summary.failed, 1);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_add_one_allocates_free_name() {
    let (_dir, ctx, mut registry) = setup();
    std::fs::write(ctx.songs_dir.join("mike_obrien.mp3"), b"someone else").unwrap();

    let mut pipeline = ImportPipeline::new(&ctx, WritingFetcher::new(&ctx));
    let record = pipeline
        .add_one("Thunderstruck AC/DC", "Mike O'Brien", 7, 15, &mut registry)
        .await
        .unwrap();

    assert_eq!(record.file, "mike_obrien_1.mp3");
    assert_eq!(pipeline.fetcher().queries, vec!["Thunderstruck AC/DC"]);
    assert_eq!(Registry::load(&ctx.registry_file).get(7), Some(&record));
}

#[tokio::test]
async fn test_replace_song_overwrites_in_place() {
    let (_dir, ctx, mut registry) = setup();
    ana(&mut registry);
    let path = ctx.songs_dir.join("ana_ruiz.mp3");
    std::fs::write(&path, b"old").unwrap();

    let mut pipeline = ImportPipeline::new(&ctx, WritingFetcher::new(&ctx));
    pipeline
        .replace_song(21, "Seven Nation Army", &registry)
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "Seven Nation Army");

    let err = pipeline.replace_song(99, "x", &registry).await.unwrap_err();
    assert!(matches!(err, ImportError::UnknownPlayer(99)));

    let mut failing = ImportPipeline::new(&ctx, FailingFetcher);
    assert!(failing.replace_song(21, "y", &registry).await.is_err());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "Seven Nation Army");
}

#[tokio::test]
async fn test_unsluggable_names_still_collide() {
    let (_dir, ctx, mut registry) = setup();
    registry
        .upsert(PlayerRecord {
            jersey: 1,
            name: "李明".into(),
            file: "player.mp3".into(),
            start_offset_secs: 0,
        })
        .unwrap();

    let mut pipeline = ImportPipeline::new(&ctx, WritingFetcher::new(&ctx));
    let err = pipeline
        .add_one("Some Song", "王伟", 1, 0, &mut registry)
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::Collision { jersey: 1, .. }));
    assert!(pipeline.fetcher().queries.is_empty());
    assert_eq!(registry.get(1).unwrap().name, "李明");

    // a free jersey is fine, and the first player stays put
    let record = pipeline
        .add_one("Some Song", "王伟", 2, 0, &mut registry)
        .await
        .unwrap();
    assert_eq!(record.file, "player.mp3");
    assert_eq!(registry.len(), 2);
}
