//! Line-oriented operator console: type a jersey number to play that
//! player's song, or a single-letter command.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use walkup_core::batch::load_candidates;
use walkup_core::names::list_audio_files;
use walkup_core::{
    AppContext, ImportPipeline, PlaybackController, PlayerRecord, Registry, SettingsStore,
};

use crate::mpv::MpvEngine;
use crate::ytdlp::YtDlpFetcher;

const HELP: &str = "\
  <number>   play that jersey's song
  p          pause / resume
  s          stop
  v NN       set volume (0-100)
  d          download a song for one player
  c          batch import from the CSV (c! overwrites existing songs)
  e <number> edit a player
  r          reload the roster from disk
  l          list audio files
  h          this help
  q          quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(u32),
    TogglePause,
    Stop,
    Volume(i64),
    Download,
    Batch { overwrite: bool },
    Edit(Option<u32>),
    Reload,
    List,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if let Ok(jersey) = line.parse::<u32>() {
        return Command::Play(jersey);
    }

    let mut parts = line.split_whitespace();
    let head = parts.next().unwrap_or_default().to_lowercase();
    let arg = parts.next();

    match (head.as_str(), arg) {
        ("p", None) => Command::TogglePause,
        ("s", None) => Command::Stop,
        ("v", Some(n)) => match n.parse::<i64>() {
            Ok(v) => Command::Volume(v),
            Err(_) => Command::Invalid("Usage: v 80".into()),
        },
        ("v", None) => Command::Invalid("Usage: v 80".into()),
        ("d", None) => Command::Download,
        ("c", None) => Command::Batch { overwrite: false },
        ("c!", None) => Command::Batch { overwrite: true },
        ("e", None) => Command::Edit(None),
        ("e", Some(n)) => match n.parse::<u32>() {
            Ok(j) => Command::Edit(Some(j)),
            Err(_) => Command::Invalid("Usage: e 7".into()),
        },
        ("r", None) => Command::Reload,
        ("l", None) => Command::List,
        ("h", None) | ("?", None) | ("help", None) => Command::Help,
        ("q", None) | ("quit", None) | ("exit", None) => Command::Quit,
        _ => Command::Invalid(format!("Unknown command: {}", line)),
    }
}

/// Roster lines sorted by jersey, flagging players whose song file is gone.
pub fn roster_lines(ctx: &AppContext, registry: &Registry) -> Vec<String> {
    registry
        .all()
        .map(|p| {
            let missing = if ctx.song_path(&p.file).exists() {
                ""
            } else {
                "  (missing)"
            };
            let start = if p.start_offset_secs > 0 {
                format!("  @{}s", p.start_offset_secs)
            } else {
                String::new()
            };
            format!("#{:>3}  {:<24} {}{}{}", p.jersey, p.name, p.file, start, missing)
        })
        .collect()
}

/// Prompted input over any line source.
pub struct Input<R> {
    reader: R,
}

impl<R: BufRead> Input<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Trimmed line, or `None` at end of input.
    pub fn line(&mut self, prompt: &str) -> Option<String> {
        print!("{}", prompt);
        let _ = std::io::stdout().flush();
        let mut buf = String::new();
        match self.reader.read_line(&mut buf) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(buf.trim().to_string()),
        }
    }

    /// Non-negative number; blank input or end of input gives `None`.
    pub fn number(&mut self, prompt: &str) -> Option<u32> {
        loop {
            let answer = self.line(prompt)?;
            if answer.is_empty() {
                return None;
            }
            match answer.parse::<u32>() {
                Ok(n) => return Some(n),
                Err(_) => println!("Enter a whole number, or leave blank to skip."),
            }
        }
    }
}

pub struct Console<R> {
    ctx: AppContext,
    yt_dlp: Option<PathBuf>,
    registry: Registry,
    settings: SettingsStore,
    player: PlaybackController<MpvEngine>,
    input: Input<R>,
}

impl<R: BufRead> Console<R> {
    pub fn new(
        ctx: AppContext,
        yt_dlp: Option<PathBuf>,
        registry: Registry,
        settings: SettingsStore,
        reader: R,
    ) -> Self {
        let volume = settings.volume();
        let player = PlaybackController::new(MpvEngine::new(volume), &ctx, volume);
        Self {
            ctx,
            yt_dlp,
            registry,
            settings,
            player,
            input: Input::new(reader),
        }
    }

    fn fetcher(&self) -> YtDlpFetcher {
        YtDlpFetcher::new(&self.ctx, self.yt_dlp.clone())
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        println!("{} players loaded. Volume {}. Type h for help.", self.registry.len(), self.settings.volume());

        loop {
            let prompt = format!("[{} | vol {}] > ", self.player.status().label(), self.player.volume());
            let Some(line) = self.input.line(&prompt) else {
                break;
            };
            match parse_command(&line) {
                Command::Quit => break,
                Command::Empty => {}
                Command::Invalid(msg) => println!("{}", msg),
                Command::Help => println!("{}", HELP),
                Command::Play(jersey) => self.play(jersey).await,
                Command::TogglePause => self.player.toggle_pause().await,
                Command::Stop => self.player.stop().await,
                Command::Volume(v) => self.set_volume(v).await,
                Command::Download => self.download_one().await,
                Command::Batch { overwrite } => self.batch(overwrite).await,
                Command::Edit(jersey) => self.edit(jersey).await,
                Command::Reload => {
                    self.registry = Registry::load(self.ctx.registry_file.clone());
                    println!("Reloaded {} players.", self.registry.len());
                }
                Command::List => self.list_files(),
            }
        }

        self.player.stop().await;
        self.player.engine_mut().shutdown().await;
        info!("Console closed");
        Ok(())
    }

    async fn play(&mut self, jersey: u32) {
        let Some(record) = self.registry.get(jersey).cloned() else {
            println!("No player with jersey #{}.", jersey);
            return;
        };
        let path = self.ctx.song_path(&record.file);
        if !path.exists() {
            println!("Song file missing for #{} {}: {}", record.jersey, record.name, record.file);
            return;
        }
        let status = self
            .player
            .play(&path, record.start_offset_secs, self.settings.volume())
            .await;
        println!("#{} {}: {} ({})", record.jersey, record.name, record.file, status.label());
    }

    async fn set_volume(&mut self, volume: i64) {
        let applied = self.player.set_volume(volume).await;
        if let Err(e) = self.settings.set_volume(i64::from(applied)) {
            warn!("Could not save volume: {}", e);
        }
        println!("Volume {}", applied);
    }

    async fn download_one(&mut self) {
        let Some(query) = self.input.line("Song search (title and artist): ").filter(|q| !q.is_empty())
        else {
            return;
        };
        let Some(name) = self.input.line("Player name: ").filter(|n| !n.is_empty()) else {
            return;
        };
        let Some(jersey) = self.input.number("Jersey #: ") else {
            return;
        };
        let start = self.input.number("Start at second [0]: ").unwrap_or(0);

        let fetcher = self.fetcher();
        let mut pipeline = ImportPipeline::new(&self.ctx, fetcher);
        match pipeline
            .add_one(&query, &name, jersey, start, &mut self.registry)
            .await
        {
            Ok(record) => println!("Saved #{} {} -> {}", record.jersey, record.name, record.file),
            Err(e) => println!("Download failed ({}): {}", e.label(), e),
        }
    }

    async fn batch(&mut self, overwrite: bool) {
        let rows = match load_candidates(&self.ctx.batch_csv) {
            Ok(rows) => rows,
            Err(e) => {
                println!("Could not read {}: {:#}", self.ctx.batch_csv.display(), e);
                return;
            }
        };
        println!("Importing {} rows from {}", rows.len(), self.ctx.batch_csv.display());

        let fetcher = self.fetcher();
        let input = &mut self.input;
        let mut pipeline = ImportPipeline::new(&self.ctx, fetcher).with_jersey_source(move |row| {
            input.number(&format!("Jersey # for {} (blank to skip): ", row.display_name()))
        });
        let summary = pipeline.run(&rows, &mut self.registry, overwrite).await;
        println!(
            "Batch complete: {} imported, {} skipped, {} failed.",
            summary.success, summary.skipped, summary.failed
        );
    }

    fn list_files(&self) {
        match list_audio_files(&self.ctx.songs_dir) {
            Ok(files) if files.is_empty() => println!("No audio files in {}", self.ctx.songs_dir.display()),
            Ok(files) => {
                for (i, f) in files.iter().enumerate() {
                    println!("{:>3}. {}", i + 1, f);
                }
            }
            Err(e) => println!("Could not list {}: {}", self.ctx.songs_dir.display(), e),
        }
        for line in roster_lines(&self.ctx, &self.registry) {
            println!("{}", line);
        }
    }

    async fn edit(&mut self, jersey: Option<u32>) {
        let Some(jersey) = jersey.or_else(|| self.input.number("Edit jersey #: ")) else {
            return;
        };
        let Some(mut current) = self.registry.get(jersey).cloned() else {
            println!("No player with jersey #{}.", jersey);
            return;
        };

        loop {
            println!(
                "#{} {}  file={}  start={}s\n  1) name  2) jersey  3) start  4) file  5) new song  6) delete  0) done",
                current.jersey, current.name, current.file, current.start_offset_secs
            );
            let Some(choice) = self.input.line("edit> ") else {
                return;
            };
            let mut next = current.clone();
            match choice.as_str() {
                "" | "0" => return,
                "1" => match self.input.line("New name: ").filter(|n| !n.is_empty()) {
                    Some(name) => next.name = name,
                    None => continue,
                },
                "2" => match self.input.number("New jersey #: ") {
                    Some(j) => next.jersey = j,
                    None => continue,
                },
                "3" => match self.input.number("Start at second: ") {
                    Some(s) => next.start_offset_secs = s,
                    None => continue,
                },
                "4" => match self.pick_file() {
                    Some(file) => next.file = file,
                    None => continue,
                },
                "5" => {
                    self.replace_song(&current).await;
                    continue;
                }
                "6" => {
                    self.delete(&current);
                    return;
                }
                other => {
                    println!("Unknown option: {}", other);
                    continue;
                }
            }

            match self.registry.update(current.jersey, next.clone()) {
                Ok(()) => match self.registry.save() {
                    Ok(()) => {
                        info!("Edited #{} -> #{} {}", current.jersey, next.jersey, next.name);
                        current = next;
                    }
                    Err(e) => println!("Could not save roster: {}", e),
                },
                Err(e) => println!("{}", e),
            }
        }
    }

    fn pick_file(&mut self) -> Option<String> {
        let files = list_audio_files(&self.ctx.songs_dir).unwrap_or_default();
        for (i, f) in files.iter().enumerate() {
            println!("{:>3}. {}", i + 1, f);
        }
        let answer = self.input.line("File number or name: ")?;
        if answer.is_empty() {
            return None;
        }
        let chosen = match answer.parse::<usize>() {
            Ok(n) if n >= 1 && n <= files.len() => files[n - 1].clone(),
            _ => answer,
        };
        if self.ctx.song_path(&chosen).is_file() {
            Some(chosen)
        } else {
            println!("No such file: {}", chosen);
            None
        }
    }

    async fn replace_song(&mut self, record: &PlayerRecord) {
        let Some(query) = self.input.line("Song search (title and artist): ").filter(|q| !q.is_empty())
        else {
            return;
        };
        // mpv may hold the file open
        self.player.stop().await;
        let fetcher = self.fetcher();
        let mut pipeline = ImportPipeline::new(&self.ctx, fetcher);
        match pipeline.replace_song(record.jersey, &query, &self.registry).await {
            Ok(r) => println!("Replaced song for #{} {}", r.jersey, r.name),
            Err(e) => println!("Replace failed ({}): {}", e.label(), e),
        }
    }

    fn delete(&mut self, record: &PlayerRecord) {
        let confirm = self
            .input
            .line(&format!("Delete #{} {}? [y/N] ", record.jersey, record.name))
            .unwrap_or_default();
        if !confirm.eq_ignore_ascii_case("y") {
            return;
        }
        self.registry.remove(record.jersey);
        match self.registry.save() {
            Ok(()) => {
                info!("Deleted #{} {}", record.jersey, record.name);
                println!("Deleted #{} {}. The song file was kept.", record.jersey, record.name);
            }
            Err(e) => println!("Could not save roster: {}", e),
        }
    }
}
