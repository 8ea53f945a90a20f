mod console;
mod logging;
mod mpv;
mod ytdlp;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use walkup_core::batch::load_candidates;
use walkup_core::config::Config;
use walkup_core::{AppContext, ImportPipeline, Registry, SettingsStore};

use crate::console::Console;
use crate::ytdlp::YtDlpFetcher;

/// Walk-up song manager: play each batter's song from their cue point.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the songs directory from the config
    #[arg(long, value_name = "DIR")]
    songs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Download and register every row of a batch CSV
    Import {
        /// CSV to read instead of the configured one
        csv: Option<PathBuf>,
        /// Replace songs that already exist
        #[arg(long)]
        overwrite: bool,
    },
    /// Print the roster
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_path = logging::init()?;
    info!("Log file: {:?}", log_path);

    if let Err(e) = run(cli).await {
        error!("walkup failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Config loaded from: {:?}", path);
            Config::load_from(path)?
        }
        None => {
            info!("Config loaded from: {:?}", Config::config_path());
            Config::load()?
        }
    };
    if let Some(dir) = cli.songs_dir {
        config.paths.songs_dir = dir;
    }

    let ctx = AppContext::from_config(&config);
    ctx.ensure_dirs()?;
    let registry = Registry::load(ctx.registry_file.clone());
    info!("Loaded {} players from {:?}", registry.len(), ctx.registry_file);

    match cli.command {
        Some(Cmd::Import { csv, overwrite }) => {
            let csv = csv.unwrap_or_else(|| ctx.batch_csv.clone());
            import(&ctx, config.fetch.yt_dlp_path.clone(), registry, &csv, overwrite).await
        }
        Some(Cmd::List) => {
            for line in console::roster_lines(&ctx, &registry) {
                println!("{}", line);
            }
            Ok(())
        }
        None => {
            let settings = SettingsStore::load(ctx.settings_file.clone());
            let stdin = std::io::stdin().lock();
            Console::new(ctx, config.fetch.yt_dlp_path.clone(), registry, settings, stdin)
                .run()
                .await
        }
    }
}

/// Unattended batch import; rows without a jersey are skipped.
async fn import(
    ctx: &AppContext,
    yt_dlp: Option<PathBuf>,
    mut registry: Registry,
    csv: &std::path::Path,
    overwrite: bool,
) -> anyhow::Result<()> {
    let rows = load_candidates(csv)?;
    println!("Importing {} rows from {}", rows.len(), csv.display());

    let mut pipeline = ImportPipeline::new(ctx, YtDlpFetcher::new(ctx, yt_dlp));
    let summary = pipeline.run(&rows, &mut registry, overwrite).await;
    println!(
        "Batch complete: {} imported, {} skipped, {} failed.",
        summary.success, summary.skipped, summary.failed
    );
    Ok(())
}
