//! yt-dlp backed [`AssetFetcher`]: search-and-download the best match for a
//! query as audio into the songs directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkup_core::{AppContext, AssetFetcher, FetchError};

pub struct YtDlpFetcher {
    binary: Option<PathBuf>,
    output_dir: PathBuf,
    audio_format: String,
}

impl YtDlpFetcher {
    /// `binary` overrides the lookup beside the executable and on `PATH`.
    pub fn new(ctx: &AppContext, binary: Option<PathBuf>) -> Self {
        Self {
            binary: binary.or_else(walkup_core::platform::find_yt_dlp_binary),
            output_dir: ctx.songs_dir.clone(),
            audio_format: ctx.audio_ext.clone(),
        }
    }

    fn command(&self, binary: &Path, query: &str) -> Command {
        let mut cmd = Command::new(binary);
        cmd.args(download_args(&self.output_dir, &self.audio_format, query))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Argument list for one search-and-extract run.
fn download_args(output_dir: &Path, audio_format: &str, query: &str) -> Vec<String> {
    let template = output_dir.join("%(title)s.%(ext)s");
    vec![
        "--default-search".into(),
        "ytsearch1".into(),
        "--no-playlist".into(),
        "--extract-audio".into(),
        "--audio-format".into(),
        audio_format.into(),
        "--audio-quality".into(),
        "192K".into(),
        "--no-progress".into(),
        "--newline".into(),
        "--no-warnings".into(),
        "-o".into(),
        template.to_string_lossy().into_owned(),
        query.into(),
    ]
}

#[async_trait]
impl AssetFetcher for YtDlpFetcher {
    async fn fetch(&mut self, query: &str) -> Result<(), FetchError> {
        let binary = self
            .binary
            .clone()
            .ok_or_else(|| FetchError::Unavailable("yt-dlp not found".into()))?;

        info!("yt-dlp: searching {:?}", query);
        let mut child = self.command(&binary, query).spawn()?;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("yt-dlp: {}", line);
                }
            });
        }

        // Keep the tail of stderr to report if the run fails.
        let stderr_task = child.stderr.take().map(|stderr| {
            let mut lines = BufReader::new(stderr).lines();
            tokio::spawn(async move {
                let mut last = None;
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("yt-dlp stderr: {}", line);
                    last = Some(line);
                }
                last
            })
        });

        let status = child.wait().await?;
        if !status.success() {
            if let Some(task) = stderr_task {
                if let Ok(Some(line)) = task.await {
                    warn!("yt-dlp: {}", line);
                }
            }
            return Err(FetchError::ExitStatus(status.code()));
        }
        Ok(())
    }
}
