/// mpv-backed [`PlaybackEngine`] over mpv's JSON IPC.
///
/// Architecture:
///
/// ```text
///   MpvEngine (lazy: first load spawns mpv)
///         │
///         ├── writer_task   ← receives PendingRequest via mpsc, serialises → socket
///         └── reader_task   ← reads JSON lines from socket
///                                ├── response (has request_id) → matched oneshot::Sender
///                                └── event                    → debug log
/// ```
///
/// `load` parks mpv paused so that `play` is the call that actually starts
/// audio; that keeps the mute-then-start sequence of the controller honest.
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use walkup_core::{EngineError, EngineState, PlaybackEngine};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

type Reply = Result<Value, EngineError>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<Reply>,
}

// ── handle ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    async fn send(&self, command: Value) -> Reply {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg).map_err(|e| EngineError::Command(e.to_string()))?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::Unavailable("mpv writer task gone".into()))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| EngineError::Unavailable(format!("mpv IPC timeout for req={}", req_id)))?
            .map_err(|_| EngineError::Unavailable(format!("mpv reply dropped req={}", req_id)))?
    }

    async fn set_property(&self, name: &str, value: Value) -> Result<(), EngineError> {
        self.send(json!(["set_property", name, value])).await?;
        Ok(())
    }

    async fn get_property(&self, name: &str) -> Reply {
        let resp = self.send(json!(["get_property", name])).await?;
        Ok(resp.get("data").cloned().unwrap_or(Value::Null))
    }
}

// ── engine ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process and the IPC connection to it.
pub struct MpvEngine {
    socket_name: String,
    process: Option<tokio::process::Child>,
    handle: Option<MpvHandle>,
    /// Applied as `--volume` when mpv is (re)spawned.
    last_volume: u8,
}

impl MpvEngine {
    pub fn new(volume: u8) -> Self {
        Self {
            socket_name: walkup_core::platform::mpv_socket_name(),
            process: None,
            handle: None,
            last_volume: volume.min(100),
        }
    }

    fn process_alive(&mut self) -> bool {
        if let Some(ref mut child) = self.process {
            child.try_wait().ok().flatten().is_none()
        } else {
            false
        }
    }

    pub async fn shutdown(&mut self) {
        self.handle = None;
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    /// Connected handle, spawning mpv if it is not running.
    async fn connect(&mut self) -> Result<MpvHandle, EngineError> {
        if let Some(handle) = self.handle.clone() {
            if self.process_alive() {
                return Ok(handle);
            }
            warn!("mpv: process gone, respawning");
        }
        let handle = self.spawn_and_connect().await?;
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    fn spawn_process(&mut self) -> Result<(), EngineError> {
        let mpv_binary = walkup_core::platform::find_mpv_binary()
            .ok_or_else(|| EngineError::Unavailable("mpv binary not found".into()))?;

        info!("mpv: spawning {:?}", mpv_binary);
        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg("--really-quiet")
            .arg(walkup_core::platform::mpv_socket_arg())
            .arg(format!("--volume={}", self.last_volume))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.process = Some(child);
        Ok(())
    }

    #[cfg(unix)]
    async fn spawn_and_connect(&mut self) -> Result<MpvHandle, EngineError> {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        self.spawn_process()?;

        // Wait for socket to appear
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            return Err(EngineError::Unavailable("mpv IPC socket did not appear".into()));
        }

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(BufReader::new(read_half), write_half))
    }

    #[cfg(windows)]
    async fn spawn_and_connect(&mut self) -> Result<MpvHandle, EngineError> {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }

        self.spawn_process()?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(BufReader::new(read_half), write_half));
            }
        }
        Err(EngineError::Unavailable("mpv named pipe did not appear".into()))
    }
}

#[async_trait]
impl PlaybackEngine for MpvEngine {
    async fn load(&mut self, path: &Path) -> Result<(), EngineError> {
        let handle = self.connect().await?;
        handle.set_property("pause", json!(true)).await?;
        handle
            .send(json!(["loadfile", path.to_string_lossy(), "replace"]))
            .await?;
        debug!("mpv: loaded {:?}", path);
        Ok(())
    }

    async fn play(&mut self) -> Result<(), EngineError> {
        self.connect().await?.set_property("pause", json!(false)).await
    }

    async fn pause(&mut self) -> Result<(), EngineError> {
        self.connect().await?.set_property("pause", json!(true)).await
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        // Nothing to stop if mpv was never started.
        let Some(handle) = self.handle.clone() else {
            return Ok(());
        };
        handle.send(json!(["stop"])).await?;
        Ok(())
    }

    async fn set_volume(&mut self, volume: u8) -> Result<(), EngineError> {
        self.last_volume = volume.min(100);
        match self.handle.clone() {
            Some(handle) => handle.set_property("volume", json!(self.last_volume)).await,
            None => Ok(()),
        }
    }

    async fn state(&mut self) -> Result<EngineState, EngineError> {
        let Some(handle) = self.handle.clone() else {
            return Ok(EngineState::Stopped);
        };
        if handle.get_property("idle-active").await?.as_bool() == Some(true) {
            return Ok(EngineState::Stopped);
        }
        // time-pos is unavailable until the file is actually loaded
        if handle.get_property("time-pos").await.is_err() {
            return Ok(EngineState::Stopped);
        }
        if handle.get_property("pause").await?.as_bool() == Some(true) {
            Ok(EngineState::Paused)
        } else {
            Ok(EngineState::Playing)
        }
    }

    async fn seek(&mut self, millis: u64) -> Result<(), EngineError> {
        let secs = millis as f64 / 1000.0;
        self.connect()
            .await?
            .set_property("time-pos", json!(secs))
            .await
    }
}

fn start_io_tasks<R, W>(reader: BufReader<R>, writer: W) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // req_id → reply channel. Writer inserts, reader resolves.
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(writer, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(reader, pending));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_all(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let _ = tx.send(response_to_reply(val));
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else if let Some(name) = val.get("event").and_then(|e| e.as_str()) {
                    debug!("mpv event: {}", name);
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_all(&pending, "mpv IPC read error").await;
                break;
            }
        }
    }
}

fn response_to_reply(val: Value) -> Reply {
    match val.get("error").and_then(|e| e.as_str()) {
        Some("success") => Ok(val),
        Some(err) => Err(EngineError::Command(err.to_string())),
        None => Err(EngineError::Command("response without status".into())),
    }
}

async fn fail_all(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(EngineError::Unavailable(reason.to_string())));
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(EngineError::Io(e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_status_mapping() {
        let ok = json!({"request_id": 1, "error": "success", "data": 12.5});
        assert_eq!(response_to_reply(ok).unwrap()["data"], 12.5);

        let unavailable = json!({"request_id": 2, "error": "property unavailable"});
        match response_to_reply(unavailable) {
            Err(EngineError::Command(msg)) => assert_eq!(msg, "property unavailable"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_engine_idle_before_spawn() {
        let mut engine = MpvEngine::new(150);
        assert_eq!(engine.last_volume, 100);
        assert_eq!(engine.state().await.unwrap(), EngineState::Stopped);
        engine.stop().await.unwrap();
        engine.set_volume(40).await.unwrap();
        assert_eq!(engine.last_volume, 40);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_request_response_roundtrip_over_socket() {
        let (client, server) = UnixStream::pair().unwrap();
        let (read_half, write_half) = client.into_split();
        let handle = start_io_tasks(BufReader::new(read_half), write_half);

        // fake mpv: answer every request with the property value 42
        tokio::spawn(async move {
            let (srv_read, mut srv_write) = server.into_split();
            let mut lines = BufReader::new(srv_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let req: Value = serde_json::from_str(&line).unwrap();
                let resp = json!({"request_id": req["request_id"], "error": "success", "data": 42});
                let mut out = resp.to_string();
                out.push('\n');
                srv_write.write_all(out.as_bytes()).await.unwrap();
            }
        });

        assert_eq!(handle.get_property("volume").await.unwrap(), json!(42));
    }
}
