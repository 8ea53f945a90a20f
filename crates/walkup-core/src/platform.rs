use std::path::PathBuf;

#[cfg(unix)]
pub fn mpv_socket_name() -> String {
    format!("{}/walkup-mpv.sock", std::env::temp_dir().display())
}

#[cfg(windows)]
pub fn mpv_socket_name() -> String {
    "walkup-mpv".to_string()
}

#[cfg(unix)]
pub fn mpv_socket_arg() -> String {
    format!("--input-ipc-server={}", mpv_socket_name())
}

#[cfg(windows)]
pub fn mpv_socket_arg() -> String {
    format!("--input-ipc-server=\\\\.\\pipe\\{}", mpv_socket_name())
}

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/walkup/ (XDG standard)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("walkup")
    }
    #[cfg(windows)]
    {
        // Portable installs keep their data beside the executable
        if let Some(dir) = exe_dir() {
            let portable_data = dir.join("data");
            if portable_data.exists() {
                return portable_data;
            }
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("walkup")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(dir) = exe_dir() {
            if dir.join("config.toml").exists() {
                return dir;
            }
        }
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("walkup")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("walkup")
    }
}

#[cfg(windows)]
fn exe_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    exe.parent().map(|p| p.to_path_buf())
}

#[cfg(unix)]
fn mpv_binary_names() -> &'static [&'static str] {
    &["mpv"]
}

#[cfg(windows)]
fn mpv_binary_names() -> &'static [&'static str] {
    &["mpv.exe", "mpv"]
}

#[cfg(unix)]
fn yt_dlp_binary_names() -> &'static [&'static str] {
    &["yt-dlp", "yt-dlp_linux", "yt-dlp_macos"]
}

#[cfg(windows)]
fn yt_dlp_binary_names() -> &'static [&'static str] {
    &["yt-dlp.exe", "yt-dlp"]
}

fn find_beside_exe(names: &[&str]) -> Option<PathBuf> {
    let current_exe = std::env::current_exe().ok()?;
    let dir = current_exe.parent()?;
    for name in names {
        let p = dir.join(name);
        if p.exists() {
            return Some(p);
        }
        let p = dir.join("external").join(name);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        for name in names {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }
    None
}

/// Find mpv for playback: beside the executable first, then PATH.
pub fn find_mpv_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("MPV_PATH") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }
    find_beside_exe(mpv_binary_names()).or_else(|| find_on_path(mpv_binary_names()))
}

/// Find yt-dlp binary for downloading audio.
///
/// Searches in order:
/// 1. YT_DLP_PATH environment variable
/// 2. Beside current executable
/// 3. PATH
pub fn find_yt_dlp_binary() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("YT_DLP_PATH") {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(p) = find_beside_exe(yt_dlp_binary_names()) {
        return Some(p);
    }

    find_on_path(yt_dlp_binary_names())
}
