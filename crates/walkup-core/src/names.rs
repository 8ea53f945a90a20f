//! Canonical file naming: display name → slug, and collision-free paths.

use std::path::{Path, PathBuf};

/// Slug used when a name contains nothing we can keep.
pub const FALLBACK_SLUG: &str = "player";

/// Extensions recognised as playable audio in the songs directory.
pub const AUDIO_EXTS: &[&str] = &["mp3", "m4a", "wav", "flac", "ogg"];

/// Convert a display name into a filesystem-safe slug.
///
/// Whitespace runs and underscores become a single `_`, anything that is not
/// an ASCII lowercase letter or digit after lowercasing is dropped, and
/// separators never lead, trail or repeat. `"Mike O'Brien "` → `"mike_obrien"`.
pub fn sanitize(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;

    for ch in name.chars() {
        if ch.is_whitespace() || ch == '_' {
            pending_sep = true;
            continue;
        }
        for lower in ch.to_lowercase() {
            if !(lower.is_ascii_lowercase() || lower.is_ascii_digit()) {
                continue;
            }
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(lower);
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Return `desired` if nothing exists there, otherwise the first of
/// `stem_1.ext`, `stem_2.ext`, … that is free.
pub fn allocate(desired: &Path) -> PathBuf {
    if !desired.exists() {
        return desired.to_path_buf();
    }

    let stem = desired
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = desired
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1u32..)
        .map(|i| desired.with_file_name(format!("{stem}_{i}{ext}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| desired.to_path_buf())
}

pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// File names of all audio files in `dir`, sorted case-insensitively.
pub fn list_audio_files(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut files: Vec<String> = std::fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && AUDIO_EXTS.iter().any(|ext| has_extension(p, ext)))
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    files.sort_by_key(|name| name.to_lowercase());
    Ok(files)
}
