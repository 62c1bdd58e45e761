//! Queue-directory helpers shared by the watcher, coordinator and handlers.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;

/// Extensions that mark an item as part of a model group
pub const MODEL_EXTENSIONS: &[&str] = &["stl", "3mf", "obj", "zip", "rar", "7z"];

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Lower-cased extension, if any.
pub fn extension_of(path: &Utf8Path) -> Option<String> {
    path.extension().map(str::to_ascii_lowercase)
}

pub fn has_extension(path: &Utf8Path, set: &[&str]) -> bool {
    extension_of(path).is_some_and(|ext| set.contains(&ext.as_str()))
}

pub fn is_image(path: &Utf8Path) -> bool {
    has_extension(path, IMAGE_EXTENSIONS)
}

/// Dot-prefixed names are never queued.
pub fn is_hidden(path: &Utf8Path) -> bool {
    path.file_name().is_some_and(|name| name.starts_with('.'))
}

/// Directories and model/archive files.
pub fn is_model(path: &Utf8Path) -> bool {
    path.is_dir() || has_extension(path, MODEL_EXTENSIONS)
}

/// Ordering key: directories, then model/archive files, then the rest.
pub fn kind_priority(path: &Utf8Path) -> u8 {
    if path.is_dir() {
        0
    } else if has_extension(path, MODEL_EXTENSIONS) {
        1
    } else {
        2
    }
}

/// Stable sort by [`kind_priority`], then by name.
pub fn sort_by_priority(paths: &mut [Utf8PathBuf]) {
    paths.sort_by_cached_key(|p| (kind_priority(p), p.file_name().unwrap_or_default().to_string()));
}

/// Visible top-level entries of `dir`, sorted by name.
///
/// Non-UTF-8 names are skipped.
pub fn list_visible(dir: &Utf8Path) -> io::Result<Vec<Utf8PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(path) = Utf8PathBuf::try_from(entry.path()) else {
            tracing::debug!("Skipping non-UTF-8 entry {:?}", entry.path());
            continue;
        };
        if !is_hidden(&path) {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

/// True when `dir` holds no visible entries (or cannot be read).
pub fn is_empty_visible(dir: &Utf8Path) -> bool {
    list_visible(dir).map(|entries| entries.is_empty()).unwrap_or(true)
}

/// A destination in `dir` for `name` that does not exist yet.
///
/// Collisions get a ` (n)` suffix before the extension: `cube.stl`, `cube (1).stl`.
pub fn unique_destination(dir: &Utf8Path, name: &str) -> Utf8PathBuf {
    let candidate = dir.join(name);
    if !exists(&candidate) {
        return candidate;
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };

    (1..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
            None => dir.join(format!("{stem} ({n})")),
        })
        .find(|p| !exists(p))
        .unwrap_or(candidate)
}

/// Existence without following symlinks.
pub fn exists(path: &Utf8Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Move a file or directory, falling back to copy + remove across filesystems.
pub fn move_path(source: &Utf8Path, destination: &Utf8Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!("Cross-device move of {}, copying instead", source);
            copy_recursively(source, destination)?;
            remove_path(source)
        }
        Err(e) => Err(e),
    }
}

/// Remove a file or directory tree.
pub fn remove_path(path: &Utf8Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn copy_recursively(source: &Utf8Path, destination: &Utf8Path) -> io::Result<()> {
    if !fs::symlink_metadata(source)?.is_dir() {
        fs::copy(source, destination)?;
        return Ok(());
    }

    fs::create_dir_all(destination)?;
    for entry in walkdir::WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = destination.as_std_path().join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
