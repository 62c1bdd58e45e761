use crate::intake::queue::{self, extension_of, is_hidden};
use crate::services::{is_zip_container, zip_contains};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;

/// Entry that marks a zip container as a 3MF package
const PACKAGE_MODEL_ENTRY: &str = "3D/3dmodel.model";

/// Handling strategy selected for one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerKind {
    /// Compressed container: extract, then treat as a directory project
    Archive,
    DirectoryProject,
    /// 3MF / OBJ kept in its native form
    NativePackage,
    /// Several STL files sharing a parent, converted together
    ModelAggregate(Vec<Utf8PathBuf>),
    SingleModel,
    /// Loose image, relocated without a manifest
    Orphan,
}

impl HandlerKind {
    pub fn label(&self) -> &'static str {
        match self {
            HandlerKind::Archive => "archive",
            HandlerKind::DirectoryProject => "directory-project",
            HandlerKind::NativePackage => "native-package",
            HandlerKind::ModelAggregate(_) => "model-aggregate",
            HandlerKind::SingleModel => "single-model",
            HandlerKind::Orphan => "orphan",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pick a handling strategy for `path` without touching the filesystem.
///
/// `roots` are the queue directories themselves, which are never items.
/// Returns `None` when nothing applies (or the path is gone).
pub fn classify(path: &Utf8Path, roots: &[&Utf8Path]) -> Option<HandlerKind> {
    if roots.contains(&path) || !queue::exists(path) {
        return None;
    }

    if path.is_dir() {
        return Some(HandlerKind::DirectoryProject);
    }

    let ext = extension_of(path);
    match ext.as_deref() {
        Some("stl") => return Some(classify_stl(path)),
        Some("obj") => return Some(HandlerKind::NativePackage),
        // A 3MF is a zip container; anything else wearing the extension is unrecognized
        Some("3mf") if !is_zip_container(path) => return None,
        _ => {}
    }

    if is_zip_container(path) {
        return Some(if zip_contains(path, PACKAGE_MODEL_ENTRY) {
            HandlerKind::NativePackage
        } else {
            HandlerKind::Archive
        });
    }

    match ext.as_deref() {
        // Not a zip, but the extractor decides how to report it
        Some("zip") | Some("rar") | Some("7z") => Some(HandlerKind::Archive),
        _ if queue::is_image(path) => Some(HandlerKind::Orphan),
        _ => None,
    }
}

fn classify_stl(path: &Utf8Path) -> HandlerKind {
    let Some(parent) = path.parent() else {
        return HandlerKind::SingleModel;
    };

    let stls = stl_files_in(parent);
    if stls.len() > 1 {
        HandlerKind::ModelAggregate(stls)
    } else {
        HandlerKind::SingleModel
    }
}

/// Visible STL files directly inside `dir`, sorted by name.
pub fn stl_files_in(dir: &Utf8Path) -> Vec<Utf8PathBuf> {
    queue::list_visible(dir)
        .unwrap_or_default()
        .into_iter()
        .filter(|p| p.is_file() && !is_hidden(p) && extension_of(p).as_deref() == Some("stl"))
        .collect()
}
