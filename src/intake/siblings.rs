//! Companion-image association for model files.
//!
//! A candidate image belongs to a model when the two names share a token longer
//! than three characters, or when either base name contains the other. When the
//! whole group finds nothing and the model's own directory holds exactly one
//! image, that image is adopted.

use crate::intake::queue::{self, is_image};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static TOKEN_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_\s.]+").expect("Invalid token separator regex"));

/// Shared tokens must be longer than this to count as a match
const MIN_TOKEN_LEN: usize = 3;

/// A model (or model group) and its associated images
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiblingGroup {
    pub models: Vec<Utf8PathBuf>,
    /// In discovery order; the first one is the preview
    pub images: Vec<Utf8PathBuf>,
    /// True when the single-image fallback supplied the images
    pub by_fallback: bool,
}

impl SiblingGroup {
    pub fn preview(&self) -> Option<&Utf8Path> {
        self.images.first().map(Utf8PathBuf::as_path)
    }
}

/// Lower-cased tokens of a base name.
pub fn tokenize(name: &str) -> HashSet<String> {
    TOKEN_SEPARATORS
        .split(&name.to_lowercase())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Name-based sibling test over base names (no extensions).
pub fn names_match(model_stem: &str, candidate_stem: &str) -> bool {
    let model = model_stem.to_lowercase();
    let candidate = candidate_stem.to_lowercase();
    if model.is_empty() || candidate.is_empty() {
        return false;
    }

    if model.contains(&candidate) || candidate.contains(&model) {
        return true;
    }

    let model_tokens = tokenize(&model);
    tokenize(&candidate)
        .iter()
        .any(|t| t.len() > MIN_TOKEN_LEN && model_tokens.contains(t))
}

/// Resolve the images belonging to `models`.
///
/// `search_dirs` are scanned in order (typically the models' parent, then Staging).
/// The models themselves are never candidates. The fallback applies to the group
/// as a whole: it only fires when no model in the group matched any image.
pub fn resolve_siblings(models: &[Utf8PathBuf], search_dirs: &[&Utf8Path]) -> SiblingGroup {
    let mut group = SiblingGroup {
        models: models.to_vec(),
        ..SiblingGroup::default()
    };

    let excluded: HashSet<&Utf8Path> = models.iter().map(Utf8PathBuf::as_path).collect();
    let stems: Vec<&str> = models.iter().filter_map(|m| m.file_stem()).collect();

    let mut seen_dirs = HashSet::new();
    for dir in search_dirs {
        if !seen_dirs.insert(*dir) {
            continue;
        }
        for candidate in image_candidates(dir, &excluded) {
            let Some(candidate_stem) = candidate.file_stem() else {
                continue;
            };
            if stems.iter().any(|stem| names_match(stem, candidate_stem))
                && !group.images.contains(&candidate)
            {
                tracing::debug!("Sibling {} matched by name", candidate);
                group.images.push(candidate);
            }
        }
    }

    if !group.images.is_empty() {
        return group;
    }

    if let Some(primary) = models.first().and_then(|m| m.parent()) {
        let mut lone = image_candidates(primary, &excluded);
        if lone.len() == 1 {
            tracing::debug!("Adopting {} as the only image beside the model", lone[0]);
            group.images.append(&mut lone);
            group.by_fallback = true;
        }
    }

    group
}

fn image_candidates(dir: &Utf8Path, excluded: &HashSet<&Utf8Path>) -> Vec<Utf8PathBuf> {
    queue::list_visible(dir)
        .unwrap_or_default()
        .into_iter()
        .filter(|p| is_image(p) && p.is_file() && !excluded.contains(p.as_path()))
        .collect()
}
