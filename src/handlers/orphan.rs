use super::output::{Package, item_stem, slugify, titleize};
use super::{Dispatcher, HandlerOutcome};
use crate::intake::IntakeError;
use crate::services::media_type_for;
use camino::Utf8Path;

/// Loose file with no model: relocated unchanged, no manifest.
pub(super) fn handle_orphan(
    dispatcher: &Dispatcher,
    path: &Utf8Path,
) -> Result<HandlerOutcome, IntakeError> {
    let stem = item_stem(path);
    let mut package = Package::new(slugify(stem), titleize(stem))?;
    package.add_original(path, media_type_for(path.as_str()));
    package.finish(dispatcher.output_root(), dispatcher.collaborators.manifests.as_ref(), false)
}
