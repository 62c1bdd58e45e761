use super::output::{Package, item_stem, slugify, titleize};
use super::{Dispatcher, HandlerOutcome, package_images, package_stl_group};
use crate::intake::siblings::resolve_siblings;
use crate::intake::{IntakeError, queue};
use camino::{Utf8Path, Utf8PathBuf};

/// Single STL or an aggregate of the STLs sharing a directory.
///
/// The group is converted into one 3MF; siblings of any member are attached.
pub(super) async fn handle_models(
    dispatcher: &Dispatcher,
    item: &Utf8Path,
    models: &[Utf8PathBuf],
    aggregate: bool,
) -> Result<HandlerOutcome, IntakeError> {
    // Members can be consumed by an earlier dispatch of the same group
    let models: Vec<Utf8PathBuf> = models.iter().filter(|m| queue::exists(m)).cloned().collect();
    let Some(lead) = models.first() else {
        return Err(IntakeError::VanishedInput(item.to_path_buf()));
    };

    let stem = if aggregate { item_stem(lead) } else { item_stem(item) };
    let mut title = titleize(stem);
    if aggregate {
        title.push_str(" (Aggregated)");
    }
    let mut package = Package::new(slugify(stem), title)?;

    let primary = lead.parent().unwrap_or(lead);
    let group = resolve_siblings(&models, &dispatcher.sibling_dirs(primary));
    if !group.images.is_empty() {
        tracing::info!(
            "Attaching {} image(s) to {}{}",
            group.images.len(),
            package.slug(),
            if group.by_fallback { " (single-image fallback)" } else { "" }
        );
    }

    let collaborators = &dispatcher.collaborators;
    package_stl_group(&mut package, &models, collaborators.geometry.as_ref()).await;
    package_images(&mut package, &group.images, collaborators.images.as_ref()).await;

    package.finish(dispatcher.output_root(), collaborators.manifests.as_ref(), true)
}
