use super::output::{Package, item_stem, slugify, titleize};
use super::{Dispatcher, HandlerOutcome, package_images};
use crate::intake::IntakeError;
use crate::intake::queue::extension_of;
use crate::intake::siblings::resolve_siblings;
use crate::services::{is_zip_container, read_package_metadata};
use camino::{Utf8Path, Utf8PathBuf};

/// 3MF or OBJ kept in its native form, with siblings and embedded thumbnails as previews.
pub(super) async fn handle_native(
    dispatcher: &Dispatcher,
    path: &Utf8Path,
) -> Result<HandlerOutcome, IntakeError> {
    let stem = item_stem(path);
    let mut package = Package::new(slugify(stem), titleize(stem))?;

    let ext = extension_of(path);
    let zipped = is_zip_container(path);
    let media_type = match ext.as_deref() {
        Some("obj") if !zipped => "model/obj",
        _ => "model/3mf",
    };

    // A 3MF that arrived without its extension gains it in the output folder only
    if zipped && ext.as_deref() != Some("3mf") {
        package.add_original_as(path, &format!("{stem}.3mf"), media_type);
    } else {
        package.add_original(path, media_type);
    }

    let mut previews: Vec<Utf8PathBuf> = Vec::new();
    if zipped {
        match read_package_metadata(path) {
            Ok(metadata) => {
                if let Some(title) = metadata.title {
                    package.set_title(title);
                }
                package.set_description(metadata.description);
                for (name, bytes) in metadata.thumbnails {
                    let thumbnail = package.work_path(&format!("{}-{}", package.slug(), name));
                    match std::fs::write(&thumbnail, bytes) {
                        Ok(()) => previews.push(thumbnail),
                        Err(e) => tracing::warn!(
                            "Could not extract thumbnail {} from {}: {}",
                            name,
                            path,
                            e
                        ),
                    }
                }
            }
            Err(e) => tracing::warn!("Could not read package metadata from {}: {}", path, e),
        }
    }

    let primary = path.parent().unwrap_or(path);
    let group = resolve_siblings(&[path.to_path_buf()], &dispatcher.sibling_dirs(primary));
    previews.extend(group.images);

    package_images(&mut package, &previews, dispatcher.collaborators.images.as_ref()).await;
    package.finish(dispatcher.output_root(), dispatcher.collaborators.manifests.as_ref(), true)
}
