use super::output::{Package, item_name, item_stem, slugify, titleize};
use super::{Dispatcher, HandlerOutcome, package_images, package_stl_group};
use crate::intake::IntakeError;
use crate::intake::queue::{self, extension_of, is_image};
use crate::services::media_type_for;
use camino::{Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;

/// Files of a project folder, split by how they are packaged
#[derive(Debug, Default)]
struct ProjectFiles {
    stls: Vec<Utf8PathBuf>,
    natives: Vec<Utf8PathBuf>,
    images: Vec<Utf8PathBuf>,
    attachments: Vec<Utf8PathBuf>,
}

impl ProjectFiles {
    fn collect(root: &Utf8Path) -> Self {
        let mut files = ProjectFiles::default();

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

        for entry in walker.filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.into_path()) else {
                continue;
            };
            match extension_of(&path).as_deref() {
                Some("stl") => files.stls.push(path),
                Some("3mf") | Some("obj") => files.natives.push(path),
                _ if is_image(&path) => files.images.push(path),
                _ => files.attachments.push(path),
            }
        }

        files
    }

    fn has_content(&self) -> bool {
        !(self.stls.is_empty() && self.natives.is_empty() && self.images.is_empty())
    }
}

pub(super) async fn handle_directory(
    dispatcher: &Dispatcher,
    dir: &Utf8Path,
) -> Result<HandlerOutcome, IntakeError> {
    let stem = item_stem(dir);
    let outcome = package_directory(dispatcher, dir, &slugify(stem), &titleize(stem)).await?;

    if queue::exists(dir) {
        if let Err(e) = queue::remove_path(dir) {
            tracing::warn!("Could not remove emptied project folder {}: {}", dir, e);
        }
    }
    Ok(outcome)
}

/// Package every visible file below `root` as one project.
///
/// STLs are converted together, 3MF/OBJ kept native, images converted, and
/// anything else carried along as an attachment.
pub(super) async fn package_directory(
    dispatcher: &Dispatcher,
    root: &Utf8Path,
    slug: &str,
    title: &str,
) -> Result<HandlerOutcome, IntakeError> {
    let files = ProjectFiles::collect(root);
    if !files.has_content() {
        return Err(IntakeError::EmptyProject(item_name(root)));
    }

    tracing::debug!(
        "Project {}: {} stl, {} native, {} image(s), {} attachment(s)",
        slug,
        files.stls.len(),
        files.natives.len(),
        files.images.len(),
        files.attachments.len()
    );

    let mut package = Package::new(slug, title)?;
    let collaborators = &dispatcher.collaborators;

    package_stl_group(&mut package, &files.stls, collaborators.geometry.as_ref()).await;
    for native in &files.natives {
        package.add_original(native, media_type_for(native.as_str()));
    }
    package_images(&mut package, &files.images, collaborators.images.as_ref()).await;
    for attachment in &files.attachments {
        package.add_original(attachment, media_type_for(attachment.as_str()));
    }

    package.finish(dispatcher.output_root(), collaborators.manifests.as_ref(), true)
}
