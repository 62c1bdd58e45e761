//! Handler strategies, one per [`HandlerKind`].
//!
//! Every strategy follows the same sequence: convert geometry (falling back to the
//! original file), convert preview images (same fallback), write a manifest, move
//! all artifacts into `output/<slug>/`, and only then delete originals that have
//! a converted replacement. A failing manifest or relocation is fatal for the item.

pub mod archive;
pub mod directory;
pub mod model;
pub mod native;
pub mod orphan;
pub mod output;

use crate::intake::{HandlerKind, IntakeError};
use crate::models::Settings;
use crate::services::{
    ArchiveExtractor, BuiltinStlConverter, ChainedGeometryConverter, ConversionOutcome,
    DatapackageWriter, ExternalGeometryConverter, ExternalImageConverter, GeometryConverter,
    ImageConverter, ManifestWriter, STANDARD_IMAGE_EXTENSION, STANDARD_IMAGE_MEDIA_TYPE,
    TokioCommandRunner, ZipExtractor, media_type_for,
};
use camino::{Utf8Path, Utf8PathBuf};
use output::Package;
use std::sync::Arc;

/// External collaborators used by the strategies
#[derive(Clone)]
pub struct Collaborators {
    pub geometry: Arc<dyn GeometryConverter>,
    pub images: Arc<dyn ImageConverter>,
    pub archives: Arc<dyn ArchiveExtractor>,
    pub manifests: Arc<dyn ManifestWriter>,
}

impl Collaborators {
    /// Production wiring: optional external geometry binary ahead of the built-in
    /// STL converter, `cwebp`-style image conversion, zip extraction, datapackage manifests.
    pub fn from_settings(settings: &Settings) -> Self {
        let runner = Arc::new(TokioCommandRunner);
        let timeout = settings.conversion_timeout();

        let mut geometry: Vec<Arc<dyn GeometryConverter>> = Vec::new();
        if let Some(program) = &settings.geometry_command {
            geometry.push(Arc::new(ExternalGeometryConverter::new(
                program.clone(),
                runner.clone(),
                timeout,
            )));
        }
        geometry.push(Arc::new(BuiltinStlConverter));

        Self {
            geometry: Arc::new(ChainedGeometryConverter::new(geometry)),
            images: Arc::new(ExternalImageConverter::new(
                settings.image_command.clone(),
                runner,
                timeout,
            )),
            archives: Arc::new(ZipExtractor::default()),
            manifests: Arc::new(DatapackageWriter),
        }
    }
}

/// What a successful dispatch produced
#[derive(Debug)]
pub struct HandlerOutcome {
    pub slug: String,
    pub output_dir: Utf8PathBuf,
    /// File names placed in `output_dir`, manifest excluded
    pub artifacts: Vec<String>,
    /// Conversions that fell back to the original file
    pub fallbacks: Vec<IntakeError>,
}

/// Runs the strategy for a classified item.
pub struct Dispatcher {
    output_root: Utf8PathBuf,
    staging: Utf8PathBuf,
    collaborators: Collaborators,
}

impl Dispatcher {
    pub fn new(
        output_root: Utf8PathBuf,
        staging: Utf8PathBuf,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            output_root,
            staging,
            collaborators,
        }
    }

    pub(crate) fn output_root(&self) -> &Utf8Path {
        &self.output_root
    }

    pub async fn dispatch(
        &self,
        kind: &HandlerKind,
        path: &Utf8Path,
    ) -> Result<HandlerOutcome, IntakeError> {
        if !crate::intake::queue::exists(path) {
            return Err(IntakeError::VanishedInput(path.to_path_buf()));
        }

        tracing::info!("Dispatching {} as {}", path, kind);

        match kind {
            HandlerKind::SingleModel => {
                let models = [path.to_path_buf()];
                model::handle_models(self, path, &models, false).await
            }
            HandlerKind::ModelAggregate(models) => {
                model::handle_models(self, path, models, true).await
            }
            HandlerKind::NativePackage => native::handle_native(self, path).await,
            HandlerKind::DirectoryProject => directory::handle_directory(self, path).await,
            HandlerKind::Archive => archive::handle_archive(self, path).await,
            HandlerKind::Orphan => orphan::handle_orphan(self, path),
        }
    }

    /// Where the sibling resolver looks besides the model's own directory
    fn sibling_dirs<'a>(&'a self, primary: &'a Utf8Path) -> Vec<&'a Utf8Path> {
        vec![primary, self.staging.as_path()]
    }
}

/// Convert an STL group into `<slug>.3mf`, or keep each STL on failure.
async fn package_stl_group(
    package: &mut Package,
    stls: &[Utf8PathBuf],
    geometry: &dyn GeometryConverter,
) {
    if stls.is_empty() {
        return;
    }

    let produced = package.work_path(&format!("{}.3mf", package.slug()));
    match geometry.convert(stls, &produced).await {
        ConversionOutcome::Converted => package.add_converted(produced, "model/3mf", stls),
        ConversionOutcome::Failed(reason) => {
            for stl in stls {
                package.record_fallback(stl, reason.clone());
                package.add_original(stl, media_type_for(stl.as_str()));
            }
        }
    }
}

/// Convert each image to WebP, keeping the original when conversion fails.
async fn package_images(
    package: &mut Package,
    images: &[Utf8PathBuf],
    converter: &dyn ImageConverter,
) {
    for image in images {
        if crate::intake::queue::extension_of(image).as_deref() == Some(STANDARD_IMAGE_EXTENSION) {
            package.add_original(image, STANDARD_IMAGE_MEDIA_TYPE);
            continue;
        }

        let stem = image.file_stem().unwrap_or("image");
        let produced = package.work_path(&format!("{stem}.{STANDARD_IMAGE_EXTENSION}"));
        match converter.to_standard_image(image, &produced).await {
            ConversionOutcome::Converted => {
                let originals = std::slice::from_ref(image);
                package.add_converted(produced, STANDARD_IMAGE_MEDIA_TYPE, originals);
            }
            ConversionOutcome::Failed(reason) => {
                package.record_fallback(image, reason);
                package.add_original(image, media_type_for(image.as_str()));
            }
        }
    }
}
