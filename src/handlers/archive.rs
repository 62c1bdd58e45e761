use super::directory::package_directory;
use super::output::{item_name, item_stem, slugify, titleize};
use super::{Dispatcher, HandlerOutcome};
use crate::intake::{IntakeError, queue};
use crate::services::ServiceError;
use camino::{Utf8Path, Utf8PathBuf};

/// Extract into a scratch directory, then package the contents as a project
/// named after the archive. The archive is deleted only after success.
pub(super) async fn handle_archive(
    dispatcher: &Dispatcher,
    archive: &Utf8Path,
) -> Result<HandlerOutcome, IntakeError> {
    let name = item_name(archive);
    let failed = |source: ServiceError| IntakeError::ExtractionFailed {
        name: name.clone(),
        source,
    };

    let scratch = tempfile::Builder::new()
        .prefix("manyfold-extract-")
        .tempdir()
        .map_err(|e| failed(e.into()))?;
    let target = Utf8PathBuf::from_path_buf(scratch.path().to_path_buf()).map_err(|_| {
        failed(std::io::Error::other("extraction directory path is not UTF-8").into())
    })?;

    let extractor = dispatcher.collaborators.archives.clone();
    let (source, destination) = (archive.to_path_buf(), target.clone());
    let summary = tokio::task::spawn_blocking(move || extractor.extract(&source, &destination))
        .await
        .map_err(|e| failed(std::io::Error::other(e).into()))?
        .map_err(&failed)?;

    tracing::info!(
        "Extracted {} file(s) ({} bytes, {} skipped) from {}",
        summary.files,
        summary.bytes,
        summary.skipped,
        archive
    );

    let stem = item_stem(archive);
    let root = content_root(&target);
    let outcome = package_directory(dispatcher, &root, &slugify(stem), &titleize(stem)).await?;

    if let Err(e) = queue::remove_path(archive) {
        tracing::warn!("Could not delete processed archive {}: {}", archive, e);
    }
    Ok(outcome)
}

/// Archives that wrap everything in one folder are packaged from inside it.
fn content_root(target: &Utf8Path) -> Utf8PathBuf {
    match queue::list_visible(target).as_deref() {
        Ok([only]) if only.is_dir() => only.clone(),
        _ => target.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::Collaborators;
    use crate::intake::HandlerKind;
    use crate::services::archive::MockArchiveExtractor;
    use crate::services::archive::tests::write_zip;
    use crate::services::geometry::MockGeometryConverter;
    use crate::services::image::MockImageConverter;
    use crate::services::{ConversionOutcome, DatapackageWriter, ZipExtractor};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn dispatcher(
        root: &Utf8Path,
        archives: Arc<dyn crate::services::ArchiveExtractor>,
    ) -> Dispatcher {
        let mut geometry = MockGeometryConverter::new();
        geometry.expect_convert().returning(|_, out| {
            fs::write(out, b"3mf").unwrap();
            ConversionOutcome::Converted
        });
        Dispatcher::new(
            root.join("output"),
            root.join("staging"),
            Collaborators {
                geometry: Arc::new(geometry),
                images: Arc::new(MockImageConverter::new()),
                archives,
                manifests: Arc::new(DatapackageWriter),
            },
        )
    }

    #[tokio::test]
    async fn test_zip_with_wrapper_folder() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        fs::create_dir_all(root.join("input")).unwrap();
        let archive = root.join("input/Knight Pack.zip");
        write_zip(&archive, &[("knight/knight.stl", b"k"), ("knight/notes.txt", b"n")]);

        let outcome = dispatcher(&root, Arc::new(ZipExtractor::default()))
            .dispatch(&HandlerKind::Archive, &archive)
            .await
            .unwrap();

        assert_eq!(outcome.slug, "knight-pack");
        assert_eq!(outcome.artifacts, vec!["knight-pack.3mf", "notes.txt"]);
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn test_extraction_failure_keeps_archive() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        fs::create_dir_all(root.join("input")).unwrap();
        let archive = root.join("input/pack.rar");
        fs::write(&archive, b"Rar!").unwrap();

        let mut extractor = MockArchiveExtractor::new();
        extractor
            .expect_extract()
            .returning(|_, _| Err(ServiceError::UnsupportedArchive("rar".into())));

        let err = dispatcher(&root, Arc::new(extractor))
            .dispatch(&HandlerKind::Archive, &archive)
            .await
            .unwrap_err();

        assert!(
            matches!(err, IntakeError::ExtractionFailed { ref name, .. } if name == "pack.rar")
        );
        assert!(archive.exists());
    }
}
