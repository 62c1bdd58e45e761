//! Slugs, titles and the per-dispatch package that collects artifacts before
//! they are relocated into `output/<slug>/`.

use crate::handlers::HandlerOutcome;
use crate::intake::IntakeError;
use crate::intake::queue::{self, move_path, unique_destination};
use crate::services::{MANIFEST_FILE_NAME, Manifest, ManifestWriter, Resource, ServiceError};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashSet;
use tempfile::TempDir;

/// Filesystem-safe folder name: lower-case, non-alphanumeric runs become `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug
    }
}

/// Human title from a file stem: `-`/`_` become spaces, words capitalised.
pub fn titleize(stem: &str) -> String {
    stem.split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// File stem, or the whole name for directories and extension-less files.
pub fn item_stem(path: &Utf8Path) -> &str {
    if path.is_dir() {
        path.file_name().unwrap_or("unnamed")
    } else {
        path.file_stem().or_else(|| path.file_name()).unwrap_or("unnamed")
    }
}

pub fn item_name(path: &Utf8Path) -> String {
    path.file_name().unwrap_or_default().to_string()
}

#[derive(Debug)]
struct Artifact {
    source: Utf8PathBuf,
    name: String,
    media_type: String,
}

/// Artifacts gathered for one item.
///
/// Converted outputs live in a private work directory until [`Package::finish`]
/// moves everything into the output folder. Originals replaced by a converted
/// artifact are deleted only after that move succeeds.
#[derive(Debug)]
pub struct Package {
    slug: String,
    title: String,
    description: Option<String>,
    work: TempDir,
    work_dir: Utf8PathBuf,
    artifacts: Vec<Artifact>,
    names: HashSet<String>,
    converted_originals: Vec<Utf8PathBuf>,
    fallbacks: Vec<IntakeError>,
}

impl Package {
    pub fn new(slug: impl Into<String>, title: impl Into<String>) -> Result<Self, IntakeError> {
        let slug = slug.into();
        let work = tempfile::Builder::new()
            .prefix("manyfold-intake-")
            .tempdir()
            .map_err(|e| IntakeError::packaging(&slug, e))?;
        let work_dir = Utf8PathBuf::from_path_buf(work.path().to_path_buf()).map_err(|_| {
            IntakeError::packaging(&slug, std::io::Error::other("work directory path is not UTF-8"))
        })?;

        Ok(Self {
            slug,
            title: title.into(),
            description: None,
            work,
            work_dir,
            artifacts: Vec::new(),
            names: HashSet::new(),
            converted_originals: Vec::new(),
            fallbacks: Vec::new(),
        })
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn set_description(&mut self, description: Option<String>) {
        if description.is_some() {
            self.description = description;
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Fresh path inside the work directory for a converted artifact
    pub fn work_path(&self, file_name: &str) -> Utf8PathBuf {
        unique_destination(&self.work_dir, file_name)
    }

    /// A converted artifact; `originals` are deleted once it is relocated.
    pub fn add_converted(
        &mut self,
        produced: Utf8PathBuf,
        media_type: &str,
        originals: &[Utf8PathBuf],
    ) {
        let name = self.reserve_name(produced.file_name().unwrap_or("artifact"));
        self.artifacts.push(Artifact {
            source: produced,
            name,
            media_type: media_type.to_string(),
        });
        self.converted_originals.extend_from_slice(originals);
    }

    /// A file relocated as-is (native form, attachment, or fallback copy).
    pub fn add_original(&mut self, source: &Utf8Path, media_type: &str) {
        self.add_original_as(source, source.file_name().unwrap_or("artifact"), media_type);
    }

    /// Like [`Package::add_original`], but placed under `file_name` in the output folder.
    /// The source keeps its name until [`Package::finish`] moves it.
    pub fn add_original_as(&mut self, source: &Utf8Path, file_name: &str, media_type: &str) {
        let name = self.reserve_name(file_name);
        self.artifacts.push(Artifact {
            source: source.to_path_buf(),
            name,
            media_type: media_type.to_string(),
        });
    }

    /// Note a conversion that fell back to the original file.
    pub fn record_fallback(&mut self, file: &Utf8Path, reason: String) {
        tracing::warn!("Conversion failed for {}, keeping original: {}", file, reason);
        self.fallbacks.push(IntakeError::ConversionFailure {
            file: item_name(file),
            reason,
        });
    }

    pub fn artifact_count(&self) -> usize {
        self.artifacts.len()
    }

    fn reserve_name(&mut self, wanted: &str) -> String {
        if self.names.insert(wanted.to_ascii_lowercase()) {
            return wanted.to_string();
        }
        let (stem, ext) = wanted.rsplit_once('.').unwrap_or((wanted, ""));
        let mut n = 1;
        loop {
            let candidate = if ext.is_empty() {
                format!("{stem}-{n}")
            } else {
                format!("{stem}-{n}.{ext}")
            };
            if self.names.insert(candidate.to_ascii_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Write the manifest (unless `with_manifest` is false), move every artifact
    /// into `output_root/<slug>/`, then delete replaced originals.
    pub fn finish(
        self,
        output_root: &Utf8Path,
        manifests: &dyn ManifestWriter,
        with_manifest: bool,
    ) -> Result<HandlerOutcome, IntakeError> {
        let item = self.slug.clone();
        let output_dir = output_root.join(&self.slug);

        let manifest_source = if with_manifest {
            let mut manifest =
                Manifest::new(&self.slug, &self.title).with_description(self.description.clone());
            for artifact in &self.artifacts {
                manifest.push_resource(Resource::new(&artifact.name, &artifact.media_type));
            }
            let path = self.work_dir.join(MANIFEST_FILE_NAME);
            manifests
                .write_manifest(&manifest, &path)
                .map_err(|e| IntakeError::packaging(&item, e))?;
            Some(path)
        } else {
            None
        };

        std::fs::create_dir_all(&output_dir).map_err(|e| IntakeError::packaging(&item, e))?;

        let mut placed = Vec::with_capacity(self.artifacts.len() + 1);
        for artifact in &self.artifacts {
            place(&artifact.source, &output_dir.join(&artifact.name))
                .map_err(|e| IntakeError::packaging(&item, e))?;
            placed.push(artifact.name.clone());
        }
        if let Some(manifest_source) = manifest_source {
            place(&manifest_source, &output_dir.join(MANIFEST_FILE_NAME))
                .map_err(|e| IntakeError::packaging(&item, e))?;
        }

        for original in &self.converted_originals {
            if queue::exists(original) {
                if let Err(e) = queue::remove_path(original) {
                    tracing::warn!("Could not delete converted original {}: {}", original, e);
                }
            }
        }

        tracing::info!(
            "Packaged {} ({} artifacts, {} fallbacks) into {}",
            self.slug,
            placed.len(),
            self.fallbacks.len(),
            output_dir
        );

        // Work directory is dropped (and removed) here
        drop(self.work);

        Ok(HandlerOutcome {
            slug: self.slug,
            output_dir,
            artifacts: placed,
            fallbacks: self.fallbacks,
        })
    }
}

/// Move `source` to `destination`, replacing an existing file of the same name.
fn place(source: &Utf8Path, destination: &Utf8Path) -> Result<(), ServiceError> {
    if queue::exists(destination) {
        queue::remove_path(destination)?;
    }
    move_path(source, destination)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::manifest::MockManifestWriter;
    use crate::services::DatapackageWriter;
    use proptest::prelude::*;
    use std::fs;

    fn utf8_dir(temp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Sophia 35mm (Sophia)"), "sophia-35mm-sophia");
        assert_eq!(slugify("--Dragon__Bust--"), "dragon-bust");
        assert_eq!(slugify("???"), "unnamed");
        assert_eq!(slugify("Château"), "château");
    }

    #[test]
    fn test_titleize() {
        assert_eq!(titleize("sophia-35mm_sophia"), "Sophia 35mm Sophia");
        assert_eq!(titleize("dragon  bust"), "Dragon Bust");
        assert_eq!(titleize(""), "");
    }

    #[test]
    fn test_finish_moves_artifacts_and_deletes_converted_originals() {
        let temp = TempDir::new().unwrap();
        let root = utf8_dir(&temp);
        let input = root.join("input");
        let output = root.join("output");
        fs::create_dir_all(&input).unwrap();

        let original = input.join("cube.stl");
        fs::write(&original, b"stl").unwrap();
        let image = input.join("cube.png");
        fs::write(&image, b"png").unwrap();

        let mut package = Package::new("cube", "Cube").unwrap();
        let produced = package.work_path("cube.3mf");
        fs::write(&produced, b"3mf").unwrap();
        package.add_converted(produced, "model/3mf", std::slice::from_ref(&original));
        package.add_original(&image, "image/png");
        package.record_fallback(&image, "no converter".to_string());

        let outcome = package.finish(&output, &DatapackageWriter, true).unwrap();

        assert_eq!(outcome.output_dir, output.join("cube"));
        assert_eq!(outcome.artifacts, vec!["cube.3mf", "cube.png"]);
        assert_eq!(outcome.fallbacks.len(), 1);
        assert!(output.join("cube/datapackage.json").exists());
        assert_eq!(fs::read(output.join("cube/cube.png")).unwrap(), b"png");
        assert!(!original.exists());
        assert!(!image.exists());
    }

    #[test]
    fn test_manifest_failure_leaves_originals() {
        let temp = TempDir::new().unwrap();
        let root = utf8_dir(&temp);
        let original = root.join("cube.stl");
        fs::write(&original, b"stl").unwrap();

        let mut writer = MockManifestWriter::new();
        writer
            .expect_write_manifest()
            .returning(|_, _| Err(ServiceError::Io(std::io::Error::other("disk full"))));

        let mut package = Package::new("cube", "Cube").unwrap();
        package.add_original(&original, "model/stl");
        let err = package.finish(&root.join("output"), &writer, true).unwrap_err();

        assert!(matches!(err, IntakeError::ManifestOrRelocationFailure { .. }));
        assert!(original.exists());
        assert!(!root.join("output/cube").exists());
    }

    #[test]
    fn test_existing_output_file_is_replaced() {
        let temp = TempDir::new().unwrap();
        let root = utf8_dir(&temp);
        let output = root.join("output");
        fs::create_dir_all(output.join("cube")).unwrap();
        fs::write(output.join("cube/cube.stl"), b"old").unwrap();

        let original = root.join("cube.stl");
        fs::write(&original, b"new").unwrap();

        let mut package = Package::new("cube", "Cube").unwrap();
        package.add_original(&original, "model/stl");
        package.finish(&output, &DatapackageWriter, false).unwrap();

        assert_eq!(fs::read(output.join("cube/cube.stl")).unwrap(), b"new");
        assert!(!output.join("cube/datapackage.json").exists());
    }

    #[test]
    fn test_duplicate_artifact_names_are_suffixed() {
        let temp = TempDir::new().unwrap();
        let root = utf8_dir(&temp);
        fs::create_dir_all(root.join("a")).unwrap();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("a/part.stl"), b"1").unwrap();
        fs::write(root.join("b/part.stl"), b"2").unwrap();

        let mut package = Package::new("parts", "Parts").unwrap();
        package.add_original(&root.join("a/part.stl"), "model/stl");
        package.add_original(&root.join("b/part.stl"), "model/stl");
        let outcome = package.finish(&root.join("out"), &DatapackageWriter, true).unwrap();

        assert_eq!(outcome.artifacts, vec!["part.stl", "part-1.stl"]);
    }

    proptest! {
        #[test]
        fn prop_slug_is_filesystem_safe(name in "[ -~]{0,40}") {
            let slug = slugify(&name);
            prop_assert!(!slug.is_empty());
            prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            prop_assert!(slug.chars().all(|c| c == '-' || c.is_alphanumeric()));
        }
    }
}
