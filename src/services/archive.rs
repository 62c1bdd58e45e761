use crate::services::ServiceError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File};
use std::io::{self, Read};

#[cfg(test)]
use mockall::automock;

/// Local file header signature of a zip container
const ZIP_SIGNATURE: [u8; 4] = *b"PK\x03\x04";

/// Maximum number of entries in an archive (prevents zip bombs)
pub const MAX_ARCHIVE_ENTRIES: usize = 10_000;

/// Maximum total uncompressed size (10 GiB)
pub const MAX_ARCHIVE_BYTES: u64 = 10 * 1024 * 1024 * 1024;

/// Summary of a finished extraction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub files: usize,
    pub bytes: u64,
    pub skipped: usize,
}

/// Unpacks an archive into a directory.
#[cfg_attr(test, automock)]
pub trait ArchiveExtractor: Send + Sync {
    fn extract(&self, archive: &Utf8Path, target: &Utf8Path)
        -> Result<ExtractionSummary, ServiceError>;
}

/// Zip extraction with entry-count and size limits.
///
/// The container is recognised by its signature, not its extension. Entries whose
/// names would escape `target` are skipped.
#[derive(Debug, Clone)]
pub struct ZipExtractor {
    max_entries: usize,
    max_total_bytes: u64,
}

impl Default for ZipExtractor {
    fn default() -> Self {
        Self {
            max_entries: MAX_ARCHIVE_ENTRIES,
            max_total_bytes: MAX_ARCHIVE_BYTES,
        }
    }
}

impl ZipExtractor {
    pub fn with_limits(max_entries: usize, max_total_bytes: u64) -> Self {
        Self {
            max_entries,
            max_total_bytes,
        }
    }
}

impl ArchiveExtractor for ZipExtractor {
    fn extract(
        &self,
        archive_path: &Utf8Path,
        target: &Utf8Path,
    ) -> Result<ExtractionSummary, ServiceError> {
        if !is_zip_container(archive_path) {
            let format = archive_path
                .extension()
                .map(str::to_ascii_lowercase)
                .unwrap_or_else(|| "unknown".to_string());
            return Err(ServiceError::UnsupportedArchive(format));
        }

        let mut archive = zip::ZipArchive::new(File::open(archive_path)?)?;

        if archive.len() > self.max_entries {
            return Err(ServiceError::ArchiveLimit(format!(
                "{} entries (limit {})",
                archive.len(),
                self.max_entries
            )));
        }

        let mut declared: u64 = 0;
        for i in 0..archive.len() {
            declared = declared.saturating_add(archive.by_index(i)?.size());
        }
        if declared > self.max_total_bytes {
            return Err(ServiceError::ArchiveLimit(format!(
                "{declared} bytes uncompressed (limit {})",
                self.max_total_bytes
            )));
        }

        fs::create_dir_all(target)?;
        let mut summary = ExtractionSummary::default();

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;

            let Some(relative) = entry.enclosed_name() else {
                tracing::warn!(
                    "Skipping unsafe archive entry {:?} in {}",
                    entry.name(),
                    archive_path
                );
                summary.skipped += 1;
                continue;
            };
            let Ok(relative) = Utf8PathBuf::try_from(relative) else {
                summary.skipped += 1;
                continue;
            };
            if relative.starts_with("__MACOSX") {
                summary.skipped += 1;
                continue;
            }

            let out_path = target.join(&relative);
            if entry.is_dir() {
                fs::create_dir_all(&out_path)?;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }

            // Declared sizes can lie; bound the actual bytes written too
            let remaining = self.max_total_bytes.saturating_sub(summary.bytes);
            let mut out_file = File::create(&out_path)?;
            let written = io::copy(&mut (&mut entry).take(remaining + 1), &mut out_file)?;
            summary.bytes += written;
            if summary.bytes > self.max_total_bytes {
                return Err(ServiceError::ArchiveLimit(format!(
                    "more than {} bytes written",
                    self.max_total_bytes
                )));
            }
            summary.files += 1;
        }

        tracing::info!(
            "Extracted {} files ({} bytes) from {}",
            summary.files,
            summary.bytes,
            archive_path
        );
        Ok(summary)
    }
}

/// True when the file starts with the zip local-header signature.
pub fn is_zip_container(path: &Utf8Path) -> bool {
    let mut signature = [0u8; 4];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut signature))
        .map(|_| signature == ZIP_SIGNATURE)
        .unwrap_or(false)
}

/// True when the zip at `path` has an entry named `entry` (case-insensitive).
pub fn zip_contains(path: &Utf8Path, entry: &str) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let Ok(archive) = zip::ZipArchive::new(file) else {
        return false;
    };
    archive.file_names().any(|name| name.eq_ignore_ascii_case(entry))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    pub(crate) fn write_zip(path: &Utf8Path, entries: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, bytes) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    fn utf8_dir(temp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_extracts_nested_entries() {
        let temp = TempDir::new().unwrap();
        let dir = utf8_dir(&temp);
        let archive = dir.join("pack.zip");
        write_zip(&archive, &[("models/a.stl", b"aaaa"), ("readme.txt", b"hi")]);

        let target = dir.join("out");
        let summary = ZipExtractor::default().extract(&archive, &target).unwrap();

        assert_eq!(summary.files, 2);
        assert_eq!(fs::read(target.join("models/a.stl")).unwrap(), b"aaaa");
    }

    #[test]
    fn test_signature_detection_ignores_extension() {
        let temp = TempDir::new().unwrap();
        let dir = utf8_dir(&temp);
        let disguised = dir.join("pack.bin");
        write_zip(&disguised, &[("a.txt", b"x")]);
        let plain = dir.join("fake.zip");
        fs::write(&plain, b"not a zip at all").unwrap();

        assert!(is_zip_container(&disguised));
        assert!(!is_zip_container(&plain));
        assert!(!is_zip_container(&dir.join("missing.zip")));
    }

    #[test]
    fn test_rar_is_unsupported() {
        let temp = TempDir::new().unwrap();
        let dir = utf8_dir(&temp);
        let rar = dir.join("pack.rar");
        fs::write(&rar, b"Rar!\x1a\x07\x00").unwrap();

        let err = ZipExtractor::default().extract(&rar, &dir.join("out")).unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedArchive(ref f) if f == "rar"));
    }

    #[test]
    fn test_entry_limit() {
        let temp = TempDir::new().unwrap();
        let dir = utf8_dir(&temp);
        let archive = dir.join("many.zip");
        write_zip(&archive, &[("a", b"1"), ("b", b"2"), ("c", b"3")]);

        let err = ZipExtractor::with_limits(2, MAX_ARCHIVE_BYTES)
            .extract(&archive, &dir.join("out"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::ArchiveLimit(_)));
    }

    #[test]
    fn test_size_limit() {
        let temp = TempDir::new().unwrap();
        let dir = utf8_dir(&temp);
        let archive = dir.join("big.zip");
        write_zip(&archive, &[("a", &[0u8; 64])]);

        let err = ZipExtractor::with_limits(10, 16)
            .extract(&archive, &dir.join("out"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::ArchiveLimit(_)));
    }

    #[test]
    fn test_zip_contains_is_case_insensitive() {
        let temp = TempDir::new().unwrap();
        let dir = utf8_dir(&temp);
        let archive = dir.join("model.3mf");
        write_zip(&archive, &[("3D/3DModel.model", b"<model/>")]);

        assert!(zip_contains(&archive, "3D/3dmodel.model"));
        assert!(!zip_contains(&archive, "Metadata/thumbnail.png"));
    }
}
