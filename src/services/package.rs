//! Metadata embedded in 3MF packages.

use crate::services::ServiceError;
use camino::Utf8Path;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::fs::File;
use std::io::Read;

const MODEL_ENTRY: &str = "3D/3dmodel.model";

/// Upper bound on how much of the model document is scanned for metadata
const MAX_MODEL_DOCUMENT: u64 = 64 * 1024 * 1024;

/// `<metadata name="...">` keys worth carrying into the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetadataKey {
    Title,
    Description,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    /// (file name, bytes) of images under `Metadata/`
    pub thumbnails: Vec<(String, Vec<u8>)>,
}

/// Read title, description and thumbnails from a 3MF (zip) package.
pub fn read_package_metadata(path: &Utf8Path) -> Result<PackageMetadata, ServiceError> {
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;
    let mut metadata = PackageMetadata::default();

    let names: Vec<String> = archive.file_names().map(String::from).collect();

    if let Some(model_name) = names.iter().find(|n| n.eq_ignore_ascii_case(MODEL_ENTRY)) {
        let mut document = String::new();
        archive
            .by_name(model_name)?
            .take(MAX_MODEL_DOCUMENT)
            .read_to_string(&mut document)?;

        read_model_metadata(&document, &mut metadata)?;
    }

    for name in names.iter().filter(|n| is_thumbnail_entry(n)) {
        let mut bytes = Vec::new();
        archive.by_name(name)?.read_to_end(&mut bytes)?;
        let file_name = name.rsplit('/').next().unwrap_or(name).to_string();
        metadata.thumbnails.push((file_name, bytes));
    }

    Ok(metadata)
}

fn is_thumbnail_entry(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with("metadata/")
        && [".png", ".jpg", ".jpeg"].iter().any(|ext| lower.ends_with(ext))
}

/// Pull Title and Description out of the core model document.
fn read_model_metadata(document: &str, metadata: &mut PackageMetadata) -> Result<(), ServiceError> {
    let mut reader = Reader::from_str(document);
    reader.trim_text(true);

    let mut current: Option<MetadataKey> = None;
    let mut value = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"metadata" => {
                current = metadata_key(&e)?;
                value.clear();
            }
            Event::Text(text) if current.is_some() => value.push_str(&text.unescape()?),
            Event::CData(data) if current.is_some() => {
                value.push_str(&String::from_utf8_lossy(&data.into_inner()));
            }
            Event::End(e) if e.local_name().as_ref() == b"metadata" => {
                let trimmed = value.trim();
                match current.take() {
                    Some(_) if trimmed.is_empty() => {}
                    Some(MetadataKey::Title) => metadata.title = Some(trimmed.to_string()),
                    Some(MetadataKey::Description) => {
                        metadata.description = Some(trimmed.to_string())
                    }
                    None => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(())
}

fn metadata_key(element: &BytesStart<'_>) -> Result<Option<MetadataKey>, ServiceError> {
    for attribute in element.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        if attribute.key.local_name().as_ref() != b"name" {
            continue;
        }
        return Ok(match &*attribute.unescape_value()? {
            "Title" => Some(MetadataKey::Title),
            "Description" => Some(MetadataKey::Description),
            _ => None,
        });
    }
    Ok(None)
}
