use crate::services::ServiceError;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

pub const DATAPACKAGE_SCHEMA: &str = "https://manyfold.app/profiles/0.0/datapackage.json";
pub const MANIFEST_FILE_NAME: &str = "datapackage.json";

/// One artifact listed in a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    /// Relative to the item folder, `/`-separated
    pub path: String,
    pub mediatype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presupported: Option<bool>,
}

impl Resource {
    pub fn new(path: impl Into<String>, mediatype: impl Into<String>) -> Self {
        let path = path.into().replace('\\', "/");
        let mediatype = mediatype.into();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();

        // Model files carry orientation hints
        let is_model = mediatype.starts_with("model/");
        Self {
            name,
            path,
            up: is_model.then(|| "+z".to_string()),
            presupported: is_model.then_some(false),
            mediatype,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub path: String,
}

/// Manyfold datapackage descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub name: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub contributors: Vec<serde_json::Value>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Manifest {
    pub fn new(slug: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            schema: DATAPACKAGE_SCHEMA.to_string(),
            name: slug.into(),
            title: title.into(),
            caption: None,
            description: None,
            keywords: Vec::new(),
            resources: Vec::new(),
            contributors: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn push_resource(&mut self, resource: Resource) {
        self.resources.push(resource);
    }
}

/// Serialises a [`Manifest`] next to the artifacts it describes.
#[cfg_attr(test, automock)]
pub trait ManifestWriter: Send + Sync {
    fn write_manifest(&self, manifest: &Manifest, out_path: &Utf8Path) -> Result<(), ServiceError>;
}

/// Pretty-printed `datapackage.json`
#[derive(Debug, Clone, Copy, Default)]
pub struct DatapackageWriter;

impl ManifestWriter for DatapackageWriter {
    fn write_manifest(&self, manifest: &Manifest, out_path: &Utf8Path) -> Result<(), ServiceError> {
        let json = serde_json::to_string_pretty(manifest)?;
        std::fs::write(out_path, json)?;
        tracing::debug!(
            "Wrote manifest for {} ({} resources) to {}",
            manifest.name,
            manifest.resources.len(),
            out_path
        );
        Ok(())
    }
}

/// Media type guessed from the file extension.
pub fn media_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "stl" => "model/stl",
        "3mf" => "model/3mf",
        "obj" => "model/obj",
        "ply" => "model/ply",
        "gcode" => "text/x-gcode",
        "webp" => "image/webp",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
