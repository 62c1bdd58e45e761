//! Shared fixtures for the integration tests.
//!
//! Real geometry, archive and manifest collaborators are used; image conversion
//! is replaced by a byte copy so no external `cwebp` is needed.

#![allow(dead_code)]

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use manyfold_intake::services::{
    BuiltinStlConverter, ConversionOutcome, DatapackageWriter, GeometryConverter, ImageConverter,
    Manifest, ManifestWriter, ServiceError, ZipExtractor,
};
use manyfold_intake::{
    Collaborators, ConfigManager, Dispatcher, IntakeCoordinator, IntakeHandle, Metrics,
    PersistedConfig, QueueDirs,
};
use std::fs;
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// "Converts" an image by copying its bytes to the output path.
pub struct CopyImageConverter;

#[async_trait]
impl ImageConverter for CopyImageConverter {
    async fn to_standard_image(&self, input: &Utf8Path, output: &Utf8Path) -> ConversionOutcome {
        match fs::copy(input, output) {
            Ok(_) => ConversionOutcome::Converted,
            Err(e) => ConversionOutcome::Failed(e.to_string()),
        }
    }
}

/// Always fails, so every image falls back to its original.
pub struct FailingImageConverter;

#[async_trait]
impl ImageConverter for FailingImageConverter {
    async fn to_standard_image(&self, _input: &Utf8Path, _output: &Utf8Path) -> ConversionOutcome {
        ConversionOutcome::Failed("no image converter available".to_string())
    }
}

/// Refuses every manifest, so packaging fails after conversion.
pub struct FailingManifestWriter;

impl ManifestWriter for FailingManifestWriter {
    fn write_manifest(
        &self,
        _manifest: &Manifest,
        _out_path: &Utf8Path,
    ) -> Result<(), ServiceError> {
        Err(std::io::Error::other("disk full").into())
    }
}

pub fn collaborators() -> Collaborators {
    Collaborators {
        geometry: Arc::new(BuiltinStlConverter) as Arc<dyn GeometryConverter>,
        images: Arc::new(CopyImageConverter),
        archives: Arc::new(ZipExtractor::default()),
        manifests: Arc::new(DatapackageWriter),
    }
}

/// Input, Staging, Output and config directories under one temp root.
pub struct TestDirs {
    _temp: TempDir,
    pub root: Utf8PathBuf,
    pub input: Utf8PathBuf,
    pub staging: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub config: Utf8PathBuf,
}

impl TestDirs {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        // Canonical so assertions compare equal to the coordinator's resolved paths
        let root = Utf8PathBuf::try_from(temp.path().canonicalize().unwrap()).unwrap();
        let dirs = Self {
            input: root.join("input"),
            staging: root.join("staging"),
            output: root.join("output"),
            config: root.join("config"),
            root,
            _temp: temp,
        };
        for dir in [&dirs.input, &dirs.staging, &dirs.output, &dirs.config] {
            fs::create_dir_all(dir).unwrap();
        }
        dirs
    }

    pub fn persist_config(&self, config: &PersistedConfig) {
        ConfigManager::new(&self.config).unwrap().save(config).unwrap();
    }

    pub fn saved_config(&self) -> PersistedConfig {
        ConfigManager::new(&self.config).unwrap().load()
    }

    pub fn dispatcher(&self, collaborators: Collaborators) -> Dispatcher {
        Dispatcher::new(self.output.clone(), self.staging.clone(), collaborators)
    }
}

/// A running coordinator over fresh directories.
pub struct Harness {
    pub dirs: TestDirs,
    pub intake: IntakeHandle,
    pub metrics: Arc<Metrics>,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn start() -> Self {
        Self::start_in(TestDirs::new(), collaborators())
    }

    pub fn start_in(dirs: TestDirs, collaborators: Collaborators) -> Self {
        let queue_dirs = QueueDirs::prepare(&dirs.input, &dirs.staging).unwrap();
        let config = ConfigManager::new(&dirs.config).unwrap();
        let metrics = Arc::new(Metrics::new());
        let dispatcher = dirs.dispatcher(collaborators);
        let (coordinator, intake) =
            IntakeCoordinator::new(queue_dirs, dispatcher, config, metrics.clone());
        let task = coordinator.spawn();
        Self {
            dirs,
            intake,
            metrics,
            task,
        }
    }

    pub async fn stop(self) -> TestDirs {
        self.intake.shutdown().await.unwrap();
        self.task.await.unwrap();
        self.dirs
    }
}

pub fn write(path: &Utf8Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

/// Visible entry names of `dir`, sorted.
pub fn names(dir: &Utf8Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    names
}

/// Binary STL holding one unit square (two triangles).
pub fn binary_stl() -> Vec<u8> {
    let triangles: [[[f32; 3]; 3]; 2] = [
        [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]],
        [[0.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
    ];
    let mut bytes = vec![0u8; 80];
    bytes.extend_from_slice(&(triangles.len() as u32).to_le_bytes());
    for triangle in &triangles {
        bytes.extend_from_slice(&[0u8; 12]);
        for vertex in triangle {
            for coord in vertex {
                bytes.extend_from_slice(&coord.to_le_bytes());
            }
        }
        bytes.extend_from_slice(&[0u8; 2]);
    }
    bytes
}

pub fn write_zip(path: &Utf8Path, entries: &[(&str, &[u8])]) {
    let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    for (name, bytes) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
}
