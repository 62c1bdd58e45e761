//! Integration tests for the handler strategies with real collaborators
//!
//! Each test classifies an item the way the coordinator does and dispatches it,
//! then inspects what landed in the output folder.

mod common;

use common::{FailingImageConverter, TestDirs, binary_stl, collaborators, names, write, write_zip};
use manyfold_intake::intake::classify;
use manyfold_intake::services::{MANIFEST_FILE_NAME, Manifest};
use manyfold_intake::{Collaborators, HandlerKind, HandlerOutcome, IntakeError};
use camino::Utf8Path;
use std::fs;
use std::sync::Arc;

async fn run(
    dirs: &TestDirs,
    collaborators: Collaborators,
    path: &Utf8Path,
) -> Result<HandlerOutcome, IntakeError> {
    let kind = classify(path, &[&dirs.input, &dirs.staging]).expect("item should classify");
    dirs.dispatcher(collaborators).dispatch(&kind, path).await
}

fn manifest(dir: &Utf8Path) -> Manifest {
    let json = fs::read_to_string(dir.join(MANIFEST_FILE_NAME)).unwrap();
    serde_json::from_str(&json).unwrap()
}

fn zip_entries(path: &Utf8Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    archive.file_names().map(str::to_string).collect()
}

#[tokio::test]
async fn test_binary_stl_becomes_3mf_package() {
    let dirs = TestDirs::new();
    let model = dirs.input.join("Space Marine.stl");
    write(&model, &binary_stl());

    let outcome = run(&dirs, collaborators(), &model).await.unwrap();

    assert_eq!(outcome.slug, "space-marine");
    assert_eq!(outcome.artifacts, vec!["space-marine.3mf"]);
    assert!(outcome.fallbacks.is_empty());
    assert!(!model.exists());

    let package = outcome.output_dir.join("space-marine.3mf");
    assert!(zip_entries(&package).iter().any(|e| e == "3D/3dmodel.model"));

    let manifest = manifest(&outcome.output_dir);
    assert_eq!(manifest.title, "Space Marine");
    assert_eq!(manifest.resources.len(), 1);
    assert_eq!(manifest.resources[0].mediatype, "model/3mf");
}

#[tokio::test]
async fn test_ascii_stl_falls_back_to_original() {
    let dirs = TestDirs::new();
    let model = dirs.input.join("vase.stl");
    write(&model, b"solid vase\nendsolid vase\n");

    let outcome = run(&dirs, collaborators(), &model).await.unwrap();

    assert_eq!(outcome.artifacts, vec!["vase.stl"]);
    assert_eq!(outcome.fallbacks.len(), 1);
    assert!(matches!(
        &outcome.fallbacks[0],
        IntakeError::ConversionFailure { file, .. } if file == "vase.stl"
    ));
    assert!(!model.exists());
    assert_eq!(
        fs::read(outcome.output_dir.join("vase.stl")).unwrap(),
        b"solid vase\nendsolid vase\n"
    );
    assert_eq!(manifest(&outcome.output_dir).resources[0].name, "vase.stl");
}

#[tokio::test]
async fn test_failed_image_conversion_keeps_original_preview() {
    let dirs = TestDirs::new();
    let model = dirs.input.join("goblin.stl");
    write(&model, &binary_stl());
    write(&dirs.input.join("goblin-front.jpg"), b"jpg");

    let mut collab = collaborators();
    collab.images = Arc::new(FailingImageConverter);
    let outcome = run(&dirs, collab, &model).await.unwrap();

    assert_eq!(
        names(&outcome.output_dir),
        vec!["datapackage.json", "goblin-front.jpg", "goblin.3mf"]
    );
    assert_eq!(outcome.fallbacks.len(), 1);
    assert!(names(&dirs.input).is_empty());
}

#[tokio::test]
async fn test_native_3mf_keeps_format() {
    let dirs = TestDirs::new();
    let native = dirs.input.join("boat.3mf");
    write_zip(&native, &[("3D/3dmodel.model", b"<model/>")]);

    let outcome = run(&dirs, collaborators(), &native).await.unwrap();

    assert_eq!(outcome.artifacts, vec!["boat.3mf"]);
    assert!(!native.exists());
    assert_eq!(manifest(&outcome.output_dir).resources[0].mediatype, "model/3mf");
}

#[tokio::test]
async fn test_archive_with_nested_project() {
    let dirs = TestDirs::new();
    let stl = binary_stl();
    let archive = dirs.input.join("Mech Kit.zip");
    write_zip(
        &archive,
        &[
            ("mech/body.stl", &stl),
            ("mech/arms/arm.stl", &stl),
            ("mech/renders/body.png", b"png"),
            ("mech/README.md", b"# Mech"),
            ("mech/.DS_Store", b"junk"),
        ],
    );
    assert_eq!(
        classify(&archive, &[&dirs.input, &dirs.staging]),
        Some(HandlerKind::Archive)
    );

    let outcome = run(&dirs, collaborators(), &archive).await.unwrap();

    assert_eq!(outcome.slug, "mech-kit");
    assert!(outcome.artifacts.contains(&"mech-kit.3mf".to_string()));
    assert!(outcome.artifacts.contains(&"body.webp".to_string()));
    assert!(outcome.artifacts.contains(&"README.md".to_string()));
    assert!(!outcome.artifacts.iter().any(|a| a.starts_with('.')));
    assert!(!archive.exists());
    assert_eq!(manifest(&outcome.output_dir).title, "Mech Kit");
}

#[tokio::test]
async fn test_empty_directory_project_fails_in_place() {
    let dirs = TestDirs::new();
    let project = dirs.input.join("empty-project");
    write(&project.join(".hidden"), b"x");

    let err = run(&dirs, collaborators(), &project).await.unwrap_err();

    assert!(matches!(err, IntakeError::EmptyProject(_)));
    assert!(project.exists());
    assert!(names(&dirs.output).is_empty());
}

#[tokio::test]
async fn test_vanished_item_reported() {
    let dirs = TestDirs::new();
    let model = dirs.input.join("ghost.stl");
    write(&model, &binary_stl());
    let kind = classify(&model, &[&dirs.input]).unwrap();
    fs::remove_file(&model).unwrap();

    let err = dirs.dispatcher(collaborators()).dispatch(&kind, &model).await.unwrap_err();

    assert!(matches!(err, IntakeError::VanishedInput(_)));
}
