//! Services module - external collaborators used by the handler strategies.
//!
//! Each collaborator is a pure function over files, reached through a trait so the
//! handlers never care whether the work happens in-process or in a subprocess.
//!
//! # Components
//!
//! - [`GeometryConverter`]: mesh files to a 3MF package. [`ExternalGeometryConverter`]
//!   runs a configured binary, [`BuiltinStlConverter`] handles binary STL in-process,
//!   [`ChainedGeometryConverter`] tries them in order.
//! - [`ImageConverter`]: preview images to WebP through `cwebp` ([`ExternalImageConverter`]).
//! - [`ArchiveExtractor`]: zip extraction with entry/size limits ([`ZipExtractor`]).
//! - [`ManifestWriter`]: Manyfold `datapackage.json` ([`DatapackageWriter`]).
//! - [`CommandRunner`]: subprocess execution with a hard timeout ([`TokioCommandRunner`]).
//!
//! Converters report [`ConversionOutcome::Failed`] instead of erroring, so a handler
//! can always fall back to the original file.

pub mod archive;
pub mod error;
pub mod geometry;
pub mod image;
pub mod manifest;
pub mod mesh;
pub mod package;
pub mod runner;

pub use archive::{
    ArchiveExtractor, ExtractionSummary, ZipExtractor, is_zip_container, zip_contains,
};
pub use error::ServiceError;
pub use geometry::{
    BuiltinStlConverter, ChainedGeometryConverter, ConversionOutcome, ExternalGeometryConverter,
    GeometryConverter,
};
pub use image::{
    ExternalImageConverter, ImageConverter, STANDARD_IMAGE_EXTENSION, STANDARD_IMAGE_MEDIA_TYPE,
};
pub use manifest::{
    DatapackageWriter, MANIFEST_FILE_NAME, Manifest, ManifestWriter, Resource, media_type_for,
};
pub use package::{PackageMetadata, read_package_metadata};
pub use runner::{CommandOutput, CommandRunner, TokioCommandRunner};
