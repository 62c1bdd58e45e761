use crate::services::mesh::{Mesh, parse_binary_stl, write_3mf};
use crate::services::{CommandRunner, ServiceError};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

/// Result of asking a converter for a standard form.
///
/// Converters never raise; a failure is a value the caller falls back on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Converted,
    Failed(String),
}

impl ConversionOutcome {
    pub(crate) fn from_result(result: Result<(), ServiceError>) -> Self {
        match result {
            Ok(()) => ConversionOutcome::Converted,
            Err(e) => ConversionOutcome::Failed(e.to_string()),
        }
    }
}

/// Turns one or more mesh files into a single 3MF package at `output`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GeometryConverter: Send + Sync {
    async fn convert(&self, inputs: &[Utf8PathBuf], output: &Utf8Path) -> ConversionOutcome;
}

/// Runs a configured converter binary:
/// `<program> --input <a> [--input <b> ...] --output <out>`.
pub struct ExternalGeometryConverter {
    program: String,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl ExternalGeometryConverter {
    pub fn new(
        program: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            runner,
            timeout,
        }
    }

    fn build_args(inputs: &[Utf8PathBuf], output: &Utf8Path) -> Vec<String> {
        let mut args = Vec::with_capacity(inputs.len() * 2 + 2);
        for input in inputs {
            args.push("--input".to_string());
            args.push(input.to_string());
        }
        args.push("--output".to_string());
        args.push(output.to_string());
        args
    }
}

#[async_trait]
impl GeometryConverter for ExternalGeometryConverter {
    async fn convert(&self, inputs: &[Utf8PathBuf], output: &Utf8Path) -> ConversionOutcome {
        let args = Self::build_args(inputs, output);

        let result = match self.runner.run(&self.program, &args, self.timeout).await {
            Ok(_) if non_empty_file(output) => Ok(()),
            Ok(_) => Err(ServiceError::OutputMissing(output.to_path_buf())),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            tracing::warn!("{} failed for {} input(s): {}", self.program, inputs.len(), e);
        }
        ConversionOutcome::from_result(result)
    }
}

/// In-process fallback: binary STL only, one 3MF object per input file.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinStlConverter;

impl BuiltinStlConverter {
    fn convert_blocking(inputs: &[Utf8PathBuf], output: &Utf8Path) -> Result<(), ServiceError> {
        if inputs.is_empty() {
            return Err(ServiceError::InvalidGeometry("no input files".to_string()));
        }

        let meshes = inputs
            .iter()
            .map(|input| {
                let bytes = std::fs::read(input)?;
                parse_binary_stl(input.file_stem().unwrap_or("mesh"), &bytes)
            })
            .collect::<Result<Vec<Mesh>, ServiceError>>()?;

        let file = std::fs::File::create(output)?;
        let written = write_3mf(std::io::BufWriter::new(file), &meshes);
        if written.is_err() {
            let _ = std::fs::remove_file(output);
        }
        written
    }
}

#[async_trait]
impl GeometryConverter for BuiltinStlConverter {
    async fn convert(&self, inputs: &[Utf8PathBuf], output: &Utf8Path) -> ConversionOutcome {
        let inputs = inputs.to_vec();
        let output = output.to_path_buf();

        let result = tokio::task::spawn_blocking(move || Self::convert_blocking(&inputs, &output))
            .await
            .unwrap_or_else(|e| {
                Err(ServiceError::InvalidGeometry(format!("converter panicked: {e}")))
            });

        if let Err(e) = &result {
            tracing::debug!("Built-in STL conversion failed: {}", e);
        }
        ConversionOutcome::from_result(result)
    }
}

/// Tries each converter in order; the first success wins.
pub struct ChainedGeometryConverter {
    converters: Vec<Arc<dyn GeometryConverter>>,
}

impl ChainedGeometryConverter {
    pub fn new(converters: Vec<Arc<dyn GeometryConverter>>) -> Self {
        Self { converters }
    }
}

#[async_trait]
impl GeometryConverter for ChainedGeometryConverter {
    async fn convert(&self, inputs: &[Utf8PathBuf], output: &Utf8Path) -> ConversionOutcome {
        let mut reasons = Vec::new();
        for converter in &self.converters {
            match converter.convert(inputs, output).await {
                ConversionOutcome::Converted => return ConversionOutcome::Converted,
                ConversionOutcome::Failed(reason) => reasons.push(reason),
            }
        }

        if reasons.is_empty() {
            ConversionOutcome::Failed("no geometry converter configured".to_string())
        } else {
            ConversionOutcome::Failed(reasons.join("; "))
        }
    }
}

pub(crate) fn non_empty_file(path: &Utf8Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mesh::tests::{binary_stl, square};
    use crate::services::runner::{CommandOutput, MockCommandRunner};
    use tempfile::TempDir;

    fn utf8_dir(temp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_external_args() {
        let args = ExternalGeometryConverter::build_args(
            &[Utf8PathBuf::from("/in/a.stl"), Utf8PathBuf::from("/in/b.stl")],
            Utf8Path::new("/out/a.3mf"),
        );
        assert_eq!(
            args,
            vec!["--input", "/in/a.stl", "--input", "/in/b.stl", "--output", "/out/a.3mf"]
        );
    }

    #[tokio::test]
    async fn test_external_missing_output_is_failure() {
        let temp = TempDir::new().unwrap();
        let out = utf8_dir(&temp).join("model.3mf");

        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(1).returning(|_, _, _| {
            Ok(CommandOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                duration: Duration::ZERO,
            })
        });

        let converter =
            ExternalGeometryConverter::new("stl2threemf", Arc::new(runner), Duration::from_secs(1));
        let outcome = converter.convert(&[Utf8PathBuf::from("/in/a.stl")], &out).await;
        assert!(
            matches!(outcome, ConversionOutcome::Failed(reason) if reason.contains("not produced"))
        );
    }

    #[tokio::test]
    async fn test_external_timeout_is_failure() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, _, d| Err(ServiceError::Timeout(d)));

        let converter =
            ExternalGeometryConverter::new("stl2threemf", Arc::new(runner), Duration::from_secs(2));
        let outcome = converter
            .convert(&[Utf8PathBuf::from("/in/a.stl")], Utf8Path::new("/out/a.3mf"))
            .await;
        assert!(matches!(outcome, ConversionOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_builtin_converts_binary_stl() {
        let temp = TempDir::new().unwrap();
        let dir = utf8_dir(&temp);
        let a = dir.join("a.stl");
        let b = dir.join("b.stl");
        std::fs::write(&a, binary_stl(&square())).unwrap();
        std::fs::write(&b, binary_stl(&square())).unwrap();

        let out = dir.join("out.3mf");
        let outcome = BuiltinStlConverter.convert(&[a, b], &out).await;

        assert_eq!(outcome, ConversionOutcome::Converted);
        assert!(non_empty_file(&out));
    }

    #[tokio::test]
    async fn test_builtin_rejects_ascii_and_leaves_no_output() {
        let temp = TempDir::new().unwrap();
        let dir = utf8_dir(&temp);
        let a = dir.join("a.stl");
        std::fs::write(&a, "solid a\nendsolid a\n").unwrap();

        let out = dir.join("out.3mf");
        let outcome = BuiltinStlConverter.convert(&[a], &out).await;

        assert!(matches!(outcome, ConversionOutcome::Failed(_)));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_chain_falls_through() {
        let mut first = MockGeometryConverter::new();
        first
            .expect_convert()
            .times(1)
            .returning(|_, _| ConversionOutcome::Failed("external down".to_string()));
        let mut second = MockGeometryConverter::new();
        second
            .expect_convert()
            .times(1)
            .returning(|_, _| ConversionOutcome::Converted);

        let chain = ChainedGeometryConverter::new(vec![Arc::new(first), Arc::new(second)]);
        let outcome = chain
            .convert(&[Utf8PathBuf::from("a.stl")], Utf8Path::new("a.3mf"))
            .await;
        assert_eq!(outcome, ConversionOutcome::Converted);
    }

    #[tokio::test]
    async fn test_empty_chain_fails() {
        let chain = ChainedGeometryConverter::new(Vec::new());
        let outcome = chain.convert(&[], Utf8Path::new("a.3mf")).await;
        assert!(matches!(outcome, ConversionOutcome::Failed(_)));
    }
}
