use crate::services::geometry::{ConversionOutcome, non_empty_file};
use crate::services::{CommandRunner, ServiceError};
use async_trait::async_trait;
use camino::Utf8Path;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

/// Media type of the standard image form
pub const STANDARD_IMAGE_MEDIA_TYPE: &str = "image/webp";
pub const STANDARD_IMAGE_EXTENSION: &str = "webp";

/// Produces the standard (WebP) form of a preview image.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ImageConverter: Send + Sync {
    async fn to_standard_image(&self, input: &Utf8Path, output: &Utf8Path) -> ConversionOutcome;
}

/// `cwebp -quiet -q 80 <in> -o <out>` or a compatible command.
pub struct ExternalImageConverter {
    program: Option<String>,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl ExternalImageConverter {
    pub fn new(program: Option<String>, runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            program,
            runner,
            timeout,
        }
    }
}

#[async_trait]
impl ImageConverter for ExternalImageConverter {
    async fn to_standard_image(&self, input: &Utf8Path, output: &Utf8Path) -> ConversionOutcome {
        let Some(program) = &self.program else {
            return ConversionOutcome::Failed("no image converter configured".to_string());
        };

        let args: Vec<String> = vec![
            "-quiet".into(),
            "-q".into(),
            "80".into(),
            input.to_string(),
            "-o".into(),
            output.to_string(),
        ];

        let result = match self.runner.run(program, &args, self.timeout).await {
            Ok(_) if non_empty_file(output) => Ok(()),
            Ok(_) => Err(ServiceError::OutputMissing(output.to_path_buf())),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            tracing::warn!("Image conversion of {} failed: {}", input, e);
        }
        ConversionOutcome::from_result(result)
    }
}
