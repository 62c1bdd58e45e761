use crate::services::ServiceError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

#[cfg(test)]
use mockall::automock;

/// Captured result of a finished subprocess
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Runs external programs with a hard time bound.
///
/// Converters go through this seam so tests can swap in a mock.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout_duration: Duration,
    ) -> Result<CommandOutput, ServiceError>;
}

/// [`CommandRunner`] backed by `tokio::process`.
///
/// The child is killed when the timeout elapses (`kill_on_drop`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout_duration: Duration,
    ) -> Result<CommandOutput, ServiceError> {
        tracing::debug!("Executing: {} {}", program, args.join(" "));

        let start = Instant::now();

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ServiceError::CommandNotFound(program.to_string()),
                _ => ServiceError::Io(e),
            })?;

        let output = timeout(timeout_duration, child.wait_with_output())
            .await
            .map_err(|_| {
                tracing::warn!("{} timed out after {:?}", program, timeout_duration);
                ServiceError::Timeout(timeout_duration)
            })??;

        let duration = start.elapsed();
        let exit_code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        tracing::debug!(
            "{} completed in {:.2}s with exit code {}",
            program,
            duration.as_secs_f32(),
            exit_code
        );

        if !output.status.success() {
            return Err(ServiceError::ProcessFailed {
                code: output.status.code(),
                stderr,
            });
        }

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
            duration,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_successful_command() {
        let output = TokioCommandRunner
            .run("sh", &args(&["-c", "echo hello"]), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_process_failed() {
        let err = TokioCommandRunner
            .run("sh", &args(&["-c", "echo nope >&2; exit 3"]), Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            ServiceError::ProcessFailed { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let err = TokioCommandRunner
            .run("sleep", &args(&["5"]), Duration::from_millis(100))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Timeout(d) if d == Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = TokioCommandRunner
            .run("definitely-not-a-real-binary-xyz", &[], Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::CommandNotFound(_)));
    }
}
