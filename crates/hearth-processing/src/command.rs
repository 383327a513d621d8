//! Bounded execution of external codec processes.

use std::ffi::OsString;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::ProcessingError;

/// Reject program paths containing shell metacharacters or traversal.
pub fn validate_program(program: &str) -> Result<(), ProcessingError> {
    if program.trim().is_empty() {
        return Err(ProcessingError::InvalidProgram("program path is empty".to_string()));
    }
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if program.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(ProcessingError::InvalidProgram(format!(
            "contains dangerous characters: {}",
            program
        )));
    }
    if program.contains("..") {
        return Err(ProcessingError::InvalidProgram(format!(
            "contains directory traversal: {}",
            program
        )));
    }
    Ok(())
}

/// Runs a program to completion, killing it if it outlives `timeout`.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Result<Self, ProcessingError> {
        let program = program.into();
        validate_program(&program)?;
        Ok(Self { program, timeout })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run with `args`. A non-zero exit fails with the combined stdout and
    /// stderr. On timeout the child is killed and `CommandTimeout` returned.
    #[tracing::instrument(skip(self, args), fields(
        process.executable.path = %self.program,
        timeout_secs = self.timeout.as_secs()
    ))]
    pub async fn run(&self, args: &[OsString]) -> Result<(), ProcessingError> {
        let start = std::time::Instant::now();

        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessingError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ProcessingError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                tracing::warn!(
                    program = %self.program,
                    timeout_secs = self.timeout.as_secs(),
                    "External process timed out and was killed"
                );
                return Err(ProcessingError::CommandTimeout {
                    program: self.program.clone(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(ProcessingError::CommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                output: combined.trim().to_string(),
            });
        }

        tracing::debug!(
            program = %self.program,
            duration_ms = start.elapsed().as_millis() as u64,
            "External process finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_program() {
        assert!(validate_program("ffmpeg").is_ok());
        assert!(validate_program("/usr/local/bin/heif-convert").is_ok());
        assert!(validate_program("ffmpeg; rm -rf /").is_err());
        assert!(validate_program("$(whoami)").is_err());
        assert!(validate_program("../bin/ffmpeg").is_err());
        assert!(validate_program("  ").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_success() {
        let runner = CommandRunner::new("true", Duration::from_secs(5)).unwrap();
        runner.run(&[]).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_failure_includes_output() {
        let runner = CommandRunner::new("sh", Duration::from_secs(5)).unwrap();
        let args: Vec<OsString> = vec!["-c".into(), "echo decoder exploded >&2; exit 3".into()];
        let err = runner.run(&args).await.unwrap_err();
        match err {
            ProcessingError::CommandFailed { output, .. } => {
                assert!(output.contains("decoder exploded"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_timeout_kills_process() {
        let runner = CommandRunner::new("sleep", Duration::from_millis(100)).unwrap();
        let start = std::time::Instant::now();
        let err = runner.run(&["10".into()]).await.unwrap_err();
        assert!(matches!(err, ProcessingError::CommandTimeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let runner =
            CommandRunner::new("hearth-no-such-binary", Duration::from_secs(1)).unwrap();
        let err = runner.run(&[]).await.unwrap_err();
        assert!(matches!(err, ProcessingError::Spawn { .. }));
    }
}
