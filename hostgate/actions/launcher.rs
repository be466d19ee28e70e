use std::{
    process::Stdio,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;
use tokio::{process::Command, time::timeout};
use tracing::debug;

/// Program invocation handed to a launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable.
    pub program: String,
    /// Arguments, passed verbatim.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: IndexMap<String, String>,
    /// Hard deadline; the child is killed when it expires.
    pub timeout: Duration,
}

impl CommandSpec {
    /// Creates a spec without extra environment.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            env: IndexMap::new(),
            timeout,
        }
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Program followed by its arguments.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    /// Standard output, decoded leniently.
    pub stdout: String,
    /// Standard error, decoded leniently.
    pub stderr: String,
    /// Wall time.
    pub duration: Duration,
}

/// Failures that prevent a process from producing output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LaunchError {
    /// The program could not be started.
    #[error("failed to start {program}: {reason}")]
    Spawn {
        /// Program name.
        program: String,
        /// OS error text.
        reason: String,
    },
    /// The process outlived its deadline and was killed.
    #[error("{program} timed out after {}s and was killed", .timeout.as_secs_f64())]
    Timeout {
        /// Program name.
        program: String,
        /// Deadline that expired.
        timeout: Duration,
    },
    /// Output could not be collected.
    #[error("failed to collect output of {program}: {reason}")]
    Io {
        /// Program name.
        program: String,
        /// OS error text.
        reason: String,
    },
}

/// Runs host programs.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Runs `spec` to completion or until its deadline.
    async fn launch(&self, spec: CommandSpec) -> Result<ProcessOutput, LaunchError>;
}

/// Launcher backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessLauncher;

#[async_trait]
impl ProcessLauncher for TokioProcessLauncher {
    async fn launch(&self, spec: CommandSpec) -> Result<ProcessOutput, LaunchError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|err| LaunchError::Spawn {
            program: spec.program.clone(),
            reason: err.to_string(),
        })?;
        debug!(program = %spec.program, pid = ?child.id(), "process started");

        let start = Instant::now();
        // on timeout the future owning the child is dropped, which kills it
        match timeout(spec.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ProcessOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                duration: start.elapsed(),
            }),
            Ok(Err(err)) => Err(LaunchError::Io {
                program: spec.program,
                reason: err.to_string(),
            }),
            Err(_) => Err(LaunchError::Timeout {
                program: spec.program,
                timeout: spec.timeout,
            }),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> CommandSpec {
        CommandSpec::new("sh", vec!["-c".into(), script.into()], timeout)
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let output = TokioProcessLauncher
            .launch(sh("echo out; echo err >&2; exit 3", Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn passes_environment_without_interpolation() {
        let spec = sh("printf '%s' \"$HOSTGATE_TEST\"", Duration::from_secs(5))
            .with_env("HOSTGATE_TEST", "a; echo injected");
        let output = TokioProcessLauncher.launch(spec).await.unwrap();
        assert_eq!(output.stdout, "a; echo injected");
    }

    #[tokio::test]
    async fn decodes_invalid_utf8_leniently() {
        let output = TokioProcessLauncher
            .launch(sh("printf 'ok\\377'", Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(output.stdout.starts_with("ok"));
        assert!(output.stdout.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn times_out_and_kills() {
        let started = Instant::now();
        let err = TokioProcessLauncher
            .launch(sh("sleep 5", Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = TokioProcessLauncher
            .launch(CommandSpec::new(
                "/nonexistent/hostgate-binary",
                Vec::new(),
                Duration::from_secs(1),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
    }
}
