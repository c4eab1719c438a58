//! Shell Bridge
//!
//! Runs external management scripts as argument vectors with a hard
//! wall-clock timeout. Arguments are never joined into a shell string, so
//! usernames and UUIDs arriving from chat input cannot inject commands.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Shell bridge errors
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("failed to launch {program}: {reason}")]
    Launch { program: String, reason: String },
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
}

/// Captured result of a finished subprocess
#[derive(Debug, Clone)]
pub struct ShellOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes external commands as argv vectors with captured output.
#[derive(Debug, Clone)]
pub struct ShellBridge {
    default_timeout: Duration,
}

impl ShellBridge {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    /// Run `argv[0]` with `argv[1..]` as literal arguments.
    ///
    /// Non-zero exit is not an error here; callers inspect the exit code.
    /// A single invocation per call, no retries.
    pub async fn run(&self, argv: &[String]) -> Result<ShellOutput, ShellError> {
        self.run_with_timeout(argv, self.default_timeout).await
    }

    pub async fn run_with_timeout(
        &self,
        argv: &[String],
        timeout: Duration,
    ) -> Result<ShellOutput, ShellError> {
        let (program, args) = argv.split_first().ok_or_else(|| ShellError::Launch {
            program: "<empty>".to_string(),
            reason: "empty argument vector".to_string(),
        })?;

        debug!("Executing: {:?} (timeout {:?})", argv, timeout);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ShellError::Launch {
                program: program.clone(),
                reason: e.to_string(),
            })?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                Ok(ShellOutput {
                    exit_code,
                    stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                })
            }
            Ok(Err(e)) => Err(ShellError::Launch {
                program: program.clone(),
                reason: format!("wait failed: {}", e),
            }),
            Err(_) => {
                // kill_on_drop reaps the child once the future is dropped
                warn!("Command {:?} exceeded {:?}, killing", program, timeout);
                Err(ShellError::Timeout(timeout))
            }
        }
    }
}

/// Build the canonical argv for a management script invocation:
/// `["bash", <scripts_dir>/<script>, <subcommand>, args...]`.
pub fn script_argv(
    scripts_dir: &Path,
    script: &str,
    subcommand: &str,
    args: &[String],
) -> Vec<String> {
    let mut argv = vec![
        "bash".to_string(),
        scripts_dir.join(script).display().to_string(),
        subcommand.to_string(),
    ];
    argv.extend(args.iter().cloned());
    argv
}
