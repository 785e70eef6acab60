//! Shell command execution utilities for cfgmgr daemons.
//!
//! Service lifecycle commands (restart of rsyslog and friends) go through
//! here.
//!
//! # Example
//!
//! ```ignore
//! use sonic_cfgmgr_common::shell;
//!
//! let result = shell::exec("systemctl restart rsyslog").await?;
//! ```

use std::process::Stdio;
use tokio::process::Command;

use crate::error::{CfgMgrError, CfgMgrResult};

/// Shell used to run command lines.
pub const SH_CMD: &str = "/bin/sh";

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// The stdout output.
    pub stdout: String,
    /// The stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Runs a command line through `/bin/sh -c`, capturing both streams.
///
/// Returns `Err` only when the command could not be spawned; a non-zero
/// exit code is reported through [`ExecResult::exit_code`].
pub async fn exec(cmd: &str) -> CfgMgrResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let output = Command::new(SH_CMD)
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| CfgMgrError::ShellExec {
            command: cmd.to_string(),
            source: e,
        })?;

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    let result = ExecResult {
        exit_code,
        stdout,
        stderr,
    };

    if result.success() {
        tracing::trace!(command = %cmd, exit_code = exit_code, "Command succeeded");
    } else {
        tracing::warn!(
            command = %cmd,
            exit_code = exit_code,
            stderr = %result.stderr,
            "Command failed"
        );
    }

    Ok(result)
}

/// Executes a shell command and returns an error on non-zero exit.
///
/// Returns the trimmed stdout on success.
pub async fn exec_or_throw(cmd: &str) -> CfgMgrResult<String> {
    let result = exec(cmd).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(CfgMgrError::ShellCommandFailed {
            command: cmd.to_string(),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_result_combined() {
        let result = ExecResult {
            exit_code: 0,
            stdout: "stdout".to_string(),
            stderr: "stderr".to_string(),
        };
        assert!(result.success());
        assert_eq!(result.combined_output(), "stdout\nstderr");

        let failed = ExecResult {
            exit_code: 1,
            stdout: String::new(),
            stderr: "error message".to_string(),
        };
        assert!(!failed.success());
        assert_eq!(failed.combined_output(), "error message");
    }

    #[tokio::test]
    async fn test_exec_echo() {
        let result = exec("echo hello").await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "hello");
    }

    #[tokio::test]
    async fn test_exec_failure() {
        let result = exec("exit 42").await.unwrap();
        assert!(!result.success());
        assert_eq!(result.exit_code, 42);
    }

    #[tokio::test]
    async fn test_exec_or_throw() {
        assert_eq!(exec_or_throw("echo success").await.unwrap(), "success");

        match exec_or_throw("exit 1").await {
            Err(CfgMgrError::ShellCommandFailed { exit_code, .. }) => assert_eq!(exit_code, 1),
            other => panic!("Expected ShellCommandFailed error, got {:?}", other),
        }
    }
}
