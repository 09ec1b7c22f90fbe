//! Shell command execution utilities for cfgmgr daemons.
//!
//! Commands are built as strings with every variable part passed through
//! [`shellquote`], then run through `/bin/sh -c`. Router-scoped commands
//! are wrapped with `ip netns exec <ns>` via [`netns_wrap`].
//!
//! # Example
//!
//! ```ignore
//! use sonic_cfgmgr_common::shell::{self, IP_CMD, shellquote};
//!
//! let cmd = format!("{} -o -6 addr show dev {}", IP_CMD, shellquote("qg-1"));
//! let result = shell::exec_in_netns(Some("qrouter-1"), &cmd).await?;
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{CfgMgrError, CfgMgrResult};

/// Path to the `ip` command for network interface configuration.
pub const IP_CMD: &str = "/sbin/ip";

/// Shell used to run command strings.
pub const SH_CMD: &str = "/bin/sh";

/// Characters that need escaping inside shell double-quotes:
/// `$`, `` ` ``, `"`, `\` and newline.
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// # Example
///
/// ```
/// use sonic_cfgmgr_common::shell::shellquote;
///
/// assert_eq!(shellquote("qg-1234"), "\"qg-1234\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Prefixes `cmd` with `ip netns exec <namespace>` when a namespace is set.
pub fn netns_wrap(namespace: Option<&str>, cmd: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => {
            format!("{} netns exec {} {}", IP_CMD, shellquote(ns), cmd)
        }
        _ => cmd.to_string(),
    }
}

/// Joins an argument vector into a command string, quoting every argument.
pub fn join_quoted<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(|a| shellquote(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// The trimmed stdout output.
    pub stdout: String,
    /// The trimmed stderr output.
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

    /// Converts a non-zero exit into [`CfgMgrError::ShellCommandFailed`].
    pub fn into_output(self, cmd: &str) -> CfgMgrResult<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(CfgMgrError::ShellCommandFailed {
                command: cmd.to_string(),
                exit_code: self.exit_code,
                output: self.combined_output(),
            })
        }
    }
}

/// Executes a shell command asynchronously.
///
/// Only spawn failures are errors; a non-zero exit is reported through
/// [`ExecResult::exit_code`].
pub async fn exec(cmd: &str) -> CfgMgrResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let output = Command::new(SH_CMD)
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| CfgMgrError::ShellExec {
            command: cmd.to_string(),
            source: e,
        })?;

    let exit_code = output.status.code().unwrap_or(-1);
    let result = ExecResult {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };

    if result.success() {
        tracing::trace!(command = %cmd, "Command succeeded");
    } else {
        tracing::debug!(
            command = %cmd,
            exit_code = exit_code,
            stderr = %result.stderr,
            "Command failed"
        );
    }

    Ok(result)
}

/// Executes a shell command and returns an error on non-zero exit.
pub async fn exec_or_throw(cmd: &str) -> CfgMgrResult<String> {
    exec(cmd).await?.into_output(cmd)
}

/// Executes a command inside `namespace` (or the current one if `None`).
pub async fn exec_in_netns(namespace: Option<&str>, cmd: &str) -> CfgMgrResult<ExecResult> {
    exec(&netns_wrap(namespace, cmd)).await
}

/// Executes a command inside `namespace`, failing on non-zero exit.
pub async fn exec_in_netns_or_throw(namespace: Option<&str>, cmd: &str) -> CfgMgrResult<String> {
    let wrapped = netns_wrap(namespace, cmd);
    exec(&wrapped).await?.into_output(&wrapped)
}
