//! Shell command execution.
//!
//! Commands run in the workspace with a timeout and the environment
//! assembled from exposable secrets. A non-zero exit status is an ordinary
//! result (the agent reads it and reacts); spawn failures and timeouts are
//! tool errors.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use super::{Tool, ToolContext, ToolError};

/// Name under which the shell tool registers (and the approval allow-list
/// entry guarding it).
pub const SHELL_TOOL_NAME: &str = "shell";

/// Interrupt action title for shell approval requests.
pub const SHELL_APPROVAL_ACTION: &str = "Approve Shell Command";

/// Default command timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Command prefixes refused outright.
const DANGEROUS_PATTERNS: &[(&str, &str)] = &[
    ("rm -rf /", "This would destroy the entire system"),
    ("rm -rf /*", "This would destroy the entire system"),
    ("> /dev/", "Writing to device files is blocked"),
    ("dd if=/dev/", "Direct disk operations are blocked"),
    ("mkfs", "Formatting filesystems is blocked"),
];

/// Sanitize command output for model consumption: drop binary garbage while
/// preserving valid text.
fn sanitize_output(bytes: &[u8]) -> String {
    let non_printable = bytes
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t')
        .count();
    if bytes.len() > 100 && non_printable > bytes.len() / 10 {
        return format!(
            "[Binary output detected - {} bytes, {}% non-printable]",
            bytes.len(),
            non_printable * 100 / bytes.len()
        );
    }
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|&c| c == '\n' || c == '\r' || c == '\t' || (c >= ' ' && c != '\u{FFFD}'))
        .collect()
}

fn validate_command(cmd: &str) -> Result<(), ToolError> {
    let trimmed = cmd.trim();
    for (pattern, reason) in DANGEROUS_PATTERNS {
        let hit = trimmed.starts_with(pattern)
            || ["sudo ", "time ", "nice ", "nohup "]
                .iter()
                .any(|prefix| trimmed.strip_prefix(prefix).is_some_and(|rest| rest.starts_with(pattern)));
        if hit {
            return Err(ToolError::Blocked {
                reason: format!("dangerous command pattern '{pattern}': {reason}"),
            });
        }
    }
    Ok(())
}

/// Shell execution tool.
pub struct Shell {
    timeout: Duration,
}

impl Default for Shell {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Shell {
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Tool for Shell {
    fn name(&self) -> &str {
        SHELL_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Run a shell command in the workspace. Returns exit status, stdout \
         and stderr. Commands are killed after the timeout."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to run with `sh -c`."
                },
                "workdir": {
                    "type": "string",
                    "description": "Optional: working directory, relative to the workspace."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let command = args["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArgs("missing 'command' argument".into()))?;
        validate_command(command)?;

        let workdir = match args["workdir"].as_str() {
            Some(dir) => ctx.workspace.resolve(dir)?,
            None => ctx.workspace.root().to_path_buf(),
        };

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &ctx.env {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|e| ToolError::ExecutionFailed {
            message: format!("failed to spawn '{command}': {e}"),
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ToolError::Timeout {
                seconds: self.timeout.as_secs(),
            })??;

        let stdout = sanitize_output(&output.stdout);
        let stderr = sanitize_output(&output.stderr);
        let exit = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "killed".to_string());

        let mut result = format!("exit code: {exit}");
        if !stdout.is_empty() {
            result.push_str("\nstdout:\n");
            result.push_str(&stdout);
        }
        if !stderr.is_empty() {
            result.push_str("\nstderr:\n");
            result.push_str(&stderr);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dangerous_patterns_are_blocked() {
        assert!(validate_command("rm -rf /").is_err());
        assert!(validate_command("sudo rm -rf /").is_err());
        assert!(validate_command("cargo test").is_ok());
    }

    #[test]
    fn binary_output_is_replaced() {
        let bytes: Vec<u8> = (0u8..=255).cycle().take(1000).collect();
        assert!(sanitize_output(&bytes).starts_with("[Binary output detected"));
        assert_eq!(sanitize_output(b"plain text\n"), "plain text\n");
    }
}
