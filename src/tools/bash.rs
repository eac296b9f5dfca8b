use super::args::{optional_str, optional_usize, required_str};
use super::{Tool, Workspace};
use crate::error::ToolExecutionError;
use crate::types::ToolArguments;
use anyhow::Context;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::runtime::{Builder, Handle};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 600;

const BLOCKED_PATTERNS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "rm -rf ~",
    "mkfs",
    "dd if=/dev/zero",
    "dd if=/dev/random",
    ":(){ :|:& };:",
    "> /dev/sda",
    "chmod -r 777 /",
];

pub struct RunBashTool {
    workspace: Workspace,
}

impl RunBashTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

impl Tool for RunBashTool {
    fn name(&self) -> &str {
        "run_bash"
    }

    fn description(&self) -> &str {
        "Run a shell command in the workspace and return its output. Killed after `timeout` seconds."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The shell command to run" },
                "working_dir": { "type": "string", "default": "." },
                "timeout": { "type": "integer", "minimum": 1, "maximum": MAX_TIMEOUT_SECS, "default": DEFAULT_TIMEOUT_SECS }
            },
            "required": ["command"]
        })
    }

    fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolExecutionError> {
        let command = required_str(arguments, self.name(), "command")?;
        if let Some(pattern) = blocked_pattern(command) {
            return Err(ToolExecutionError::new(format!(
                "Command blocked for safety (matched '{pattern}')"
            )));
        }
        let dir = self
            .workspace
            .resolve(optional_str(arguments, "working_dir").unwrap_or("."))?;
        let timeout_secs = optional_usize(arguments, "timeout")
            .map(|v| v as u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .clamp(1, MAX_TIMEOUT_SECS);

        let output = run_with_timeout(command, &dir, Duration::from_secs(timeout_secs))?;
        Ok(output)
    }
}

fn blocked_pattern(command: &str) -> Option<&'static str> {
    let normalized = command
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();
    BLOCKED_PATTERNS.iter().copied().find(|pattern| {
        if *pattern == "rm -rf /" {
            // Plain "rm -rf /tmp/x" is allowed; only the bare root is blocked.
            normalized
                .split(['&', ';', '|'])
                .any(|part| part.trim() == "rm -rf /" || part.trim() == "sudo rm -rf /")
        } else {
            normalized.contains(pattern)
        }
    })
}

/// Tools are synchronous, so the async command runs on the ambient runtime
/// when there is one (the dispatcher calls tools from the blocking pool) and
/// on a throwaway current-thread runtime otherwise. Must not be called from
/// an async task directly.
fn run_with_timeout(
    command: &str,
    dir: &Path,
    timeout: Duration,
) -> Result<String, ToolExecutionError> {
    let run = run_command(command, dir, timeout);
    match Handle::try_current() {
        Ok(handle) => handle.block_on(run),
        Err(_) => Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start command runtime")?
            .block_on(run),
    }
}

async fn run_command(
    command: &str,
    dir: &Path,
    timeout: Duration,
) -> Result<String, ToolExecutionError> {
    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("Failed to spawn shell")?;

    // A background job can hold the pipes open after the shell exits, so the
    // deadline covers collecting output too. Dropping the future kills the shell.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.context("Failed to collect command output")?,
        Err(_) => {
            tracing::warn!(command, timeout_secs = timeout.as_secs(), "command timed out");
            return Err(ToolExecutionError::new(format!(
                "Command timed out after {}s",
                timeout.as_secs()
            )));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let mut sections = Vec::new();
    if !stdout.is_empty() {
        sections.push(stdout.into_owned());
    }
    if !stderr.trim().is_empty() {
        sections.push(format!("STDERR:\n{}", stderr.trim_end()));
    }
    if !output.status.success() {
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        sections.push(format!("Exit code: {code}"));
    }

    if sections.is_empty() {
        Ok("(no output)".to_string())
    } else {
        Ok(sections.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    fn bash(temp: &TempDir, input: Value) -> Result<String, ToolExecutionError> {
        RunBashTool::new(Workspace::new(temp.path().to_path_buf()))
            .invoke(input.as_object().expect("object input"))
    }

    #[test]
    fn test_simple_command() {
        let temp = TempDir::new().expect("temp dir");
        assert_eq!(bash(&temp, json!({"command": "echo hello"})).unwrap(), "hello\n");
    }

    #[test]
    fn test_command_runs_in_working_dir() {
        let temp = TempDir::new().expect("temp dir");
        std::fs::write(temp.path().join("test.txt"), "file content").unwrap();
        let out = bash(&temp, json!({"command": "cat test.txt"})).unwrap();
        assert!(out.contains("file content"));
    }

    #[test]
    fn test_failing_command_reports_exit_code_and_stderr() {
        let temp = TempDir::new().expect("temp dir");
        let out = bash(&temp, json!({"command": "ls nonexistent_dir_12345"})).unwrap();
        assert!(out.contains("STDERR:"));
        assert!(out.contains("Exit code:"));
    }

    #[test]
    fn test_dangerous_command_blocked() {
        let temp = TempDir::new().expect("temp dir");
        let err = bash(&temp, json!({"command": "rm -rf /"})).unwrap_err();
        assert!(err.message.contains("blocked"));
        assert!(blocked_pattern("rm -rf /tmp/scratch").is_none());
    }

    #[test]
    fn test_timeout_kills_command() {
        let temp = TempDir::new().expect("temp dir");
        let started = Instant::now();
        let err = bash(&temp, json!({"command": "sleep 5", "timeout": 1})).unwrap_err();
        assert!(err.message.contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_timeout_covers_background_job_holding_stdout() {
        let temp = TempDir::new().expect("temp dir");
        let started = Instant::now();
        let err = bash(&temp, json!({"command": "sleep 6 & echo started", "timeout": 1})).unwrap_err();
        assert!(err.message.contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_runs_on_blocking_pool_of_current_runtime() {
        let temp = TempDir::new().expect("temp dir");
        let tool = RunBashTool::new(Workspace::new(temp.path().to_path_buf()));
        let out = tokio::task::spawn_blocking(move || {
            tool.invoke(json!({"command": "echo pooled"}).as_object().unwrap())
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(out, "pooled\n");
    }
}
