use super::args::{optional_bool, optional_str, optional_usize};
use super::{Tool, Workspace};
use crate::error::ToolExecutionError;
use crate::types::ToolArguments;
use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::path::Path;
use std::process::Command;

fn run_git(dir: &Path, args: &[String]) -> Result<String> {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .context("Failed to execute git command")?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        let details = if stderr.is_empty() { stdout } else { stderr };
        bail!("git {} failed: {}", args.join(" "), details);
    }
    Ok(stdout)
}

fn repo_dir(workspace: &Workspace, arguments: &ToolArguments) -> Result<std::path::PathBuf> {
    let dir = workspace.resolve(optional_str(arguments, "path").unwrap_or("."))?;
    if !dir.is_dir() {
        bail!("Directory not found: {}", dir.display());
    }
    Ok(dir)
}

fn path_only_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "path": { "type": "string", "default": "." }
        }
    })
}

pub struct GitStatusTool {
    workspace: Workspace,
}

impl GitStatusTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

impl Tool for GitStatusTool {
    fn name(&self) -> &str {
        "git_status"
    }

    fn description(&self) -> &str {
        "Show the current branch and modified, staged and untracked files."
    }

    fn input_schema(&self) -> Value {
        path_only_schema()
    }

    fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolExecutionError> {
        let dir = repo_dir(&self.workspace, arguments)?;
        let raw = run_git(
            &dir,
            &["status".into(), "--short".into(), "--branch".into()],
        )?;
        Ok(format_status(&raw))
    }
}

fn format_status(raw: &str) -> String {
    let mut lines = raw.lines();
    let branch = lines
        .next()
        .and_then(|header| header.strip_prefix("## "))
        .map(|header| header.split("...").next().unwrap_or(header).to_string())
        .unwrap_or_else(|| "(unknown)".to_string());

    let mut out = vec![format!("Branch: {branch}")];
    let mut changes = 0usize;
    for line in lines {
        let (code, file) = line.split_at(line.len().min(3));
        let label = match code.trim() {
            "??" => "Untracked",
            "M" | "MM" | "AM" => "Modified",
            "A" => "Added",
            "D" => "Deleted",
            "R" => "Renamed",
            _ => "Changed",
        };
        out.push(format!("{label}: {}", file.trim()));
        changes += 1;
    }
    if changes == 0 {
        out.push("Working tree clean".to_string());
    }
    out.join("\n")
}

pub struct GitDiffTool {
    workspace: Workspace,
}

impl GitDiffTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

impl Tool for GitDiffTool {
    fn name(&self) -> &str {
        "git_diff"
    }

    fn description(&self) -> &str {
        "Show the git diff of the working tree, or of staged changes when staged=true."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "default": "." },
                "staged": { "type": "boolean", "default": false }
            }
        })
    }

    fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolExecutionError> {
        let dir = repo_dir(&self.workspace, arguments)?;
        let mut args = vec!["diff".to_string()];
        if optional_bool(arguments, "staged", false) {
            args.push("--cached".to_string());
        }
        let diff = run_git(&dir, &args)?;
        if diff.trim().is_empty() {
            Ok("No changes".to_string())
        } else {
            Ok(diff)
        }
    }
}

pub struct GitLogTool {
    workspace: Workspace,
}

impl GitLogTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

impl Tool for GitLogTool {
    fn name(&self) -> &str {
        "git_log"
    }

    fn description(&self) -> &str {
        "Show recent commits, one line each."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "default": "." },
                "limit": { "type": "integer", "minimum": 1, "maximum": 100, "default": 10 }
            }
        })
    }

    fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolExecutionError> {
        let dir = repo_dir(&self.workspace, arguments)?;
        let limit = optional_usize(arguments, "limit").unwrap_or(10).clamp(1, 100);
        let log = run_git(&dir, &["log".into(), "--oneline".into(), format!("-n{limit}")])?;
        if log.is_empty() {
            Ok("No commits".to_string())
        } else {
            Ok(log)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_status_labels_entries() {
        let raw = "## main...origin/main\n M README.md\n?? new_file.txt";
        assert_eq!(
            format_status(raw),
            "Branch: main\nModified: README.md\nUntracked: new_file.txt"
        );
    }

    #[test]
    fn test_format_status_clean_tree() {
        assert_eq!(
            format_status("## No commits yet on main"),
            "Branch: No commits yet on main\nWorking tree clean"
        );
    }
}
