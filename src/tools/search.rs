use super::args::{optional_str, optional_usize, required_str};
use super::{Tool, Workspace};
use crate::error::ToolExecutionError;
use crate::types::ToolArguments;
use anyhow::Context;
use regex::Regex;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_MAX_RESULTS: usize = 100;

pub struct SearchCodeTool {
    workspace: Workspace,
}

impl SearchCodeTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

impl Tool for SearchCodeTool {
    fn name(&self) -> &str {
        "search_code"
    }

    fn description(&self) -> &str {
        "Search code files for a regex pattern and return matching lines as path:line: text."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "The pattern to search for (regex)" },
                "path": { "type": "string", "default": "." },
                "file_type": { "type": "string", "description": "Optional extension filter, e.g. 'rs'" },
                "max_results": { "type": "integer", "minimum": 1, "maximum": 500 }
            },
            "required": ["pattern"]
        })
    }

    fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolExecutionError> {
        let pattern = required_str(arguments, self.name(), "pattern")?;
        let path = optional_str(arguments, "path").unwrap_or(".");
        let file_type = optional_str(arguments, "file_type")
            .map(|ext| ext.trim().trim_start_matches('.'))
            .filter(|ext| !ext.is_empty());
        let max_results = optional_usize(arguments, "max_results")
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, 500);

        let matcher = Regex::new(pattern)
            .map_err(|e| ToolExecutionError::new(format!("Invalid pattern '{pattern}': {e}")))?;
        let root = self.workspace.resolve(path)?;
        if !root.exists() {
            return Err(ToolExecutionError::new(format!("Path not found: {path}")));
        }

        let mut files = Vec::new();
        collect_files(&root, &mut files)?;

        let mut results = Vec::new();
        'files: for file in files {
            if let Some(ext) = file_type {
                if file.extension().and_then(|e| e.to_str()) != Some(ext) {
                    continue;
                }
            }
            let Ok(bytes) = fs::read(&file) else {
                continue;
            };
            let content = String::from_utf8_lossy(&bytes);
            for (index, line) in content.lines().enumerate() {
                if matcher.is_match(line) {
                    results.push(format!(
                        "{}:{}: {}",
                        self.workspace.display(&file),
                        index + 1,
                        line.trim()
                    ));
                    if results.len() >= max_results {
                        break 'files;
                    }
                }
            }
        }

        if results.is_empty() {
            Ok("No matches found".to_string())
        } else {
            Ok(results.join("\n"))
        }
    }
}

fn collect_files(path: &Path, out: &mut Vec<PathBuf>) -> Result<(), ToolExecutionError> {
    if path.is_file() {
        out.push(path.to_path_buf());
        return Ok(());
    }

    let mut children: Vec<PathBuf> = fs::read_dir(path)
        .with_context(|| format!("Failed to read directory {}", path.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .map(|entry| entry.path())
        .collect();
    children.sort();

    for child in children {
        if child.is_dir() {
            collect_files(&child, out)?;
        } else if child.is_file() {
            out.push(child);
        }
    }
    Ok(())
}
