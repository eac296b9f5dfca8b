use super::args::{optional_bool, optional_str, optional_usize, required_str};
use super::{Tool, Workspace};
use crate::error::ToolExecutionError;
use crate::types::ToolArguments;
use anyhow::Context;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

const MAX_TREE_ENTRIES: usize = 2_000;

pub struct ReadFileTool {
    workspace: Workspace,
}

impl ReadFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file or a 1-indexed, inclusive line range of it."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The file path to read" },
                "start_line": { "type": "integer", "minimum": 1 },
                "end_line": { "type": "integer", "minimum": 1 }
            },
            "required": ["path"]
        })
    }

    fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolExecutionError> {
        let path = required_str(arguments, self.name(), "path")?;
        let resolved = self.workspace.resolve(path)?;
        if !resolved.is_file() {
            return Err(ToolExecutionError::new(format!("File not found: {path}")));
        }
        let content = fs::read_to_string(&resolved)
            .with_context(|| format!("Failed to read {path}"))?;

        let start_line = optional_usize(arguments, "start_line");
        let end_line = optional_usize(arguments, "end_line");
        if start_line.is_none() && end_line.is_none() {
            return Ok(content);
        }

        let lines: Vec<&str> = content.split('\n').collect();
        let start = start_line.unwrap_or(1).saturating_sub(1).min(lines.len());
        let end = end_line.unwrap_or(lines.len()).clamp(start, lines.len());
        Ok(lines[start..end].join("\n"))
    }
}

pub struct WriteFileTool {
    workspace: Workspace,
}

impl WriteFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it and its parent directories if needed."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The file path to write to" },
                "content": { "type": "string", "description": "The content to write" }
            },
            "required": ["path", "content"]
        })
    }

    fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolExecutionError> {
        let path = required_str(arguments, self.name(), "path")?;
        let content = required_str(arguments, self.name(), "content")?;
        let resolved = self.workspace.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).context("Failed to create parent directory")?;
        }
        fs::write(&resolved, content).with_context(|| format!("Failed to write {path}"))?;
        Ok(format!("Successfully wrote to {path}"))
    }
}

pub struct EditFileTool {
    workspace: Workspace,
}

impl EditFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing one exact, unique snippet (old_content -> new_content)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The file path to edit" },
                "old_content": { "type": "string", "description": "The content to replace" },
                "new_content": { "type": "string", "description": "The new content" }
            },
            "required": ["path", "old_content", "new_content"]
        })
    }

    fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolExecutionError> {
        let path = required_str(arguments, self.name(), "path")?;
        let old_content = required_str(arguments, self.name(), "old_content")?;
        let new_content = required_str(arguments, self.name(), "new_content")?;
        if old_content.is_empty() {
            return Err(ToolExecutionError::new(
                "edit_file requires a non-empty old_content",
            ));
        }

        let resolved = self.workspace.resolve(path)?;
        if !resolved.is_file() {
            return Err(ToolExecutionError::new(format!("File not found: {path}")));
        }
        let content = fs::read_to_string(&resolved)
            .with_context(|| format!("Failed to read {path}"))?;

        match content.matches(old_content).count() {
            0 => Err(ToolExecutionError::new(format!(
                "Content to replace not found in {path}"
            ))),
            1 => {
                let updated = content.replacen(old_content, new_content, 1);
                fs::write(&resolved, updated)
                    .with_context(|| format!("Failed to edit {path}"))?;
                Ok(format!("Successfully edited {path}"))
            }
            occurrences => Err(ToolExecutionError::new(format!(
                "Content to replace appears {occurrences} times in {path}; must be unique"
            ))),
        }
    }
}

pub struct ListDirectoryTool {
    workspace: Workspace,
}

impl ListDirectoryTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the contents of a directory as a tree, optionally recursively."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "default": "." },
                "recursive": { "type": "boolean", "default": false }
            }
        })
    }

    fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolExecutionError> {
        let path = optional_str(arguments, "path").unwrap_or(".");
        let recursive = optional_bool(arguments, "recursive", false);
        let root = self.workspace.resolve(path)?;
        if !root.is_dir() {
            return Err(ToolExecutionError::new(format!(
                "Directory not found: {path}"
            )));
        }

        let mut lines = vec![self.workspace.display(&root)];
        let top_level = root == self.workspace.root();
        format_tree(&root, "", recursive, top_level, &mut lines)?;
        Ok(lines.join("\n"))
    }
}

fn format_tree(
    dir: &Path,
    prefix: &str,
    recursive: bool,
    top_level: bool,
    lines: &mut Vec<String>,
) -> Result<(), ToolExecutionError> {
    let mut entries: Vec<(bool, String)> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            if should_skip_entry(&name, top_level) {
                return None;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            Some((is_dir, name))
        })
        .collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let count = entries.len();
    for (index, (is_dir, name)) in entries.into_iter().enumerate() {
        if lines.len() >= MAX_TREE_ENTRIES {
            lines.push(format!("{prefix}... (truncated)"));
            return Ok(());
        }
        let is_last = index + 1 == count;
        let connector = if is_last { "└── " } else { "├── " };
        lines.push(format!("{prefix}{connector}{name}"));

        if is_dir && recursive {
            let extension = if is_last { "    " } else { "│   " };
            format_tree(
                &dir.join(&name),
                &format!("{prefix}{extension}"),
                recursive,
                false,
                lines,
            )?;
        }
    }
    Ok(())
}

fn should_skip_entry(name: &str, top_level: bool) -> bool {
    if name.starts_with('.') {
        return true;
    }

    top_level
        && matches!(
            name,
            "target" | "node_modules" | "__pycache__" | "venv" | "build" | "dist"
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(value: Value) -> ToolArguments {
        value.as_object().cloned().unwrap_or_default()
    }

    fn workspace(temp: &TempDir) -> Workspace {
        Workspace::new(temp.path().to_path_buf())
    }

    #[test]
    fn test_read_file_line_window_is_inclusive() {
        let temp = TempDir::new().expect("temp dir");
        fs::write(temp.path().join("notes.txt"), "one\ntwo\nthree\nfour").unwrap();
        let tool = ReadFileTool::new(workspace(&temp));

        let window = tool
            .invoke(&args(json!({"path": "notes.txt", "start_line": 2, "end_line": 3})))
            .expect("read window");
        assert_eq!(window, "two\nthree");

        let tail = tool
            .invoke(&args(json!({"path": "notes.txt", "start_line": 4})))
            .expect("read tail");
        assert_eq!(tail, "four");
    }

    #[test]
    fn test_read_missing_file_reports_not_found() {
        let temp = TempDir::new().expect("temp dir");
        let err = ReadFileTool::new(workspace(&temp))
            .invoke(&args(json!({"path": "missing.rs"})))
            .unwrap_err();
        assert!(err.message.contains("File not found: missing.rs"));
    }

    #[test]
    fn test_write_then_edit_unique_snippet() {
        let temp = TempDir::new().expect("temp dir");
        let ws = workspace(&temp);
        WriteFileTool::new(ws.clone())
            .invoke(&args(json!({"path": "src/main.rs", "content": "fn main() {}\n"})))
            .expect("write nested file");

        let edited = EditFileTool::new(ws)
            .invoke(&args(json!({
                "path": "src/main.rs",
                "old_content": "fn main() {}",
                "new_content": "fn main() { println!(\"hi\"); }"
            })))
            .expect("edit");
        assert_eq!(edited, "Successfully edited src/main.rs");
        assert!(fs::read_to_string(temp.path().join("src/main.rs"))
            .unwrap()
            .contains("println!"));
    }

    #[test]
    fn test_edit_rejects_ambiguous_snippet() {
        let temp = TempDir::new().expect("temp dir");
        fs::write(temp.path().join("test.txt"), "foo\nfoo\n").unwrap();

        let err = EditFileTool::new(workspace(&temp))
            .invoke(&args(json!({"path": "test.txt", "old_content": "foo", "new_content": "bar"})))
            .unwrap_err();
        assert!(err.message.contains("appears 2 times"));
    }

    #[test]
    fn test_list_directory_renders_tree_with_dirs_first() {
        let temp = TempDir::new().expect("temp dir");
        fs::create_dir_all(temp.path().join("src/nested")).unwrap();
        fs::write(temp.path().join("src/lib.rs"), "").unwrap();
        fs::write(temp.path().join("README.md"), "").unwrap();
        fs::write(temp.path().join(".hidden"), "").unwrap();
        let tool = ListDirectoryTool::new(workspace(&temp));

        let flat = tool.invoke(&args(json!({}))).expect("flat listing");
        assert_eq!(flat, ".\n├── src\n└── README.md");

        let tree = tool
            .invoke(&args(json!({"recursive": true})))
            .expect("recursive listing");
        assert_eq!(
            tree,
            ".\n├── src\n│   ├── nested\n│   └── lib.rs\n└── README.md"
        );
    }

    #[test]
    fn test_list_directory_traversal_blocked() {
        let temp = TempDir::new().expect("temp dir");
        let result = ListDirectoryTool::new(workspace(&temp)).invoke(&args(json!({"path": "../"})));
        assert!(result.is_err(), "Path traversal should be rejected");
    }
}
