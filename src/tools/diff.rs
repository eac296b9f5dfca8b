use super::args::required_str;
use super::{Tool, Workspace};
use crate::error::ToolExecutionError;
use crate::types::ToolArguments;
use anyhow::Context;
use serde_json::{json, Value};
use std::fs;

const CONTEXT_LINES: usize = 3;
/// Upper bound on LCS table cells, after the common prefix and suffix are trimmed.
const MAX_DIFF_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiffKind {
    Equal,
    Delete,
    Insert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DiffLine<'a> {
    kind: DiffKind,
    text: &'a str,
    old_line: Option<usize>,
    new_line: Option<usize>,
}

/// Line-level unified diff. Returns an empty string when the inputs match,
/// and an error when the differing region is too large to compare.
pub fn unified_diff(
    old: &str,
    new: &str,
    old_label: &str,
    new_label: &str,
) -> Result<String, ToolExecutionError> {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let diff_lines = build_diff_lines(&old_lines, &new_lines)?;
    let hunks = build_hunk_ranges(&diff_lines, CONTEXT_LINES);
    if hunks.is_empty() {
        return Ok(String::new());
    }

    let mut out = format!("--- {old_label}\n+++ {new_label}\n");
    for (start, end) in hunks {
        let hunk = &diff_lines[start..end];
        let old_count = hunk.iter().filter(|l| l.old_line.is_some()).count();
        let new_count = hunk.iter().filter(|l| l.new_line.is_some()).count();
        let old_start = hunk_start(hunk, |l| l.old_line, old_count);
        let new_start = hunk_start(hunk, |l| l.new_line, new_count);
        out.push_str(&format!(
            "@@ -{old_start},{old_count} +{new_start},{new_count} @@\n"
        ));
        for line in hunk {
            let marker = match line.kind {
                DiffKind::Equal => ' ',
                DiffKind::Delete => '-',
                DiffKind::Insert => '+',
            };
            out.push(marker);
            out.push_str(line.text);
            out.push('\n');
        }
    }
    Ok(out)
}

/// Unified-diff convention: an empty side starts at the line *before* the hunk.
fn hunk_start(
    hunk: &[DiffLine<'_>],
    side: impl Fn(&DiffLine<'_>) -> Option<usize>,
    count: usize,
) -> usize {
    match hunk.iter().find_map(&side) {
        Some(first) => first,
        None if count == 0 => hunk
            .iter()
            .find_map(|l| l.old_line.or(l.new_line))
            .map(|n| n.saturating_sub(1))
            .unwrap_or(0),
        None => 1,
    }
}

fn build_diff_lines<'a>(
    old_lines: &[&'a str],
    new_lines: &[&'a str],
) -> Result<Vec<DiffLine<'a>>, ToolExecutionError> {
    let prefix = old_lines
        .iter()
        .zip(new_lines)
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old_lines[prefix..]
        .iter()
        .rev()
        .zip(new_lines[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_mid = &old_lines[prefix..old_lines.len() - suffix];
    let new_mid = &new_lines[prefix..new_lines.len() - suffix];

    let cells = (old_mid.len() + 1).saturating_mul(new_mid.len() + 1);
    if cells > MAX_DIFF_CELLS {
        return Err(ToolExecutionError::new(format!(
            "Files differ in too many lines to diff ({} vs {} changed lines)",
            old_mid.len(),
            new_mid.len()
        )));
    }

    let mut out = Vec::with_capacity(old_lines.len() + new_lines.len());
    for (index, text) in old_lines[..prefix].iter().enumerate() {
        out.push(equal_line(*text, index + 1, index + 1));
    }

    let lcs = build_lcs_matrix(old_mid, new_mid);
    let (mut old_index, mut new_index) = (0usize, 0usize);
    while old_index < old_mid.len() || new_index < new_mid.len() {
        let kind = if old_index < old_mid.len()
            && new_index < new_mid.len()
            && old_mid[old_index] == new_mid[new_index]
        {
            DiffKind::Equal
        } else if new_index >= new_mid.len()
            || (old_index < old_mid.len()
                && lcs[old_index + 1][new_index] >= lcs[old_index][new_index + 1])
        {
            DiffKind::Delete
        } else {
            DiffKind::Insert
        };

        match kind {
            DiffKind::Equal => {
                out.push(equal_line(
                    old_mid[old_index],
                    prefix + old_index + 1,
                    prefix + new_index + 1,
                ));
                old_index += 1;
                new_index += 1;
            }
            DiffKind::Delete => {
                out.push(DiffLine {
                    kind,
                    text: old_mid[old_index],
                    old_line: Some(prefix + old_index + 1),
                    new_line: None,
                });
                old_index += 1;
            }
            DiffKind::Insert => {
                out.push(DiffLine {
                    kind,
                    text: new_mid[new_index],
                    old_line: None,
                    new_line: Some(prefix + new_index + 1),
                });
                new_index += 1;
            }
        }
    }

    let old_tail = old_lines.len() - suffix;
    let new_tail = new_lines.len() - suffix;
    for offset in 0..suffix {
        out.push(equal_line(
            old_lines[old_tail + offset],
            old_tail + offset + 1,
            new_tail + offset + 1,
        ));
    }

    Ok(out)
}

fn equal_line<'a>(text: &'a str, old_line: usize, new_line: usize) -> DiffLine<'a> {
    DiffLine {
        kind: DiffKind::Equal,
        text,
        old_line: Some(old_line),
        new_line: Some(new_line),
    }
}

fn build_lcs_matrix(old_lines: &[&str], new_lines: &[&str]) -> Vec<Vec<usize>> {
    let mut lcs = vec![vec![0usize; new_lines.len() + 1]; old_lines.len() + 1];

    for old_index in (0..old_lines.len()).rev() {
        for new_index in (0..new_lines.len()).rev() {
            lcs[old_index][new_index] = if old_lines[old_index] == new_lines[new_index] {
                lcs[old_index + 1][new_index + 1] + 1
            } else {
                lcs[old_index + 1][new_index].max(lcs[old_index][new_index + 1])
            };
        }
    }

    lcs
}

fn build_hunk_ranges(diff_lines: &[DiffLine<'_>], context_lines: usize) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();

    for (index, line) in diff_lines.iter().enumerate() {
        if line.kind == DiffKind::Equal {
            continue;
        }

        let start = index.saturating_sub(context_lines);
        let end = (index + context_lines + 1).min(diff_lines.len());
        if let Some((_, previous_end)) = ranges.last_mut() {
            if start <= *previous_end {
                *previous_end = (*previous_end).max(end);
                continue;
            }
        }
        ranges.push((start, end));
    }

    ranges
}

pub struct FileDiffTool {
    workspace: Workspace,
}

impl FileDiffTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

impl Tool for FileDiffTool {
    fn name(&self) -> &str {
        "file_diff"
    }

    fn description(&self) -> &str {
        "Show a unified diff between two files."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file1": { "type": "string" },
                "file2": { "type": "string" }
            },
            "required": ["file1", "file2"]
        })
    }

    fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolExecutionError> {
        let file1 = required_str(arguments, self.name(), "file1")?;
        let file2 = required_str(arguments, self.name(), "file2")?;

        let mut contents = Vec::with_capacity(2);
        for path in [file1, file2] {
            let resolved = self.workspace.resolve(path)?;
            if !resolved.is_file() {
                return Err(ToolExecutionError::new(format!("File not found: {path}")));
            }
            contents.push(
                fs::read_to_string(&resolved).with_context(|| format!("Failed to read {path}"))?,
            );
        }

        let diff = unified_diff(&contents[0], &contents[1], file1, file2)?;
        if diff.is_empty() {
            Ok("Files are identical".to_string())
        } else {
            Ok(diff)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unified_diff_single_change() {
        let diff = unified_diff("line 1\nline 2\nline 3\n", "line 1\nmodified line\nline 3\n", "a", "b")
            .unwrap();
        assert_eq!(
            diff,
            "--- a\n+++ b\n@@ -1,3 +1,3 @@\n line 1\n-line 2\n+modified line\n line 3\n"
        );
    }

    #[test]
    fn test_unified_diff_separates_distant_hunks() {
        let old = (1..=20).map(|n| n.to_string()).collect::<Vec<_>>().join("\n");
        let new = old.replacen("2\n", "two\n", 1).replace("19", "nineteen");
        let diff = unified_diff(&old, &new, "a", "b").unwrap();
        assert_eq!(diff.matches("@@ ").count(), 2);
    }

    #[test]
    fn test_unified_diff_insert_into_empty() {
        let diff = unified_diff("", "new line", "a", "b").unwrap();
        assert!(diff.contains("@@ -0,0 +1,1 @@"));
        assert!(diff.contains("+new line"));
    }

    #[test]
    fn test_large_file_with_local_change_is_diffed() {
        let old = (1..=10_000).map(|n| format!("line {n}")).collect::<Vec<_>>().join("\n");
        let new = old.replace("line 5000\n", "changed\n");
        let diff = unified_diff(&old, &new, "a", "b").unwrap();
        assert!(diff.contains("@@ -4997,7 +4997,7 @@"));
        assert!(diff.contains("-line 5000\n+changed\n"));
    }

    #[test]
    fn test_oversized_diff_is_refused() {
        let temp = TempDir::new().expect("temp dir");
        let left = (0..2_500).map(|n| format!("left {n}\n")).collect::<String>();
        let right = (0..2_500).map(|n| format!("right {n}\n")).collect::<String>();
        fs::write(temp.path().join("left.txt"), left).unwrap();
        fs::write(temp.path().join("right.txt"), right).unwrap();
        let tool = FileDiffTool::new(Workspace::new(temp.path().to_path_buf()));

        let input = json!({"file1": "left.txt", "file2": "right.txt"});
        let err = tool.invoke(input.as_object().unwrap()).unwrap_err();
        assert!(err.message.contains("too many lines"));
    }

    #[test]
    fn test_file_diff_tool() {
        let temp = TempDir::new().expect("temp dir");
        fs::write(temp.path().join("file1.txt"), "same content\n").unwrap();
        fs::write(temp.path().join("file2.txt"), "same content\n").unwrap();
        let tool = FileDiffTool::new(Workspace::new(temp.path().to_path_buf()));
        let input = json!({"file1": "file1.txt", "file2": "file2.txt"});

        assert_eq!(
            tool.invoke(input.as_object().unwrap()).unwrap(),
            "Files are identical"
        );

        let missing = json!({"file1": "file1.txt", "file2": "nope.txt"});
        let err = tool.invoke(missing.as_object().unwrap()).unwrap_err();
        assert!(err.message.contains("not found"));
    }
}
