//! Tool capabilities and the registry the dispatcher resolves them from.

mod args;
mod bash;
mod diff;
mod fs;
mod git;
mod search;
mod workspace;

pub use args::{optional_bool, optional_str, optional_usize, required_str};
pub use bash::RunBashTool;
pub use diff::{unified_diff, FileDiffTool};
pub use fs::{EditFileTool, ListDirectoryTool, ReadFileTool, WriteFileTool};
pub use git::{GitDiffTool, GitLogTool, GitStatusTool};
pub use search::SearchCodeTool;
pub use workspace::Workspace;

use crate::error::ToolExecutionError;
use crate::types::ToolArguments;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A named, schema-described action the model may request.
///
/// Implementations are blocking. Any internal fault must be normalized into a
/// [`ToolExecutionError`]; nothing else crosses this boundary.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolExecutionError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Model-facing description of one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

type ToolFn = dyn Fn(&ToolArguments) -> Result<String, ToolExecutionError> + Send + Sync;

/// Closure-backed tool, handy for embedding and for scripted tests.
pub struct FnTool {
    name: String,
    description: String,
    input_schema: Value,
    handler: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(&ToolArguments) -> Result<String, ToolExecutionError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: Box::new(handler),
        }
    }
}

impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.input_schema.clone()
    }

    fn invoke(&self, arguments: &ToolArguments) -> Result<String, ToolExecutionError> {
        (self.handler)(arguments)
    }
}

/// Name-keyed set of tools. Registering an existing name replaces it.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        let mut registry = Self::new();
        registry.register_all(tools);
        registry
    }

    /// Returns the definition that was displaced, if any.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        self.tools.insert(tool.name().to_string(), tool)
    }

    pub fn register_all(&mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Snapshot of the current membership, as handed to the model service.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|tool| tool.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

pub fn code_tools(workspace: &Workspace) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ReadFileTool::new(workspace.clone())),
        Arc::new(WriteFileTool::new(workspace.clone())),
        Arc::new(EditFileTool::new(workspace.clone())),
        Arc::new(ListDirectoryTool::new(workspace.clone())),
        Arc::new(SearchCodeTool::new(workspace.clone())),
    ]
}

pub fn git_tools(workspace: &Workspace) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(GitStatusTool::new(workspace.clone())),
        Arc::new(GitDiffTool::new(workspace.clone())),
        Arc::new(GitLogTool::new(workspace.clone())),
    ]
}

pub fn util_tools(workspace: &Workspace) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(RunBashTool::new(workspace.clone())),
        Arc::new(FileDiffTool::new(workspace.clone())),
    ]
}

pub fn all_tools(workspace: &Workspace) -> Vec<Arc<dyn Tool>> {
    let mut tools = code_tools(workspace);
    tools.extend(git_tools(workspace));
    tools.extend(util_tools(workspace));
    tools
}

/// Registry holding every built-in tool rooted at `working_dir`.
pub fn default_registry(working_dir: PathBuf) -> ToolRegistry {
    ToolRegistry::with_tools(all_tools(&Workspace::new(working_dir)))
}
