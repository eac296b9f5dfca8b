use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Root directory every built-in tool is confined to.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    canonical_root: PathBuf,
}

impl Workspace {
    pub fn new(root: PathBuf) -> Self {
        let canonical_root = fs::canonicalize(&root).unwrap_or_else(|_| root.clone());
        Self {
            root,
            canonical_root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tool-supplied path. Relative paths are joined to the root;
    /// absolute ones are accepted only when they already point inside it.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let path = path.trim();
        if path.is_empty() || path == "." {
            return Ok(self.root.clone());
        }
        if path.contains('\\') {
            bail!("Security error: platform-specific path not allowed: {path}");
        }

        let requested = Path::new(path);
        if requested.is_absolute() {
            let normalized = normalize(requested);
            self.ensure_within_workspace(&normalized)?;
            return Ok(normalized);
        }

        for component in requested.components() {
            if matches!(component, Component::ParentDir) {
                bail!("Security error: path traversal detected: {path}");
            }
        }

        let normalized = normalize(&self.root.join(requested));
        self.ensure_within_workspace(&normalized)?;
        Ok(normalized)
    }

    pub fn display(&self, path: &Path) -> String {
        for base in [&self.root, &self.canonical_root] {
            if let Ok(relative) = path.strip_prefix(base) {
                let shown = relative.to_string_lossy().to_string();
                return if shown.is_empty() { ".".to_string() } else { shown };
            }
        }
        path.to_string_lossy().to_string()
    }

    fn ensure_within_workspace(&self, path: &Path) -> Result<()> {
        let guard_path = nearest_existing_ancestor(path)
            .context("Security error: could not find an existing parent path")?;

        let canonical_guard = fs::canonicalize(guard_path)
            .with_context(|| format!("Failed to canonicalize {}", guard_path.display()))?;
        if !canonical_guard.starts_with(&self.canonical_root) {
            bail!(
                "Security error: path escapes working directory via symlink or traversal: {}",
                path.display()
            );
        }
        Ok(())
    }
}

fn nearest_existing_ancestor(path: &Path) -> Option<&Path> {
    let mut current = path;
    while !current.exists() {
        current = current.parent()?;
    }
    Some(current)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
