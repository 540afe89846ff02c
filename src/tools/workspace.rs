//! Per-run working directories.
//!
//! Sandboxed runs get an isolated scratch directory under the engine's
//! sandbox root; local runs operate directly on the operator's working
//! directory. Tools see the same [`Workspace`] API either way.

use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use super::ToolError;
use crate::runtimes::runtime_config::{EngineConfig, RunConfig, RunMode};

/// A run's working directory, with path confinement in sandboxed mode.
#[derive(Clone, Debug)]
pub struct Workspace {
    root: PathBuf,
    mode: RunMode,
}

impl Workspace {
    /// Build the workspace for a run.
    ///
    /// Sandboxed mode creates `<sandbox_root>/<run_id>`; local mode uses
    /// the configured local directory (or the process working directory).
    pub async fn for_run(
        run_id: &str,
        config: &RunConfig,
        engine: &EngineConfig,
    ) -> Result<Self, ToolError> {
        match config.mode {
            RunMode::Sandboxed => {
                let root = engine.sandbox_root.join(run_id);
                tokio::fs::create_dir_all(&root).await?;
                Ok(Self {
                    root,
                    mode: RunMode::Sandboxed,
                })
            }
            RunMode::Local => {
                let root = match &config.local_workdir {
                    Some(dir) => dir.clone(),
                    None => std::env::current_dir()?,
                };
                Ok(Self {
                    root,
                    mode: RunMode::Local,
                })
            }
        }
    }

    /// A workspace rooted at an explicit directory (test fixtures).
    #[must_use]
    pub fn at(root: PathBuf, mode: RunMode) -> Self {
        Self { root, mode }
    }

    /// The workspace root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The execution mode this workspace was built for.
    #[must_use]
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Resolve a tool-supplied path.
    ///
    /// Relative paths are joined onto the root. In sandboxed mode the
    /// result must stay inside the root: absolute paths outside it and
    /// `..` escapes are refused before any filesystem access. Local mode
    /// trusts the operator and resolves like a shell would.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        if self.mode == RunMode::Local {
            return Ok(joined);
        }

        // Lexical normalization; the jail check must not require the path
        // to exist yet.
        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(ToolError::Blocked {
                            reason: format!("path escapes the workspace: {path}"),
                        });
                    }
                }
                Component::CurDir => {}
                other => normalized.push(other),
            }
        }

        if normalized.starts_with(&self.root) {
            Ok(normalized)
        } else {
            Err(ToolError::Blocked {
                reason: format!("path outside the workspace: {path}"),
            })
        }
    }

    /// Spill oversized tool output to a file under the workspace, returning
    /// its path for by-reference storage.
    pub async fn spill(&self, content: &str) -> Result<PathBuf, std::io::Error> {
        let dir = self.root.join(".codeloom").join("outputs");
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.log", Uuid::new_v4().simple()));
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }
}
