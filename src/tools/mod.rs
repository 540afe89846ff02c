//! Tool execution layer.
//!
//! Tools are polymorphic over `{name, parameters_schema, execute}` and run
//! against a per-run [`Workspace`]. The same contract serves both execution
//! modes; the mode flag only selects the workspace root (sandbox scratch
//! dir vs. the operator's local directory).
//!
//! Tool failures are recoverable by design: the registry folds them into a
//! result string the agent can read and react to. Oversized results are
//! truncated, with the full output spilled to a file referenced from the
//! truncated summary.

pub mod file_ops;
pub mod http;
pub mod search;
pub mod shell;
pub mod workspace;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use workspace::Workspace;

/// Tool output size threshold before truncation kicks in.
pub const MAX_OUTPUT_BYTES: usize = 20_000;

/// Execution context handed to tools.
#[derive(Clone, Debug)]
pub struct ToolContext {
    /// The run's working directory abstraction.
    pub workspace: Workspace,
    /// Environment entries materialized from exposable secrets.
    pub env: Vec<(String, String)>,
}

impl ToolContext {
    #[must_use]
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }
}

/// Errors from tool invocation.
///
/// These are *recoverable* at the run level: the registry renders them into
/// the tool result so the agent can self-correct, and execution continues
/// via normal edge resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    #[diagnostic(code(codeloom::tools::invalid_args))]
    InvalidArgs(String),

    #[error("blocked: {reason}")]
    #[diagnostic(
        code(codeloom::tools::blocked),
        help("The command or path was refused before execution.")
    )]
    Blocked { reason: String },

    #[error("io error: {0}")]
    #[diagnostic(code(codeloom::tools::io))]
    Io(#[from] std::io::Error),

    #[error("execution failed: {message}")]
    #[diagnostic(code(codeloom::tools::execution))]
    ExecutionFailed { message: String },

    #[error("timed out after {seconds}s")]
    #[diagnostic(code(codeloom::tools::timeout))]
    Timeout { seconds: u64 },

    #[error("http error: {0}")]
    #[diagnostic(code(codeloom::tools::http))]
    Http(#[from] reqwest::Error),
}

/// A single invokable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable tool name used in schemas and the approval allow-list.
    fn name(&self) -> &str;

    /// One-line description surfaced to the model.
    fn description(&self) -> &str;

    /// JSON Schema of the accepted arguments.
    fn parameters_schema(&self) -> Value;

    /// Execute with validated-enough args against the run's workspace.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, ToolError>;
}

/// Result of a registry-mediated invocation.
#[derive(Clone, Debug)]
pub struct ToolResult {
    /// Result text, truncated when over [`MAX_OUTPUT_BYTES`].
    pub content: String,
    /// Where the full output was spilled, when truncation applied.
    pub full_output: Option<PathBuf>,
}

/// Registry of available tools plus the approval allow-list.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: FxHashMap<String, Arc<dyn Tool>>,
    approval_required: FxHashSet<String>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard tool set: file read/write, search, shell, HTTP fetch.
    /// Shell execution requires approval out of the box.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(file_ops::ReadFile);
        registry.register(file_ops::WriteFile);
        registry.register(search::SearchFiles);
        registry.register(shell::Shell::default());
        registry.register(http::HttpRequest::default());
        registry.require_approval(shell::SHELL_TOOL_NAME);
        registry
    }

    /// Register a tool under its own name.
    pub fn register(&mut self, tool: impl Tool + 'static) -> &mut Self {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
        self
    }

    /// Mark a tool as approval-requiring.
    pub fn require_approval(&mut self, name: &str) -> &mut Self {
        self.approval_required.insert(name.to_string());
        self
    }

    /// Whether an invocation of `name` must pause for operator approval.
    #[must_use]
    pub fn requires_approval(&self, name: &str) -> bool {
        self.approval_required.contains(name)
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Names of all registered tools, sorted for stable prompt rendering.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Schema descriptors for every registered tool, sorted by name.
    #[must_use]
    pub fn schemas(&self) -> Vec<Value> {
        let mut entries: Vec<(&str, Value)> = self
            .tools
            .values()
            .map(|tool| {
                (
                    tool.name(),
                    serde_json::json!({
                        "name": tool.name(),
                        "description": tool.description(),
                        "parameters": tool.parameters_schema(),
                    }),
                )
            })
            .collect();
        entries.sort_unstable_by_key(|(name, _)| *name);
        entries.into_iter().map(|(_, schema)| schema).collect()
    }

    /// Invoke a tool and normalize its output.
    ///
    /// Unknown tools and tool failures come back as `Err(ToolError)`; the
    /// caller decides how to fold that into state. Oversized outputs are
    /// truncated here, with the full text spilled under the workspace.
    pub async fn run(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::InvalidArgs(
            format!("unknown tool: {name}"),
        ))?;

        let output = tool.execute(args, ctx).await?;

        if output.len() <= MAX_OUTPUT_BYTES {
            return Ok(ToolResult {
                content: output,
                full_output: None,
            });
        }

        let spill_path = ctx.workspace.spill(&output).await?;
        let mut cut = MAX_OUTPUT_BYTES;
        while !output.is_char_boundary(cut) {
            cut -= 1;
        }
        let content = format!(
            "{}\n... [truncated {} of {} bytes; full output at {}]",
            &output[..cut],
            output.len() - cut,
            output.len(),
            spill_path.display()
        );
        Ok(ToolResult {
            content,
            full_output: Some(spill_path),
        })
    }
}
