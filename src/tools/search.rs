//! Pattern search across the run workspace.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use walkdir::WalkDir;

use super::{Tool, ToolContext, ToolError};

const MAX_MATCHES: usize = 200;
const SKIP_DIRS: &[&str] = &[".git", "target", "node_modules", ".codeloom"];

/// Search file contents for a regex pattern.
pub struct SearchFiles;

#[async_trait]
impl Tool for SearchFiles {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search file contents for a regular expression. Returns matching \
         lines as 'path:line: text', capped at 200 matches."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for."
                },
                "path": {
                    "type": "string",
                    "description": "Optional: directory to search, relative to the workspace. Defaults to the workspace root."
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let pattern = args["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArgs("missing 'pattern' argument".into()))?;
        let regex = Regex::new(pattern)
            .map_err(|e| ToolError::InvalidArgs(format!("invalid pattern: {e}")))?;

        let search_root = match args["path"].as_str() {
            Some(path) => ctx.workspace.resolve(path)?,
            None => ctx.workspace.root().to_path_buf(),
        };

        // Walking the tree is blocking work; the trees involved are small
        // enough that offloading is not worth a thread hop per search.
        let mut matches: Vec<String> = Vec::new();
        'walk: for entry in WalkDir::new(&search_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                e.file_name()
                    .to_str()
                    .map(|name| !SKIP_DIRS.contains(&name))
                    .unwrap_or(true)
            })
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            if !entry.file_type().is_file() {
                continue;
            }
            // Binary files fail UTF-8 reading and are skipped.
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            let display_path = entry
                .path()
                .strip_prefix(ctx.workspace.root())
                .unwrap_or(entry.path());
            for (line_no, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(format!(
                        "{}:{}: {}",
                        display_path.display(),
                        line_no + 1,
                        line.trim_end()
                    ));
                    if matches.len() >= MAX_MATCHES {
                        matches.push(format!("... capped at {MAX_MATCHES} matches"));
                        break 'walk;
                    }
                }
            }
        }

        if matches.is_empty() {
            Ok(format!("No matches for pattern: {pattern}"))
        } else {
            Ok(matches.join("\n"))
        }
    }
}
