//! Run and engine configuration.
//!
//! Two layers, both explicit objects rather than ambient globals:
//!
//! - [`EngineConfig`]: process-wide, read-only after startup: encryption
//!   key, per-role model defaults, recursion ceiling, checkpointer choice.
//!   Constructed once (typically via [`EngineConfig::from_env`]) and handed
//!   to [`GraphBuilder`](crate::graphs::GraphBuilder), so tests can build
//!   isolated instances.
//! - [`RunConfig`]: per-run: execution mode, secrets, per-role model
//!   overrides, tracker reference, rate-limit identity.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::runtimes::checkpointer::CheckpointerType;
use crate::secrets::{RunSecret, SecretCipher};
use crate::tracker::TrackerRef;

/// Where a run's tools execute.
///
/// The mode flag is the only behavioral branch: sandboxed runs get a
/// per-run scratch directory under the sandbox root, local runs operate
/// directly on the operator's working directory. The tool contract is
/// identical in both.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Per-run isolated working directory under the sandbox root.
    #[default]
    Sandboxed,
    /// Operate directly on the local working directory.
    Local,
}

/// Stage roles that may carry model overrides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    Router,
    Planner,
    Programmer,
}

/// Optional per-role model overrides carried by a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOverrides {
    pub router: Option<String>,
    pub planner: Option<String>,
    pub programmer: Option<String>,
}

impl ModelOverrides {
    #[must_use]
    pub fn get(&self, role: ModelRole) -> Option<&str> {
        match role {
            ModelRole::Router => self.router.as_deref(),
            ModelRole::Planner => self.planner.as_deref(),
            ModelRole::Programmer => self.programmer.as_deref(),
        }
    }
}

/// Per-role model defaults, read-only process-wide.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefaults {
    pub router: String,
    pub planner: String,
    pub programmer: String,
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            router: "anthropic:claude-3-5-haiku-latest".to_string(),
            planner: "anthropic:claude-sonnet-4-0".to_string(),
            programmer: "anthropic:claude-sonnet-4-0".to_string(),
        }
    }
}

/// Per-run configuration supplied at run creation.
#[derive(Clone, Debug, Default)]
pub struct RunConfig {
    /// Tool-execution mode.
    pub mode: RunMode,
    /// Identity used for rate limiting. Runs without an identity bypass the
    /// limiter.
    pub identity: Option<String>,
    /// Repository the run operates on, recorded in state metadata.
    pub target_repository: Option<String>,
    /// Secrets to propagate into tool execution (see [`crate::secrets`]).
    pub secrets: Vec<RunSecret>,
    /// Per-role model overrides.
    pub model_overrides: ModelOverrides,
    /// External tracker for usage reporting, when present.
    pub tracker: Option<TrackerRef>,
    /// Override of the engine's node-visit ceiling for this run.
    pub recursion_limit: Option<u32>,
    /// Working directory for local-mode runs. Defaults to the process
    /// working directory.
    pub local_workdir: Option<PathBuf>,
}

impl RunConfig {
    /// Resolve the model for a role: run override first, engine default
    /// otherwise.
    #[must_use]
    pub fn resolve_model(&self, role: ModelRole, engine: &EngineConfig) -> String {
        self.model_overrides
            .get(role)
            .map(str::to_string)
            .unwrap_or_else(|| match role {
                ModelRole::Router => engine.default_models.router.clone(),
                ModelRole::Planner => engine.default_models.planner.clone(),
                ModelRole::Programmer => engine.default_models.programmer.clone(),
            })
    }

    /// Whether any carried secret is in the encrypted envelope format.
    #[must_use]
    pub fn has_enveloped_secrets(&self) -> bool {
        self.secrets
            .iter()
            .any(|s| crate::secrets::is_enveloped(&s.value))
    }
}

/// Process-wide engine configuration, constructed once at startup.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Key string for the secret envelope cipher. `None` disables
    /// decryption; runs carrying enveloped secrets are then rejected at
    /// creation.
    pub encryption_key: Option<String>,
    /// Per-role model defaults.
    pub default_models: ModelDefaults,
    /// Node-visit ceiling per run.
    pub recursion_limit: u32,
    /// Checkpoint store selection.
    pub checkpointer: CheckpointerType,
    /// SQLite database file for durable checkpoints.
    pub sqlite_db_name: Option<String>,
    /// Root directory for sandboxed run workspaces.
    pub sandbox_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            encryption_key: None,
            default_models: ModelDefaults::default(),
            recursion_limit: Self::DEFAULT_RECURSION_LIMIT,
            checkpointer: CheckpointerType::InMemory,
            sqlite_db_name: None,
            sandbox_root: PathBuf::from(Self::DEFAULT_SANDBOX_ROOT),
        }
    }
}

impl EngineConfig {
    /// Default node-visit ceiling.
    pub const DEFAULT_RECURSION_LIMIT: u32 = 128;
    /// Default sandbox root directory.
    pub const DEFAULT_SANDBOX_ROOT: &'static str = "/var/lib/codeloom/sandboxes";

    /// Build configuration from the environment, loading `.env` first.
    ///
    /// Recognized variables: `CODELOOM_ENCRYPTION_KEY`,
    /// `CODELOOM_RECURSION_LIMIT`, `CODELOOM_SANDBOX_ROOT`,
    /// `SQLITE_DB_NAME`.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self {
            encryption_key: std::env::var("CODELOOM_ENCRYPTION_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            sqlite_db_name: std::env::var("SQLITE_DB_NAME").ok(),
            ..Self::default()
        };
        if let Some(limit) = std::env::var("CODELOOM_RECURSION_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.recursion_limit = limit;
        }
        if let Ok(root) = std::env::var("CODELOOM_SANDBOX_ROOT") {
            config.sandbox_root = PathBuf::from(root);
        }
        config
    }

    /// The envelope cipher, when an encryption key is configured.
    #[must_use]
    pub fn cipher(&self) -> Option<SecretCipher> {
        self.encryption_key
            .as_deref()
            .and_then(|key| SecretCipher::new(key).ok())
    }

    /// Builder-style override of the recursion ceiling.
    #[must_use]
    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Builder-style override of the checkpointer.
    #[must_use]
    pub fn with_checkpointer(mut self, checkpointer: CheckpointerType) -> Self {
        self.checkpointer = checkpointer;
        self
    }

    /// Builder-style override of the encryption key.
    #[must_use]
    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }
}
