//! Runtime execution types.
//!
//! Lightweight newtypes for run identity and step counting, kept separate
//! from the core graph types in [`crate::types`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one run (one execution instance of a workflow graph).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        RunId(s)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        RunId(s.to_string())
    }
}

/// 1-based step number within a run.
pub type StepNumber = u64;
