//! Identifier generation for runs and interrupts.

use uuid::Uuid;

/// Generates prefixed, collision-resistant identifiers.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdGenerator;

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// A fresh run identifier, e.g. `run_6f9a...`.
    #[must_use]
    pub fn generate_run_id(&self) -> String {
        format!("run_{}", Uuid::new_v4().simple())
    }

    /// A fresh interrupt identifier, e.g. `int_41bc...`.
    #[must_use]
    pub fn generate_interrupt_id(&self) -> String {
        format!("int_{}", Uuid::new_v4().simple())
    }
}
