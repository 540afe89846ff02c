//! Task plans: the ordered work items produced by planning and consumed by
//! the programmer stage.
//!
//! A [`TaskPlan`] is an ordered sequence of [`Task`]s with unique ids. Task
//! status moves strictly forward (`Pending → InProgress → Completed/Failed`);
//! attempts to move a task backwards are rejected so progress reporting can
//! never regress after a resume.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a single task.
///
/// The ordering of the variants is the allowed direction of travel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Whether the task has reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A single unit of planned work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Identifier unique within the owning plan.
    pub id: u32,
    /// Human-readable description of the work.
    pub description: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Summary of what was done, attached when the task completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Task {
    /// Creates a new pending task.
    #[must_use]
    pub fn new(id: u32, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            status: TaskStatus::Pending,
            summary: None,
        }
    }
}

/// Errors raised by plan construction and task transitions.
#[derive(Debug, Error, Diagnostic)]
pub enum PlanError {
    #[error("duplicate task id {id} in plan")]
    #[diagnostic(
        code(codeloom::plan::duplicate_id),
        help("Task ids must be unique within a plan.")
    )]
    DuplicateTaskId { id: u32 },

    #[error("unknown task id {id}")]
    #[diagnostic(code(codeloom::plan::unknown_id))]
    UnknownTaskId { id: u32 },

    #[error("invalid status transition for task {id}: {from:?} -> {to:?}")]
    #[diagnostic(
        code(codeloom::plan::invalid_transition),
        help("Task status only moves forward: pending -> in-progress -> completed/failed.")
    )]
    InvalidTransition {
        id: u32,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// Ordered sequence of tasks with unique ids.
///
/// # Examples
///
/// ```
/// use codeloom::plan::{TaskPlan, TaskStatus};
///
/// let mut plan = TaskPlan::from_descriptions(
///     "Fix flaky CI",
///     ["reproduce the failure", "patch the race", "run the suite"],
/// );
/// plan.start(0).unwrap();
/// plan.complete(0, Some("race was in the file watcher".into())).unwrap();
/// assert_eq!(plan.task(0).unwrap().status, TaskStatus::Completed);
/// assert_eq!(plan.next_pending().unwrap().id, 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPlan {
    /// Short human-readable title for the plan.
    #[serde(default)]
    pub title: String,
    /// The ordered tasks.
    pub tasks: Vec<Task>,
}

impl TaskPlan {
    /// Builds a plan from an ordered set of tasks, validating id uniqueness.
    pub fn new(title: impl Into<String>, tasks: Vec<Task>) -> Result<Self, PlanError> {
        let mut seen = rustc_hash::FxHashSet::default();
        for task in &tasks {
            if !seen.insert(task.id) {
                return Err(PlanError::DuplicateTaskId { id: task.id });
            }
        }
        Ok(Self {
            title: title.into(),
            tasks,
        })
    }

    /// Builds a plan of pending tasks from plain descriptions, assigning
    /// sequential ids starting at zero.
    #[must_use]
    pub fn from_descriptions<I, S>(title: impl Into<String>, descriptions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: title.into(),
            tasks: descriptions
                .into_iter()
                .enumerate()
                .map(|(i, d)| Task::new(i as u32, d))
                .collect(),
        }
    }

    /// Whether the plan contains no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn task(&self, id: u32) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// The first task that has not yet been started, in plan order.
    #[must_use]
    pub fn next_pending(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.status == TaskStatus::Pending)
    }

    /// The task currently in progress, if any.
    #[must_use]
    pub fn in_progress(&self) -> Option<&Task> {
        self.tasks
            .iter()
            .find(|t| t.status == TaskStatus::InProgress)
    }

    /// Whether every task has reached a terminal status.
    #[must_use]
    pub fn all_done(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    /// Marks a pending task as in progress.
    pub fn start(&mut self, id: u32) -> Result<(), PlanError> {
        self.transition(id, TaskStatus::InProgress, None)
    }

    /// Marks a task as completed, optionally attaching a summary of the work.
    pub fn complete(&mut self, id: u32, summary: Option<String>) -> Result<(), PlanError> {
        self.transition(id, TaskStatus::Completed, summary)
    }

    /// Marks a task as failed.
    pub fn fail(&mut self, id: u32, summary: Option<String>) -> Result<(), PlanError> {
        self.transition(id, TaskStatus::Failed, summary)
    }

    fn transition(
        &mut self,
        id: u32,
        to: TaskStatus,
        summary: Option<String>,
    ) -> Result<(), PlanError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(PlanError::UnknownTaskId { id })?;
        // Strictly monotonic: equal or backwards moves are rejected, as is
        // any move out of a terminal status.
        if task.status.is_terminal() || to <= task.status {
            return Err(PlanError::InvalidTransition {
                id,
                from: task.status,
                to,
            });
        }
        task.status = to;
        if summary.is_some() {
            task.summary = summary;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_ids_rejected() {
        let tasks = vec![Task::new(1, "a"), Task::new(1, "b")];
        assert!(matches!(
            TaskPlan::new("t", tasks),
            Err(PlanError::DuplicateTaskId { id: 1 })
        ));
    }

    #[test]
    fn transitions_are_monotonic() {
        let mut plan = TaskPlan::from_descriptions("t", ["only"]);
        plan.start(0).unwrap();
        plan.complete(0, None).unwrap();
        // Completed is terminal; no further moves.
        assert!(plan.fail(0, None).is_err());
        assert!(plan.start(0).is_err());
    }

    #[test]
    fn skipping_in_progress_is_allowed_but_backwards_is_not() {
        let mut plan = TaskPlan::from_descriptions("t", ["only"]);
        // Pending -> Failed skips InProgress; still forward.
        plan.fail(0, None).unwrap();
        assert!(plan.start(0).is_err());
    }
}
