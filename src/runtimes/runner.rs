//! Run lifecycle management: stepwise execution, pausing, resuming,
//! cancellation, and checkpointing.
//!
//! [`RunManager`] wraps a compiled [`App`] and owns the mutable execution
//! environment: the run table, the checkpointer, the event bus, and the
//! optional rate limiter. One run is one strictly sequential state machine;
//! the manager's exclusive ownership of each run's state serializes all
//! checkpoint writes for that run, so concurrent resume attempts cannot
//! lose updates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::app::App;
use crate::channels::errors::{ErrorDetail, ErrorEvent};
use crate::event_bus::{Event, EventBus, STREAM_END_SCOPE};
use crate::interrupts::{Decision, HumanInterrupt, InterruptStatus, ResumeDecision};
use crate::node::{NodeContext, NodeError, NodePartial, NodeStep};
use crate::ratelimit::{RateLimitError, RateLimiter};
use crate::reducers::ReducerError;
use crate::runtimes::checkpointer::{
    restore_run_state, Checkpoint, Checkpointer, CheckpointerError, CheckpointerType,
    InMemoryCheckpointer,
};
use crate::runtimes::runtime_config::RunConfig;
use crate::state::{StateSnapshot, VersionedState};
use crate::types::NodeKind;
use crate::utils::id::IdGenerator;

/// Lifecycle status of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Paused,
    Completed,
    Errored,
    Cancelled,
}

impl RunStatus {
    /// Whether the run can make no further progress.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Errored | RunStatus::Cancelled
        )
    }
}

/// In-memory state of one run.
#[derive(Clone)]
pub struct RunState {
    /// The run's versioned state.
    pub state: VersionedState,
    /// Steps executed so far.
    pub step: u64,
    /// The node to execute next; `None` once terminal.
    pub current: Option<NodeKind>,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Node visits consumed (recursion guard).
    pub visits: u32,
    /// The single live interrupt while paused; cleared when the suspended
    /// node completes after a resume.
    pub pending_interrupt: Option<HumanInterrupt>,
    /// Decision awaiting delivery to the suspended node. Transient, never
    /// persisted.
    pub pending_resume: Option<ResumeDecision>,
    /// The run's configuration.
    pub config: Arc<RunConfig>,
    /// Cooperative cancellation flag, honored between node executions.
    pub cancel_flag: Arc<AtomicBool>,
    /// Live step-report stream, when a consumer subscribed.
    step_stream: Option<flume::Sender<StepReport>>,
}

impl RunState {
    fn fresh(state: VersionedState, current: Option<NodeKind>, config: RunConfig) -> Self {
        Self {
            state,
            step: 0,
            current,
            status: RunStatus::Running,
            visits: 0,
            pending_interrupt: None,
            pending_resume: None,
            config: Arc::new(config),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            step_stream: None,
        }
    }

    /// Rebuild from a checkpoint (crash recovery / process restart).
    #[must_use]
    pub fn restored(
        state: VersionedState,
        step: u64,
        current: Option<NodeKind>,
        status: RunStatus,
        visits: u32,
        pending_interrupt: Option<HumanInterrupt>,
        config: RunConfig,
    ) -> Self {
        Self {
            state,
            step,
            current,
            status,
            visits,
            pending_interrupt,
            pending_resume: None,
            config: Arc::new(config),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            step_stream: None,
        }
    }
}

/// Result of executing one step of a run.
#[derive(Debug, Clone)]
pub struct StepReport {
    /// 1-based step number.
    pub step: u64,
    /// The node that executed.
    pub node: NodeKind,
    /// Channels whose content changed during the merge.
    pub updated_channels: Vec<&'static str>,
    /// The node selected for the next step, `None` when the run finished.
    pub next: Option<NodeKind>,
    /// Post-merge state snapshot.
    pub snapshot: StateSnapshot,
    /// Whether this step completed the run.
    pub completed: bool,
}

/// Outcome of driving a run until it settles.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The run reached a terminal node (or a node with no matching edge).
    Completed(VersionedState),
    /// The run is paused awaiting an operator decision.
    Paused(HumanInterrupt),
    /// The run was cancelled between node executions.
    Cancelled(VersionedState),
}

/// Result of attempting a single step.
#[derive(Debug, Clone)]
pub enum StepResult {
    /// A node executed and its update was merged.
    Advanced(StepReport),
    /// The node suspended; the run is paused.
    Paused(HumanInterrupt),
    /// The run is not in a runnable state.
    Idle(RunStatus),
}

/// Read-only view for presentation layers: snapshot, pending interrupt,
/// status. Nothing here can influence execution.
#[derive(Debug, Clone)]
pub struct RunView {
    pub snapshot: StateSnapshot,
    pub status: RunStatus,
    pub pending_interrupt: Option<HumanInterrupt>,
}

/// Handle for requesting cancellation from another task while the manager
/// is driving the run.
#[derive(Clone, Debug)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request cancellation; honored at the next between-node boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Errors surfaced by the run manager.
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    #[error("run not found: {run_id}")]
    #[diagnostic(code(codeloom::runner::run_not_found))]
    RunNotFound { run_id: String },

    #[error("no entry edge matched from Start")]
    #[diagnostic(
        code(codeloom::runner::no_entry),
        help("Ensure an edge from Start matches the initial state.")
    )]
    NoEntryNode,

    #[error("node not registered: {kind}")]
    #[diagnostic(code(codeloom::runner::missing_node))]
    MissingNode { kind: NodeKind },

    #[error("run {run_id} is not runnable (status: {status:?})")]
    #[diagnostic(code(codeloom::runner::not_runnable))]
    RunNotRunnable { run_id: String, status: RunStatus },

    #[error("run {run_id} is not paused (status: {status:?})")]
    #[diagnostic(
        code(codeloom::runner::not_paused),
        help("Only paused runs can be resumed; the request left the run untouched.")
    )]
    NotPaused { run_id: String, status: RunStatus },

    #[error("interrupt {interrupt_id} is not the pending interrupt for run {run_id}")]
    #[diagnostic(
        code(codeloom::runner::unknown_interrupt),
        help("The interrupt was already resolved or belongs to another pause point.")
    )]
    UnknownInterrupt { run_id: String, interrupt_id: String },

    #[error("decision '{decision}' is not permitted by the interrupt's capabilities")]
    #[diagnostic(
        code(codeloom::runner::decision_not_permitted),
        help("Check the interrupt's capability descriptor before deciding.")
    )]
    DecisionNotPermitted { decision: &'static str },

    #[error("recursion limit of {limit} node visits exceeded")]
    #[diagnostic(
        code(codeloom::runner::recursion_limit),
        help("The run was marked errored; the last checkpoint is preserved.")
    )]
    RecursionLimitExceeded { limit: u32 },

    #[error("configuration error: {message}")]
    #[diagnostic(code(codeloom::runner::configuration), help("The run was not created."))]
    Configuration { message: String },

    #[error("node {kind} failed: {source}")]
    #[diagnostic(code(codeloom::runner::node))]
    Node {
        kind: NodeKind,
        #[source]
        source: NodeError,
    },

    #[error(transparent)]
    #[diagnostic(code(codeloom::runner::reducer))]
    Reducer(#[from] ReducerError),

    #[error(transparent)]
    #[diagnostic(code(codeloom::runner::checkpointer))]
    Checkpointer(#[from] CheckpointerError),

    #[error(transparent)]
    #[diagnostic(code(codeloom::runner::rate_limit))]
    RateLimit(#[from] RateLimitError),
}

/// Pre-flight decision for a single step, computed under the run borrow.
enum PreStep {
    Idle(RunStatus),
    RecursionExceeded(u32),
    Execute {
        node_kind: NodeKind,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    },
}

/// Runtime execution engine for workflow graphs with run management,
/// checkpointing, and event streaming.
///
/// # Architecture: App vs RunManager
///
/// - **`App`**: the workflow graph structure (nodes, edges, reducers)
/// - **`RunManager`**: the runtime environment (runs, events, checkpoints)
///
/// One `App` can back many `RunManager` instances; each manager has its own
/// event bus and run table.
pub struct RunManager {
    app: Arc<App>,
    runs: FxHashMap<String, RunState>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    autosave: bool,
    event_bus: EventBus,
    rate_limiter: Option<RateLimiter>,
}

impl RunManager {
    /// Create a manager with the checkpointer selected by the app's engine
    /// configuration and autosave enabled.
    pub async fn new(app: App) -> Self {
        let checkpointer_type = app.engine_config().checkpointer;
        Self::with_options(app, checkpointer_type, true).await
    }

    /// Create a manager with explicit checkpointer and autosave settings.
    pub async fn with_options(
        app: App,
        checkpointer_type: CheckpointerType,
        autosave: bool,
    ) -> Self {
        let event_bus = EventBus::default();
        event_bus.listen_for_events();
        let checkpointer = Self::create_checkpointer(&app, checkpointer_type).await;
        Self {
            app: Arc::new(app),
            runs: FxHashMap::default(),
            checkpointer,
            autosave,
            event_bus,
            rate_limiter: None,
        }
    }

    /// Create a manager over an externally owned checkpointer.
    ///
    /// Lets several managers (or manager generations across restarts)
    /// share one store, and lets tests inject fakes.
    pub fn with_checkpointer(
        app: App,
        checkpointer: Arc<dyn Checkpointer>,
        autosave: bool,
    ) -> Self {
        let event_bus = EventBus::default();
        event_bus.listen_for_events();
        Self {
            app: Arc::new(app),
            runs: FxHashMap::default(),
            checkpointer: Some(checkpointer),
            autosave,
            event_bus,
            rate_limiter: None,
        }
    }

    async fn create_checkpointer(
        app: &App,
        checkpointer_type: CheckpointerType,
    ) -> Option<Arc<dyn Checkpointer>> {
        match checkpointer_type {
            CheckpointerType::InMemory => Some(Arc::new(InMemoryCheckpointer::new())),
            #[cfg(feature = "sqlite")]
            CheckpointerType::Sqlite => {
                let db_url = std::env::var("CODELOOM_SQLITE_URL")
                    .ok()
                    .or_else(|| {
                        app.engine_config()
                            .sqlite_db_name
                            .as_ref()
                            .map(|name| format!("sqlite://{name}"))
                    })
                    .unwrap_or_else(|| "sqlite://codeloom.db".to_string());
                // Ensure the underlying file exists before sqlx connects.
                if let Some(path) = db_url.strip_prefix("sqlite://") {
                    let path = path.trim();
                    if !path.is_empty() {
                        let p = std::path::Path::new(path);
                        if let Some(parent) = p.parent() {
                            let _ = std::fs::create_dir_all(parent);
                        }
                        if !p.exists() {
                            let _ = std::fs::File::create_new(p);
                        }
                    }
                }
                match crate::runtimes::checkpointer_sqlite::SqliteCheckpointer::connect(&db_url)
                    .await
                {
                    Ok(cp) => Some(Arc::new(cp) as Arc<dyn Checkpointer>),
                    Err(e) => {
                        tracing::error!(
                            url = %db_url,
                            error = %e,
                            "SqliteCheckpointer initialization failed"
                        );
                        None
                    }
                }
            }
        }
    }

    /// Attach a rate limiter gating run creation.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// The manager's event bus, for attaching sinks.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Create a new run from a trigger payload.
    ///
    /// Pre-run gates, in order:
    /// 1. enveloped secrets require a configured encryption key
    ///    (`Configuration` error, run not created);
    /// 2. the rate limiter, when attached and the config carries an
    ///    identity (`RateLimit` error, run not created).
    ///
    /// On success the entry node is resolved from `Start` and an initial
    /// checkpoint is persisted.
    #[instrument(skip(self, config, initial_state), err)]
    pub async fn create_run(
        &mut self,
        config: RunConfig,
        initial_state: VersionedState,
    ) -> Result<String, RunnerError> {
        if config.has_enveloped_secrets() && self.app.engine_config().cipher().is_none() {
            return Err(RunnerError::Configuration {
                message: "run carries encrypted secrets but no encryption key is configured"
                    .to_string(),
            });
        }

        if let (Some(limiter), Some(identity)) = (&self.rate_limiter, &config.identity) {
            limiter
                .check_and_increment(identity, chrono::Utc::now())
                .await?;
        }

        let snapshot = initial_state.snapshot();
        let entry = self.app.resolve_next(&NodeKind::Start, &snapshot);
        let current = match entry {
            None => return Err(RunnerError::NoEntryNode),
            Some(NodeKind::End) => None,
            Some(node) => Some(node),
        };

        let run_id = IdGenerator::new().generate_run_id();
        let mut run = RunState::fresh(initial_state, current, config);
        if run.current.is_none() {
            run.status = RunStatus::Completed;
        }
        self.runs.insert(run_id.clone(), run);
        self.maybe_checkpoint(&run_id).await;
        tracing::info!(run = %run_id, "run created");
        Ok(run_id)
    }

    /// Restore a run from its latest checkpoint (process restart path).
    ///
    /// The run's original `RunConfig` is not persisted alongside state;
    /// callers supply it again.
    pub async fn restore_run(
        &mut self,
        run_id: &str,
        config: RunConfig,
    ) -> Result<RunStatus, RunnerError> {
        let Some(checkpointer) = &self.checkpointer else {
            return Err(RunnerError::RunNotFound {
                run_id: run_id.to_string(),
            });
        };
        let checkpoint =
            checkpointer
                .load_latest(run_id)
                .await?
                .ok_or_else(|| RunnerError::RunNotFound {
                    run_id: run_id.to_string(),
                })?;
        let run = restore_run_state(&checkpoint, config);
        let status = run.status;
        self.runs.insert(run_id.to_string(), run);
        tracing::info!(run = %run_id, step = checkpoint.step, "run restored from checkpoint");
        Ok(status)
    }

    /// A cancellation handle usable from other tasks. Cancellation takes
    /// effect only between node executions, so a half-applied update can
    /// never be observed.
    pub fn cancel_handle(&self, run_id: &str) -> Result<CancelHandle, RunnerError> {
        self.runs
            .get(run_id)
            .map(|run| CancelHandle(Arc::clone(&run.cancel_flag)))
            .ok_or_else(|| RunnerError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    /// Request cancellation of an idle run directly.
    pub async fn cancel(&mut self, run_id: &str) -> Result<(), RunnerError> {
        let run = self.run_mut(run_id)?;
        run.cancel_flag.store(true, Ordering::SeqCst);
        if matches!(run.status, RunStatus::Running | RunStatus::Paused) {
            run.status = RunStatus::Cancelled;
            run.pending_interrupt = None;
            run.pending_resume = None;
            run.step_stream = None;
            self.maybe_checkpoint(run_id).await;
            tracing::info!(run = %run_id, "run cancelled");
        }
        Ok(())
    }

    /// Subscribe to per-step reports for a run.
    ///
    /// The stream is lazy (reports are produced as steps execute), finite
    /// (the sender is dropped when the run settles), and single-pass.
    pub fn step_stream(
        &mut self,
        run_id: &str,
    ) -> Result<flume::Receiver<StepReport>, RunnerError> {
        let run = self.run_mut(run_id)?;
        let (tx, rx) = flume::unbounded();
        run.step_stream = Some(tx);
        Ok(rx)
    }

    /// Presentation-layer view of a run.
    #[must_use]
    pub fn view(&self, run_id: &str) -> Option<RunView> {
        self.runs.get(run_id).map(|run| RunView {
            snapshot: run.state.snapshot(),
            status: run.status,
            pending_interrupt: run.pending_interrupt.clone(),
        })
    }

    /// Direct access to a run's in-memory state.
    #[must_use]
    pub fn get_run(&self, run_id: &str) -> Option<&RunState> {
        self.runs.get(run_id)
    }

    /// All run ids known to this manager.
    #[must_use]
    pub fn list_runs(&self) -> Vec<&String> {
        self.runs.keys().collect()
    }

    fn run_mut(&mut self, run_id: &str) -> Result<&mut RunState, RunnerError> {
        self.runs
            .get_mut(run_id)
            .ok_or_else(|| RunnerError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    /// Drive a run until it completes, pauses on an interrupt, or is
    /// cancelled.
    #[instrument(skip(self), err)]
    pub async fn run_until_settled(&mut self, run_id: &str) -> Result<RunOutcome, RunnerError> {
        loop {
            let run = self.run_mut(run_id)?;

            // Cancellation boundary: between node executions only.
            if run.cancel_flag.load(Ordering::SeqCst) && !run.status.is_terminal() {
                run.status = RunStatus::Cancelled;
                run.pending_interrupt = None;
                run.pending_resume = None;
                run.step_stream = None;
                let state = run.state.clone();
                self.maybe_checkpoint(run_id).await;
                self.emit_stream_end(run_id, "cancelled");
                return Ok(RunOutcome::Cancelled(state));
            }

            match run.status {
                RunStatus::Completed => {
                    return Ok(RunOutcome::Completed(run.state.clone()));
                }
                RunStatus::Cancelled => {
                    return Ok(RunOutcome::Cancelled(run.state.clone()));
                }
                RunStatus::Errored => {
                    return Err(RunnerError::RunNotRunnable {
                        run_id: run_id.to_string(),
                        status: RunStatus::Errored,
                    });
                }
                RunStatus::Paused => {
                    if run.pending_resume.is_none() {
                        let interrupt = run
                            .pending_interrupt
                            .clone()
                            .expect("paused run must hold its pending interrupt");
                        return Ok(RunOutcome::Paused(interrupt));
                    }
                    // A decision is queued: fall through and re-run the
                    // suspended node.
                }
                RunStatus::Running => {}
            }

            match self.run_step(run_id).await? {
                StepResult::Advanced(report) => {
                    if report.completed {
                        let run = self.run_mut(run_id)?;
                        return Ok(RunOutcome::Completed(run.state.clone()));
                    }
                }
                StepResult::Paused(interrupt) => {
                    return Ok(RunOutcome::Paused(interrupt));
                }
                StepResult::Idle(status) => {
                    tracing::debug!(run = %run_id, ?status, "step found run idle");
                }
            }
        }
    }

    /// Execute exactly one node of a run.
    #[instrument(skip(self), err)]
    pub async fn run_step(&mut self, run_id: &str) -> Result<StepResult, RunnerError> {
        let engine_limit = self.app.engine_config().recursion_limit;
        let event_sender = self.event_bus.sender();

        // Phase 1: pre-flight under the run borrow.
        let pre = {
            let run = self.run_mut(run_id)?;
            let runnable = run.status == RunStatus::Running
                || (run.status == RunStatus::Paused && run.pending_resume.is_some());
            if !runnable {
                PreStep::Idle(run.status)
            } else if let Some(node_kind) = run.current.clone() {
                let limit = run.config.recursion_limit.unwrap_or(engine_limit);
                // Recursion guard: enforced as the visit is consumed, so the
                // ceiling is exceeded by at most one visit.
                run.visits += 1;
                if run.visits > limit {
                    run.status = RunStatus::Errored;
                    let event = ErrorEvent::runner(
                        run_id,
                        run.step,
                        ErrorDetail::msg(format!(
                            "recursion limit of {limit} node visits exceeded"
                        )),
                    )
                    .with_tag("recursion");
                    run.state.errors.get_mut().push(event);
                    run.step_stream = None;
                    PreStep::RecursionExceeded(limit)
                } else {
                    run.step += 1;
                    run.status = RunStatus::Running;
                    let ctx = NodeContext {
                        run_id: run_id.to_string(),
                        node_id: node_kind.to_string(),
                        step: run.step,
                        config: Arc::clone(&run.config),
                        event_sender,
                        resume: run.pending_resume.take(),
                    };
                    PreStep::Execute {
                        snapshot: run.state.snapshot(),
                        node_kind,
                        ctx,
                    }
                }
            } else {
                run.status = RunStatus::Completed;
                PreStep::Idle(RunStatus::Completed)
            }
        };

        let (node_kind, snapshot, ctx) = match pre {
            PreStep::Idle(status) => return Ok(StepResult::Idle(status)),
            PreStep::RecursionExceeded(limit) => {
                self.maybe_checkpoint(run_id).await;
                self.emit_stream_end(run_id, "errored");
                return Err(RunnerError::RecursionLimitExceeded { limit });
            }
            PreStep::Execute {
                node_kind,
                snapshot,
                ctx,
            } => (node_kind, snapshot, ctx),
        };

        let node = self
            .app
            .nodes()
            .get(&node_kind)
            .cloned()
            .ok_or_else(|| RunnerError::MissingNode {
                kind: node_kind.clone(),
            })?;

        tracing::debug!(run = %run_id, node = %node_kind, "executing node");
        let result = node.run(snapshot, ctx).await;

        match result {
            Err(source) => {
                // Fatal: record the failure in state, preserve the prior
                // checkpoint, and mark the run errored.
                {
                    let run = self.run_mut(run_id)?;
                    let event = ErrorEvent::node(
                        node_kind.encode(),
                        run.step,
                        ErrorDetail::msg(source.to_string()),
                    )
                    .with_tag("fatal");
                    run.state.errors.get_mut().push(event);
                    run.status = RunStatus::Errored;
                    run.step_stream = None;
                }
                self.maybe_checkpoint(run_id).await;
                self.emit_stream_end(run_id, "errored");
                Err(RunnerError::Node {
                    kind: node_kind,
                    source,
                })
            }
            Ok(NodeStep::Suspend(request)) => {
                let interrupt = HumanInterrupt::from_request(request);
                {
                    let run = self.run_mut(run_id)?;
                    run.status = RunStatus::Paused;
                    run.pending_interrupt = Some(interrupt.clone());
                }
                self.maybe_checkpoint(run_id).await;
                tracing::info!(
                    run = %run_id,
                    node = %node_kind,
                    interrupt = %interrupt.id,
                    action = %interrupt.action_request.action,
                    "run paused for approval"
                );
                Ok(StepResult::Paused(interrupt))
            }
            Ok(NodeStep::Continue(partial)) => {
                let report = self.merge_and_route(run_id, &node_kind, partial).await?;
                Ok(StepResult::Advanced(report))
            }
        }
    }

    /// Merge a node's update atomically and route to the next node.
    async fn merge_and_route(
        &mut self,
        run_id: &str,
        node_kind: &NodeKind,
        partial: NodePartial,
    ) -> Result<StepReport, RunnerError> {
        let app = Arc::clone(&self.app);
        let report = {
            let run = self.run_mut(run_id)?;

            // All-or-nothing merge: apply to a scratch clone, swap on
            // success.
            let mut scratch = run.state.clone();
            let outcome = app.apply_update(&mut scratch, node_kind, &partial)?;
            run.state = scratch;

            // The interrupt (if any) is fully consumed once its node
            // completes.
            run.pending_interrupt = None;
            run.status = RunStatus::Running;

            let snapshot = run.state.snapshot();
            let next = match outcome.goto {
                Some(NodeKind::End) => None,
                Some(target) => {
                    if app.nodes().contains_key(&target) {
                        Some(target)
                    } else {
                        tracing::warn!(
                            run = %run_id,
                            target = %target,
                            "goto target not registered; falling back to edge resolution"
                        );
                        app.resolve_next(node_kind, &snapshot)
                    }
                }
                None => app.resolve_next(node_kind, &snapshot),
            };
            let next = match next {
                Some(NodeKind::End) | None => None,
                Some(node) => Some(node),
            };

            let completed = next.is_none();
            run.current = next.clone();
            if completed {
                run.status = RunStatus::Completed;
            }

            let report = StepReport {
                step: run.step,
                node: node_kind.clone(),
                updated_channels: outcome.updated_channels,
                next,
                snapshot,
                completed,
            };

            if let Some(stream) = &run.step_stream {
                let _ = stream.send(report.clone());
            }
            if completed {
                run.step_stream = None;
            }
            report
        };

        self.maybe_checkpoint(run_id).await;
        if report.completed {
            tracing::info!(run = %run_id, step = report.step, "run completed");
            self.emit_stream_end(run_id, "completed");
        }
        Ok(report)
    }

    /// Resume a paused run with an operator decision.
    ///
    /// Rejections are idempotent and mutate nothing: the run must be
    /// paused, the interrupt id must match the single pending interrupt,
    /// and the decision kind must be permitted by the interrupt's
    /// capability descriptor. All of this is checked before any side effect.
    #[instrument(skip(self, decision), err)]
    pub async fn resume(
        &mut self,
        run_id: &str,
        interrupt_id: &str,
        decision: Decision,
    ) -> Result<RunOutcome, RunnerError> {
        {
            let run = self
                .runs
                .get(run_id)
                .ok_or_else(|| RunnerError::RunNotFound {
                    run_id: run_id.to_string(),
                })?;

            if run.status != RunStatus::Paused {
                return Err(RunnerError::NotPaused {
                    run_id: run_id.to_string(),
                    status: run.status,
                });
            }
            let pending = run
                .pending_interrupt
                .as_ref()
                .filter(|i| i.is_pending())
                .ok_or_else(|| RunnerError::UnknownInterrupt {
                    run_id: run_id.to_string(),
                    interrupt_id: interrupt_id.to_string(),
                })?;
            if pending.id != interrupt_id {
                return Err(RunnerError::UnknownInterrupt {
                    run_id: run_id.to_string(),
                    interrupt_id: interrupt_id.to_string(),
                });
            }
            if !pending.capabilities.permits(&decision) {
                return Err(RunnerError::DecisionNotPermitted {
                    decision: decision.kind(),
                });
            }
        }

        // Validation passed; now mutate.
        {
            let run = self.run_mut(run_id)?;
            let mut resolved = run
                .pending_interrupt
                .clone()
                .expect("validated pending interrupt");
            resolved.status = InterruptStatus::Resolved;
            run.pending_interrupt = Some(resolved.clone());
            run.pending_resume = Some(ResumeDecision {
                interrupt: resolved,
                decision,
            });
        }
        self.maybe_checkpoint(run_id).await;
        tracing::info!(run = %run_id, interrupt = %interrupt_id, "run resumed");

        self.run_until_settled(run_id).await
    }

    /// Persist a checkpoint when autosave is enabled.
    async fn maybe_checkpoint(&self, run_id: &str) {
        if !self.autosave {
            return;
        }
        if let Some(checkpointer) = &self.checkpointer {
            if let Some(run) = self.runs.get(run_id) {
                if let Err(err) = checkpointer.save(Checkpoint::from_run(run_id, run)).await {
                    tracing::warn!(run = %run_id, error = %err, "checkpoint save failed");
                }
            }
        }
    }

    fn emit_stream_end(&self, run_id: &str, status: &str) {
        self.event_bus.emit(Event::diagnostic(
            STREAM_END_SCOPE,
            format!("run={run_id} status={status}"),
        ));
    }
}
