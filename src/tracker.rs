//! Best-effort usage reporting to an external tracker.
//!
//! After ledger-mutating nodes, stage graphs push the aggregated token
//! ledger to the tracker named in the run's configuration. The push is
//! fire-and-forget: failures are logged and never alter run status or
//! surface to the caller.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::accounting::{aggregate_by_model, TokenDataPoint};
use crate::runtimes::runtime_config::{RunConfig, RunMode};

/// Identifies where a run reports usage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerRef {
    /// Base endpoint of the tracker service.
    pub endpoint: String,
    /// Tracker-side identifier for this run's work item (e.g. an issue id).
    pub tracker_id: String,
}

/// Error from a tracker push. Always non-fatal to the run.
#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    #[error("tracker request failed: {0}")]
    #[diagnostic(code(codeloom::tracker::request))]
    Request(#[from] reqwest::Error),

    #[error("tracker rejected usage payload: status {status}")]
    #[diagnostic(code(codeloom::tracker::rejected))]
    Rejected { status: u16 },
}

/// Outbound usage-reporting seam.
#[async_trait]
pub trait UsageTracker: Send + Sync {
    /// Push the aggregated ledger for one run to the tracker.
    async fn push_usage(
        &self,
        tracker: &TrackerRef,
        run_id: &str,
        ledger: &[TokenDataPoint],
    ) -> Result<(), SyncError>;
}

/// JSON payload posted to the tracker endpoint.
#[derive(Debug, Serialize)]
struct UsagePayload<'a> {
    run_id: &'a str,
    tracker_id: &'a str,
    usage: Vec<crate::accounting::ModelUsage>,
}

/// HTTP tracker client posting per-model aggregates as JSON.
#[derive(Clone, Debug)]
pub struct HttpTracker {
    client: reqwest::Client,
}

impl Default for HttpTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl UsageTracker for HttpTracker {
    async fn push_usage(
        &self,
        tracker: &TrackerRef,
        run_id: &str,
        ledger: &[TokenDataPoint],
    ) -> Result<(), SyncError> {
        let payload = UsagePayload {
            run_id,
            tracker_id: &tracker.tracker_id,
            usage: aggregate_by_model(ledger),
        };
        let response = self
            .client
            .post(format!("{}/usage", tracker.endpoint.trim_end_matches('/')))
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SyncError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// Best-effort sync of a run's ledger to its tracker.
///
/// Skipped entirely when the run is in local mode, the ledger is empty, or
/// no tracker reference is configured. Failures are logged and swallowed;
/// the caller's control flow is untouched either way.
pub async fn sync_usage(
    tracker: &dyn UsageTracker,
    config: &RunConfig,
    run_id: &str,
    ledger: &[TokenDataPoint],
) {
    if config.mode == RunMode::Local {
        tracing::debug!(run = %run_id, "usage sync skipped: local mode");
        return;
    }
    if ledger.is_empty() {
        tracing::debug!(run = %run_id, "usage sync skipped: empty ledger");
        return;
    }
    let Some(tracker_ref) = &config.tracker else {
        tracing::debug!(run = %run_id, "usage sync skipped: no tracker configured");
        return;
    };

    if let Err(err) = tracker.push_usage(tracker_ref, run_id, ledger).await {
        tracing::warn!(
            run = %run_id,
            tracker_id = %tracker_ref.tracker_id,
            error = %err,
            "usage sync failed; continuing"
        );
    }
}
