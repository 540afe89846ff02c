//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use codeloom::accounting::TokenDataPoint;
use codeloom::interrupts::{InterruptCapabilities, InterruptRequest};
use codeloom::llm::{ChatRequest, ChatResponse, CompletionClient, LlmError, TokenUsage, ToolCallRequest};
use codeloom::message::Message;
use codeloom::node::{Node, NodeContext, NodeError, NodePartial, NodeStep};
use codeloom::runtimes::runtime_config::EngineConfig;
use codeloom::runtimes::CheckpointerType;
use codeloom::state::StateSnapshot;
use codeloom::tracker::{SyncError, TrackerRef, UsageTracker};

/// Engine config for tests: in-memory checkpoints, tight recursion limit.
pub fn test_engine() -> EngineConfig {
    EngineConfig::default()
        .with_checkpointer(CheckpointerType::InMemory)
        .with_recursion_limit(64)
}

/// Node that returns an empty update.
pub struct NoopNode;

#[async_trait]
impl Node for NoopNode {
    async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodeStep, NodeError> {
        Ok(NodePartial::default().into())
    }
}

/// Node that appends one assistant message.
pub struct SayNode(pub &'static str);

#[async_trait]
impl Node for SayNode {
    async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodeStep, NodeError> {
        Ok(NodePartial::new()
            .with_messages(vec![Message::assistant(self.0)])
            .into())
    }
}

/// Node that appends a fixed token data point, as a model-invoking node
/// would.
pub struct SpendTokensNode;

#[async_trait]
impl Node for SpendTokensNode {
    async fn run(&self, _: StateSnapshot, ctx: NodeContext) -> Result<NodeStep, NodeError> {
        Ok(NodePartial::new()
            .with_tokens(vec![TokenDataPoint::now("test-model", 10, 5, ctx.node_id)])
            .into())
    }
}

/// Node that always fails.
pub struct FailingNode;

#[async_trait]
impl Node for FailingNode {
    async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodeStep, NodeError> {
        Err(NodeError::ValidationFailed("deliberate failure".into()))
    }
}

/// Node that suspends on first visit and records the decision on resume.
pub struct ApprovalNode {
    pub capabilities: InterruptCapabilities,
}

#[async_trait]
impl Node for ApprovalNode {
    async fn run(&self, _: StateSnapshot, ctx: NodeContext) -> Result<NodeStep, NodeError> {
        match &ctx.resume {
            Some(resume) => Ok(NodePartial::new()
                .with_messages(vec![Message::assistant(&format!(
                    "decision: {}",
                    resume.decision.kind()
                ))])
                .into()),
            None => Ok(NodeStep::Suspend(InterruptRequest::new(
                "Approve Action",
                serde_json::json!({"what": "test"}),
                self.capabilities,
            ))),
        }
    }
}

/// Completion client that replays a scripted queue of responses.
#[derive(Clone, Default)]
pub struct ScriptedClient {
    responses: Arc<Mutex<VecDeque<ChatResponse>>>,
    pub requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A plain text reply with fixed usage.
    pub fn text(content: &str) -> ChatResponse {
        ChatResponse {
            content: content.to_string(),
            tool_call: None,
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 20,
            },
        }
    }

    /// A reply proposing a tool call.
    pub fn tool_call(content: &str, name: &str, args: serde_json::Value) -> ChatResponse {
        ChatResponse {
            content: content.to_string(),
            tool_call: Some(ToolCallRequest {
                name: name.to_string(),
                args,
            }),
            usage: TokenUsage {
                prompt_tokens: 150,
                completion_tokens: 30,
            },
        }
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request);
        Ok(self
            .responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Self::text("done")))
    }
}

/// Tracker that records pushes.
#[derive(Clone, Default)]
pub struct RecordingTracker {
    pub pushes: Arc<Mutex<Vec<(String, usize)>>>,
}

#[async_trait]
impl UsageTracker for RecordingTracker {
    async fn push_usage(
        &self,
        tracker: &TrackerRef,
        _run_id: &str,
        ledger: &[TokenDataPoint],
    ) -> Result<(), SyncError> {
        self.pushes
            .lock()
            .expect("pushes lock")
            .push((tracker.tracker_id.clone(), ledger.len()));
        Ok(())
    }
}

/// Tracker that always fails, to prove sync errors stay non-fatal.
#[derive(Clone, Default)]
pub struct FailingTracker {
    pub attempts: Arc<Mutex<u32>>,
}

#[async_trait]
impl UsageTracker for FailingTracker {
    async fn push_usage(
        &self,
        _tracker: &TrackerRef,
        _run_id: &str,
        _ledger: &[TokenDataPoint],
    ) -> Result<(), SyncError> {
        *self.attempts.lock().expect("attempts lock") += 1;
        Err(SyncError::Rejected { status: 503 })
    }
}
