//! Programmer stage: execute the plan task by task.
//!
//! The loop per task: the model proposes a tool call (`generate-action`),
//! usage syncs (`record-usage`), the tool executes, pausing first for
//! operator approval when the tool is on the allow-list (`take-action`),
//! and the result folds back into the conversation for the next model
//! turn. A model reply without a tool call closes the current task
//! (`progress-task`) and moves on, until the plan is done.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{RecordUsage, StageServices, PENDING_TOOL_KEY};
use crate::accounting::TokenDataPoint;
use crate::app::App;
use crate::channels::errors::{ErrorDetail, ErrorEvent};
use crate::graphs::{EdgePredicate, GraphBuilder, GraphCompileError};
use crate::interrupts::{Decision, InterruptCapabilities, InterruptRequest};
use crate::llm::ChatRequest;
use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError, NodePartial, NodeStep};
use crate::runtimes::runtime_config::ModelRole;
use crate::secrets::materialize_env;
use crate::state::StateSnapshot;
use crate::tools::shell::SHELL_APPROVAL_ACTION;
use crate::tools::{ToolContext, Workspace};
use crate::types::NodeKind;
use crate::utils::collections::new_extra_map;

/// The pending tool call recorded in the extra channel between the model
/// turn and its execution.
fn pending_tool(snapshot: &StateSnapshot) -> Option<(String, Value)> {
    let value = snapshot.extra.get(PENDING_TOOL_KEY)?;
    if value.is_null() {
        return None;
    }
    let name = value.get("name")?.as_str()?.to_string();
    let args = value.get("args").cloned().unwrap_or(Value::Null);
    Some((name, args))
}

/// Advance the plan: close the task the model just finished, start the
/// next pending one.
struct ProgressTask;

#[async_trait]
impl Node for ProgressTask {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeStep, NodeError> {
        let mut plan = snapshot.plan.clone();

        if let Some(task) = plan.in_progress() {
            let id = task.id;
            let summary = snapshot
                .messages
                .iter()
                .rev()
                .find(|m| m.has_role(Message::ASSISTANT))
                .map(|m| m.content.clone());
            plan.complete(id, summary)?;
            ctx.emit("plan", format!("task {id} completed"))?;
        }

        if let Some(next) = plan.next_pending() {
            let id = next.id;
            plan.start(id)?;
            ctx.emit("plan", format!("task {id} started"))?;
        }

        Ok(NodePartial::new().with_plan(plan).into())
    }
}

/// One model turn: propose the next tool call (or close out the task).
struct GenerateAction {
    services: StageServices,
}

#[async_trait]
impl Node for GenerateAction {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeStep, NodeError> {
        let task = snapshot
            .plan
            .in_progress()
            .ok_or(NodeError::MissingInput {
                what: "task in progress",
            })?;

        let mut messages = vec![Message::system(&format!(
            "You are a careful software engineer working on the task: {}. \
             Use the available tools to make progress. Reply without a tool \
             call once the task is complete, summarizing what you did.",
            task.description
        ))];
        messages.extend(snapshot.messages.iter().cloned());

        let model = ctx
            .config
            .resolve_model(ModelRole::Programmer, &self.services.engine);
        let response = self
            .services
            .client
            .complete(ChatRequest {
                model: model.clone(),
                messages,
                tools: self.services.tools.schemas(),
            })
            .await
            .map_err(|e| NodeError::Provider {
                provider: "model-api",
                message: e.to_string(),
            })?;

        let mut extra = new_extra_map();
        match &response.tool_call {
            Some(call) => {
                ctx.emit("action", format!("model requested tool '{}'", call.name))?;
                extra.insert(
                    PENDING_TOOL_KEY.to_string(),
                    json!({"name": call.name, "args": call.args}),
                );
            }
            None => {
                extra.insert(PENDING_TOOL_KEY.to_string(), Value::Null);
            }
        }

        let mut partial = NodePartial::new()
            .with_extra(extra)
            .with_tokens(vec![TokenDataPoint::now(
                model,
                response.usage.prompt_tokens,
                response.usage.completion_tokens,
                ctx.node_id.clone(),
            )]);
        if !response.content.is_empty() {
            partial = partial.with_messages(vec![Message::assistant(&response.content)]);
        }
        Ok(partial.into())
    }
}

/// Execute the pending tool call, gated by the approval allow-list.
///
/// First visit with an allow-listed tool suspends the run; after resume
/// the node runs again with the operator's decision in the context and
/// acts on it. Tool failures are recoverable: they fold into the
/// conversation as a tool message plus an error event, and the loop
/// continues.
struct TakeAction {
    services: StageServices,
}

impl TakeAction {
    async fn execute_tool(
        &self,
        name: &str,
        args: Value,
        ctx: &NodeContext,
    ) -> Result<NodePartial, NodeError> {
        let workspace =
            Workspace::for_run(&ctx.run_id, &ctx.config, &self.services.engine).await?;
        // Lazy decryption, exactly at point of use. A missing key or a
        // corrupt envelope is fatal for the run.
        let env = materialize_env(&ctx.config.secrets, self.services.engine.cipher().as_ref())?;
        let tool_ctx = ToolContext::new(workspace).with_env(env);

        let mut extra = new_extra_map();
        extra.insert(PENDING_TOOL_KEY.to_string(), Value::Null);

        match self.services.tools.run(name, args, &tool_ctx).await {
            Ok(result) => Ok(NodePartial::new()
                .with_messages(vec![Message::tool(name, &result.content)])
                .with_extra(extra)),
            Err(err) => {
                ctx.emit("action", format!("tool '{name}' failed: {err}"))?;
                let event = ErrorEvent::tool(name, ErrorDetail::msg(err.to_string()))
                    .with_tag("recoverable");
                Ok(NodePartial::new()
                    .with_messages(vec![Message::tool(
                        name,
                        &format!("tool execution failed: {err}"),
                    )])
                    .with_extra(extra)
                    .with_errors(vec![event]))
            }
        }
    }
}

#[async_trait]
impl Node for TakeAction {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeStep, NodeError> {
        let Some((name, args)) = pending_tool(&snapshot) else {
            return Ok(NodePartial::default().into());
        };

        if let Some(resume) = &ctx.resume {
            let mut extra = new_extra_map();
            extra.insert(PENDING_TOOL_KEY.to_string(), Value::Null);
            return match &resume.decision {
                Decision::Accept => {
                    ctx.emit("approval", format!("tool '{name}' approved"))?;
                    Ok(self.execute_tool(&name, args, &ctx).await?.into())
                }
                Decision::Edit(new_args) => {
                    ctx.emit("approval", format!("tool '{name}' approved with edits"))?;
                    Ok(self.execute_tool(&name, new_args.clone(), &ctx).await?.into())
                }
                Decision::Ignore => {
                    ctx.emit("approval", format!("tool '{name}' skipped by operator"))?;
                    Ok(NodePartial::new()
                        .with_messages(vec![Message::tool(
                            &name,
                            "Tool execution skipped by operator.",
                        )])
                        .with_extra(extra)
                        .into())
                }
                Decision::Respond(text) => {
                    ctx.emit("approval", "operator responded without executing")?;
                    Ok(NodePartial::new()
                        .with_messages(vec![Message::user(text)])
                        .with_extra(extra)
                        .into())
                }
            };
        }

        if self.services.tools.requires_approval(&name) {
            ctx.emit("approval", format!("tool '{name}' requires approval"))?;
            return Ok(NodeStep::Suspend(InterruptRequest::new(
                SHELL_APPROVAL_ACTION,
                args,
                InterruptCapabilities::accept_or_ignore(),
            )));
        }

        Ok(self.execute_tool(&name, args, &ctx).await?.into())
    }
}

/// Build the programmer graph.
///
/// ```text
/// Start -> progress-task -+-(task in progress)-> generate-action -> record-usage
///                         \-> End                       ^                |
///                                                       |   (pending tool)
///                                                       |                v
///                                                       +---------- take-action
/// ```
pub fn programmer_graph(services: StageServices) -> Result<App, GraphCompileError> {
    let engine = services.engine.clone();

    let has_active_task: EdgePredicate = Arc::new(|s| s.plan.in_progress().is_some());
    let has_pending_tool: EdgePredicate = Arc::new(|s| pending_tool(s).is_some());

    let progress = NodeKind::Custom("progress-task".into());
    let generate = NodeKind::Custom("generate-action".into());
    let record = NodeKind::Custom("record-usage".into());
    let take = NodeKind::Custom("take-action".into());

    GraphBuilder::new()
        .add_node(progress.clone(), ProgressTask)
        .add_node(
            generate.clone(),
            GenerateAction {
                services: services.clone(),
            },
        )
        .add_node(
            record.clone(),
            RecordUsage {
                services: services.clone(),
            },
        )
        .add_node(take.clone(), TakeAction { services })
        .add_edge(NodeKind::Start, progress.clone())
        // Most specific first: keep working while a task is active.
        .add_conditional_edge(progress.clone(), generate.clone(), has_active_task)
        .add_edge(progress.clone(), NodeKind::End)
        .add_edge(generate.clone(), record.clone())
        .add_conditional_edge(record.clone(), take.clone(), has_pending_tool)
        .add_edge(record, progress)
        .add_edge(take, generate)
        .with_engine_config(engine)
        .compile()
}
