//! Planner stage: produce the task plan and the run's first token data.

use async_trait::async_trait;
use serde_json::json;

use super::{RecordUsage, StageServices, PLAN_REVISIONS_COUNTER};
use crate::accounting::TokenDataPoint;
use crate::app::App;
use crate::graphs::{GraphBuilder, GraphCompileError};
use crate::llm::ChatRequest;
use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError, NodePartial, NodeStep};
use crate::plan::TaskPlan;
use crate::runtimes::runtime_config::ModelRole;
use crate::state::StateSnapshot;
use crate::types::NodeKind;
use crate::utils::collections::{new_counter_map, new_extra_map};

/// Seed run metadata before planning.
struct InitializeContext;

#[async_trait]
impl Node for InitializeContext {
    async fn run(&self, _: StateSnapshot, ctx: NodeContext) -> Result<NodeStep, NodeError> {
        let mut extra = new_extra_map();
        if let Some(repo) = &ctx.config.target_repository {
            extra.insert("target_repository".to_string(), json!(repo));
        }
        extra.insert("mode".to_string(), json!(ctx.config.mode));
        Ok(NodePartial::new().with_extra(extra).into())
    }
}

/// Turn model output into an ordered plan.
///
/// One task per list line (`- item` or `1. item`); a reply without list
/// lines becomes a single-task plan. The plan content is model-generated
/// and opaque; only the list structure matters here.
fn parse_plan(request: &str, content: &str) -> TaskPlan {
    let items: Vec<String> = content
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let rest = trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
                .or_else(|| {
                    trimmed
                        .split_once(". ")
                        .filter(|(n, _)| n.chars().all(|c| c.is_ascii_digit()))
                        .map(|(_, rest)| rest)
                });
            rest.map(str::to_string)
        })
        .filter(|item| !item.is_empty())
        .collect();

    if items.is_empty() {
        TaskPlan::from_descriptions(request, [content.trim().to_string()])
    } else {
        TaskPlan::from_descriptions(request, items)
    }
}

/// Generate the task plan with the planner model.
struct GeneratePlan {
    services: StageServices,
}

#[async_trait]
impl Node for GeneratePlan {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeStep, NodeError> {
        let request = snapshot
            .messages
            .iter()
            .rev()
            .find(|m| m.has_role(Message::USER))
            .ok_or(NodeError::MissingInput {
                what: "user message",
            })?
            .clone();

        ctx.emit("plan", "generating task plan")?;
        let model = ctx
            .config
            .resolve_model(ModelRole::Planner, &self.services.engine);
        let response = self
            .services
            .client
            .complete(ChatRequest {
                model: model.clone(),
                messages: vec![
                    Message::system(
                        "Break the user's request into a short ordered list of concrete \
                         coding tasks. Reply with one task per line, as a dashed list.",
                    ),
                    request.clone(),
                ],
                tools: vec![],
            })
            .await
            .map_err(|e| NodeError::Provider {
                provider: "model-api",
                message: e.to_string(),
            })?;

        let plan = parse_plan(&request.content, &response.content);
        tracing::info!(run = %ctx.run_id, tasks = plan.tasks.len(), "plan generated");

        let mut counters = new_counter_map();
        counters.insert(
            PLAN_REVISIONS_COUNTER.to_string(),
            snapshot
                .counters
                .get(PLAN_REVISIONS_COUNTER)
                .copied()
                .unwrap_or(0)
                + 1,
        );

        Ok(NodePartial::new()
            .with_messages(vec![Message::assistant(&response.content)])
            .with_plan(plan)
            .with_counters(counters)
            .with_tokens(vec![TokenDataPoint::now(
                model,
                response.usage.prompt_tokens,
                response.usage.completion_tokens,
                ctx.node_id.clone(),
            )])
            .into())
    }
}

/// Build the planner graph:
/// `Start -> initialize-context -> generate-plan -> record-usage -> End`.
pub fn planner_graph(services: StageServices) -> Result<App, GraphCompileError> {
    let engine = services.engine.clone();
    GraphBuilder::new()
        .add_node(
            NodeKind::Custom("initialize-context".into()),
            InitializeContext,
        )
        .add_node(
            NodeKind::Custom("generate-plan".into()),
            GeneratePlan {
                services: services.clone(),
            },
        )
        .add_node(
            NodeKind::Custom("record-usage".into()),
            RecordUsage { services },
        )
        .add_edge(NodeKind::Start, NodeKind::Custom("initialize-context".into()))
        .add_edge(
            NodeKind::Custom("initialize-context".into()),
            NodeKind::Custom("generate-plan".into()),
        )
        .add_edge(
            NodeKind::Custom("generate-plan".into()),
            NodeKind::Custom("record-usage".into()),
        )
        .add_edge(NodeKind::Custom("record-usage".into()), NodeKind::End)
        .with_engine_config(engine)
        .compile()
}

#[cfg(test)]
mod tests {
    use super::parse_plan;

    #[test]
    fn dashed_and_numbered_lists_parse() {
        let plan = parse_plan("req", "- first\n- second\n");
        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[1].description, "second");

        let plan = parse_plan("req", "1. alpha\n2. beta\n3. gamma");
        assert_eq!(plan.tasks.len(), 3);
        assert_eq!(plan.tasks[0].description, "alpha");
    }

    #[test]
    fn freeform_reply_becomes_single_task() {
        let plan = parse_plan("req", "just do the thing");
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].description, "just do the thing");
    }
}
