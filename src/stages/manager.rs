//! Manager stage: classify the incoming request and route it.

use async_trait::async_trait;
use serde_json::json;

use super::{StageServices, ROUTE_KEY};
use crate::accounting::TokenDataPoint;
use crate::app::App;
use crate::graphs::{GraphBuilder, GraphCompileError};
use crate::llm::ChatRequest;
use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError, NodePartial, NodeStep};
use crate::runtimes::runtime_config::ModelRole;
use crate::state::StateSnapshot;
use crate::types::NodeKind;
use crate::utils::collections::new_extra_map;

/// Classifies the latest user message and records where the work should go.
///
/// The classification itself is model-generated and opaque to the engine;
/// anything that is not an explicit "no action needed" routes to the
/// planner.
struct ClassifyRequest {
    services: StageServices,
}

#[async_trait]
impl Node for ClassifyRequest {
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
            })?;

        ctx.emit("classify", "classifying incoming request")?;
        let model = ctx
            .config
            .resolve_model(ModelRole::Router, &self.services.engine);
        let response = self
            .services
            .client
            .complete(ChatRequest {
                model: model.clone(),
                messages: vec![
                    Message::system(
                        "Classify the user's request. Reply with exactly one word: \
                         'plan' if it asks for code changes, 'no-op' otherwise.",
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

        let route = if response.content.trim().eq_ignore_ascii_case("no-op") {
            "no-op"
        } else {
            "planner"
        };
        tracing::info!(run = %ctx.run_id, route, "request classified");

        let mut extra = new_extra_map();
        extra.insert(ROUTE_KEY.to_string(), json!(route));

        Ok(NodePartial::new()
            .with_extra(extra)
            .with_tokens(vec![TokenDataPoint::now(
                model,
                response.usage.prompt_tokens,
                response.usage.completion_tokens,
                ctx.node_id.clone(),
            )])
            .into())
    }
}

/// Build the manager graph: `Start -> classify-request -> End`.
pub fn manager_graph(services: StageServices) -> Result<App, GraphCompileError> {
    let engine = services.engine.clone();
    GraphBuilder::new()
        .add_node(
            NodeKind::Custom("classify-request".into()),
            ClassifyRequest { services },
        )
        .add_edge(NodeKind::Start, NodeKind::Custom("classify-request".into()))
        .add_edge(NodeKind::Custom("classify-request".into()), NodeKind::End)
        .with_engine_config(engine)
        .compile()
}
