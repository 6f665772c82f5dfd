use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use ferry_core::config::AgentConfig;
use ferry_core::error::Result;
use ferry_core::traits::{ChatModel, ToolProvider};

use crate::context::TurnContext;
use crate::graph::{Action, Flow, FlowReport, Graph};
use crate::nodes::{
    CompleteNode, DecideNode, ErrorNode, ExecuteNode, PrepareNode, COMPLETE, DECIDE, ERROR, EXECUTE,
    PREPARE,
};
use crate::session::Conversation;

/// Wires the nodes into the turn graph and runs it for a conversation.
///
/// ```text
/// prepare --call_llm--> decide --execute--> execute --call_llm--> decide
///                        decide --call_llm--> decide
///                        decide --complete--> complete
///                                             execute --complete--> complete
/// prepare | decide | execute --error--> error
/// ```
pub struct Agent {
    graph: Graph,
    max_steps: usize,
}

impl Agent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Arc<dyn ToolProvider>,
        config: &AgentConfig,
    ) -> Result<Self> {
        let graph = Graph::builder()
            .node(PrepareNode::new(tools.clone(), config.system_prompt()))
            .node(DecideNode::new(
                model,
                config.incomplete_prompt.clone(),
                config.stream_fields.clone(),
            ))
            .node(ExecuteNode::new(tools, config.confirm_tools.iter().cloned()))
            .node(CompleteNode)
            .node(ErrorNode)
            .edge(PREPARE, Action::CallLlm, DECIDE)
            .edge(PREPARE, Action::Error, ERROR)
            .edge(DECIDE, Action::Execute, EXECUTE)
            .edge(DECIDE, Action::CallLlm, DECIDE)
            .edge(DECIDE, Action::Complete, COMPLETE)
            .edge(DECIDE, Action::Error, ERROR)
            .edge(EXECUTE, Action::CallLlm, DECIDE)
            .edge(EXECUTE, Action::Complete, COMPLETE)
            .edge(EXECUTE, Action::Error, ERROR)
            .entry(PREPARE)
            .build()?;

        Ok(Self {
            graph,
            max_steps: config.max_steps,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Run one turn, or resume a paused one when the conversation has been
    /// acknowledged.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> Result<FlowReport> {
        self.run_context(&mut conversation.context, cancel).await
    }

    pub async fn run_context(
        &self,
        ctx: &mut TurnContext,
        cancel: &CancellationToken,
    ) -> Result<FlowReport> {
        let start = if ctx.is_continue { EXECUTE } else { PREPARE };
        info!(conversation = %ctx.conversation_id, start = %start, "Running turn");
        Flow::new(&self.graph, self.max_steps)
            .run(ctx, Some(start), cancel)
            .await
    }
}
