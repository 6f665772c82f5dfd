use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ferry_core::error::{FerryError, Result};

use super::node::{Action, NodeId};
use super::table::Graph;
use crate::context::TurnContext;

/// One node invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub node: NodeId,
    pub action: Action,
}

/// What a flow run did.
#[derive(Debug, Clone)]
pub struct FlowReport {
    /// Node invocations in order.
    pub steps: Vec<Step>,
    /// Action returned by the final node.
    pub last_action: Action,
    pub elapsed_ms: u64,
}

impl FlowReport {
    pub fn visited(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.node.0).collect()
    }

    pub fn paused(&self) -> bool {
        self.last_action == Action::Pause
    }
}

/// Walks a [`Graph`] until a node returns an action with no outgoing edge.
pub struct Flow<'g> {
    graph: &'g Graph,
    max_steps: usize,
}

impl<'g> Flow<'g> {
    pub fn new(graph: &'g Graph, max_steps: usize) -> Self {
        Self { graph, max_steps }
    }

    /// Run from `start` (or the graph's entry).
    ///
    /// Cancellation is checked before every node and raced against the
    /// running node. At most `max_steps` nodes run.
    pub async fn run(
        &self,
        ctx: &mut TurnContext,
        start: Option<NodeId>,
        cancel: &CancellationToken,
    ) -> Result<FlowReport> {
        let started = Instant::now();
        let mut current = start.unwrap_or_else(|| self.graph.entry());
        if !self.graph.contains(current) {
            return Err(FerryError::Graph(format!("unknown start node '{}'", current)));
        }

        let mut steps: Vec<Step> = Vec::new();
        info!(conversation = %ctx.conversation_id, start = %current, "Flow started");

        loop {
            if cancel.is_cancelled() {
                info!(conversation = %ctx.conversation_id, node = %current, "Flow cancelled");
                return Err(FerryError::Cancelled);
            }
            if steps.len() >= self.max_steps {
                warn!(
                    conversation = %ctx.conversation_id,
                    max_steps = self.max_steps,
                    "Flow exceeded step limit"
                );
                return Err(FerryError::MaxStepsExceeded(self.max_steps));
            }

            let node = self
                .graph
                .node(current)
                .ok_or_else(|| FerryError::Graph(format!("node '{}' not found in graph", current)))?;

            let node_start = Instant::now();
            let action = tokio::select! {
                action = node.run(ctx) => action,
                _ = cancel.cancelled() => {
                    info!(node = %current, "Flow cancelled mid-node");
                    return Err(FerryError::Cancelled);
                }
            };
            debug!(
                node = %current,
                action = %action,
                elapsed_ms = node_start.elapsed().as_millis() as u64,
                "Node finished"
            );

            if !node.outcomes().contains(&action) {
                warn!(node = %current, action = %action, "Node returned an undeclared action");
            }
            steps.push(Step { node: current, action });

            match self.graph.successor(current, action) {
                Some(next) => current = next,
                None if action.is_terminal() => break,
                None => {
                    warn!(
                        node = %current,
                        action = %action,
                        "No edge for action, flow stops here"
                    );
                    break;
                }
            }
        }

        let last_action = steps.last().map(|s| s.action).unwrap_or(Action::Done);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            conversation = %ctx.conversation_id,
            steps = steps.len(),
            last_action = %last_action,
            elapsed_ms,
            "Flow finished"
        );
        Ok(FlowReport {
            steps,
            last_action,
            elapsed_ms,
        })
    }
}
