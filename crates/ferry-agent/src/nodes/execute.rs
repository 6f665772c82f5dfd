use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use tracing::{error, info, warn};

use ferry_core::traits::ToolProvider;
use ferry_core::types::{ChatMessage, ToolCall, ToolContext, ToolResult};
use ferry_tools::ToolRegistry;

use super::{EXECUTE, STATUS_AWAITING_ACK, STATUS_EXECUTING};
use crate::context::TurnContext;
use crate::graph::{Action, Node, NodeId};

/// Runs the pending tool calls: local tools one at a time, then remote tools
/// concurrently. Results keep the order of the calls.
pub struct ExecuteNode {
    provider: Arc<dyn ToolProvider>,
    confirm_tools: HashSet<String>,
}

impl ExecuteNode {
    pub fn new(provider: Arc<dyn ToolProvider>, confirm_tools: impl IntoIterator<Item = String>) -> Self {
        Self {
            provider,
            confirm_tools: confirm_tools.into_iter().collect(),
        }
    }
}

pub struct ExecutePrep {
    calls: Vec<ToolCall>,
    acknowledged: bool,
    local: Arc<ToolRegistry>,
    tool_ctx: ToolContext,
}

#[derive(Debug)]
pub enum ExecuteOutcome {
    /// Nothing was pending.
    Nothing,
    /// A call needs the client's go-ahead first.
    AwaitingAck,
    Ran(Vec<ToolResult>),
}

impl ExecuteNode {
    async fn run_local(registry: &ToolRegistry, call: &ToolCall, ctx: ToolContext) -> ToolResult {
        let input = serde_json::Value::Object(call.arguments.clone());
        match registry.execute(&call.name, input, ctx).await {
            Ok(output) => ToolResult::success(call, output),
            Err(e) => {
                error!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::failure(call, e.to_string())
            }
        }
    }

    async fn run_remote(&self, call: &ToolCall) -> ToolResult {
        match self.provider.call_tool(&call.name, call.arguments.clone()).await {
            Ok(output) => ToolResult::success(call, output),
            Err(e) => {
                error!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::failure(call, e.to_string())
            }
        }
    }
}

impl Node for ExecuteNode {
    type Prep = ExecutePrep;
    type Exec = ExecuteOutcome;

    fn id(&self) -> NodeId {
        EXECUTE
    }

    fn outcomes(&self) -> &'static [Action] {
        &[Action::CallLlm, Action::Complete, Action::Pause, Action::Error]
    }

    fn prepare<'a>(&'a self, ctx: &'a mut TurnContext) -> BoxFuture<'a, ExecutePrep> {
        Box::pin(async move {
            ctx.sink().status(STATUS_EXECUTING).await;
            let acknowledged = std::mem::take(&mut ctx.is_continue);
            ctx.paused = false;
            ExecutePrep {
                calls: std::mem::take(&mut ctx.tool_calls),
                acknowledged,
                local: ctx.local_tools.clone(),
                tool_ctx: ToolContext::new(ctx.conversation_id.clone(), ctx.chat_history.clone()),
            }
        })
    }

    fn execute<'a>(&'a self, prep: &'a mut ExecutePrep) -> BoxFuture<'a, ExecuteOutcome> {
        Box::pin(async move {
            if prep.calls.is_empty() {
                return ExecuteOutcome::Nothing;
            }
            if !prep.acknowledged && prep.calls.iter().any(|c| self.confirm_tools.contains(&c.name)) {
                return ExecuteOutcome::AwaitingAck;
            }

            let mut slots: Vec<Option<ToolResult>> = vec![None; prep.calls.len()];
            let (local, remote): (Vec<_>, Vec<_>) = prep
                .calls
                .iter()
                .enumerate()
                .partition(|(_, c)| prep.local.contains(&c.name));

            for (i, call) in local {
                slots[i] = Some(Self::run_local(&prep.local, call, prep.tool_ctx.clone()).await);
            }

            let remote_results = join_all(remote.iter().map(|(_, call)| self.run_remote(call))).await;
            for ((i, _), result) in remote.into_iter().zip(remote_results) {
                slots[i] = Some(result);
            }

            ExecuteOutcome::Ran(slots.into_iter().flatten().collect())
        })
    }

    fn decide<'a>(
        &'a self,
        ctx: &'a mut TurnContext,
        prep: ExecutePrep,
        outcome: ExecuteOutcome,
    ) -> BoxFuture<'a, Action> {
        Box::pin(async move {
            match outcome {
                ExecuteOutcome::Nothing => {
                    warn!(conversation = %ctx.conversation_id, "Execute reached with no pending tool calls");
                    ctx.error = Some("no tool calls to execute".to_string());
                    Action::Error
                }
                ExecuteOutcome::AwaitingAck => {
                    info!(
                        conversation = %ctx.conversation_id,
                        calls = prep.calls.len(),
                        "Waiting for acknowledgement before running tools"
                    );
                    ctx.tool_calls = prep.calls;
                    ctx.paused = true;
                    ctx.sink().status(STATUS_AWAITING_ACK).await;
                    Action::Pause
                }
                ExecuteOutcome::Ran(results) => {
                    let failed = results.iter().filter(|r| !r.is_success()).count();
                    info!(
                        conversation = %ctx.conversation_id,
                        total = results.len(),
                        failed,
                        "Tools executed"
                    );
                    if ctx.task_done() {
                        return Action::Complete;
                    }
                    ctx.next_messages
                        .extend(results.into_iter().map(ChatMessage::tool_result));
                    Action::CallLlm
                }
            }
        })
    }
}
