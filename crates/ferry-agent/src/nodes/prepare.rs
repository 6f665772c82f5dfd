use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use ferry_core::error::Result;
use ferry_core::traits::ToolProvider;
use ferry_core::types::{ChatMessage, ToolDefinition};

use super::{PREPARE, STATUS_PREPARING};
use crate::context::TurnContext;
use crate::graph::{Action, Node, NodeId};

/// Starts a turn: resets per-turn state, discovers remote tools and queues
/// the system and user messages.
pub struct PrepareNode {
    provider: Arc<dyn ToolProvider>,
    system_prompt: String,
}

impl PrepareNode {
    pub fn new(provider: Arc<dyn ToolProvider>, system_prompt: impl Into<String>) -> Self {
        Self {
            provider,
            system_prompt: system_prompt.into(),
        }
    }
}

impl Node for PrepareNode {
    type Prep = ();
    type Exec = Result<Vec<ToolDefinition>>;

    fn id(&self) -> NodeId {
        PREPARE
    }

    fn outcomes(&self) -> &'static [Action] {
        &[Action::CallLlm, Action::Error]
    }

    fn prepare<'a>(&'a self, ctx: &'a mut TurnContext) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            ctx.sink().status(STATUS_PREPARING).await;
            ctx.reset_for_turn();
        })
    }

    fn execute<'a>(&'a self, _prep: &'a mut ()) -> BoxFuture<'a, Self::Exec> {
        self.provider.list_tools()
    }

    fn decide<'a>(
        &'a self,
        ctx: &'a mut TurnContext,
        _prep: (),
        tools: Self::Exec,
    ) -> BoxFuture<'a, Action> {
        Box::pin(async move {
            let tools = match tools {
                Ok(tools) => tools,
                Err(e) => {
                    warn!(error = %e, "Tool discovery failed");
                    ctx.error = Some(format!("failed to list tools: {}", e));
                    return Action::Error;
                }
            };

            let (remote, shadowed): (Vec<_>, Vec<_>) = tools
                .into_iter()
                .partition(|t| !ctx.local_tools.contains(&t.name));
            for tool in &shadowed {
                warn!(tool = %tool.name, "Remote tool shadowed by a local tool of the same name");
            }
            info!(
                conversation = %ctx.conversation_id,
                local = ctx.local_tools.list().len(),
                remote = remote.len(),
                "Tools ready"
            );
            ctx.remote_tools = remote;

            ctx.next_messages = vec![
                ChatMessage::system(self.system_prompt.clone()),
                ChatMessage::user(ctx.user_message.clone()),
            ];
            Action::CallLlm
        })
    }
}
