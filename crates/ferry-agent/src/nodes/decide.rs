use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use ferry_core::error::Result;
use ferry_core::traits::ChatModel;
use ferry_core::types::{ChatMessage, FinishReason, LlmResponse, ToolDefinition};

use super::{DECIDE, STATUS_THINKING};
use crate::context::TurnContext;
use crate::graph::{Action, Node, NodeId};
use crate::stream::StreamPrinter;

/// Calls the model with the committed history and routes on its reply.
pub struct DecideNode {
    model: Arc<dyn ChatModel>,
    incomplete_prompt: String,
    stream_fields: HashMap<String, String>,
}

impl DecideNode {
    pub fn new(
        model: Arc<dyn ChatModel>,
        incomplete_prompt: impl Into<String>,
        stream_fields: HashMap<String, String>,
    ) -> Self {
        Self {
            model,
            incomplete_prompt: incomplete_prompt.into(),
            stream_fields,
        }
    }
}

pub struct DecidePrep {
    pending: Vec<ChatMessage>,
    messages: Vec<ChatMessage>,
    tools: Vec<ToolDefinition>,
    printer: StreamPrinter,
}

impl Node for DecideNode {
    type Prep = DecidePrep;
    type Exec = Result<LlmResponse>;

    fn id(&self) -> NodeId {
        DECIDE
    }

    fn outcomes(&self) -> &'static [Action] {
        &[Action::Execute, Action::CallLlm, Action::Complete, Action::Error]
    }

    fn prepare<'a>(&'a self, ctx: &'a mut TurnContext) -> BoxFuture<'a, DecidePrep> {
        Box::pin(async move {
            ctx.sink().status(STATUS_THINKING).await;
            let pending = std::mem::take(&mut ctx.next_messages);
            let mut messages = ctx.chat_history.clone();
            messages.extend(pending.iter().cloned());
            DecidePrep {
                pending,
                messages,
                tools: ctx.tool_definitions(),
                printer: StreamPrinter::new(ctx.sink().clone(), self.stream_fields.clone()),
            }
        })
    }

    fn execute<'a>(&'a self, prep: &'a mut DecidePrep) -> BoxFuture<'a, Self::Exec> {
        let messages = std::mem::take(&mut prep.messages);
        debug!(messages = messages.len(), tools = prep.tools.len(), "Calling model");
        self.model.chat(messages, &prep.tools, &mut prep.printer)
    }

    fn decide<'a>(
        &'a self,
        ctx: &'a mut TurnContext,
        prep: DecidePrep,
        response: Self::Exec,
    ) -> BoxFuture<'a, Action> {
        Box::pin(async move {
            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "Model call failed");
                    ctx.error = Some(e.to_string());
                    return Action::Error;
                }
            };
            ctx.chat_history.extend(prep.pending);
            info!(
                conversation = %ctx.conversation_id,
                finish = ?response.finish_reason,
                tool_calls = response.tool_calls.len(),
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "Model replied"
            );

            let content = response.content.as_str();
            if !content.is_empty() {
                ctx.chat_history.push(ChatMessage::assistant(content));
                ctx.record_answer(content);
                ctx.sink().one_shot(content).await;
            }

            if !response.tool_calls.is_empty() {
                for call in &response.tool_calls {
                    ctx.chat_history.push(ChatMessage::tool_call(call.clone()));
                }
                ctx.tool_calls = response.tool_calls;
                return Action::Execute;
            }

            if let FinishReason::Other(reason) = &response.finish_reason {
                debug!(reason = %reason, "Unrecognised finish reason, treating as stop");
            }
            if content.is_empty() {
                debug!("Model stopped without an answer, nudging");
                ctx.next_messages.push(ChatMessage::user(self.incomplete_prompt.clone()));
                Action::CallLlm
            } else {
                Action::Complete
            }
        })
    }
}
