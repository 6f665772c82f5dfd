use std::sync::Arc;

use ferry_core::output::OutputSink;
use ferry_core::traits::CompletionGate;
use ferry_core::types::{ChatMessage, ConversationId, ToolCall, ToolDefinition};
use ferry_tools::ToolRegistry;

use crate::gate::AnswerGate;

/// Mutable state of one conversation, shared by every node of a turn.
///
/// Only one flow runs against a context at a time; the owning
/// [`Conversation`](crate::session::Conversation) sits behind an async mutex.
pub struct TurnContext {
    pub conversation_id: ConversationId,
    pub user_message: String,
    /// Messages committed to the transcript.
    pub chat_history: Vec<ChatMessage>,
    /// Messages queued for the next model call, committed by Decide.
    pub next_messages: Vec<ChatMessage>,
    /// Tool calls awaiting execution.
    pub tool_calls: Vec<ToolCall>,
    pub remote_tools: Vec<ToolDefinition>,
    pub local_tools: Arc<ToolRegistry>,
    /// User-facing answers produced this turn.
    pub answers: Vec<String>,
    pub error: Option<String>,
    /// Set by the client's acknowledgement; consumed by Execute.
    pub is_continue: bool,
    /// The last run stopped waiting for acknowledgement.
    pub paused: bool,
    incomplete_prompt: String,
    gate: Arc<dyn CompletionGate>,
    sink: Arc<dyn OutputSink>,
}

impl TurnContext {
    pub fn new(
        conversation_id: ConversationId,
        user_message: impl Into<String>,
        sink: Arc<dyn OutputSink>,
        incomplete_prompt: &str,
    ) -> Self {
        Self::with_gate(
            conversation_id,
            user_message,
            sink,
            incomplete_prompt,
            Arc::new(AnswerGate::new()),
        )
    }

    pub fn with_gate(
        conversation_id: ConversationId,
        user_message: impl Into<String>,
        sink: Arc<dyn OutputSink>,
        incomplete_prompt: &str,
        gate: Arc<dyn CompletionGate>,
    ) -> Self {
        let local_tools = Arc::new(ToolRegistry::for_conversation(gate.clone(), incomplete_prompt));
        Self {
            conversation_id,
            user_message: user_message.into(),
            chat_history: Vec::new(),
            next_messages: Vec::new(),
            tool_calls: Vec::new(),
            remote_tools: Vec::new(),
            local_tools,
            answers: Vec::new(),
            error: None,
            is_continue: false,
            paused: false,
            incomplete_prompt: incomplete_prompt.to_string(),
            gate,
            sink,
        }
    }

    pub fn sink(&self) -> &Arc<dyn OutputSink> {
        &self.sink
    }

    pub fn gate(&self) -> &Arc<dyn CompletionGate> {
        &self.gate
    }

    /// Whether the completion tool accepted this turn.
    pub fn task_done(&self) -> bool {
        self.gate.is_complete()
    }

    /// Record a user-facing answer and tell the gate about it.
    pub fn record_answer(&mut self, text: &str) {
        self.answers.push(text.to_string());
        self.gate.record_answer();
    }

    /// Clear per-turn state and rebuild the local tools for a fresh turn.
    pub fn reset_for_turn(&mut self) {
        self.chat_history.clear();
        self.next_messages.clear();
        self.tool_calls.clear();
        self.answers.clear();
        self.error = None;
        self.paused = false;
        self.gate.reset();
        self.local_tools = Arc::new(ToolRegistry::for_conversation(
            self.gate.clone(),
            &self.incomplete_prompt,
        ));
    }

    /// Local then remote tool definitions, as offered to the model.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = self.local_tools.definitions();
        defs.extend(self.remote_tools.iter().cloned());
        defs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::output::NullSink;

    #[test]
    fn test_reset_clears_turn_state() {
        let mut ctx = TurnContext::new(ConversationId::new(), "q", Arc::new(NullSink), "more");
        ctx.chat_history.push(ChatMessage::user("q"));
        ctx.record_answer("a");
        ctx.gate().mark_complete();
        ctx.error = Some("boom".into());
        ctx.paused = true;

        ctx.reset_for_turn();
        assert!(ctx.chat_history.is_empty());
        assert!(ctx.answers.is_empty());
        assert!(ctx.error.is_none());
        assert!(!ctx.paused);
        assert!(!ctx.task_done());
        assert!(!ctx.gate().can_complete());
        assert_eq!(ctx.user_message, "q");
    }

    #[test]
    fn test_local_tools_come_first() {
        let mut ctx = TurnContext::new(ConversationId::new(), "q", Arc::new(NullSink), "more");
        ctx.remote_tools.push(ToolDefinition {
            name: "list_tables".into(),
            description: String::new(),
            input_schema: serde_json::json!({"type": "object"}),
        });
        let names: Vec<_> = ctx.tool_definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["chat_history", "sequentialthinking", "task_done", "list_tables"]);
    }
}
