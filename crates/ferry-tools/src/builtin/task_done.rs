use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info};

use ferry_core::error::Result;
use ferry_core::traits::{CompletionGate, Tool};
use ferry_core::types::ToolContext;

pub const TASK_DONE: &str = "task_done";

/// The completion tool. The only way a turn is marked finished.
///
/// When the gate refuses, the configured prompt is returned as a normal
/// (successful) result so the model sees why and keeps working.
pub struct TaskDoneTool {
    gate: Arc<dyn CompletionGate>,
    incomplete_prompt: String,
}

impl TaskDoneTool {
    pub fn new(gate: Arc<dyn CompletionGate>, incomplete_prompt: &str) -> Self {
        Self {
            gate,
            incomplete_prompt: incomplete_prompt.to_string(),
        }
    }
}

impl Tool for TaskDoneTool {
    fn name(&self) -> &str {
        TASK_DONE
    }

    fn description(&self) -> &str {
        "Report that the task is complete. Call this only after the answer has been \
         given to the user."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    fn execute(&self, _input: serde_json::Value, ctx: ToolContext) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            if self.gate.can_complete() {
                self.gate.mark_complete();
                info!(conversation = %ctx.conversation_id, "Task marked complete");
                Ok("Task done.".to_string())
            } else {
                debug!(conversation = %ctx.conversation_id, "Completion refused, no answer yet");
                Ok(self.incomplete_prompt.clone())
            }
        })
    }

    fn timeout_secs(&self) -> u64 {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use ferry_core::types::ConversationId;

    struct Gate {
        allowed: bool,
        done: AtomicBool,
    }

    impl CompletionGate for Gate {
        fn can_complete(&self) -> bool {
            self.allowed
        }
        fn mark_complete(&self) {
            self.done.store(true, Ordering::SeqCst);
        }
        fn is_complete(&self) -> bool {
            self.done.load(Ordering::SeqCst)
        }
        fn record_answer(&self) {}
        fn reset(&self) {}
    }

    fn ctx() -> ToolContext {
        ToolContext::new(ConversationId::new(), Vec::new())
    }

    #[tokio::test]
    async fn test_completes_when_allowed() {
        let gate = Arc::new(Gate { allowed: true, done: AtomicBool::new(false) });
        let tool = TaskDoneTool::new(gate.clone(), "keep going");
        let out = tool.execute(serde_json::json!({}), ctx()).await.unwrap();
        assert_eq!(out, "Task done.");
        assert!(gate.is_complete());
    }

    #[tokio::test]
    async fn test_refusal_returns_prompt_and_leaves_flag() {
        let gate = Arc::new(Gate { allowed: false, done: AtomicBool::new(false) });
        let tool = TaskDoneTool::new(gate.clone(), "keep going");
        let out = tool.execute(serde_json::json!({}), ctx()).await.unwrap();
        assert_eq!(out, "keep going");
        assert!(!gate.is_complete());
    }
}
