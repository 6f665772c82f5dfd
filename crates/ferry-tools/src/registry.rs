use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use ferry_core::error::{FerryError, Result};
use ferry_core::traits::{CompletionGate, Tool};
use ferry_core::types::{ToolContext, ToolDefinition};

use crate::builtin::{chat_history::ChatHistoryTool, task_done::TaskDoneTool, thinking::SequentialThinkingTool};

/// Registry of in-process tools.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Get tool definitions for sending to the LLM.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| FerryError::ToolNotFound(name.to_string()))?;

        debug!(tool = %name, "Executing local tool");
        let timeout = std::time::Duration::from_secs(tool.timeout_secs());

        match tokio::time::timeout(timeout, tool.execute(input, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(FerryError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs: tool.timeout_secs(),
            }),
        }
    }

    /// The local tools every conversation gets.
    pub fn for_conversation(gate: Arc<dyn CompletionGate>, incomplete_prompt: &str) -> Self {
        let mut registry = Self::new();
        registry.register(SequentialThinkingTool::new());
        registry.register(TaskDoneTool::new(gate, incomplete_prompt));
        registry.register(ChatHistoryTool);
        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicBool, Ordering};

    use ferry_core::types::ConversationId;

    struct SlowTool;

    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "never finishes in time"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<String>> {
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                Ok("late".into())
            })
        }
        fn timeout_secs(&self) -> u64 {
            1
        }
    }

    #[derive(Default)]
    struct FlagGate(AtomicBool);

    impl CompletionGate for FlagGate {
        fn can_complete(&self) -> bool {
            true
        }
        fn mark_complete(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
        fn is_complete(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
        fn record_answer(&self) {}
        fn reset(&self) {
            self.0.store(false, Ordering::SeqCst);
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(ConversationId::new(), Vec::new())
    }

    #[test]
    fn test_conversation_tools_are_registered() {
        let registry = ToolRegistry::for_conversation(Arc::new(FlagGate::default()), "not yet");
        assert_eq!(registry.list(), vec!["chat_history", "sequentialthinking", "task_done"]);
        assert_eq!(registry.definitions().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.execute("nope", serde_json::json!({}), ctx()).await.unwrap_err();
        assert!(matches!(err, FerryError::ToolNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let err = registry.execute("slow", serde_json::json!({}), ctx()).await.unwrap_err();
        assert!(matches!(err, FerryError::ToolTimeout { timeout_secs: 1, .. }));
    }
}
