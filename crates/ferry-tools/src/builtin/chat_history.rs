use futures::future::BoxFuture;

use ferry_core::error::Result;
use ferry_core::traits::Tool;
use ferry_core::types::ToolContext;

/// Returns the conversation so far as a JSON array of `{role, content}`.
pub struct ChatHistoryTool;

impl Tool for ChatHistoryTool {
    fn name(&self) -> &str {
        "chat_history"
    }

    fn description(&self) -> &str {
        "Return the messages exchanged in this conversation so far."
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
            let entries: Vec<serde_json::Value> = ctx
                .history
                .iter()
                .map(|m| serde_json::json!({ "role": m.role, "content": m.text() }))
                .collect();
            Ok(serde_json::to_string(&entries)?)
        })
    }
}
