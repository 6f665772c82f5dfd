//! Sequential thinking tool: lets the model reason step by step without side
//! effects. The `thought` argument is what clients see streaming live.

use std::collections::BTreeSet;
use std::sync::Mutex;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;

use ferry_core::error::{FerryError, Result};
use ferry_core::traits::Tool;
use ferry_core::types::ToolContext;

#[derive(Debug, Deserialize)]
struct ThoughtInput {
    thought: String,
    #[serde(default = "default_true")]
    next_thought_needed: bool,
    #[serde(default = "default_one")]
    thought_number: u32,
    #[serde(default = "default_one")]
    total_thoughts: u32,
    #[serde(default)]
    is_revision: bool,
    #[serde(default)]
    revises_thought: Option<u32>,
    #[serde(default)]
    branch_from_thought: Option<u32>,
    #[serde(default)]
    branch_id: Option<String>,
}

fn default_true() -> bool { true }
fn default_one() -> u32 { 1 }

#[derive(Default)]
struct ThoughtLog {
    count: usize,
    branches: BTreeSet<String>,
}

pub struct SequentialThinkingTool {
    log: Mutex<ThoughtLog>,
}

impl SequentialThinkingTool {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(ThoughtLog::default()),
        }
    }
}

impl Default for SequentialThinkingTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for SequentialThinkingTool {
    fn name(&self) -> &str {
        "sequentialthinking"
    }

    fn description(&self) -> &str {
        "Think through a problem one step at a time. Each call records one thought; \
         revise or branch earlier thoughts when new information appears. Set \
         next_thought_needed to false when the reasoning is finished."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "thought": {"type": "string", "description": "The current thinking step"},
                "next_thought_needed": {"type": "boolean"},
                "thought_number": {"type": "integer", "minimum": 1},
                "total_thoughts": {"type": "integer", "minimum": 1},
                "is_revision": {"type": "boolean"},
                "revises_thought": {"type": "integer", "minimum": 1},
                "branch_from_thought": {"type": "integer", "minimum": 1},
                "branch_id": {"type": "string"}
            },
            "required": ["thought", "next_thought_needed", "thought_number", "total_thoughts"]
        })
    }

    fn execute(&self, input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let input: ThoughtInput = serde_json::from_value(input)
                .map_err(|e| FerryError::ToolValidation(format!("sequentialthinking: {}", e)))?;
            if input.thought.trim().is_empty() {
                return Err(FerryError::ToolValidation("thought must not be empty".into()));
            }
            if input.is_revision && input.revises_thought.is_none() {
                return Err(FerryError::ToolValidation(
                    "is_revision requires revises_thought".into(),
                ));
            }

            let total = input.total_thoughts.max(input.thought_number);
            let (history_len, branches) = {
                let mut log = self
                    .log
                    .lock()
                    .map_err(|_| FerryError::ToolExecution {
                        tool: "sequentialthinking".into(),
                        message: "thought log poisoned".into(),
                    })?;
                log.count += 1;
                if let (Some(_), Some(id)) = (input.branch_from_thought, input.branch_id.as_ref()) {
                    log.branches.insert(id.clone());
                }
                (log.count, log.branches.iter().cloned().collect::<Vec<_>>())
            };

            Ok(json!({
                "thought_number": input.thought_number,
                "total_thoughts": total,
                "next_thought_needed": input.next_thought_needed,
                "branches": branches,
                "thought_history_length": history_len,
            })
            .to_string())
        })
    }
}
