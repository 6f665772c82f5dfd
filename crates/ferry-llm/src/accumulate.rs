use ferry_core::error::{FerryError, Result};
use ferry_core::types::{FinishReason, LlmResponse, StreamDelta, ToolCall, Usage};

#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    input_json: String,
}

/// Folds a delta stream into one [`LlmResponse`].
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    content: String,
    tool_calls: Vec<ToolCallAccumulator>,
    finish_reason: Option<FinishReason>,
    usage: Usage,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &StreamDelta) {
        match delta {
            StreamDelta::TextDelta(text) => self.content.push_str(text),
            StreamDelta::ToolUseStart { index, id, name } => {
                while self.tool_calls.len() <= *index {
                    self.tool_calls.push(ToolCallAccumulator::default());
                }
                let tc = &mut self.tool_calls[*index];
                // The first non-empty id and name win; later repeats are noise
                if tc.id.is_empty() && !id.is_empty() {
                    tc.id = id.clone();
                }
                if tc.name.is_empty() && !name.is_empty() {
                    tc.name = name.clone();
                }
            }
            StreamDelta::ToolInputDelta { index, delta } => {
                if let Some(tc) = self.tool_calls.get_mut(*index) {
                    tc.input_json.push_str(delta);
                }
            }
            StreamDelta::Stop(reason) => self.finish_reason = Some(reason.clone()),
            StreamDelta::Usage {
                input_tokens,
                output_tokens,
            } => {
                self.usage.input_tokens += input_tokens;
                self.usage.output_tokens += output_tokens;
            }
        }
    }

    /// Build the response. Tool arguments must parse as a JSON object; an
    /// empty argument string means `{}`.
    pub fn finish(self) -> Result<LlmResponse> {
        let mut tool_calls = Vec::with_capacity(self.tool_calls.len());
        for (i, tc) in self.tool_calls.into_iter().enumerate() {
            if tc.name.is_empty() {
                return Err(FerryError::LlmParse(format!("tool call #{} has no name", i)));
            }
            let arguments = if tc.input_json.trim().is_empty() {
                serde_json::Map::new()
            } else {
                match serde_json::from_str::<serde_json::Value>(&tc.input_json) {
                    Ok(serde_json::Value::Object(map)) => map,
                    Ok(other) => {
                        return Err(FerryError::LlmParse(format!(
                            "arguments for {} are not an object: {}",
                            tc.name, other
                        )))
                    }
                    Err(e) => {
                        return Err(FerryError::LlmParse(format!(
                            "invalid arguments for {}: {}",
                            tc.name, e
                        )))
                    }
                }
            };
            let call_id = if tc.id.is_empty() {
                format!("call_{}", i)
            } else {
                tc.id
            };
            tool_calls.push(ToolCall::new(call_id, tc.name, arguments));
        }

        let finish_reason = match self.finish_reason {
            Some(reason) => reason,
            None if tool_calls.is_empty() => FinishReason::Stop,
            None => FinishReason::ToolCalls,
        };

        Ok(LlmResponse {
            content: self.content,
            tool_calls,
            finish_reason,
            usage: self.usage,
            model: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_text_and_fragmented_arguments() {
        let mut acc = ResponseAccumulator::new();
        acc.push(&StreamDelta::TextDelta("Here are ".into()));
        acc.push(&StreamDelta::TextDelta("the tables".into()));
        acc.push(&StreamDelta::ToolUseStart { index: 0, id: "c0".into(), name: "describe".into() });
        acc.push(&StreamDelta::ToolInputDelta { index: 0, delta: "{\"tab".into() });
        acc.push(&StreamDelta::ToolInputDelta { index: 0, delta: "le\": \"users\"}".into() });
        acc.push(&StreamDelta::ToolUseStart { index: 1, id: "c1".into(), name: "list_tables".into() });
        acc.push(&StreamDelta::Stop(FinishReason::ToolCalls));
        acc.push(&StreamDelta::Usage { input_tokens: 10, output_tokens: 4 });

        let r = acc.finish().unwrap();
        assert_eq!(r.content, "Here are the tables");
        assert_eq!(r.tool_calls.len(), 2);
        assert_eq!(r.tool_calls[0].call_id, "c0");
        assert_eq!(r.tool_calls[0].arguments["table"], "users");
        assert!(r.tool_calls[1].arguments.is_empty());
        assert_eq!(r.finish_reason, FinishReason::ToolCalls);
        assert_eq!(r.usage.output_tokens, 4);
    }

    #[test]
    fn test_rejects_truncated_arguments() {
        let mut acc = ResponseAccumulator::new();
        acc.push(&StreamDelta::ToolUseStart { index: 0, id: "c0".into(), name: "describe".into() });
        acc.push(&StreamDelta::ToolInputDelta { index: 0, delta: "{\"table\": \"us".into() });
        assert!(matches!(acc.finish(), Err(FerryError::LlmParse(_))));
    }

    #[test]
    fn test_repeated_start_keeps_first_name() {
        let mut acc = ResponseAccumulator::new();
        acc.push(&StreamDelta::ToolUseStart { index: 0, id: "c0".into(), name: "list_tables".into() });
        acc.push(&StreamDelta::ToolUseStart { index: 0, id: "".into(), name: "".into() });
        acc.push(&StreamDelta::ToolInputDelta { index: 0, delta: "{}".into() });
        acc.push(&StreamDelta::ToolUseStart { index: 0, id: "c0".into(), name: "list_tables".into() });

        let r = acc.finish().unwrap();
        assert_eq!(r.tool_calls.len(), 1);
        assert_eq!(r.tool_calls[0].name, "list_tables");
        assert_eq!(r.tool_calls[0].call_id, "c0");
    }

    #[test]
    fn test_missing_stop_defaults() {
        let mut acc = ResponseAccumulator::new();
        acc.push(&StreamDelta::TextDelta("hi".into()));
        assert_eq!(acc.finish().unwrap().finish_reason, FinishReason::Stop);
    }
}
