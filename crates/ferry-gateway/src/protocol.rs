//! Inbound frames. Outbound frames are [`OutputEvent`](ferry_core::output::OutputEvent)s,
//! which already serialize as `{"type", "content"}`.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
}

/// A client request, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    /// Start a new conversation with this user message.
    Message(String),
    /// Answer to a paused turn: `cancel` or empty declines, anything else
    /// resumes it.
    Acknowledge(String),
}

impl ClientRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientRequest::Message(_) => "message",
            ClientRequest::Acknowledge(_) => "acknowledge",
        }
    }
}

pub fn parse_frame(text: &str) -> Result<ClientRequest, String> {
    let frame: RawFrame =
        serde_json::from_str(text).map_err(|e| format!("malformed frame: {}", e))?;
    let content = frame.content.unwrap_or_default();
    match frame.kind.as_str() {
        "message" if content.trim().is_empty() => Err("message content is required".to_string()),
        "message" => Ok(ClientRequest::Message(content)),
        "acknowledge" => Ok(ClientRequest::Acknowledge(content)),
        other => Err(format!("unknown frame type: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_message_and_acknowledge() {
        assert_eq!(
            parse_frame(r#"{"type": "message", "content": "List tables"}"#),
            Ok(ClientRequest::Message("List tables".into()))
        );
        assert_eq!(
            parse_frame(r#"{"type": "acknowledge", "content": "yes"}"#),
            Ok(ClientRequest::Acknowledge("yes".into()))
        );
        assert_eq!(
            parse_frame(r#"{"type": "acknowledge"}"#),
            Ok(ClientRequest::Acknowledge(String::new()))
        );
    }

    #[test]
    fn test_rejects_bad_frames() {
        assert!(parse_frame("not json").unwrap_err().starts_with("malformed frame"));
        assert!(parse_frame(r#"{"content": "x"}"#).is_err());
        assert_eq!(
            parse_frame(r#"{"type": "shout", "content": "x"}"#).unwrap_err(),
            "unknown frame type: shout"
        );
        assert_eq!(
            parse_frame(r#"{"type": "message", "content": "  "}"#).unwrap_err(),
            "message content is required"
        );
        assert!(parse_frame(r#"{"type": "message", "content": 5}"#).is_err());
    }
}
