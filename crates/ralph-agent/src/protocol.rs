//! Wire model of the agent CLI's `stream-json` output.
//!
//! Each stdout line is one JSON object carrying a `type` discriminator:
//! `assistant` and `user` wrap a `message.content` array of items typed
//! `tool_use`, `text` or `tool_result`; `result` is the terminal event.
//! Anything that does not fit is reported as a [`ProtocolError`] and the
//! caller treats the line as opaque text.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("empty line")]
    Empty,
}

/// One decoded protocol message
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Assistant(MessageBody),
    User(MessageBody),
    Result(FinalResult),
    /// `system` or any type this model does not know about
    Other { kind: String },
}

impl StreamMessage {
    pub fn kind(&self) -> &str {
        match self {
            StreamMessage::Assistant(_) => "assistant",
            StreamMessage::User(_) => "user",
            StreamMessage::Result(_) => "result",
            StreamMessage::Other { kind } => kind,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    content: Vec<Value>,
}

impl MessageBody {
    /// Content items that decode; items with an unknown or malformed shape are skipped.
    pub fn items(&self) -> Vec<ContentItem> {
        self.content
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default = "unknown_tool")]
        name: String,
        #[serde(default)]
        input: Value,
    },
    Text {
        #[serde(default)]
        text: String,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Other,
}

fn unknown_tool() -> String {
    "unknown".to_string()
}

/// Flatten a `tool_result` content value to text.
///
/// The CLI sends either a plain string or a list of `{"type":"text"}` blocks.
pub fn result_text(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .map(|block| match block.get("text").and_then(Value::as_str) {
                Some(text) => text.to_string(),
                None => block.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// The terminal `result` event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub num_turns: u64,
    #[serde(default)]
    pub is_error: bool,
}

impl FinalResult {
    /// Read the fields one by one so a wrong-typed field never hides the
    /// terminal event itself.
    fn from_object(obj: &serde_json::Map<String, Value>) -> Self {
        let number = |key: &str| obj.get(key).and_then(Value::as_u64).unwrap_or_default();
        Self {
            subtype: obj
                .get("subtype")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            result: obj.get("result").map(result_text).unwrap_or_default(),
            duration_ms: number("duration_ms"),
            num_turns: number("num_turns"),
            is_error: obj
                .get("is_error")
                .and_then(Value::as_bool)
                .unwrap_or_default(),
        }
    }
}

/// Decode one stdout line.
///
/// A line normally holds exactly one object, but several back-to-back objects
/// on a single line are accepted too. The whole line fails if any part of it
/// does not decode.
pub fn parse_line(line: &str) -> Result<Vec<StreamMessage>, ProtocolError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::Empty);
    }

    let values = serde_json::Deserializer::from_str(trimmed)
        .into_iter::<Value>()
        .collect::<Result<Vec<_>, _>>()?;

    values.into_iter().map(decode_message).collect()
}

fn decode_message(value: Value) -> Result<StreamMessage, ProtocolError> {
    let obj = value.as_object().ok_or(ProtocolError::NotAnObject)?;
    let kind = obj.get("type").and_then(Value::as_str).unwrap_or_default();

    let body = || -> Result<MessageBody, ProtocolError> {
        match obj.get("message") {
            Some(message) => Ok(serde_json::from_value(message.clone())?),
            None => Ok(MessageBody::default()),
        }
    };

    match kind {
        "assistant" => Ok(StreamMessage::Assistant(body()?)),
        "user" => Ok(StreamMessage::User(body()?)),
        "result" => Ok(StreamMessage::Result(FinalResult::from_object(obj))),
        other => Ok(StreamMessage::Other {
            kind: other.to_string(),
        }),
    }
}
