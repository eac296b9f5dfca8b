use super::message::{Message, ToolCallRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: String,
    pub content: Content,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default = "default_json_object")]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

fn default_json_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Server-sent event payloads from the Messages API.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    MessageStart {
        message: MessageStartData,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: Delta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDelta,
    },
    MessageStop,
    Error {
        error: ApiErrorBody,
    },
    #[serde(other)]
    Unknown,
}

/// Payload of an in-stream `error` event, e.g. `overloaded_error`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Delta {
    #[serde(rename = "type")]
    #[serde(default)]
    pub delta_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub partial_json: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageStartData {
    pub id: String,
    pub role: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageDelta {
    pub stop_reason: Option<String>,
}

/// Convert the transcript to wire messages. Consecutive tool results collapse
/// into one `user` message, which is what the Messages API expects after a
/// multi-call assistant turn.
pub fn api_messages_from(messages: &[Message]) -> Vec<ApiMessage> {
    let mut out: Vec<ApiMessage> = Vec::with_capacity(messages.len());

    for message in messages {
        match message {
            Message::Human(text) => out.push(ApiMessage {
                role: "user".to_string(),
                content: Content::Text(text.clone()),
            }),
            Message::AssistantText(text) => out.push(ApiMessage {
                role: "assistant".to_string(),
                content: Content::Text(text.clone()),
            }),
            Message::AssistantToolCalls(calls) => out.push(ApiMessage {
                role: "assistant".to_string(),
                content: Content::Blocks(calls.iter().map(tool_use_block).collect()),
            }),
            Message::ToolResult(result) => {
                let block = ContentBlock::ToolResult {
                    tool_use_id: result.call_id.clone(),
                    content: result.text.clone(),
                    is_error: result.is_error,
                };
                match out.last_mut() {
                    Some(ApiMessage {
                        role,
                        content: Content::Blocks(blocks),
                    }) if role == "user" => blocks.push(block),
                    _ => out.push(ApiMessage {
                        role: "user".to_string(),
                        content: Content::Blocks(vec![block]),
                    }),
                }
            }
        }
    }

    out
}

fn tool_use_block(call: &ToolCallRequest) -> ContentBlock {
    ContentBlock::ToolUse {
        id: call.id.clone(),
        name: call.name.clone(),
        input: Value::Object(call.arguments.clone()),
    }
}
