//! Model service boundary.
//!
//! The orchestrator only sees [`ModelService`]: a transcript plus a snapshot of
//! tool specs goes in, the next assistant message (or a stream of chunks that
//! adds up to it) comes out.

pub mod client;
pub mod logging;
pub mod mock;
pub mod stream;

pub use client::ApiClient;
pub use mock::ScriptedModelService;

use crate::error::AgentResult;
use crate::tools::ToolSpec;
use crate::types::{Message, ToolCallRequest};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// One incremental piece of a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelChunk {
    Token(String),
    ToolCall(ToolCallRequest),
}

pub type ModelStream = Pin<Box<dyn Stream<Item = AgentResult<ModelChunk>> + Send>>;

#[async_trait]
pub trait ModelService: Send + Sync {
    /// Produce the next assistant message for `messages`.
    async fn invoke(&self, messages: &[Message], tools: &[ToolSpec]) -> AgentResult<Message> {
        let stream = self.stream(messages, tools).await?;
        collect_response(stream).await
    }

    /// Lazy, finite, single-use chunk stream. Draining it is equivalent to one `invoke`.
    async fn stream(&self, messages: &[Message], tools: &[ToolSpec]) -> AgentResult<ModelStream>;
}

/// Fold a chunk stream into the assistant message it describes: any tool call
/// makes it `AssistantToolCalls`, otherwise the concatenated tokens form the text.
pub async fn collect_response(stream: ModelStream) -> AgentResult<Message> {
    collect_response_with(stream, |_| {}).await
}

/// [`collect_response`], handing each token to `on_token` as it arrives.
pub async fn collect_response_with<F>(
    mut stream: ModelStream,
    mut on_token: F,
) -> AgentResult<Message>
where
    F: FnMut(&str),
{
    let mut text = String::new();
    let mut calls = Vec::new();

    while let Some(chunk) = stream.next().await {
        match chunk? {
            ModelChunk::Token(token) => {
                on_token(&token);
                text.push_str(&token);
            }
            ModelChunk::ToolCall(call) => calls.push(call),
        }
    }

    if calls.is_empty() {
        Ok(Message::AssistantText(text))
    } else {
        Ok(Message::AssistantToolCalls(calls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use futures::stream;
    use serde_json::json;

    fn chunks(items: Vec<AgentResult<ModelChunk>>) -> ModelStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn test_collect_concatenates_tokens() {
        let message = collect_response(chunks(vec![
            Ok(ModelChunk::Token("Hel".into())),
            Ok(ModelChunk::Token("lo".into())),
        ]))
        .await
        .unwrap();
        assert_eq!(message, Message::AssistantText("Hello".into()));
    }

    #[tokio::test]
    async fn test_collect_prefers_tool_calls_over_text() {
        let call = ToolCallRequest::from_value("toolu_1", "search_code", json!({"pattern": "x"}));
        let message = collect_response(chunks(vec![
            Ok(ModelChunk::Token("Let me look.".into())),
            Ok(ModelChunk::ToolCall(call.clone())),
        ]))
        .await
        .unwrap();
        assert_eq!(message, Message::AssistantToolCalls(vec![call]));
    }

    #[tokio::test]
    async fn test_collect_propagates_stream_errors() {
        let result = collect_response(chunks(vec![
            Ok(ModelChunk::Token("partial".into())),
            Err(AgentError::model("connection reset")),
        ]))
        .await;
        assert!(matches!(result, Err(AgentError::ModelService { .. })));
    }

    #[tokio::test]
    async fn test_collect_with_forwards_tokens_in_order() {
        let mut seen = Vec::new();
        let call = ToolCallRequest::from_value("toolu_1", "git_status", json!({}));
        let message = collect_response_with(
            chunks(vec![
                Ok(ModelChunk::Token("a".into())),
                Ok(ModelChunk::ToolCall(call.clone())),
                Ok(ModelChunk::Token("b".into())),
            ]),
            |token| seen.push(token.to_string()),
        )
        .await
        .unwrap();
        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(message, Message::AssistantToolCalls(vec![call]));
    }
}
