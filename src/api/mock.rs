use super::{ModelChunk, ModelService, ModelStream};
use crate::error::{AgentError, AgentResult};
use crate::tools::ToolSpec;
use crate::types::{Message, ToolCallRequest};
use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
enum ScriptedTurn {
    Chunks(Vec<ModelChunk>),
    Fail(String),
}

/// Model service that replays canned responses in order and records every
/// transcript it was asked about.
#[derive(Clone, Default)]
pub struct ScriptedModelService {
    turns: Arc<Mutex<VecDeque<ScriptedTurn>>>,
    transcripts: Arc<Mutex<Vec<Vec<Message>>>>,
    tool_snapshots: Arc<Mutex<Vec<Vec<String>>>>,
}

impl ScriptedModelService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response made of `chunks`.
    pub fn respond(self, chunks: Vec<ModelChunk>) -> Self {
        lock(&self.turns).push_back(ScriptedTurn::Chunks(chunks));
        self
    }

    pub fn respond_text(self, text: &str) -> Self {
        self.respond(vec![ModelChunk::Token(text.to_string())])
    }

    pub fn respond_tool_call(self, id: &str, name: &str, arguments: serde_json::Value) -> Self {
        self.respond(vec![tool_call(id, name, arguments)])
    }

    /// Queue a failing model call.
    pub fn fail(self, reason: &str) -> Self {
        lock(&self.turns).push_back(ScriptedTurn::Fail(reason.to_string()));
        self
    }

    pub fn invocation_count(&self) -> usize {
        lock(&self.transcripts).len()
    }

    pub fn transcripts(&self) -> Vec<Vec<Message>> {
        lock(&self.transcripts).clone()
    }

    /// Tool names visible to the model at each invocation.
    pub fn tool_snapshots(&self) -> Vec<Vec<String>> {
        lock(&self.tool_snapshots).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.turns).len()
    }
}

pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ModelChunk {
    ModelChunk::ToolCall(ToolCallRequest::from_value(id, name, arguments))
}

#[async_trait]
impl ModelService for ScriptedModelService {
    async fn stream(&self, messages: &[Message], tools: &[ToolSpec]) -> AgentResult<ModelStream> {
        lock(&self.transcripts).push(messages.to_vec());
        lock(&self.tool_snapshots).push(tools.iter().map(|t| t.name.clone()).collect());

        match lock(&self.turns).pop_front() {
            Some(ScriptedTurn::Chunks(chunks)) => {
                Ok(Box::pin(stream::iter(
                    chunks.into_iter().map(Ok::<ModelChunk, AgentError>),
                )))
            }
            Some(ScriptedTurn::Fail(reason)) => Err(AgentError::model(reason)),
            None => Err(AgentError::model(
                "ScriptedModelService: No more responses configured",
            )),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_replays_turns_in_order_and_records_transcripts() {
        let model = ScriptedModelService::new()
            .respond_tool_call("toolu_1", "git_status", json!({}))
            .respond_text("clean");
        let transcript = vec![Message::Human("status?".into())];

        let first = model.invoke(&transcript, &[]).await.unwrap();
        assert!(matches!(first, Message::AssistantToolCalls(ref calls) if calls[0].name == "git_status"));
        let second = model.invoke(&transcript, &[]).await.unwrap();
        assert_eq!(second, Message::AssistantText("clean".into()));

        assert_eq!(model.invocation_count(), 2);
        assert_eq!(model.transcripts()[0], transcript);
        assert!(model.invoke(&transcript, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_failure_is_model_service_error() {
        let model = ScriptedModelService::new().fail("503 overloaded");
        let err = model.invoke(&[], &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "model service error: 503 overloaded");
        assert_eq!(model.remaining(), 0);
    }
}
