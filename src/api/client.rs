use super::logging::{debug_payload_enabled, emit_debug_payload};
use super::stream::StreamParser;
use super::{ModelChunk, ModelService, ModelStream};
use crate::config::Config;
use crate::error::{AgentError, AgentResult};
use crate::tools::ToolSpec;
use crate::types::api::api_messages_from;
use crate::types::{ContentBlock, Message, ServerEvent, ToolCallRequest};
use crate::util::is_local_endpoint_url;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;

pub type ByteStream = Pin<Box<dyn Stream<Item = AgentResult<Bytes>> + Send>>;

const SYSTEM_PROMPT: &str = "You are a coding assistant working inside a local repository.\n\
Use tools for all filesystem facts and changes; never guess file contents or command output.\n\
After each tool result, reassess the task and either call the next needed tool or give the final answer.\n\
Never claim a file was read, written or searched unless the corresponding tool call succeeded.\n\
Prefer search_code for targeted matches and read_file with a line window over whole-file reads.\n\
For edit_file, send a focused old_content snippet that occurs exactly once; use write_file for full rewrites.\n\
Keep final answers short and concrete.";

/// Anthropic Messages API backend.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    api_url: String,
    anthropic_version: String,
    max_tokens: u32,
    system_prompt: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> AgentResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AgentError::model(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            api_url: config.api_url.clone(),
            anthropic_version: config.anthropic_version.clone(),
            max_tokens: config.max_tokens,
            system_prompt: format!(
                "{SYSTEM_PROMPT}\nWorking directory: {}",
                config.working_dir.display()
            ),
        })
    }

    fn build_payload(&self, messages: &[Message], tools: &[ToolSpec]) -> Value {
        let mut payload = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "stream": true,
            "system": self.system_prompt,
            "messages": api_messages_from(messages),
        });
        if !tools.is_empty() {
            payload["tools"] = json!(tools);
            payload["tool_choice"] = json!({ "type": "auto" });
        }
        payload
    }

    async fn create_stream(&self, payload: &Value) -> AgentResult<ByteStream> {
        let request_url = self.api_url.clone();
        let mut request = self
            .http
            .post(&request_url)
            .header("content-type", "application/json")
            .json(payload);

        if debug_payload_enabled() {
            emit_debug_payload(&request_url, payload);
        }

        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }
        if !self.anthropic_version.trim().is_empty() {
            request = request.header("anthropic-version", &self.anthropic_version);
        }

        let response = request
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;

        let stream = response
            .bytes_stream()
            .map(move |item| item.map_err(|error| map_api_request_error(error, &request_url)));
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl ModelService for ApiClient {
    async fn stream(&self, messages: &[Message], tools: &[ToolSpec]) -> AgentResult<ModelStream> {
        let payload = self.build_payload(messages, tools);
        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "requesting model response"
        );
        let bytes = self.create_stream(&payload).await?;
        Ok(model_chunks(bytes))
    }
}

fn map_api_request_error(error: reqwest::Error, request_url: &str) -> AgentError {
    let reason = if error.is_connect() && is_local_endpoint_url(request_url) {
        format!(
            "cannot reach local API endpoint '{request_url}': {error}. Start your local server or update ANTHROPIC_API_URL."
        )
    } else if error.is_connect() {
        format!("cannot reach API endpoint '{request_url}': {error}")
    } else if error.is_timeout() {
        format!("API request to '{request_url}' timed out: {error}")
    } else if let Some(status) = error.status() {
        format!("API endpoint '{request_url}' returned HTTP {status}: {error}")
    } else {
        format!("API request to '{request_url}' failed: {error}")
    };
    AgentError::model(reason)
}

struct PendingToolUse {
    id: String,
    name: String,
    initial_input: Value,
    partial_json: String,
}

/// Turns server events into model chunks. Text deltas pass straight through;
/// tool input JSON is buffered per content block until the block closes.
#[derive(Default)]
struct ChunkAssembler {
    pending: BTreeMap<usize, PendingToolUse>,
    stopped: bool,
}

impl ChunkAssembler {
    fn handle(&mut self, event: ServerEvent) -> Vec<AgentResult<ModelChunk>> {
        match event {
            ServerEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                ContentBlock::Text { text } if !text.is_empty() => {
                    vec![Ok(ModelChunk::Token(text))]
                }
                ContentBlock::ToolUse { id, name, input } => {
                    self.pending.insert(
                        index,
                        PendingToolUse {
                            id,
                            name,
                            initial_input: input,
                            partial_json: String::new(),
                        },
                    );
                    Vec::new()
                }
                _ => Vec::new(),
            },
            ServerEvent::ContentBlockDelta { index, delta } => {
                if let Some(partial) = delta.partial_json {
                    if let Some(tool) = self.pending.get_mut(&index) {
                        tool.partial_json.push_str(&partial);
                    }
                    Vec::new()
                } else {
                    match delta.text {
                        Some(text) if !text.is_empty() => vec![Ok(ModelChunk::Token(text))],
                        _ => Vec::new(),
                    }
                }
            }
            ServerEvent::ContentBlockStop { index } => match self.pending.remove(&index) {
                Some(tool) => vec![finish_tool_use(tool)],
                None => Vec::new(),
            },
            ServerEvent::MessageDelta { delta } => {
                if let Some(reason) = delta.stop_reason {
                    tracing::debug!(target: "codeloop::api", stop_reason = %reason, "message delta");
                }
                Vec::new()
            }
            ServerEvent::Error { error } => {
                vec![Err(AgentError::model(format!(
                    "{}: {}",
                    error.error_type, error.message
                )))]
            }
            ServerEvent::MessageStop => {
                self.stopped = true;
                Vec::new()
            }
            ServerEvent::MessageStart { .. } | ServerEvent::Unknown => Vec::new(),
        }
    }

    /// Called once the body ends. A body cut off before `message_stop` is an error.
    fn finish(&mut self) -> Vec<AgentResult<ModelChunk>> {
        if !self.stopped {
            return vec![Err(AgentError::model("stream ended before message_stop"))];
        }
        std::mem::take(&mut self.pending)
            .into_values()
            .map(finish_tool_use)
            .collect()
    }
}

fn finish_tool_use(tool: PendingToolUse) -> AgentResult<ModelChunk> {
    let input = if tool.partial_json.trim().is_empty() {
        tool.initial_input
    } else {
        serde_json::from_str::<Value>(&tool.partial_json).map_err(|e| {
            AgentError::model(format!(
                "invalid input JSON for tool call '{}': {e}",
                tool.name
            ))
        })?
    };
    Ok(ModelChunk::ToolCall(ToolCallRequest::from_value(
        tool.id, tool.name, input,
    )))
}

struct ChunkStreamState {
    bytes: ByteStream,
    parser: StreamParser,
    assembler: ChunkAssembler,
    ready: VecDeque<AgentResult<ModelChunk>>,
    done: bool,
}

impl ChunkStreamState {
    fn absorb(&mut self, events: Vec<ServerEvent>) {
        for event in events {
            self.ready.extend(self.assembler.handle(event));
        }
    }
}

/// Decode an SSE byte stream into model chunks. The first error ends the stream.
pub(crate) fn model_chunks(bytes: ByteStream) -> ModelStream {
    let state = ChunkStreamState {
        bytes,
        parser: StreamParser::new(),
        assembler: ChunkAssembler::default(),
        ready: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                if item.is_err() {
                    state.ready.clear();
                    state.done = true;
                }
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.parser.process(&chunk);
                    state.absorb(events);
                }
                Some(Err(error)) => {
                    state.done = true;
                    state.ready.push_back(Err(error));
                }
                None => {
                    state.done = true;
                    let rest = state.parser.flush();
                    if !rest.trim().is_empty() {
                        let events = state.parser.process(format!("{rest}\n\n").as_bytes());
                        state.absorb(events);
                    }
                    let leftovers = state.assembler.finish();
                    state.ready.extend(leftovers);
                }
            }
        }
    }))
}
