//! On-disk session records: one JSON document per session under a storage directory.

use crate::error::{AgentError, AgentResult};
use crate::state::conversation::ConversationState;
use crate::types::Message;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    #[serde(default = "default_working_directory")]
    pub working_directory: String,
    pub created_at: String,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Read-through cache of file contents; never written to disk.
    #[serde(skip)]
    file_cache: HashMap<String, String>,
}

fn default_working_directory() -> String {
    ".".to_string()
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>, working_directory: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            working_directory: working_directory.into(),
            created_at: now_iso8601(),
            messages: Vec::new(),
            metadata: Map::new(),
            file_cache: HashMap::new(),
        }
    }

    pub fn from_conversation(session_id: impl Into<String>, state: &ConversationState) -> Self {
        let mut record = Self::new(session_id, state.working_directory());
        record.append_conversation(state.messages());
        record
    }

    pub fn add_message(&mut self, role: impl Into<String>, content: impl Into<String>) {
        self.messages.push(SessionMessage {
            role: role.into(),
            content: content.into(),
            timestamp: now_iso8601(),
        });
    }

    /// Record transcript messages. Tool-call requests are stored under the
    /// `tool_call` role with their arguments rendered as JSON text.
    pub fn append_conversation(&mut self, messages: &[Message]) {
        for message in messages {
            match message {
                Message::Human(text) => self.add_message("user", text.as_str()),
                Message::AssistantText(text) => self.add_message("assistant", text.as_str()),
                Message::AssistantToolCalls(calls) => {
                    let rendered = calls
                        .iter()
                        .map(|call| format!("{}({})", call.name, call.arguments_json()))
                        .collect::<Vec<_>>()
                        .join("\n");
                    self.add_message("tool_call", rendered);
                }
                Message::ToolResult(result) => self.add_message("tool", result.text.as_str()),
            }
        }
    }

    /// The last `limit` messages, or all of them.
    pub fn message_history(&self, limit: Option<usize>) -> &[SessionMessage] {
        match limit {
            Some(limit) => &self.messages[self.messages.len().saturating_sub(limit)..],
            None => &self.messages,
        }
    }

    /// Rebuild a transcript that can seed a new conversation. Only user and
    /// assistant text survives; a user turn with no answer is dropped so two
    /// human messages never sit next to each other.
    pub fn restore_messages(&self) -> Vec<Message> {
        let mut restored: Vec<Message> = Vec::new();
        for record in &self.messages {
            let message = match record.role.as_str() {
                "user" => Message::Human(record.content.clone()),
                "assistant" => Message::AssistantText(record.content.clone()),
                _ => continue,
            };
            match (restored.last(), &message) {
                (Some(Message::Human(_)), Message::Human(_)) => {
                    restored.pop();
                }
                (Some(Message::AssistantText(_)), Message::AssistantText(_)) => {
                    restored.pop();
                }
                _ => {}
            }
            restored.push(message);
        }
        if matches!(restored.last(), Some(Message::Human(_))) {
            restored.pop();
        }
        restored
    }

    pub fn cache_file(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.file_cache.insert(path.into(), content.into());
    }

    pub fn cached_file(&self, path: &str) -> Option<&str> {
        self.file_cache.get(path).map(String::as_str)
    }

    pub fn clear_file_cache(&mut self) {
        self.file_cache.clear();
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn to_json(&self) -> AgentResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> AgentResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AgentError::persistence(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        fs::write(path, self.to_json()?)
            .map_err(|e| AgentError::persistence(format!("cannot write {}: {e}", path.display())))
    }

    pub fn load(path: &Path) -> AgentResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| AgentError::persistence(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&raw).map_err(|e| {
            AgentError::persistence(format!("invalid session file {}: {e}", path.display()))
        })
    }
}

/// Directory of session files plus the session currently being recorded.
pub struct SessionStore {
    storage_dir: PathBuf,
    current: Option<SessionRecord>,
    synced_messages: usize,
}

impl SessionStore {
    pub fn new(storage_dir: impl Into<PathBuf>) -> AgentResult<Self> {
        let storage_dir = storage_dir.into();
        fs::create_dir_all(&storage_dir).map_err(|e| {
            AgentError::persistence(format!("cannot create {}: {e}", storage_dir.display()))
        })?;
        Ok(Self {
            storage_dir,
            current: None,
            synced_messages: 0,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.storage_dir.join(format!("{session_id}.json"))
    }

    /// Start a new session; a random id is generated when none is given.
    pub fn create(&mut self, session_id: Option<&str>, working_directory: &str) -> &SessionRecord {
        let session_id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.synced_messages = 0;
        self.current.insert(SessionRecord::new(session_id, working_directory))
    }

    /// `Ok(None)` when no file exists for `session_id`.
    pub fn load(&mut self, session_id: &str) -> AgentResult<Option<&SessionRecord>> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let record = SessionRecord::load(&path)?;
        self.synced_messages = record.restore_messages().len();
        Ok(Some(&*self.current.insert(record)))
    }

    pub fn current(&self) -> Option<&SessionRecord> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut SessionRecord> {
        self.current.as_mut()
    }

    pub fn save_current(&self) -> AgentResult<PathBuf> {
        let record = self
            .current
            .as_ref()
            .ok_or_else(|| AgentError::persistence("no active session to save"))?;
        let path = self.path_for(&record.session_id);
        record.save(&path)?;
        Ok(path)
    }

    /// Append transcript messages not yet recorded, then save.
    pub fn record_conversation(&mut self, messages: &[Message]) -> AgentResult<PathBuf> {
        let start = self.synced_messages.min(messages.len());
        let record = self
            .current
            .as_mut()
            .ok_or_else(|| AgentError::persistence("no active session to save"))?;
        record.append_conversation(&messages[start..]);
        self.synced_messages = messages.len();
        self.save_current()
    }

    /// Saved session ids, sorted.
    pub fn list(&self) -> AgentResult<Vec<String>> {
        let entries = fs::read_dir(&self.storage_dir).map_err(|e| {
            AgentError::persistence(format!("cannot read {}: {e}", self.storage_dir.display()))
        })?;
        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().to_string()))
            .collect();
        ids.sort();
        Ok(ids)
    }
}
