use crate::types::{Message, ToolResult};

/// The live transcript of one run (single-shot) or one session (interactive).
/// Messages are only ever appended; the orchestrator may roll back to an
/// earlier length when a turn fails.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
    working_directory: String,
    task: String,
    last_tool_result: Option<ToolResult>,
}

impl ConversationState {
    pub fn new(task: impl Into<String>, working_directory: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            working_directory: working_directory.into(),
            task: task.into(),
            last_tool_result: None,
        }
    }

    /// Seed a conversation with an earlier transcript, e.g. a restored session.
    pub fn with_messages(messages: Vec<Message>, working_directory: impl Into<String>) -> Self {
        Self {
            messages,
            ..Self::new(String::new(), working_directory)
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        if let Message::ToolResult(result) = &message {
            self.last_tool_result = Some(result.clone());
        }
        self.messages.push(message);
    }

    pub fn working_directory(&self) -> &str {
        &self.working_directory
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub(crate) fn set_task(&mut self, task: &str) {
        self.task = task.to_string();
    }

    pub fn last_tool_result(&self) -> Option<&ToolResult> {
        self.last_tool_result.as_ref()
    }

    /// Most recent non-empty assistant text.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|message| match message {
            Message::AssistantText(text) if !text.trim().is_empty() => Some(text.as_str()),
            _ => None,
        })
    }

    pub(crate) fn rollback_to(&mut self, len: usize) {
        if len < self.messages.len() {
            self.messages.truncate(len);
            self.last_tool_result = self.messages.iter().rev().find_map(|message| match message {
                Message::ToolResult(result) => Some(result.clone()),
                _ => None,
            });
        }
    }
}
