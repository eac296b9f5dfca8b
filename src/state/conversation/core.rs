use super::{ConversationState, Dispatcher};
use crate::api::{collect_response_with, ModelService};
use crate::error::{AgentError, AgentResult};
use crate::state::commands::{parse_input, SlashCommand, UserInput, HELP_TEXT};
use crate::state::mode::{AutoApprove, ConfirmationGate, ModeConfig, ModeController};
use crate::state::session::SessionStore;
use crate::state::stream_sink::StreamSink;
use crate::tools::{Tool, ToolRegistry, ToolSpec};
use crate::types::{Message, StreamEvent, ToolCallRequest, ToolResult};
use crate::util::read_line;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

const NO_RESPONSE: &str = "No response generated";

enum PromptInput<R> {
    Line(R, String),
    Closed,
    Cancelled,
}

/// Where the loop stands between steps.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    AwaitingModel,
    DispatchingTools(Vec<ToolCallRequest>),
    Terminated(String),
}

/// Alternates between asking the model for the next step and dispatching the
/// tool calls it requests, until the model answers without tool calls.
pub struct Orchestrator {
    model: Arc<dyn ModelService>,
    registry: ToolRegistry,
    bound_tools: Arc<[ToolSpec]>,
    modes: ModeController,
    gate: Box<dyn ConfirmationGate>,
    sink: Option<Box<dyn StreamSink>>,
    cancel: CancellationToken,
    sessions: Option<SessionStore>,
    conversation: Option<ConversationState>,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn ModelService>, registry: ToolRegistry) -> Self {
        let bound_tools = registry.specs().into();
        Self {
            model,
            registry,
            bound_tools,
            modes: ModeController::default(),
            gate: Box::new(AutoApprove),
            sink: None,
            cancel: CancellationToken::new(),
            sessions: None,
            conversation: None,
        }
    }

    pub fn with_modes(mut self, modes: ModeController) -> Self {
        self.modes = modes;
        self
    }

    pub fn with_confirmation(mut self, gate: Box<dyn ConfirmationGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Enables streaming: tokens and tool notices go to `sink` as they happen.
    pub fn with_sink(mut self, sink: Box<dyn StreamSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Record every interactive turn into the store's current session.
    pub fn with_sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Continue an earlier conversation on the next interactive session.
    pub fn resume(&mut self, conversation: ConversationState) {
        self.conversation = Some(conversation);
    }

    /// Adds (or replaces) a tool, then rebinds the model-facing tool list.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        if let Some(previous) = self.registry.register(tool) {
            tracing::debug!(tool = previous.name(), "replaced tool definition");
        }
        self.rebind_tools();
    }

    /// Capture current registry membership as the tool list sent to the model.
    pub fn rebind_tools(&mut self) {
        self.bound_tools = self.registry.specs().into();
    }

    pub fn bound_tools(&self) -> &[ToolSpec] {
        &self.bound_tools
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn modes(&self) -> &ModeController {
        &self.modes
    }

    pub fn modes_mut(&mut self) -> &mut ModeController {
        &mut self.modes
    }

    pub fn is_streaming(&self) -> bool {
        self.sink.is_some()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Transcript of the most recent run or interactive session.
    pub fn conversation(&self) -> Option<&ConversationState> {
        self.conversation.as_ref()
    }

    pub fn sessions(&self) -> Option<&SessionStore> {
        self.sessions.as_ref()
    }

    /// Single-shot run on a fresh conversation.
    pub async fn run(&mut self, task: &str, working_directory: &str) -> AgentResult<String> {
        let mut state = ConversationState::new(task, working_directory);
        let result = self.run_turn(&mut state, task).await;
        self.conversation = Some(state);
        result
    }

    /// Interactive loop over `input`. The transcript persists across turns.
    /// A failed turn is reported on `output` and rolled back; the session
    /// carries on. Ends on `exit`/`quit`, end of input, or cancellation.
    /// Cancellation also ends a wait at the prompt.
    pub async fn run_interactive<R, W>(
        &mut self,
        working_directory: &str,
        input: R,
        mut output: W,
    ) -> AgentResult<()>
    where
        R: Read + Send + 'static,
        W: Write,
    {
        let mut state = self
            .conversation
            .take()
            .unwrap_or_else(|| ConversationState::new(String::new(), working_directory));
        let result = self.interactive_loop(&mut state, input, &mut output).await;
        self.conversation = Some(state);
        result
    }

    async fn interactive_loop<R, W>(
        &mut self,
        state: &mut ConversationState,
        mut input: R,
        output: &mut W,
    ) -> AgentResult<()>
    where
        R: Read + Send + 'static,
        W: Write,
    {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            write!(output, "\n> ").and_then(|_| output.flush())?;
            let line = match self.read_prompt(input).await? {
                PromptInput::Line(reader, line) => {
                    input = reader;
                    line
                }
                PromptInput::Closed => return Ok(()),
                PromptInput::Cancelled => {
                    tracing::info!("interrupted at prompt");
                    writeln!(output, "\nInterrupted")?;
                    return Ok(());
                }
            };

            let prompt = match parse_input(&line) {
                Ok(UserInput::Exit) => return Ok(()),
                Ok(UserInput::Empty) => continue,
                Ok(UserInput::Command(command)) => {
                    let reply = self
                        .execute_command(&command, state)
                        .unwrap_or_else(|error| format!("Error: {error}"));
                    writeln!(output, "{reply}")?;
                    continue;
                }
                Ok(UserInput::Prompt(prompt)) => prompt,
                Err(error) => {
                    writeln!(output, "Error: {error}")?;
                    continue;
                }
            };

            let checkpoint = state.len();
            match self.run_turn(state, &prompt).await {
                Ok(answer) => {
                    if self.is_streaming() {
                        writeln!(output)?;
                    } else {
                        writeln!(output, "\nAgent: {answer}")?;
                    }
                    if let Some(sessions) = self.sessions.as_mut() {
                        if let Err(error) = sessions.record_conversation(state.messages()) {
                            writeln!(output, "Error: {error}")?;
                        }
                    }
                }
                Err(AgentError::Interrupted) => {
                    state.rollback_to(checkpoint);
                    writeln!(output, "\nInterrupted")?;
                    return Ok(());
                }
                Err(error) => {
                    state.rollback_to(checkpoint);
                    writeln!(output, "Error: {error}")?;
                }
            }
        }
    }

    /// Blocking reads run on a helper thread so the cancellation token can end
    /// the wait. A cancelled read abandons the reader with its thread.
    async fn read_prompt<R>(&self, mut input: R) -> AgentResult<PromptInput<R>>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        thread::spawn(move || {
            let mut line = String::new();
            let read = read_line(&mut input, &mut line);
            let _ = tx.send((input, line, read));
        });

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(PromptInput::Cancelled),
            received = rx => {
                let (input, line, read) = received
                    .map_err(|_| io::Error::other("input reader stopped unexpectedly"))?;
                if read? == 0 {
                    Ok(PromptInput::Closed)
                } else {
                    Ok(PromptInput::Line(input, line))
                }
            }
        }
    }

    /// Apply a slash command. Unknown modes are rejected without a state change.
    pub fn execute_command(
        &mut self,
        command: &SlashCommand,
        state: &ConversationState,
    ) -> AgentResult<String> {
        match command {
            SlashCommand::Mode(name) => {
                if self.modes.switch_mode(name) {
                    Ok(format!("Switched to {}", self.modes.get_mode_info()))
                } else {
                    Err(AgentError::invalid_command(format!(
                        "unknown mode '{name}'. Available modes: {}",
                        ModeConfig::names().join(", ")
                    )))
                }
            }
            SlashCommand::Modes => Ok(self.modes.list_modes()),
            SlashCommand::Status => Ok(format!(
                "{}\nWorking directory: {}\nMessages: {}\nTools: {}",
                self.modes.get_mode_info(),
                state.working_directory(),
                state.len(),
                self.registry.len()
            )),
            SlashCommand::Help => Ok(HELP_TEXT.to_string()),
        }
    }

    /// One user turn: append the prompt, then loop until the model stops
    /// asking for tools.
    pub async fn run_turn(
        &mut self,
        state: &mut ConversationState,
        prompt: &str,
    ) -> AgentResult<String> {
        if let Some(sink) = self.sink.as_mut() {
            sink.clear();
        }
        state.set_task(prompt);
        state.push(Message::Human(prompt.to_string()));

        let span = tracing::info_span!("run", mode = self.modes.name(), tools = self.bound_tools.len());
        self.drive(state).instrument(span).await
    }

    async fn drive(&mut self, state: &mut ConversationState) -> AgentResult<String> {
        let mut loop_state = LoopState::AwaitingModel;
        let mut iteration = 0usize;

        loop {
            loop_state = match loop_state {
                LoopState::AwaitingModel => {
                    if self.cancel.is_cancelled() {
                        tracing::info!(iteration, "run cancelled");
                        return Err(AgentError::Interrupted);
                    }
                    iteration += 1;
                    tracing::debug!(iteration, messages = state.len(), "invoking model");

                    let response = self.next_response(state.messages()).await?;
                    state.push(response.clone());
                    match response {
                        Message::AssistantToolCalls(calls) => LoopState::DispatchingTools(calls),
                        Message::AssistantText(text) => LoopState::Terminated(text),
                        Message::Human(_) | Message::ToolResult(_) => {
                            return Err(AgentError::model(format!(
                                "model returned a '{}' message",
                                response.role()
                            )));
                        }
                    }
                }
                LoopState::DispatchingTools(calls) => {
                    for result in self.dispatch_batch(&calls).await {
                        state.push(Message::ToolResult(result));
                    }
                    LoopState::AwaitingModel
                }
                LoopState::Terminated(text) => {
                    tracing::debug!(iterations = iteration, "run finished");
                    return Ok(self.final_text(state, text));
                }
            };
        }
    }

    async fn next_response(&mut self, messages: &[Message]) -> AgentResult<Message> {
        let Some(sink) = self.sink.as_mut() else {
            return self.model.invoke(messages, &self.bound_tools).await;
        };

        let stream = self.model.stream(messages, &self.bound_tools).await?;
        collect_response_with(stream, |token| {
            sink.handle(&StreamEvent::Token(token.to_string()))
        })
        .await
    }

    /// Dispatch in request order, consulting the confirmation gate per call.
    async fn dispatch_batch(&mut self, calls: &[ToolCallRequest]) -> Vec<ToolResult> {
        let gate = &mut self.gate;
        let mode = self.modes.active();
        let sink = &mut self.sink;
        Dispatcher::dispatch_with(
            calls,
            &self.registry,
            |request| gate.approve(mode, request),
            |event| {
                if let Some(sink) = sink.as_mut() {
                    sink.handle(event);
                }
            },
        )
        .await
    }

    fn final_text(&self, state: &ConversationState, text: String) -> String {
        if let Some(sink) = self.sink.as_ref() {
            let buffered = sink.get_buffered_text();
            if !buffered.is_empty() {
                return buffered;
            }
        } else if !text.trim().is_empty() {
            return text;
        }
        state
            .last_assistant_text()
            .unwrap_or(NO_RESPONSE)
            .to_string()
    }
}
