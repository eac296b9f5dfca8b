//! Conversation state machine and the policy pieces it consults.

pub mod commands;
pub mod conversation;
pub mod mode;
pub mod session;
pub mod stream_sink;

pub use commands::{parse_input, SlashCommand, UserInput};
pub use conversation::{ConversationState, Dispatcher, LoopState, Orchestrator};
pub use mode::{AutoApprove, ConfirmationGate, ModeConfig, ModeController, PromptConfirmation};
pub use session::{SessionMessage, SessionRecord, SessionStore};
pub use stream_sink::{StreamSink, StreamingSink};
