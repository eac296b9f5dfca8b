mod core;
mod dispatch;
mod state;


pub use self::core::{LoopState, Orchestrator};
pub use dispatch::Dispatcher;
pub use state::ConversationState;
