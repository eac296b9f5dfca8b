pub mod api;
pub mod message;

pub use api::{ApiMessage, Content, ContentBlock, ServerEvent};
pub use message::{Message, StreamEvent, ToolArguments, ToolCallRequest, ToolResult};
