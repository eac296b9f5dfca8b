pub mod api;
pub mod config;
pub mod error;
pub mod state;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{AgentError, AgentResult, ToolExecutionError};
