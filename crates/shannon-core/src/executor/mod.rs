pub mod tool_executor;

pub use tool_executor::{ExecutorOutcome, ToolExecutor};
