pub mod builtin;
pub mod registry;

pub use builtin::chat_history::ChatHistoryTool;
pub use builtin::task_done::TaskDoneTool;
pub use builtin::thinking::SequentialThinkingTool;
pub use registry::ToolRegistry;
