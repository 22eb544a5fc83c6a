//! 记忆层：对话记录（Transcript）

pub mod conversation;

pub use conversation::{FunctionCall, Message, Role, ToolCall, Transcript};
