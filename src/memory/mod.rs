//! 记忆层：会话历史消息（持久化见 store 模块）

pub mod conversation;

pub use conversation::{format_history, prune_history, Message, Role};
