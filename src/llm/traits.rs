//! 推理后端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 ReasoningBackend：给定完整对话与工具 schema，
//! 返回一条回复（可选文本 + 有序的工具调用列表）。调用方不做自动重试。

use async_trait::async_trait;
use serde_json::Value;

use crate::core::LlmError;
use crate::memory::{Message, ToolCall};

/// 推理后端的单条回复
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl BackendReply {
    /// 只有文本、没有工具调用的最终回复
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
        }
    }
}

#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// 发送完整对话与公布的工具 schema（tool_choice = auto，最低温度）
    async fn complete(&self, messages: &[Message], tools: &[Value]) -> Result<BackendReply, LlmError>;

    fn model(&self) -> &str;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
