//! Mock 推理后端（用于测试与离线运行，无需 API）
//!
//! 先按顺序消费预置的脚本回复；脚本用完后按回退策略应答：
//! Echo 回显最后一条 user 消息作为最终答案，Repeat 每次重复同一回复（工具调用 ID 加序号保证唯一）。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::LlmError;
use crate::llm::{BackendReply, ReasoningBackend};
use crate::memory::{Message, Role};

#[derive(Debug, Clone)]
enum Fallback {
    Echo,
    Repeat(BackendReply),
}

/// Mock 后端
#[derive(Debug)]
pub struct MockBackend {
    script: Mutex<VecDeque<Result<BackendReply, LlmError>>>,
    fallback: Fallback,
    delay: Option<Duration>,
    calls: AtomicUsize,
    seen_lengths: Mutex<Vec<usize>>,
}

impl MockBackend {
    fn with_fallback(fallback: Fallback) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: AtomicUsize::new(0),
            seen_lengths: Mutex::new(Vec::new()),
        }
    }

    /// 回显最后一条 user 消息
    pub fn echo() -> Self {
        Self::with_fallback(Fallback::Echo)
    }

    /// 按顺序返回给定回复，用完后回显
    pub fn scripted(replies: Vec<Result<BackendReply, LlmError>>) -> Self {
        let backend = Self::echo();
        backend.lock_script().extend(replies);
        backend
    }

    /// 每次都返回同一回复
    pub fn repeating(reply: BackendReply) -> Self {
        Self::with_fallback(Fallback::Repeat(reply))
    }

    /// 每次请求前等待，用于模拟网络延迟
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 已收到的请求次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次请求时收到的对话长度
    pub fn seen_lengths(&self) -> Vec<usize> {
        self.seen_lengths
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<BackendReply, LlmError>>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ReasoningBackend for MockBackend {
    fn model(&self) -> &str {
        "mock"
    }

    async fn complete(&self, messages: &[Message], _tools: &[Value]) -> Result<BackendReply, LlmError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen_lengths
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.len());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(next) = self.lock_script().pop_front() {
            return next;
        }

        match &self.fallback {
            Fallback::Echo => {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or("(no input)");
                Ok(BackendReply::text(format!("Echo from Mock: {}", last_user)))
            }
            Fallback::Repeat(reply) => {
                let mut reply = reply.clone();
                for call in &mut reply.tool_calls {
                    call.id = format!("{}_{}", call.id, n);
                }
                Ok(reply)
            }
        }
    }
}
