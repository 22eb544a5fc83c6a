//! 工具调用结果：所有失败模式都落到结构化的 ToolCallResult，不会越过调用边界抛出

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::InvocationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

/// 单次工具调用的结果；写回对话时携带发起请求的关联 ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub status: ToolStatus,
    /// 不透明的结构化负载；成功时为下游工具输出的信封本身
    pub payload: Value,
    /// 诊断文本（子进程 stderr 等）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    /// 子进程 stdout 原文；写回对话时原样使用，不经解析再序列化
    #[serde(skip)]
    raw: Option<String>,
}

impl ToolCallResult {
    pub fn success(payload: Value) -> Self {
        Self {
            call_id: None,
            status: ToolStatus::Success,
            payload,
            diagnostic: None,
            raw: None,
        }
    }

    /// 子进程 stdout：原文保留给对话；能解析为 JSON 则 payload 为该值，否则为原文字符串
    pub fn from_output(stdout: &str) -> Self {
        let payload = serde_json::from_str::<Value>(stdout)
            .unwrap_or_else(|_| Value::String(stdout.to_string()));
        Self {
            raw: Some(stdout.to_string()),
            ..Self::success(payload)
        }
    }

    /// 结构化错误，负载形如 `{"status":"error","message":..,"debug":..}`
    pub fn error(message: impl Into<String>, diagnostic: Option<String>) -> Self {
        let message = message.into();
        let mut payload = json!({ "status": "error", "message": message });
        if let Some(d) = &diagnostic {
            payload["debug"] = Value::String(d.clone());
        }
        Self {
            call_id: None,
            status: ToolStatus::Error,
            payload,
            diagnostic,
            raw: None,
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// 错误结果的消息文本
    pub fn message(&self) -> Option<&str> {
        match self.status {
            ToolStatus::Error => self.payload.get("message").and_then(Value::as_str),
            ToolStatus::Success => None,
        }
    }

    /// 写入对话的文本：子进程输出原文优先；否则字符串负载原样，其余序列化为紧凑 JSON
    pub fn content(&self) -> String {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        match &self.payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl From<InvocationError> for ToolCallResult {
    fn from(e: InvocationError) -> Self {
        let diagnostic = e.diagnostic().map(str::to_string);
        ToolCallResult::error(e.to_string(), diagnostic)
    }
}
