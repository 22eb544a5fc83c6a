//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! 请求整体受固定超时约束；回复中的 tool_calls 原样带回给编排器。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::CreateChatCompletionRequest;
use async_openai::Client;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::LlmError;
use crate::llm::{BackendReply, ReasoningBackend};
use crate::memory::{Message, ToolCall};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// 回复消息中与编排相关的部分；工具调用按 wire 格式读取，兼容 arguments 直接给对象的端点
#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ReplyToolCall>>,
}

#[derive(Deserialize)]
struct ReplyToolCall {
    #[serde(default)]
    id: Option<String>,
    /// 非 function 类型的调用没有该字段，忽略
    #[serde(default)]
    function: Option<ReplyFunction>,
}

#[derive(Deserialize)]
struct ReplyFunction {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// OpenAI 兼容客户端：持有 async_openai Client、model 名与采样温度
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: &str,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let timeout = Duration::from_secs(timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        let base_url = base_url.unwrap_or(OPENAI_BASE_URL).trim_end_matches('/').to_string();
        let config = OpenAIConfig::new()
            .with_api_base(base_url.clone())
            .with_api_key(api_key);

        Ok(Self {
            client: Client::with_config(config).with_http_client(http),
            base_url,
            model: model.to_string(),
            temperature: 0.0,
            timeout,
            usage: TokenUsage::new(),
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// 对话记录本身就是 wire 格式，直接转成 async_openai 的请求类型
    fn build_request(
        &self,
        messages: &[Message],
        tools: &[Value],
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "temperature": self.temperature,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
            body["tool_choice"] = json!("auto");
        }
        serde_json::from_value(body)
            .map_err(|e| LlmError::MalformedResponse(format!("cannot build request: {}", e)))
    }
}

fn map_openai_error(e: OpenAIError) -> LlmError {
    match e {
        OpenAIError::Reqwest(e) => LlmError::from(e),
        OpenAIError::ApiError(api) => LlmError::Api(api.message),
        other => LlmError::Network(other.to_string()),
    }
}

/// 首个 choice 的 message（已序列化为 JSON）转为 BackendReply
fn reply_from_message(message: Value) -> Result<BackendReply, LlmError> {
    let message: ReplyMessage = serde_json::from_value(message)
        .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .filter_map(|tc| {
            let function = tc.function?;
            let arguments = match function.arguments {
                Some(Value::String(s)) => s,
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            Some(ToolCall::new(tc.id.unwrap_or_default(), function.name, arguments))
        })
        .collect();

    Ok(BackendReply {
        content: message.content.unwrap_or_default(),
        tool_calls,
    })
}

#[async_trait]
impl ReasoningBackend for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, messages: &[Message], tools: &[Value]) -> Result<BackendReply, LlmError> {
        let request = self.build_request(messages, tools)?;
        tracing::debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "backend request");

        // 整体超时同时约束 async_openai 内部对限流的退避重试
        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(map_openai_error)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let choice = response
            .choices
            .first()
            .ok_or_else(|| LlmError::MalformedResponse("response has no choices".to_string()))?;
        let message = serde_json::to_value(&choice.message)
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
        reply_from_message(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let client = OpenAiClient::new(Some("https://api.example.com/"), "m1", "sk-test", 5).unwrap();
        assert_eq!(client.endpoint(), "https://api.example.com/chat/completions");

        let messages = vec![
            Message::system("sys"),
            Message::user("hi"),
            Message::assistant_with_calls("", vec![ToolCall::new("call_1", "t", "{}")]),
            Message::tool("call_1", "t", r#"{"status":"success"}"#),
        ];
        let tools = vec![json!({
            "type": "function",
            "function": {"name": "t", "description": "d", "parameters": {"type": "object", "properties": {}}}
        })];
        let v = serde_json::to_value(client.build_request(&messages, &tools).unwrap()).unwrap();
        assert_eq!(v["model"], "m1");
        assert_eq!(v["temperature"], 0.0);
        assert_eq!(v["tool_choice"], "auto");
        assert_eq!(v["messages"].as_array().unwrap().len(), 4);
        assert_eq!(v["messages"][2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(v["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(v["tools"][0]["function"]["name"], "t");

        let v = serde_json::to_value(client.build_request(&messages[..2], &[]).unwrap()).unwrap();
        assert!(v.get("tools").map_or(true, Value::is_null));
        assert!(v.get("tool_choice").map_or(true, Value::is_null));
    }

    #[test]
    fn test_parse_tool_call_message() {
        let message = json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "omics_dea", "arguments": "{\"group_a\":[\"S1\"]}"}
            }, {
                "id": "call_2",
                "type": "function",
                "function": {"name": "kg_pathfinder", "arguments": {"gene": "TP53"}}
            }]
        });
        let reply = reply_from_message(message).unwrap();
        assert_eq!(reply.content, "");
        assert_eq!(reply.tool_calls.len(), 2);
        assert_eq!(reply.tool_calls[0].id, "call_1");
        assert_eq!(reply.tool_calls[0].function.arguments, r#"{"group_a":["S1"]}"#);
        assert_eq!(reply.tool_calls[1].function.arguments, r#"{"gene":"TP53"}"#);
    }

    #[test]
    fn test_parse_text_message() {
        let message = json!({"role": "assistant", "content": "Done"});
        assert_eq!(reply_from_message(message).unwrap(), BackendReply::text("Done"));
    }

    #[test]
    fn test_non_object_message_is_malformed() {
        assert!(matches!(
            reply_from_message(json!("oops")),
            Err(LlmError::MalformedResponse(_))
        ));
    }
}
