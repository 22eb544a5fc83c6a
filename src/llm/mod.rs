//! 推理后端层：抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use deepseek::{create_deepseek_client, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT};
pub use mock::MockBackend;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{BackendReply, ReasoningBackend};

use crate::config::AppConfig;

/// 根据配置与环境变量选择推理后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_backend_from_config(cfg: &AppConfig) -> Arc<dyn ReasoningBackend> {
    let provider = cfg.llm.provider.to_lowercase();
    let timeout = cfg.llm.timeouts.request;
    let base_url = cfg.llm.base_url.as_deref();

    let client = match provider.as_str() {
        "mock" => None,
        "openai" => match std::env::var("OPENAI_API_KEY") {
            Ok(key) => Some(OpenAiClient::new(base_url, &cfg.llm.model, &key, timeout)),
            Err(_) => None,
        },
        _ => {
            if provider != "deepseek" {
                tracing::warn!(provider = %provider, "unknown provider, trying DeepSeek");
            }
            Some(create_deepseek_client(Some(&cfg.llm.model), base_url, timeout))
        }
    };

    match client {
        Some(Ok(c)) => {
            tracing::info!(provider = %provider, model = %cfg.llm.model, "Using {} backend", provider);
            Arc::new(c.with_temperature(cfg.llm.temperature))
        }
        Some(Err(e)) => {
            tracing::warn!("Backend unavailable ({}), using Mock backend", e);
            Arc::new(MockBackend::echo())
        }
        None => {
            tracing::warn!("No API key set or provider is mock, using Mock backend");
            Arc::new(MockBackend::echo())
        }
    }
}
