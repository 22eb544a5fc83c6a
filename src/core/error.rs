//! 错误类型
//!
//! 按关注点划分：技能清单（ManifestError）、命令模板（BindingError）、进程调用（InvocationError）、
//! 推理后端（LlmError），AgentError 为 crate 级汇总。
//! 单个技能或单次工具调用的失败是「数据」而非控制流：它们会被转换为 ToolCallResult 写回对话；
//! 只有推理后端失败与步数耗尽会结束一次运行。

use std::path::PathBuf;

use thiserror::Error;

/// 单个技能目录的描述文件有误；加载时隔离，跳过该技能，兄弟技能照常加载
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid skill.toml in {path}: {message}")]
    Toml { path: PathBuf, message: String },

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Duplicate parameter '{0}'")]
    DuplicateParameter(String),
}

/// 命令模板缺少必需的 token（解释器 + 脚本路径）；在该技能首次调用时以结构化错误返回
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("Command template is empty")]
    EmptyTemplate,

    #[error("Command template '{0}' has no script path")]
    MissingScript(String),
}

/// 进程层失败：创建进程、等待、输出为空、超时、参数序列化
#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Missing required parameter '{0}'")]
    MissingParameter(String),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error("Failed to serialize argument '{name}': {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Tool timed out after {0}s")]
    Timeout(u64),

    #[error("Tool produced no output")]
    NoOutput { stderr: String },

    #[error("Tool failed: {0}")]
    Tool(String),
}

impl InvocationError {
    /// 需要附带到结果中的诊断文本（子进程 stderr）
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            InvocationError::NoOutput { stderr } if !stderr.is_empty() => Some(stderr.as_str()),
            _ => None,
        }
    }
}

/// 推理后端失败（网络、超时、HTTP 状态、响应格式）；对当前运行是终止性的
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("Backend request timed out")]
    Timeout,

    #[error("Backend request failed: {0}")]
    Network(String),

    #[error("Backend API error: {0}")]
    Api(String),

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("Missing API key: {0}")]
    MissingApiKey(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else if e.is_decode() {
            LlmError::MalformedResponse(e.to_string())
        } else {
            LlmError::Network(e.to_string())
        }
    }
}

/// crate 级错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    /// 单个工具调用的参数不是合法 JSON 对象；仅影响该调用
    #[error("Invalid tool arguments for {tool}: {message}")]
    ArgumentParse { tool: String, message: String },

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_output_diagnostic() {
        let e = InvocationError::NoOutput {
            stderr: "boom".to_string(),
        };
        assert_eq!(e.diagnostic(), Some("boom"));

        let e = InvocationError::NoOutput {
            stderr: String::new(),
        };
        assert_eq!(e.diagnostic(), None);
    }

    #[test]
    fn test_binding_error_converts() {
        let e: InvocationError = BindingError::EmptyTemplate.into();
        assert!(e.to_string().contains("empty"));
    }
}
