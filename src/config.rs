//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SKILLPILOT__*` 覆盖（双下划线表示嵌套，如 `SKILLPILOT__AGENT__MAX_STEPS=40`）。

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 指定额外配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "SKILLPILOT_CONFIG";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
}

/// [app] 段：技能目录、产物目录、子进程工作目录、系统提示词
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub skills_dir: PathBuf,
    /// 会话产物根目录，每个会话一个子目录
    pub results_dir: PathBuf,
    /// 技能子进程的工作目录，未设置时为当前目录
    pub working_dir: Option<PathBuf>,
    /// 覆盖内置系统提示词的文件
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            skills_dir: PathBuf::from("skills"),
            results_dir: PathBuf::from("results"),
            working_dir: None,
            system_prompt_path: None,
        }
    }
}

/// [llm] 段：后端选择、模型、采样温度与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            temperature: 0.0,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次推理请求超时（秒），不自动重试
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 120 }
    }
}

/// [agent] 段：循环步数上限与工具并发
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_steps: usize,
    /// 同一批工具调用是否并发执行
    pub parallel_tool_calls: bool,
    /// CLI 中工具输出预览的最大字符数
    pub output_preview_chars: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: 25,
            parallel_tool_calls: true,
            output_preview_chars: 200,
        }
    }
}

/// [tools] 段：子进程超时与环境变量
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用墙钟超时（秒）
    pub tool_timeout_secs: u64,
    pub session_env_var: String,
    pub session_dir_env_var: String,
    pub extra_env: BTreeMap<String, String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        let extra_env = [("PYTHONIOENCODING", "utf-8"), ("PYTHONUTF8", "1")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            tool_timeout_secs: 600,
            session_env_var: "AITARGET_SESSION_ID".to_string(),
            session_dir_env_var: "AITARGET_SESSION_DIR".to_string(),
            extra_env,
        }
    }
}

/// 从 config 目录加载配置，环境变量 SKILLPILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SKILLPILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SKILLPILOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_steps, 25);
        assert!(cfg.agent.parallel_tool_calls);
        assert_eq!(cfg.llm.temperature, 0.0);
        assert_eq!(cfg.llm.timeouts.request, 120);
        assert_eq!(cfg.tools.session_env_var, "AITARGET_SESSION_ID");
        assert_eq!(cfg.tools.extra_env.get("PYTHONUTF8").map(String::as_str), Some("1"));
        assert_eq!(cfg.app.skills_dir, PathBuf::from("skills"));
    }

    #[test]
    fn test_load_from_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[agent]\nmax_steps = 8\n\n[llm]\nprovider = \"mock\"\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.agent.max_steps, 8);
        assert_eq!(cfg.llm.provider, "mock");
        // 未出现的键保持默认
        assert_eq!(cfg.llm.model, "deepseek-chat");
        assert!(cfg.agent.parallel_tool_calls);
        assert_eq!(cfg.tools.tool_timeout_secs, 600);
    }
}
