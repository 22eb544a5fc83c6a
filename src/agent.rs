//! Headless Agent 运行时
//!
//! create_agent_components 由配置构建可多对话共享的部件（技能注册表、工具调用器、推理后端、系统提示词），
//! new_conversation 为一次对话创建独立的 Orchestrator（独立的对话记录与会话句柄）。

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{AgentError, SessionManager};
use crate::llm::{create_backend_from_config, ReasoningBackend};
use crate::react::{load_system_prompt, Orchestrator, OrchestratorConfig};
use crate::skills::SkillRegistry;
use crate::tools::{InvokerConfig, SessionInfoTool, ToolInvoker, ToolRegistry};

/// 预构建的 Agent 部件，可多对话共享
pub struct AgentComponents {
    pub invoker: Arc<ToolInvoker>,
    pub backend: Arc<dyn ReasoningBackend>,
    pub system_prompt: String,
    pub orchestrator: OrchestratorConfig,
    pub results_dir: PathBuf,
}

/// 由配置创建 Agent 部件：加载技能、注册内置工具、选择推理后端
pub fn create_agent_components(cfg: &AppConfig) -> Result<AgentComponents, AgentError> {
    let backend = create_backend_from_config(cfg);
    create_agent_components_with_backend(cfg, backend)
}

/// 同上，但使用调用方给定的推理后端（测试 / 嵌入场景）
pub fn create_agent_components_with_backend(
    cfg: &AppConfig,
    backend: Arc<dyn ReasoningBackend>,
) -> Result<AgentComponents, AgentError> {
    let skills = Arc::new(SkillRegistry::load(&cfg.app.skills_dir)?);

    let mut builtins = ToolRegistry::new();
    builtins.register(SessionInfoTool);
    // 工具箱清单与公布的 schema 一致：同名技能被进程内工具遮蔽
    let mut toolbox = builtins.summaries();
    toolbox.extend(
        skills
            .summaries()
            .into_iter()
            .filter(|(name, _)| builtins.get(name).is_none()),
    );

    let working_dir = match &cfg.app.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let invoker = ToolInvoker::new(
        skills.clone(),
        builtins,
        InvokerConfig::from_section(&cfg.tools, working_dir),
    );

    let system_prompt = load_system_prompt(cfg.app.system_prompt_path.as_deref(), &toolbox);

    tracing::info!(
        skills = skills.len(),
        model = %backend.model(),
        "agent components ready"
    );

    Ok(AgentComponents {
        invoker: Arc::new(invoker),
        backend,
        system_prompt,
        orchestrator: OrchestratorConfig::from(&cfg.agent),
        results_dir: cfg.app.results_dir.clone(),
    })
}

impl AgentComponents {
    /// 新对话：共享部件，独立的对话记录与会话
    pub fn new_conversation(&self) -> Orchestrator {
        Orchestrator::new(
            self.backend.clone(),
            self.invoker.clone(),
            SessionManager::new(&self.results_dir),
            self.system_prompt.clone(),
            self.orchestrator.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockBackend;
    use crate::tools::Tool;

    #[test]
    fn test_toolbox_uses_builtin_descriptions() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.app.skills_dir = dir.path().join("skills");
        cfg.app.results_dir = dir.path().join("results");
        cfg.app.working_dir = Some(dir.path().to_path_buf());

        let agent =
            create_agent_components_with_backend(&cfg, Arc::new(MockBackend::echo())).unwrap();
        let expected = format!("- `session_info`: {}", SessionInfoTool.description());
        assert!(agent.system_prompt.contains(&expected));
    }
}
