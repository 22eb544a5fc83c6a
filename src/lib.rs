//! SkillPilot - 技能驱动的智能体运行时
//!
//! 模块划分：
//! - **agent**: 无头运行时，由配置装配各部件
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与会话管理
//! - **llm**: 推理后端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 对话记录
//! - **react**: 编排状态机、过程事件、系统提示词
//! - **skills**: 技能清单加载与命令模板编译
//! - **tools**: 工具调用器（隔离子进程 + 进程内工具）

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod skills;
pub mod tools;

pub use agent::{create_agent_components, AgentComponents};
pub use react::{Orchestrator, RunEvent, RunOutcome, RunStatus};
