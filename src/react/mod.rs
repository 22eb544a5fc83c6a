//! 编排层：状态机主循环、过程事件、系统提示词

pub mod events;
pub mod loop_;
pub mod prompt;

pub use events::RunEvent;
pub use loop_::{
    parse_arguments, Orchestrator, OrchestratorConfig, RunOutcome, RunStatus, DEFAULT_MAX_STEPS,
};
pub use prompt::{build_system_prompt, load_system_prompt};
