//! 技能系统
//!
//! 技能（Skill）是一个可被外部调用的工具：目录名即技能名，描述文件声明参数 schema 与命令模板。
//!
//! 目录结构：
//! ```text
//! skills/
//! ├── omics_dea/
//! │   ├── skill.toml      # 类型化描述（首选）
//! │   └── script.py
//! ├── kg_pathfinder/
//! │   ├── SKILL.md        # Markdown 描述（兼容）
//! │   └── script.py
//! └── ...
//! ```

pub mod binder;
mod loader;
pub mod manifest;

pub use binder::{compile, ParameterBinding};
pub use loader::SkillRegistry;
pub use manifest::{CapabilityDescriptor, ParamKind, ParameterSpec};
