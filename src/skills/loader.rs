//! 技能注册表
//!
//! 扫描技能根目录，每个含描述文件（skill.toml 或 SKILL.md）的子目录产生一个 CapabilityDescriptor。
//! 单个技能解析失败只记录日志并跳过，兄弟技能照常加载。加载完成后只读，可在多个对话间共享（Arc）。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::core::{AgentError, ManifestError};
use crate::skills::binder;
use crate::skills::manifest::{
    parse_skill_md, parse_skill_toml, CapabilityDescriptor, ParamKind, ParameterSpec, SKILL_MD,
    SKILL_TOML,
};

/// 只读技能注册表：名称唯一，按目录名排序
#[derive(Debug, Default)]
pub struct SkillRegistry {
    skills_dir: PathBuf,
    descriptors: Vec<CapabilityDescriptor>,
    index: HashMap<String, usize>,
}

impl SkillRegistry {
    /// 加载目录下所有技能；目录不存在时返回空注册表
    pub fn load(skills_dir: impl AsRef<Path>) -> Result<Self, AgentError> {
        let skills_dir = skills_dir.as_ref().to_path_buf();
        if !skills_dir.exists() {
            tracing::warn!(dir = %skills_dir.display(), "skills directory does not exist");
            return Ok(Self {
                skills_dir,
                ..Self::default()
            });
        }

        tracing::info!(dir = %skills_dir.display(), "scanning skills");
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&skills_dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        let mut descriptors = Vec::new();
        for dir in dirs {
            match load_skill(&dir) {
                Ok(Some(descriptor)) => {
                    tracing::info!(skill = %descriptor.name, "loaded skill");
                    descriptors.push(descriptor);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "skipping skill");
                }
            }
        }

        let mut registry = Self::from_descriptors(descriptors);
        registry.skills_dir = skills_dir;
        tracing::info!("Loaded {} skills", registry.len());
        Ok(registry)
    }

    /// 由已有描述构建；重名时保留先出现者
    pub fn from_descriptors(descriptors: Vec<CapabilityDescriptor>) -> Self {
        let mut registry = Self::default();
        for descriptor in descriptors {
            if registry.index.contains_key(&descriptor.name) {
                tracing::warn!(skill = %descriptor.name, "duplicate skill name ignored");
                continue;
            }
            registry
                .index
                .insert(descriptor.name.clone(), registry.descriptors.len());
            registry.descriptors.push(descriptor);
        }
        registry
    }

    pub fn skills_dir(&self) -> &Path {
        &self.skills_dir
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn descriptors(&self) -> &[CapabilityDescriptor] {
        &self.descriptors
    }

    pub fn names(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.name.clone()).collect()
    }

    /// 供推理后端使用的工具 schema 列表
    pub fn tool_schemas(&self) -> Vec<Value> {
        self.descriptors.iter().map(|d| d.to_tool_schema()).collect()
    }

    /// (name, 截断描述) 列表
    pub fn summaries(&self) -> Vec<(String, String)> {
        self.descriptors
            .iter()
            .map(|d| (d.name.clone(), d.summary()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// 加载单个技能目录；没有描述文件时返回 Ok(None)
fn load_skill(dir: &Path) -> Result<Option<CapabilityDescriptor>, ManifestError> {
    let name = match dir.file_name().and_then(|n| n.to_str()) {
        Some(n) => n.to_string(),
        None => return Ok(None),
    };

    let toml_path = dir.join(SKILL_TOML);
    let md_path = dir.join(SKILL_MD);
    let mut descriptor = if toml_path.is_file() {
        let content = read(&toml_path)?;
        parse_skill_toml(&name, dir, &content)?
    } else if md_path.is_file() {
        let content = read(&md_path)?;
        parse_skill_md(&name, dir, &content)?
    } else {
        return Ok(None);
    };

    declare_template_placeholders(&mut descriptor);
    Ok(Some(descriptor))
}

fn read(path: &Path) -> Result<String, ManifestError> {
    std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// 模板里出现但参数列表未声明的占位符补为可选标量参数，保证每个绑定键都在 schema 中
fn declare_template_placeholders(descriptor: &mut CapabilityDescriptor) {
    let Ok(binding) = binder::compile(&descriptor.command) else {
        return;
    };
    for name in binding.bound_parameters() {
        if descriptor.parameter(name).is_none() {
            tracing::warn!(
                skill = %descriptor.name,
                parameter = %name,
                "template placeholder not declared, adding optional parameter"
            );
            descriptor.parameters.push(ParameterSpec {
                name: name.to_string(),
                kind: ParamKind::Scalar,
                description: String::new(),
                required: false,
            });
        }
    }
}
