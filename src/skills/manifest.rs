//! 技能描述：CapabilityDescriptor 与两种磁盘格式的解析
//!
//! 首选 `skill.toml`（类型化）：
//! ```toml
//! [skill]
//! description = "差异表达分析"
//! command = "python skills/omics_dea/script.py --group_a '{group_a}' --group_b '{group_b}'"
//!
//! [[skill.parameters]]
//! name = "group_a"
//! type = "array"
//! description = "实验组样本 ID"
//! required = true
//! ```
//!
//! 兼容 `SKILL.md`：`## Description` 段、`## Command` 单行模板、
//! 以及 `- name (type-hint[, required]): description` 形式的参数列表。
//! 缺失的段落退化为安全默认值（空描述 / 空模板），不会使整个加载失败。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::ManifestError;

/// 首选描述文件名
pub const SKILL_TOML: &str = "skill.toml";
/// 兼容描述文件名
pub const SKILL_MD: &str = "SKILL.md";

/// 摘要中描述的最大字符数
const SUMMARY_CHARS: usize = 100;

static PARAM_LINE_RE: OnceLock<Regex> = OnceLock::new();
static PARAM_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn param_line_re() -> &'static Regex {
    PARAM_LINE_RE.get_or_init(|| Regex::new(r"^\s*[-*]\s+(\w+)\s+\(([^)]*)\):\s*(.*)$").unwrap())
}

fn param_name_re() -> &'static Regex {
    PARAM_NAME_RE.get_or_init(|| Regex::new(r"^\w+$").unwrap())
}

/// 参数类型：标量或序列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Scalar,
    Sequence,
}

impl ParamKind {
    /// 从自由文本类型提示推断：含 array / list / sequence 即为序列
    pub fn from_hint(hint: &str) -> Self {
        let hint = hint.to_lowercase();
        if hint.contains("array") || hint.contains("list") || hint.contains("sequence") {
            ParamKind::Sequence
        } else {
            ParamKind::Scalar
        }
    }
}

/// 单个参数的 schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
}

impl ParameterSpec {
    fn to_json_schema(&self) -> Value {
        match self.kind {
            ParamKind::Scalar => json!({
                "type": "string",
                "description": self.description,
            }),
            ParamKind::Sequence => json!({
                "type": "array",
                "items": { "type": "string" },
                "description": self.description,
            }),
        }
    }
}

/// 技能描述：名称取自目录名，参数有序
#[derive(Debug, Clone)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
    /// 原始命令模板：解释器 + 脚本路径 + `--flag '{param}'` 对
    pub command: String,
    pub dir: PathBuf,
}

impl CapabilityDescriptor {
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters.iter().filter(|p| p.required)
    }

    /// OpenAI function 格式的工具 schema，供推理后端使用
    pub fn to_tool_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.to_json_schema()))
            .collect();
        let required: Vec<&str> = self.required_parameters().map(|p| p.name.as_str()).collect();
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }

    /// 截断后的简短描述
    pub fn summary(&self) -> String {
        let short: String = self.description.chars().take(SUMMARY_CHARS).collect();
        format!("{}...", short)
    }
}

#[derive(Debug, Deserialize)]
struct SkillToml {
    skill: SkillSection,
}

#[derive(Debug, Deserialize)]
struct SkillSection {
    #[serde(default)]
    description: String,
    #[serde(default)]
    command: String,
    #[serde(default)]
    parameters: Vec<ParameterEntry>,
}

#[derive(Debug, Deserialize)]
struct ParameterEntry {
    name: String,
    #[serde(default = "default_param_type", rename = "type")]
    kind: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    required: bool,
}

fn default_param_type() -> String {
    "string".to_string()
}

/// 解析 skill.toml 内容
pub fn parse_skill_toml(
    name: &str,
    dir: &Path,
    content: &str,
) -> Result<CapabilityDescriptor, ManifestError> {
    let data: SkillToml = toml::from_str(content).map_err(|e| ManifestError::Toml {
        path: dir.join(SKILL_TOML),
        message: e.to_string(),
    })?;
    let section = data.skill;
    let parameters = section
        .parameters
        .into_iter()
        .map(|p| ParameterSpec {
            kind: ParamKind::from_hint(&p.kind),
            name: p.name,
            description: p.description.trim().to_string(),
            required: p.required,
        })
        .collect();
    let descriptor = CapabilityDescriptor {
        name: name.to_string(),
        description: section.description.trim().to_string(),
        parameters,
        command: section.command.trim().to_string(),
        dir: dir.to_path_buf(),
    };
    validate_parameters(&descriptor.parameters)?;
    Ok(descriptor)
}

/// 解析 SKILL.md 内容
pub fn parse_skill_md(
    name: &str,
    dir: &Path,
    content: &str,
) -> Result<CapabilityDescriptor, ManifestError> {
    let description = section(content, "description")
        .map(|lines| lines.join("\n").trim().to_string())
        .unwrap_or_default();

    let command = section(content, "command")
        .and_then(|lines| {
            lines
                .into_iter()
                .map(str::trim)
                .find(|l| !l.is_empty() && !l.starts_with("```"))
        })
        .map(|l| l.trim_matches('`').trim().to_string())
        .unwrap_or_default();

    // 有参数段时只扫描该段，否则扫描全文
    let param_scope: Vec<&str> =
        section(content, "parameter").unwrap_or_else(|| content.lines().collect());
    let mut parameters = Vec::new();
    for line in param_scope {
        if let Some(caps) = param_line_re().captures(line) {
            let hint = caps[2].to_lowercase();
            parameters.push(ParameterSpec {
                name: caps[1].to_string(),
                kind: ParamKind::from_hint(&hint),
                description: caps[3].trim().to_string(),
                required: hint.contains("required") && !hint.contains("not required"),
            });
        }
    }

    validate_parameters(&parameters)?;
    Ok(CapabilityDescriptor {
        name: name.to_string(),
        description,
        parameters,
        command,
        dir: dir.to_path_buf(),
    })
}

/// 取出 `## <标题>` 下直到下一个 `#` 标题之间的行；标题按小写前缀匹配
fn section<'a>(content: &'a str, heading: &str) -> Option<Vec<&'a str>> {
    let mut lines = content.lines();
    lines.by_ref().find(|l| {
        let t = l.trim_start();
        t.starts_with("##") && t.trim_start_matches('#').trim().to_lowercase().starts_with(heading)
    })?;
    let mut in_fence = false;
    let body = lines
        .take_while(|l| {
            let t = l.trim_start();
            if t.starts_with("```") {
                in_fence = !in_fence;
            }
            in_fence || !t.starts_with('#')
        })
        .collect();
    Some(body)
}

fn validate_parameters(parameters: &[ParameterSpec]) -> Result<(), ManifestError> {
    let mut seen = HashSet::new();
    for p in parameters {
        if !param_name_re().is_match(&p.name) {
            return Err(ManifestError::InvalidParameter {
                name: p.name.clone(),
                reason: "name must be word characters only".to_string(),
            });
        }
        if !seen.insert(p.name.as_str()) {
            return Err(ManifestError::DuplicateParameter(p.name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEA_MD: &str = r#"# Omics DEA

## Description
Differential expression between two sample groups.
Outputs top genes and a volcano plot.

## Command
`python skills/omics_dea/script.py --group_a '{group_a}' --group_b '{group_b}' --top_n '{top_n}'`

## Parameters
- group_a (array, required): sample ids of group A
- group_b (list of strings, required): sample ids of group B
- top_n (integer): number of genes to report
"#;

    #[test]
    fn test_parse_skill_md() {
        let d = parse_skill_md("omics_dea", Path::new("skills/omics_dea"), DEA_MD).unwrap();
        assert_eq!(d.name, "omics_dea");
        assert!(d.description.starts_with("Differential expression"));
        assert!(d.description.contains("volcano"));
        assert_eq!(
            d.command,
            "python skills/omics_dea/script.py --group_a '{group_a}' --group_b '{group_b}' --top_n '{top_n}'"
        );
        let names: Vec<&str> = d.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["group_a", "group_b", "top_n"]);
        assert_eq!(d.parameters[0].kind, ParamKind::Sequence);
        assert!(d.parameters[0].required);
        assert_eq!(d.parameters[1].kind, ParamKind::Sequence);
        assert_eq!(d.parameters[2].kind, ParamKind::Scalar);
        assert!(!d.parameters[2].required);
    }

    #[test]
    fn test_missing_sections_default() {
        let d = parse_skill_md("bare", Path::new("."), "just some text\n").unwrap();
        assert_eq!(d.description, "");
        assert_eq!(d.command, "");
        assert!(d.parameters.is_empty());
    }

    #[test]
    fn test_command_in_code_fence() {
        let md = "## Command\n```bash\npython run.py --x '{x}'\n```\n";
        let d = parse_skill_md("fenced", Path::new("."), md).unwrap();
        assert_eq!(d.command, "python run.py --x '{x}'");
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let md = "## Parameters\n- a (string): one\n- a (string): two\n";
        let err = parse_skill_md("dup", Path::new("."), md).unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateParameter(ref n) if n == "a"));
    }

    #[test]
    fn test_parse_skill_toml() {
        let content = r#"
[skill]
description = "Pathway enrichment"
command = "python script.py --genes '{genes}'"

[[skill.parameters]]
name = "genes"
type = "array"
description = "gene symbols"
required = true

[[skill.parameters]]
name = "organism"
description = "species"
"#;
        let d = parse_skill_toml("enrichment_analysis", Path::new("."), content).unwrap();
        assert_eq!(d.description, "Pathway enrichment");
        assert_eq!(d.parameters.len(), 2);
        assert_eq!(d.parameters[0].kind, ParamKind::Sequence);
        assert!(d.parameters[0].required);
        assert_eq!(d.parameters[1].kind, ParamKind::Scalar);
        assert!(!d.parameters[1].required);
    }

    #[test]
    fn test_malformed_toml() {
        let err = parse_skill_toml("broken", Path::new("."), "[skill\n").unwrap_err();
        assert!(matches!(err, ManifestError::Toml { .. }));
    }

    #[test]
    fn test_tool_schema() {
        let d = parse_skill_md("omics_dea", Path::new("."), DEA_MD).unwrap();
        let schema = d.to_tool_schema();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "omics_dea");
        let params = &schema["function"]["parameters"];
        assert_eq!(params["properties"]["group_a"]["type"], "array");
        assert_eq!(params["properties"]["group_a"]["items"]["type"], "string");
        assert_eq!(params["properties"]["top_n"]["type"], "string");
        assert_eq!(params["required"], json!(["group_a", "group_b"]));
    }
}
