//! 系统提示词：内置默认文本 + 工具箱清单，可由配置文件覆盖

use std::path::Path;

const BASE_PROMPT: &str = "You are an autonomous research agent. \
Answer the user's question by orchestrating the tools available to you.

Before each action, look at what the previous tool results actually showed and decide the next step from them. \
Prefer calling a tool over guessing; call several independent tools in one step when that helps. \
Tool results are JSON envelopes with a \"status\" field; when a tool reports an error, adapt instead of repeating the same call.

When you have enough evidence, reply with the final answer in plain text and no tool calls. \
Explain what the data showed and why it supports your conclusion.";

/// 内置提示词 + 工具箱（名称与描述摘要）
pub fn build_system_prompt(toolbox: &[(String, String)]) -> String {
    if toolbox.is_empty() {
        return BASE_PROMPT.to_string();
    }
    let list: Vec<String> = toolbox
        .iter()
        .map(|(name, desc)| format!("- `{}`: {}", name, desc))
        .collect();
    format!("{}\n\n### Toolbox\n{}", BASE_PROMPT, list.join("\n"))
}

/// 读取覆盖用的提示词文件；读取失败时回退到内置提示词
pub fn load_system_prompt(path: Option<&Path>, toolbox: &[(String, String)]) -> String {
    if let Some(p) = path {
        match std::fs::read_to_string(p) {
            Ok(text) if !text.trim().is_empty() => return text,
            Ok(_) => tracing::warn!(path = %p.display(), "system prompt file is empty, using built-in"),
            Err(e) => tracing::warn!(path = %p.display(), "cannot read system prompt: {}", e),
        }
    }
    build_system_prompt(toolbox)
}
