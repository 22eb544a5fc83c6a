//! 命令模板编译：参数名 -> CLI flag
//!
//! 模板按空白切分（引号内的空白不切分，引号本身去掉）：第 0 个 token 为解释器，第 1 个为脚本路径，其余为 flag / 占位符对。
//! `--flag '{name}'` 把 name 绑定到 --flag；不带占位符的 flag（及其字面值）原样透传。
//! 编译是纯函数：相同模板总得到相同绑定，与调用时参数顺序无关。

use std::collections::BTreeMap;

use crate::core::BindingError;

/// 编译后的参数绑定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBinding {
    pub interpreter: String,
    pub script: String,
    /// 模板中的静态 flag 与字面值，按出现顺序
    pub static_args: Vec<String>,
    flags: BTreeMap<String, String>,
}

impl ParameterBinding {
    /// 参数对应的 flag；模板中没有该占位符时回退为 `--<name>`
    pub fn flag_for(&self, name: &str) -> String {
        self.flags
            .get(name)
            .cloned()
            .unwrap_or_else(|| format!("--{}", name))
    }

    /// 模板中出现过占位符的参数名
    pub fn bound_parameters(&self) -> impl Iterator<Item = &str> {
        self.flags.keys().map(String::as_str)
    }

    pub fn flags(&self) -> &BTreeMap<String, String> {
        &self.flags
    }
}

/// 编译命令模板
pub fn compile(template: &str) -> Result<ParameterBinding, BindingError> {
    let owned = tokenize(template);
    let tokens: Vec<&str> = owned.iter().map(String::as_str).collect();
    let interpreter = match tokens.first() {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => return Err(BindingError::EmptyTemplate),
    };
    let script = match tokens.get(1) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => return Err(BindingError::MissingScript(template.trim().to_string())),
    };

    let mut static_args = Vec::new();
    let mut flags = BTreeMap::new();
    let mut i = 2;
    while i < tokens.len() {
        let token = tokens[i];
        if is_flag(token) {
            match tokens.get(i + 1) {
                Some(next) if !is_flag(next) => {
                    match placeholder(next) {
                        Some(name) => {
                            flags.insert(name.to_string(), token.to_string());
                        }
                        None => {
                            static_args.push(token.to_string());
                            static_args.push(next.to_string());
                        }
                    }
                    i += 2;
                }
                _ => {
                    static_args.push(token.to_string());
                    i += 1;
                }
            }
        } else {
            // 没有前置 flag 的占位符按默认 flag 绑定，其余视为字面值
            match placeholder(token) {
                Some(name) => {
                    flags.insert(name.to_string(), format!("--{}", name));
                }
                None => static_args.push(token.to_string()),
            }
            i += 1;
        }
    }

    Ok(ParameterBinding {
        interpreter,
        script,
        static_args,
        flags,
    })
}

/// 按空白切分，单 / 双引号包住的一段视为同一 token 的一部分
fn tokenize(template: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_token = false;

    for c in template.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

fn is_flag(token: &str) -> bool {
    token.starts_with('-') && token.len() > 1 && placeholder(token).is_none()
}

/// `{name}` -> name
fn placeholder(token: &str) -> Option<&str> {
    let inner = token.strip_prefix('{')?.strip_suffix('}')?;
    if !inner.is_empty() && inner.chars().all(|c| c.is_alphanumeric() || c == '_') {
        Some(inner)
    } else {
        None
    }
}
