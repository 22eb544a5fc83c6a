//! 工具调用器
//!
//! invoke(name, args, session) -> ToolCallResult：先查进程内工具，再按技能清单经 CommandBinder 解析 flag，
//! 以显式参数向量（不经 shell）启动隔离子进程，注入会话 ID，分别捕获 stdout / stderr（无效字节替换），
//! 带墙钟超时。所有失败模式都转为结构化错误结果，不越过调用边界；每次调用输出一条 JSON 审计日志。

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::ToolsSection;
use crate::core::{InvocationError, Session, SessionManager};
use crate::skills::{compile, CapabilityDescriptor, ParameterBinding, SkillRegistry};
use crate::tools::{ToolCallResult, ToolRegistry};

/// 审计日志中参数预览的最大字符数
const ARGS_PREVIEW_CHARS: usize = 200;

/// 子进程环境与超时设置
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// 子进程工作目录
    pub working_dir: PathBuf,
    pub timeout_secs: u64,
    /// 子进程读取会话 ID 的环境变量名
    pub session_env_var: String,
    /// 子进程读取产物目录的环境变量名
    pub session_dir_env_var: String,
    pub extra_env: BTreeMap<String, String>,
}

impl InvokerConfig {
    pub fn from_section(tools: &ToolsSection, working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            timeout_secs: tools.tool_timeout_secs,
            session_env_var: tools.session_env_var.clone(),
            session_dir_env_var: tools.session_dir_env_var.clone(),
            extra_env: tools.extra_env.clone(),
        }
    }
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self::from_section(&ToolsSection::default(), PathBuf::from("."))
    }
}

/// 工具调用器：技能注册表只读共享，可被多个对话同时使用
pub struct ToolInvoker {
    skills: Arc<SkillRegistry>,
    builtins: ToolRegistry,
    config: InvokerConfig,
}

impl ToolInvoker {
    pub fn new(skills: Arc<SkillRegistry>, builtins: ToolRegistry, config: InvokerConfig) -> Self {
        Self {
            skills,
            builtins,
            config,
        }
    }

    pub fn skills(&self) -> &SkillRegistry {
        &self.skills
    }

    /// 向推理后端公布的全部工具 schema（进程内工具在前，技能按名称排序）
    pub fn advertised_schemas(&self) -> Vec<Value> {
        let mut schemas = self.builtins.tool_schemas();
        schemas.extend(
            self.skills
                .tool_schemas()
                .into_iter()
                .filter(|s| {
                    let name = s["function"]["name"].as_str().unwrap_or_default();
                    self.builtins.get(name).is_none()
                }),
        );
        schemas
    }

    pub fn capability_names(&self) -> Vec<String> {
        let mut names = self.builtins.tool_names();
        names.extend(
            self.skills
                .names()
                .into_iter()
                .filter(|n| self.builtins.get(n).is_none()),
        );
        names
    }

    /// 调用一个能力；永不返回 Err，失败一律为 ToolCallResult::error
    pub async fn invoke(
        &self,
        name: &str,
        args: &Map<String, Value>,
        session: &SessionManager,
    ) -> ToolCallResult {
        let start = Instant::now();
        let result = self.dispatch(name, args, session).await;

        let outcome = if result.is_success() { "ok" } else { "error" };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "ok": result.is_success(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");
        result
    }

    async fn dispatch(
        &self,
        name: &str,
        args: &Map<String, Value>,
        sessions: &SessionManager,
    ) -> ToolCallResult {
        let builtin = self.builtins.get(name);
        let descriptor = self.skills.get(name);
        if builtin.is_none() && descriptor.is_none() {
            return InvocationError::UnknownCapability(name.to_string()).into();
        }

        // 尚无会话时在此惰性创建，并保留给同一运行中的后续调用
        let session = match sessions.current() {
            Ok(s) => s,
            Err(e) => return ToolCallResult::error(e.to_string(), None),
        };

        if let Some(tool) = builtin {
            return match tool.execute(Value::Object(args.clone()), &session).await {
                Ok(payload) => ToolCallResult::success(payload),
                Err(message) => InvocationError::Tool(message).into(),
            };
        }

        match descriptor {
            Some(d) => match self.run_process(d, args, &session).await {
                Ok(stdout) => ToolCallResult::from_output(&stdout),
                Err(e) => e.into(),
            },
            None => InvocationError::UnknownCapability(name.to_string()).into(),
        }
    }

    async fn run_process(
        &self,
        descriptor: &CapabilityDescriptor,
        args: &Map<String, Value>,
        session: &Session,
    ) -> Result<String, InvocationError> {
        let binding = compile(&descriptor.command)?;
        let argv = build_argv(descriptor, &binding, args)?;
        let program = binding.interpreter.clone();

        tracing::debug!(skill = %descriptor.name, program = %program, argv = ?argv, "spawning tool");
        tracing::info!(skill = %descriptor.name, session = %session.id, "tool invoke");

        let child = Command::new(&program)
            .args(&argv)
            .current_dir(&self.config.working_dir)
            .envs(&self.config.extra_env)
            .env(&self.config.session_env_var, &session.id)
            .env(&self.config.session_dir_env_var, &session.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| InvocationError::Spawn {
                program: program.clone(),
                source,
            })?;

        // 超时后 future 被丢弃，kill_on_drop 负责结束子进程
        let output = timeout(
            Duration::from_secs(self.config.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| InvocationError::Timeout(self.config.timeout_secs))?
        .map_err(InvocationError::Wait)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = stdout.trim();
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            tracing::debug!(skill = %descriptor.name, stderr = %stderr, "tool log");
        }
        if !output.status.success() {
            tracing::warn!(
                skill = %descriptor.name,
                code = ?output.status.code(),
                "tool exited with non-zero status"
            );
        }

        if stdout.is_empty() {
            return Err(InvocationError::NoOutput {
                stderr: stderr.to_string(),
            });
        }
        Ok(stdout.to_string())
    }
}

/// 构建参数向量（不含解释器）：脚本路径、静态 flag，然后按 schema 顺序、再按键名顺序追加 `flag value`
pub fn build_argv(
    descriptor: &CapabilityDescriptor,
    binding: &ParameterBinding,
    args: &Map<String, Value>,
) -> Result<Vec<String>, InvocationError> {
    for p in descriptor.required_parameters() {
        match args.get(&p.name) {
            None | Some(Value::Null) => {
                return Err(InvocationError::MissingParameter(p.name.clone()))
            }
            Some(_) => {}
        }
    }

    let mut argv = vec![resolve_script(descriptor, &binding.script)];
    argv.extend(binding.static_args.iter().cloned());

    let mut extras: Vec<&String> = args
        .keys()
        .filter(|k| descriptor.parameter(k).is_none())
        .collect();
    extras.sort();
    let ordered = descriptor
        .parameters
        .iter()
        .map(|p| &p.name)
        .chain(extras);

    for key in ordered {
        let Some(value) = args.get(key.as_str()) else {
            continue;
        };
        if let Some(text) = arg_text(key, value)? {
            argv.push(binding.flag_for(key));
            argv.push(text);
        }
    }
    Ok(argv)
}

/// 参数值转单个文本 token：字符串原样，复合值为紧凑 JSON，null 省略
fn arg_text(name: &str, value: &Value) -> Result<Option<String>, InvocationError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Bool(_) | Value::Number(_) => Ok(Some(value.to_string())),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value)
            .map(Some)
            .map_err(|source| InvocationError::Serialize {
                name: name.to_string(),
                source,
            }),
    }
}

/// 脚本在技能目录下存在时使用该路径，否则按模板原样（相对工作目录）
fn resolve_script(descriptor: &CapabilityDescriptor, script: &str) -> String {
    let local = descriptor.dir.join(script);
    if local.is_file() {
        local.to_string_lossy().into_owned()
    } else {
        script.to_string()
    }
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > ARGS_PREVIEW_CHARS {
        format!("{}...", s.chars().take(ARGS_PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}
