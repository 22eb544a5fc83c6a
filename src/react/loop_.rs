//! 编排主循环（状态机）
//!
//! START -> THINKING -> (TOOL_DISPATCH -> THINKING)* -> DONE | ERROR | STEP_LIMIT_REACHED。
//! 后端回复无条件写入对话；一批工具调用可并发执行，但结果按请求顺序写回。
//! 单个工具调用的失败（含参数解析失败）只是数据，写回对话供后端应对；只有后端失败与步数耗尽会结束循环。
//! 运行永不返回 Err，总是带回当前能给出的最佳内容。

use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::config::AgentSection;
use crate::core::{AgentError, Session, SessionManager};
use crate::llm::ReasoningBackend;
use crate::memory::{Message, Role, ToolCall, Transcript};
use crate::react::RunEvent;
use crate::tools::{ToolCallResult, ToolInvoker};

/// 单次运行内默认最大步数，防止失控的工具调用
pub const DEFAULT_MAX_STEPS: usize = 25;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_steps: usize,
    /// 同一批工具调用是否并发执行
    pub parallel_tool_calls: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            parallel_tool_calls: true,
        }
    }
}

impl From<&AgentSection> for OrchestratorConfig {
    fn from(agent: &AgentSection) -> Self {
        Self {
            max_steps: agent.max_steps.max(1),
            parallel_tool_calls: agent.parallel_tool_calls,
        }
    }
}

/// 运行的终止状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Done,
    StepLimitReached,
    Cancelled,
    Error(String),
}

/// 一次运行的结果：最终回复（或当前最佳内容）、终止状态、THINKING 次数
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub answer: String,
    pub status: RunStatus,
    pub steps: usize,
}

impl RunOutcome {
    pub fn is_done(&self) -> bool {
        self.status == RunStatus::Done
    }
}

fn send_event(tx: Option<&UnboundedSender<RunEvent>>, ev: RunEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

/// 编排器：独占对话记录，持有本对话的会话句柄
pub struct Orchestrator {
    backend: Arc<dyn ReasoningBackend>,
    invoker: Arc<ToolInvoker>,
    sessions: SessionManager,
    transcript: Transcript,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn ReasoningBackend>,
        invoker: Arc<ToolInvoker>,
        sessions: SessionManager,
        system_prompt: impl Into<String>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            backend,
            invoker,
            sessions,
            transcript: Transcript::with_system(system_prompt),
            config,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn invoker(&self) -> &ToolInvoker {
        &self.invoker
    }

    /// 当前会话（尚未建立时为 None）
    pub fn session(&self) -> Option<Session> {
        self.sessions.peek()
    }

    /// 显式建立会话；传入 ID 即刻意复用该 ID 的产物目录
    pub fn start_session(&self, id: Option<&str>) -> Result<Session, AgentError> {
        self.sessions.start(id)
    }

    /// 清空对话（保留 system 提示词）并重置会话
    pub fn reset(&mut self) {
        self.transcript.reset();
        self.sessions.reset();
    }

    pub async fn run(&mut self, query: &str, cancel: CancellationToken) -> RunOutcome {
        self.run_inner(query, cancel, None).await
    }

    /// 流式变体：每次状态迁移发送一条事件
    pub async fn run_with_events(
        &mut self,
        query: &str,
        cancel: CancellationToken,
        events: &UnboundedSender<RunEvent>,
    ) -> RunOutcome {
        self.run_inner(query, cancel, Some(events)).await
    }

    async fn run_inner(
        &mut self,
        query: &str,
        cancel: CancellationToken,
        events: Option<&UnboundedSender<RunEvent>>,
    ) -> RunOutcome {
        let run_start = self.transcript.len();
        self.transcript.push(Message::user(query));
        send_event(events, RunEvent::Start { query: query.to_string() });

        let schemas = self.invoker.advertised_schemas();
        let max_steps = self.config.max_steps;
        let mut steps = 0;

        loop {
            if cancel.is_cancelled() {
                return self.finish(RunStatus::Cancelled, self.best_content(run_start), steps, events);
            }

            if steps >= max_steps {
                tracing::warn!(max_steps, "step limit reached");
                let answer = match self.best_content(run_start) {
                    s if s.is_empty() => format!("Reached the step limit ({}) without a final answer.", max_steps),
                    s => s,
                };
                return self.finish(RunStatus::StepLimitReached, answer, steps, events);
            }

            steps += 1;
            tracing::info!(step = steps, max_steps, "thinking");

            let reply = tokio::select! {
                r = self.backend.complete(self.transcript.messages(), &schemas) => r,
                _ = cancel.cancelled() => {
                    return self.finish(RunStatus::Cancelled, self.best_content(run_start), steps, events);
                }
            };
            let reply = match reply {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(step = steps, "reasoning backend failed: {}", e);
                    let text = e.to_string();
                    send_event(events, RunEvent::Error { text: text.clone() });
                    return RunOutcome {
                        answer: self.best_content(run_start),
                        status: RunStatus::Error(text),
                        steps,
                    };
                }
            };

            let calls: Vec<ToolCall> = reply
                .tool_calls
                .into_iter()
                .map(|mut c| {
                    if c.id.trim().is_empty() {
                        c.id = format!("call_{}", uuid::Uuid::new_v4().simple());
                    }
                    c
                })
                .collect();

            self.transcript
                .push(Message::assistant_with_calls(reply.content.clone(), calls.clone()));
            send_event(
                events,
                RunEvent::Thinking {
                    step: steps,
                    max_steps,
                    content: reply.content.clone(),
                },
            );

            if calls.is_empty() {
                return self.finish(RunStatus::Done, reply.content, steps, events);
            }

            for call in &calls {
                send_event(
                    events,
                    RunEvent::ToolCall {
                        id: call.id.clone(),
                        tool: call.name().to_string(),
                        args: call.function.arguments.clone(),
                    },
                );
            }

            let results = self.dispatch_batch(&calls).await;
            for (call, result) in calls.iter().zip(results) {
                self.transcript
                    .push(Message::tool(&call.id, call.name(), result.content()));
                let ev = if result.is_success() {
                    RunEvent::ToolResult {
                        id: call.id.clone(),
                        tool: call.name().to_string(),
                        payload: result.payload,
                    }
                } else {
                    RunEvent::ToolError {
                        id: call.id.clone(),
                        tool: call.name().to_string(),
                        message: result.message().unwrap_or_default().to_string(),
                    }
                };
                send_event(events, ev);
            }
        }
    }

    /// 执行一批调用；返回值与请求一一对应、顺序相同
    async fn dispatch_batch(&self, calls: &[ToolCall]) -> Vec<ToolCallResult> {
        if self.config.parallel_tool_calls {
            join_all(calls.iter().map(|c| self.dispatch_one(c))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.dispatch_one(call).await);
            }
            results
        }
    }

    async fn dispatch_one(&self, call: &ToolCall) -> ToolCallResult {
        let result = match parse_arguments(call.name(), &call.function.arguments) {
            Ok(args) => self.invoker.invoke(call.name(), &args, &self.sessions).await,
            Err(e) => {
                tracing::warn!(tool = %call.name(), id = %call.id, "{}", e);
                ToolCallResult::error(e.to_string(), None)
            }
        };
        result.with_call_id(&call.id)
    }

    /// 本次运行中最近一条非空的 assistant 内容
    fn best_content(&self, run_start: usize) -> String {
        self.transcript.messages()[run_start..]
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.content.trim().is_empty())
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    fn finish(
        &self,
        status: RunStatus,
        answer: String,
        steps: usize,
        events: Option<&UnboundedSender<RunEvent>>,
    ) -> RunOutcome {
        tracing::info!(steps, status = ?status, "run finished");
        send_event(
            events,
            RunEvent::Complete {
                answer: answer.clone(),
                status: status.clone(),
                steps,
            },
        );
        RunOutcome { answer, status, steps }
    }
}

/// 解析一次调用的参数文本：空文本视为 `{}`，非对象或无法解析一律为 ArgumentParse 错误
pub fn parse_arguments(tool: &str, raw: &str) -> Result<Map<String, Value>, AgentError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AgentError::ArgumentParse {
            tool: tool.to_string(),
            message: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
        Err(e) => Err(AgentError::ArgumentParse {
            tool: tool.to_string(),
            message: e.to_string(),
        }),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{BackendReply, MockBackend};
    use crate::skills::SkillRegistry;
    use crate::tools::{InvokerConfig, SessionInfoTool, ToolRegistry};

    fn orchestrator(backend: MockBackend, root: &std::path::Path, max_steps: usize) -> Orchestrator {
        let mut builtins = ToolRegistry::new();
        builtins.register(SessionInfoTool);
        let invoker = ToolInvoker::new(
            Arc::new(SkillRegistry::from_descriptors(Vec::new())),
            builtins,
            InvokerConfig::default(),
        );
        Orchestrator::new(
            Arc::new(backend),
            Arc::new(invoker),
            SessionManager::new(root.join("results")),
            "sys",
            OrchestratorConfig {
                max_steps,
                parallel_tool_calls: true,
            },
        )
    }

    #[test]
    fn test_parse_arguments() {
        assert!(parse_arguments("t", "  ").unwrap().is_empty());
        assert_eq!(parse_arguments("t", r#"{"a":1}"#).unwrap()["a"], 1);
        assert!(matches!(
            parse_arguments("t", "[1,2]"),
            Err(AgentError::ArgumentParse { .. })
        ));
        assert!(matches!(
            parse_arguments("t", "{not json"),
            Err(AgentError::ArgumentParse { .. })
        ));
    }

    #[tokio::test]
    async fn test_done_in_one_step() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::scripted(vec![Ok(BackendReply::text("Done"))]);
        let mut orch = orchestrator(backend, dir.path(), 25);

        let outcome = orch.run("hi", CancellationToken::new()).await;
        assert_eq!(outcome.answer, "Done");
        assert_eq!(outcome.status, RunStatus::Done);
        assert_eq!(outcome.steps, 1);
        assert_eq!(orch.transcript().len(), 3);
        // 没有工具调用时不创建会话
        assert!(orch.session().is_none());
    }

    #[tokio::test]
    async fn test_missing_call_id_synthesized() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::scripted(vec![
            Ok(BackendReply::calls("", vec![ToolCall::new("", "session_info", "")])),
            Ok(BackendReply::text("ok")),
        ]);
        let mut orch = orchestrator(backend, dir.path(), 25);

        let outcome = orch.run("q", CancellationToken::new()).await;
        assert!(outcome.is_done());
        let msgs = orch.transcript().messages();
        let id = &msgs[2].tool_calls[0].id;
        assert!(id.starts_with("call_"));
        assert_eq!(msgs[3].tool_call_id.as_deref(), Some(id.as_str()));
        assert!(orch.session().is_some());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_step() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(MockBackend::echo(), dir.path(), 25);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = orch.run("q", cancel).await;
        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert_eq!(outcome.steps, 0);
        // 已写入的用户消息保留
        assert_eq!(orch.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_reset_keeps_system_and_new_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(MockBackend::echo(), dir.path(), 25);
        let first = orch.start_session(None).unwrap();
        orch.run("q", CancellationToken::new()).await;

        orch.reset();
        assert_eq!(orch.transcript().len(), 1);
        assert!(orch.session().is_none());
        let second = orch.start_session(None).unwrap();
        assert_ne!(first.id, second.id);
    }
}
