//! 编排过程事件：每次状态迁移一条，发送时机紧跟对应的对话记录修改

use serde::Serialize;
use serde_json::Value;

use crate::react::RunStatus;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// 用户消息已写入对话
    Start { query: String },
    /// 后端回复已写入对话（content 可为空）
    Thinking {
        step: usize,
        max_steps: usize,
        content: String,
    },
    /// 发起一次工具调用
    ToolCall { id: String, tool: String, args: String },
    /// 工具成功结果已写入对话
    ToolResult { id: String, tool: String, payload: Value },
    /// 工具失败结果已写入对话
    ToolError { id: String, tool: String, message: String },
    /// 运行结束（完成 / 步数上限 / 取消）
    Complete {
        answer: String,
        status: RunStatus,
        steps: usize,
    },
    /// 推理后端失败，本次运行终止
    Error { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let v = serde_json::to_value(RunEvent::ToolError {
            id: "call_1".into(),
            tool: "omics_dea".into(),
            message: "boom".into(),
        })
        .unwrap();
        assert_eq!(v["type"], "tool_error");
        assert_eq!(v["tool"], "omics_dea");

        let v = serde_json::to_value(RunEvent::Complete {
            answer: "Done".into(),
            status: RunStatus::StepLimitReached,
            steps: 3,
        })
        .unwrap();
        assert_eq!(v["type"], "complete");
        assert_eq!(v["status"], "step_limit_reached");
    }
}
