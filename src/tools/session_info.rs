//! 内置工具：返回当前会话 ID 与产物目录

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::Session;
use crate::tools::Tool;

pub struct SessionInfoTool;

#[async_trait]
impl Tool for SessionInfoTool {
    fn name(&self) -> &str {
        "session_info"
    }

    fn description(&self) -> &str {
        "Return the current analysis session id and the directory where tools write their artifacts."
    }

    async fn execute(&self, _args: Value, session: &Session) -> Result<Value, String> {
        Ok(json!({
            "status": "success",
            "data": {
                "session_id": session.id,
                "artifact_dir": session.dir.to_string_lossy(),
            }
        }))
    }
}
