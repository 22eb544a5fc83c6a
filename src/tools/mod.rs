//! 工具层：调用结果、进程内工具注册表、技能进程调用器

pub mod invoker;
pub mod registry;
pub mod result;
pub mod session_info;

pub use invoker::{build_argv, InvokerConfig, ToolInvoker};
pub use registry::{Tool, ToolRegistry};
pub use result::{ToolCallResult, ToolStatus};
pub use session_info::SessionInfoTool;
