//! 核心层：错误分类与会话管理

pub mod error;
pub mod session;

pub use error::{AgentError, BindingError, InvocationError, LlmError, ManifestError};
pub use session::{Session, SessionManager};
