//! 会话管理：为一次对话的产物颁发作用域 ID
//!
//! 会话 ID 可显式指定，否则按时间戳生成（`%Y%m%d_%H%M%S`）；首次需要时创建并建立
//! `<results_root>/<id>/` 产物目录，运行期间保持不变。`reset` 之后下一次访问会得到新 ID，
//! 不相关对话的产物不会被静默合并，除非调用方刻意复用同一 ID。
//!
//! SessionManager 以句柄形式显式传入每次调用，不存在进程级全局「当前会话」。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::AgentError;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// 已建立的会话：ID 与产物目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub dir: PathBuf,
}

#[derive(Debug, Default)]
struct SessionState {
    current: Option<Session>,
    /// 上一次颁发的 ID，用于保证 reset 后必然得到不同的时间戳 ID
    last_issued: Option<String>,
}

/// 会话管理器：一个对话一个实例，不应被多个并发对话共享修改
#[derive(Debug)]
pub struct SessionManager {
    results_root: PathBuf,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(results_root: impl AsRef<Path>) -> Self {
        Self {
            results_root: results_root.as_ref().to_path_buf(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn results_root(&self) -> &Path {
        &self.results_root
    }

    /// 建立会话：显式 ID 优先，否则按时间戳生成；会替换当前会话
    pub fn start(&self, id: Option<&str>) -> Result<Session, AgentError> {
        let mut state = self.lock();
        let session = match id {
            Some(explicit) => {
                validate_id(explicit)?;
                self.establish(explicit.to_string())?
            }
            None => self.claim_timestamp_id(state.last_issued.as_deref())?,
        };
        state.last_issued = Some(session.id.clone());
        state.current = Some(session.clone());
        Ok(session)
    }

    /// 当前会话；尚未建立时惰性创建（时间戳 ID），之后的调用复用同一会话
    pub fn current(&self) -> Result<Session, AgentError> {
        {
            let state = self.lock();
            if let Some(session) = &state.current {
                return Ok(session.clone());
            }
        }
        self.start(None)
    }

    /// 当前会话（不创建）
    pub fn peek(&self) -> Option<Session> {
        self.lock().current.clone()
    }

    /// 清除当前会话，下一次访问时创建新 ID
    pub fn reset(&self) {
        let mut state = self.lock();
        if let Some(old) = state.current.take() {
            tracing::info!(session = %old.id, "session reset");
        }
    }

    /// 显式 ID：目录已存在即刻意复用
    fn establish(&self, id: String) -> Result<Session, AgentError> {
        let dir = self.results_root.join(&id);
        std::fs::create_dir_all(&dir).map_err(|e| {
            AgentError::Session(format!("cannot create {}: {}", dir.display(), e))
        })?;
        tracing::info!(session = %id, dir = %dir.display(), "session established");
        Ok(Session { id, dir })
    }

    /// 时间戳 ID：以 create_dir 原子占用目录，已存在（或等于上一次颁发的 ID）则加 `_<n>` 后缀重试
    fn claim_timestamp_id(&self, last_issued: Option<&str>) -> Result<Session, AgentError> {
        std::fs::create_dir_all(&self.results_root).map_err(|e| {
            AgentError::Session(format!(
                "cannot create {}: {}",
                self.results_root.display(),
                e
            ))
        })?;

        let base = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        let mut n = 1;
        loop {
            let id = if n == 1 {
                base.clone()
            } else {
                format!("{}_{}", base, n)
            };
            n += 1;
            if last_issued == Some(id.as_str()) {
                continue;
            }
            let dir = self.results_root.join(&id);
            match std::fs::create_dir(&dir) {
                Ok(()) => {
                    tracing::info!(session = %id, dir = %dir.display(), "session established");
                    return Ok(Session { id, dir });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(AgentError::Session(format!(
                        "cannot create {}: {}",
                        dir.display(),
                        e
                    )))
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 显式 ID 会成为目录名，不允许路径分隔符与 `..`
fn validate_id(id: &str) -> Result<(), AgentError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(AgentError::Session("session id is empty".to_string()));
    }
    if trimmed != id || id.contains(['/', '\\']) || id == "." || id == ".." {
        return Err(AgentError::Session(format!("invalid session id: {:?}", id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Barrier;

    #[test]
    fn test_lazy_session_is_stable() {
        let root = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(root.path());
        assert!(manager.peek().is_none());

        let first = manager.current().unwrap();
        let second = manager.current().unwrap();
        assert_eq!(first, second);
        assert!(first.dir.is_dir());
        assert!(first.dir.starts_with(root.path()));
    }

    #[test]
    fn test_reset_yields_new_id() {
        let root = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(root.path());

        let first = manager.current().unwrap();
        manager.reset();
        assert!(manager.peek().is_none());
        let second = manager.current().unwrap();
        manager.reset();
        let third = manager.current().unwrap();

        assert_ne!(first.id, second.id);
        assert_ne!(second.id, third.id);
        assert_ne!(first.dir, second.dir);
    }

    #[test]
    fn test_explicit_override() {
        let root = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(root.path());

        let session = manager.start(Some("analysis_42")).unwrap();
        assert_eq!(session.id, "analysis_42");
        assert_eq!(manager.current().unwrap().id, "analysis_42");

        // 刻意复用同一 ID 是允许的
        manager.reset();
        let again = manager.start(Some("analysis_42")).unwrap();
        assert_eq!(again.dir, session.dir);
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let root = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(root.path());
        assert!(manager.start(Some("")).is_err());
        assert!(manager.start(Some("../escape")).is_err());
        assert!(manager.start(Some("a/b")).is_err());
        assert!(manager.start(Some(" padded")).is_err());
    }

    #[test]
    fn test_distinct_managers_disjoint_dirs() {
        let root = tempfile::tempdir().unwrap();
        let a = SessionManager::new(root.path());
        let b = SessionManager::new(root.path());
        let sa = a.current().unwrap();
        let sb = b.current().unwrap();
        assert_ne!(sa.dir, sb.dir);
    }

    #[test]
    fn test_concurrent_managers_never_share_an_id() {
        const CONVERSATIONS: usize = 8;
        let root = tempfile::tempdir().unwrap();

        for _ in 0..10 {
            let barrier = &Barrier::new(CONVERSATIONS);
            let root = root.path();
            let sessions: Vec<Session> = std::thread::scope(|s| {
                let handles: Vec<_> = (0..CONVERSATIONS)
                    .map(|_| {
                        s.spawn(move || {
                            let manager = SessionManager::new(root);
                            barrier.wait();
                            manager.current().unwrap()
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let ids: HashSet<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
            assert_eq!(ids.len(), CONVERSATIONS);
            assert!(sessions.iter().all(|s| s.dir.is_dir()));
        }
    }
}
