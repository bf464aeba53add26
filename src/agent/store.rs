//! Agent ID 持久化
//!
//! 唯一跨进程存活的状态是 `{agent_id}` 一条记录。文件实现先写 `<file>.tmp` 再 rename 覆盖，
//! 崩溃时要么是旧内容要么是新内容，不会留下半截 JSON。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Corrupt agent record: {0}")]
    Corrupt(String),
}

/// 持久化的记录；created_at 仅供排查，读取时只关心 agent_id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentIdRecord {
    pub agent_id: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Agent ID 存储：缺失是合法的「从未创建」状态
#[async_trait]
pub trait AgentIdStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>, StoreError>;

    async fn save(&self, agent_id: &str) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}

/// 单文件 JSON 存储
#[derive(Debug)]
pub struct FileAgentIdStore {
    path: PathBuf,
}

impl FileAgentIdStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "agent".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl AgentIdStore for FileAgentIdStore {
    async fn load(&self) -> Result<Option<String>, StoreError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(format!("{}: {e}", self.path.display()))),
        };
        let record: AgentIdRecord = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.path.display())))?;
        let id = record.agent_id.trim().to_string();
        Ok((!id.is_empty()).then_some(id))
    }

    async fn save(&self, agent_id: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Io(format!("{}: {e}", parent.display())))?;
        }
        let record = AgentIdRecord {
            agent_id: agent_id.to_string(),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        let raw = serde_json::to_vec_pretty(&record)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let tmp = self.tmp_path();
        let io_err = |e: std::io::Error| StoreError::Io(format!("{}: {e}", tmp.display()));
        let mut file = fs::File::create(&tmp).await.map_err(io_err)?;
        file.write_all(&raw).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Io(format!("rename {} failed: {e}", self.path.display())))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(format!("{}: {e}", self.path.display()))),
        }
    }
}

/// 内存存储（测试，或不需要跨进程复用 Agent 的部署）
#[derive(Debug, Default)]
pub struct MemoryAgentIdStore {
    slot: Mutex<Option<String>>,
}

impl MemoryAgentIdStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(agent_id: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(agent_id.into())),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl AgentIdStore for MemoryAgentIdStore {
    async fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.slot().clone())
    }

    async fn save(&self, agent_id: &str) -> Result<(), StoreError> {
        *self.slot() = Some(agent_id.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.slot() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = FileAgentIdStore::new(dir.path().join("agent.json"));
        assert_eq!(store.load().await.unwrap(), None);
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_save_overwrites_and_leaves_no_tmp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("agent.json");
        let store = FileAgentIdStore::new(&path);

        store.save("asst_old").await.unwrap();
        store.save("asst_new").await.unwrap();

        assert_eq!(store.load().await.unwrap().as_deref(), Some("asst_new"));
        assert!(!dir.path().join("state").join("agent.json.tmp").exists());

        let reopened = FileAgentIdStore::new(&path);
        assert_eq!(reopened.load().await.unwrap().as_deref(), Some("asst_new"));

        store.clear().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.json");
        std::fs::write(&path, "{\"agent_id\": ").unwrap();
        let store = FileAgentIdStore::new(&path);
        assert!(matches!(store.load().await, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_blank_id_is_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.json");
        std::fs::write(&path, r#"{"agent_id": "  "}"#).unwrap();
        let store = FileAgentIdStore::new(&path);
        assert_eq!(store.load().await.unwrap(), None);
    }
}
