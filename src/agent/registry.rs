//! Agent 注册表：复用或创建远端 Agent
//!
//! 整个「读取持久化 ID → 远端校验 → 必要时创建 → 持久化」序列在一把进程级互斥锁内完成，
//! 多个会话同时启动也只会创建一个 Agent。锁内同时缓存最近一次解析出的 ID，
//! 因此即使持久化写入失败，同一进程内也不会重复创建。

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::AgentSection;
use crate::core::AssistantError;
use crate::service::{AgentRecord, AgentService, CreateAgentRequest};
use crate::tools::ToolRegistry;

use super::store::AgentIdStore;

/// 新建 Agent 时使用的固定定义
#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    pub model: String,
    pub name: String,
    pub instructions: String,
}

impl AgentProfile {
    pub fn from_config(section: &AgentSection) -> Self {
        Self {
            model: section.model.clone(),
            name: section.name.clone(),
            instructions: section.instructions.clone(),
        }
    }
}

/// 进程级共享，经 Arc 注入每个会话
pub struct AgentRegistry {
    profile: AgentProfile,
    store: Arc<dyn AgentIdStore>,
    /// 最近一次解析出的 Agent ID；锁本身串行化 check-then-create
    known_id: Mutex<Option<String>>,
}

impl AgentRegistry {
    pub fn new(profile: AgentProfile, store: Arc<dyn AgentIdStore>) -> Self {
        Self {
            profile,
            store,
            known_id: Mutex::new(None),
        }
    }

    /// 复用已持久化的 Agent，不存在或已失效时创建新的。
    ///
    /// 持久化读写失败只记日志（退化为「总是新建」）；远端创建失败返回 Provisioning 错误。
    pub async fn resolve_or_create(
        &self,
        service: &dyn AgentService,
        tools: &ToolRegistry,
    ) -> Result<AgentRecord, AssistantError> {
        let mut known = self.known_id.lock().await;

        let candidate = match known.clone() {
            Some(id) => Some(id),
            None => self.load_persisted().await,
        };

        if let Some(id) = candidate {
            match service.get_agent(&id).await {
                Ok(agent) => {
                    tracing::info!(agent_id = %agent.id, "Using existing agent");
                    *known = Some(agent.id.clone());
                    return Ok(agent);
                }
                Err(e) => {
                    tracing::warn!(agent_id = %id, "Failed to get existing agent: {}. Will create new one.", e);
                    *known = None;
                }
            }
        }

        let request = CreateAgentRequest {
            model: self.profile.model.clone(),
            name: self.profile.name.clone(),
            instructions: self.profile.instructions.clone(),
            tools: tools.definitions(),
        };
        let agent = service
            .create_agent(&request)
            .await
            .map_err(AssistantError::Provisioning)?;
        tracing::info!(agent_id = %agent.id, tools = request.tools.len(), "Created new agent");

        if let Err(e) = self.store.save(&agent.id).await {
            tracing::warn!(agent_id = %agent.id, "Failed to persist agent id: {}", e);
        }
        *known = Some(agent.id.clone());
        Ok(agent)
    }

    /// 当前已知的 Agent ID（内存优先，其次持久化记录）
    pub async fn current_id(&self) -> Option<String> {
        let known = self.known_id.lock().await;
        match known.clone() {
            Some(id) => Some(id),
            None => self.load_persisted().await,
        }
    }

    /// 删除远端 Agent 并清除本地记录（进程关闭时调用）。
    ///
    /// 远端删除成功或 Agent 已不存在时清除记录；其它失败保留记录以便下次复用。
    /// 返回是否确有 Agent 被处理。
    pub async fn forget(&self, service: &dyn AgentService) -> Result<bool, AssistantError> {
        let mut known = self.known_id.lock().await;
        let id = match known.clone() {
            Some(id) => id,
            None => match self.load_persisted().await {
                Some(id) => id,
                None => return Ok(false),
            },
        };

        match service.delete_agent(&id).await {
            Ok(()) => tracing::info!(agent_id = %id, "Deleted agent"),
            Err(e) if e.is_not_found() => {
                tracing::info!(agent_id = %id, "Agent already gone remotely")
            }
            Err(e) => return Err(AssistantError::Service(e)),
        }

        *known = None;
        if let Err(e) = self.store.clear().await {
            tracing::warn!(agent_id = %id, "Failed to clear persisted agent id: {}", e);
        }
        Ok(true)
    }

    async fn load_persisted(&self) -> Option<String> {
        match self.store.load().await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("Failed to read persisted agent id: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::store::{MemoryAgentIdStore, StoreError};
    use crate::service::MockAgentService;
    use async_trait::async_trait;

    fn profile() -> AgentProfile {
        AgentProfile {
            model: "gpt-4o-mini".into(),
            name: "Nasdaq Stock Assistant".into(),
            instructions: "help".into(),
        }
    }

    /// 读写都失败的存储
    struct BrokenStore;

    #[async_trait]
    impl AgentIdStore for BrokenStore {
        async fn load(&self) -> Result<Option<String>, StoreError> {
            Err(StoreError::Io("disk gone".into()))
        }
        async fn save(&self, _agent_id: &str) -> Result<(), StoreError> {
            Err(StoreError::Io("disk gone".into()))
        }
        async fn clear(&self) -> Result<(), StoreError> {
            Err(StoreError::Io("disk gone".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failures_do_not_abort_provisioning() {
        let service = MockAgentService::new();
        let registry = AgentRegistry::new(profile(), Arc::new(BrokenStore));
        let tools = ToolRegistry::new();

        let first = registry.resolve_or_create(&service, &tools).await.unwrap();
        let second = registry.resolve_or_create(&service, &tools).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(service.calls().create_agent, 1);
    }

    #[tokio::test]
    async fn test_create_failure_propagates() {
        let service = MockAgentService::new();
        service.set_fail_create_agent(true);
        let store = Arc::new(MemoryAgentIdStore::new());
        let registry = AgentRegistry::new(profile(), store.clone());

        let err = registry
            .resolve_or_create(&service, &ToolRegistry::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::Provisioning(_)));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_agent_uses_profile_and_tool_definitions() {
        let service = MockAgentService::new();
        let registry = AgentRegistry::new(profile(), Arc::new(MemoryAgentIdStore::new()));
        let mut tools = ToolRegistry::new();
        tools.register(crate::tools::registry::tests::StaticTool::new("get_quote", "42"));

        let agent = registry.resolve_or_create(&service, &tools).await.unwrap();
        assert_eq!(agent.name, "Nasdaq Stock Assistant");
        assert_eq!(agent.model, "gpt-4o-mini");
        assert_eq!(agent.tools.len(), 1);
        assert_eq!(agent.tools[0].name, "get_quote");
    }

    #[tokio::test]
    async fn test_forget_deletes_and_clears() {
        let service = MockAgentService::new();
        let store = Arc::new(MemoryAgentIdStore::new());
        let registry = AgentRegistry::new(profile(), store.clone());
        let agent = registry
            .resolve_or_create(&service, &ToolRegistry::new())
            .await
            .unwrap();

        assert!(registry.forget(&service).await.unwrap());
        assert!(!service.has_agent(&agent.id));
        assert_eq!(store.load().await.unwrap(), None);
        assert_eq!(registry.current_id().await, None);
        assert!(!registry.forget(&service).await.unwrap());
    }

    #[tokio::test]
    async fn test_forget_keeps_record_when_delete_fails() {
        let service = MockAgentService::new();
        let store = Arc::new(MemoryAgentIdStore::new());
        let registry = AgentRegistry::new(profile(), store.clone());
        let agent = registry
            .resolve_or_create(&service, &ToolRegistry::new())
            .await
            .unwrap();

        service.set_fail_delete(true);
        assert!(registry.forget(&service).await.is_err());
        assert_eq!(store.load().await.unwrap(), Some(agent.id));
    }
}
