//! Agent 供给集成测试：并发复用、跨进程持久化、失效 ID 自愈

mod common;

use std::sync::Arc;
use std::time::Duration;

use stockdesk::agent::{AgentIdStore, AgentRegistry, FileAgentIdStore, MemoryAgentIdStore};
use stockdesk::service::{AgentService, MockAgentService};

#[tokio::test(start_paused = true)]
async fn test_concurrent_sessions_create_one_agent() {
    let service = Arc::new(MockAgentService::new().with_create_delay(Duration::from_millis(500)));
    let registry = Arc::new(AgentRegistry::new(
        common::profile(),
        Arc::new(MemoryAgentIdStore::new()),
    ));
    let tools = common::tools();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        let registry = registry.clone();
        let tools = tools.clone();
        handles.push(tokio::spawn(async move {
            registry
                .resolve_or_create(service.as_ref(), &tools)
                .await
                .map(|agent| agent.id)
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(service.calls().create_agent, 1);
    assert_eq!(service.agent_count(), 1);
    assert!(ids.iter().all(|id| id == &ids[0]));
}

#[tokio::test]
async fn test_persisted_id_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("agent.json");
    let service = MockAgentService::new();
    let tools = common::tools();

    let first = AgentRegistry::new(common::profile(), Arc::new(FileAgentIdStore::new(&path)));
    let created = first.resolve_or_create(&service, &tools).await.unwrap();
    assert!(path.exists());

    // 新进程：新的注册表，同一个文件
    let second = AgentRegistry::new(common::profile(), Arc::new(FileAgentIdStore::new(&path)));
    let reused = second.resolve_or_create(&service, &tools).await.unwrap();

    assert_eq!(reused.id, created.id);
    assert_eq!(service.calls().create_agent, 1);
    assert_eq!(service.calls().get_agent, 1);
}

#[tokio::test]
async fn test_stale_id_is_replaced_and_persisted() {
    let service = MockAgentService::new();
    let store = Arc::new(MemoryAgentIdStore::with_id("asst_expired"));
    let registry = AgentRegistry::new(common::profile(), store.clone());

    let agent = registry
        .resolve_or_create(&service, &common::tools())
        .await
        .unwrap();

    assert_ne!(agent.id, "asst_expired");
    assert_eq!(store.load().await.unwrap(), Some(agent.id.clone()));
    assert_eq!(service.calls().create_agent, 1);
    assert!(service.get_agent(&agent.id).await.is_ok());
}

#[tokio::test]
async fn test_agent_deleted_remotely_mid_process_is_recreated() {
    let service = MockAgentService::new();
    let registry = AgentRegistry::new(common::profile(), Arc::new(MemoryAgentIdStore::new()));
    let tools = common::tools();

    let first = registry.resolve_or_create(&service, &tools).await.unwrap();
    service.remove_agent(&first.id);
    let second = registry.resolve_or_create(&service, &tools).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(registry.current_id().await, Some(second.id));
    assert_eq!(service.calls().create_agent, 2);
}

#[tokio::test]
async fn test_corrupt_state_file_falls_back_to_create() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.json");
    std::fs::write(&path, "{ not json").unwrap();
    let service = MockAgentService::new();
    let registry = AgentRegistry::new(common::profile(), Arc::new(FileAgentIdStore::new(&path)));

    let agent = registry
        .resolve_or_create(&service, &common::tools())
        .await
        .unwrap();

    let saved = FileAgentIdStore::new(&path).load().await.unwrap();
    assert_eq!(saved, Some(agent.id));
}
