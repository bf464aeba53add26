//! 远程 Agent 服务抽象
//!
//! AgentService 覆盖编排所需的全部远端操作；ServiceConnector 用凭据打开一条新连接。
//! HTTP 实现见 `service::http`，测试用脚本化实现见 `service::mock`。

use std::sync::Arc;

use async_trait::async_trait;

use crate::service::{
    AgentRecord, CreateAgentRequest, Credential, RunRecord, ServiceError, ThreadMessage,
    ThreadRecord, ToolOutput,
};

/// 一条到远端 Agent 服务的连接
#[async_trait]
pub trait AgentService: Send + Sync {
    async fn get_agent(&self, agent_id: &str) -> Result<AgentRecord, ServiceError>;

    async fn create_agent(&self, request: &CreateAgentRequest) -> Result<AgentRecord, ServiceError>;

    async fn delete_agent(&self, agent_id: &str) -> Result<(), ServiceError>;

    async fn create_thread(&self) -> Result<ThreadRecord, ServiceError>;

    /// 以 user 角色向线程追加一条消息
    async fn create_message(&self, thread_id: &str, content: &str) -> Result<ThreadMessage, ServiceError>;

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<RunRecord, ServiceError>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunRecord, ServiceError>;

    /// 请求取消；远端异步生效，返回时 Run 未必已停止
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<RunRecord, ServiceError>;

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunRecord, ServiceError>;

    /// 线程中最新的一条消息（按创建时间倒序取第一条）
    async fn latest_message(&self, thread_id: &str) -> Result<Option<ThreadMessage>, ServiceError>;

    /// 关闭连接；之后的调用返回 ServiceError::Closed
    async fn close(&self) -> Result<(), ServiceError>;
}

/// 连接工厂：会话初始化与进程关闭时各自打开连接
#[async_trait]
pub trait ServiceConnector: Send + Sync {
    async fn connect(&self, credential: Arc<Credential>) -> Result<Arc<dyn AgentService>, ServiceError>;
}
