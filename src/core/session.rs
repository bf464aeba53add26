//! 会话：一次对话的显式上下文
//!
//! 每个会话独占一条服务连接、一个线程，并引用进程级共享的 Agent。
//! initialize 幂等；任一步失败都会先 cleanup 再返回错误，会话回到「未初始化」状态可重试。
//! process_message 对外永远返回文本，不抛错。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent::AgentRegistry;
use crate::core::run::{RunOrchestrator, ERROR_REPLY};
use crate::core::AssistantError;
use crate::service::{AgentRecord, AgentService, CredentialProvider, ServiceConnector, ThreadRecord};
use crate::tools::ToolRegistry;

/// 进程启动时构建一次、所有会话共享的依赖
pub struct SessionDeps {
    pub credentials: Arc<CredentialProvider>,
    pub connector: Arc<dyn ServiceConnector>,
    pub agents: Arc<AgentRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub orchestrator: Arc<RunOrchestrator>,
}

/// 会话持有的远端句柄
#[derive(Default)]
pub struct SessionHandle {
    pub client: Option<Arc<dyn AgentService>>,
    pub agent: Option<AgentRecord>,
    pub thread: Option<ThreadRecord>,
    pub initialized: bool,
}

/// 一次对话会话；`&mut self` 保证同一会话上的消息串行处理
pub struct Session {
    id: String,
    deps: Arc<SessionDeps>,
    handle: SessionHandle,
}

impl Session {
    pub fn new(deps: Arc<SessionDeps>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            deps,
            handle: SessionHandle::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_initialized(&self) -> bool {
        self.handle.initialized
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.handle.agent.as_ref().map(|a| a.id.as_str())
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.handle.thread.as_ref().map(|t| t.id.as_str())
    }

    /// 初始化：凭据 → 连接 → 复用或创建 Agent → 新建线程。已初始化时直接返回
    pub async fn initialize(&mut self) -> Result<(), AssistantError> {
        if self.handle.initialized {
            tracing::debug!(session = %self.id, "Session already initialized, skipping");
            return Ok(());
        }
        match self.try_initialize().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(session = %self.id, "Initialization failed: {}", e);
                self.cleanup().await;
                Err(e)
            }
        }
    }

    async fn try_initialize(&mut self) -> Result<(), AssistantError> {
        let credential = self.deps.credentials.get().await?;
        let client = self
            .deps
            .connector
            .connect(credential)
            .await
            .map_err(AssistantError::Connect)?;
        self.handle.client = Some(client.clone());

        let agent = self
            .deps
            .agents
            .resolve_or_create(client.as_ref(), &self.deps.tools)
            .await?;
        self.handle.agent = Some(agent);

        let thread = client
            .create_thread()
            .await
            .map_err(AssistantError::Provisioning)?;
        tracing::info!(session = %self.id, thread_id = %thread.id, "Created thread");
        self.handle.thread = Some(thread);

        self.handle.initialized = true;
        Ok(())
    }

    /// 关闭连接（若已打开）并重置为未初始化；关闭失败只记日志
    pub async fn cleanup(&mut self) {
        if let Some(client) = self.handle.client.take() {
            match client.close().await {
                Ok(()) => tracing::info!(session = %self.id, "Closed service client for session"),
                Err(e) => tracing::error!(session = %self.id, "Error during session cleanup: {}", e),
            }
        }
        self.handle.agent = None;
        self.handle.thread = None;
        self.handle.initialized = false;
    }

    /// 处理一条用户消息，返回助手回复或描述失败的文本
    pub async fn process_message(&mut self, content: &str) -> String {
        self.process_message_until(content, &CancellationToken::new())
            .await
    }

    /// 同 process_message；`interrupt` 触发时取消进行中的 Run 后返回
    pub async fn process_message_until(
        &mut self,
        content: &str,
        interrupt: &CancellationToken,
    ) -> String {
        if let Err(e) = self.initialize().await {
            tracing::error!(session = %self.id, "Cannot process message: {}", e);
            return ERROR_REPLY.to_string();
        }

        let (Some(client), Some(agent), Some(thread)) = (
            self.handle.client.as_ref(),
            self.handle.agent.as_ref(),
            self.handle.thread.as_ref(),
        ) else {
            tracing::error!(session = %self.id, "Session marked initialized without handles");
            return ERROR_REPLY.to_string();
        };

        let outcome = self
            .deps
            .orchestrator
            .process_message_until(client.as_ref(), &thread.id, &agent.id, content, interrupt)
            .await;
        tracing::info!(session = %self.id, "Run {}", outcome);
        outcome.into_reply()
    }
}
