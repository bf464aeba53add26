//! 优雅关闭
//!
//! ShutdownManager 监听 Ctrl+C / SIGTERM，取消令牌并记录第一次的退出原因；
//! ShutdownCoordinator 在退出前逐个执行清理任务，每个任务有超时上限，失败只记日志。
//! AgentTeardown 是进程级清理：删除远端 Agent 并清除本地 ID 记录。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::agent::AgentRegistry;
use crate::core::Session;
use crate::service::{AgentService, CredentialProvider, ServiceConnector};

/// 退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C 或 `/quit`
    UserInitiated,
    /// SIGTERM
    Signal,
    /// stdin 结束
    InputClosed,
    /// 控制台读写出错
    ConsoleFailed,
}

/// 进程级退出信号：一个取消令牌加上第一次触发时的原因
#[derive(Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason: Arc<Mutex<Option<ShutdownReason>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 交给控制台等长循环的取消令牌
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发退出；只记录第一次的原因，重复触发无副作用
    pub fn shutdown(&self, reason: ShutdownReason) {
        let mut slot = self.reason.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_none() {
            *slot = Some(reason);
        }
        drop(slot);
        self.token.cancel();
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.reason.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 后台监听 Ctrl+C 与 SIGTERM，任一到达即触发退出
    pub fn install_signal_handlers(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            let reason = tokio::select! {
                _ = manager.token.cancelled() => return,
                _ = interrupt() => ShutdownReason::UserInitiated,
                _ = terminate() => ShutdownReason::Signal,
            };
            tracing::info!(?reason, "Received shutdown signal");
            manager.shutdown(reason);
        });
    }
}

async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// 退出前执行的一项清理
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn run(&self) -> anyhow::Result<()>;

    fn label(&self) -> &'static str;
}

/// 按注册顺序执行清理，每项有独立的超时；失败与超时只记日志
pub struct ShutdownCoordinator {
    tasks: Vec<Box<dyn ShutdownCleanup>>,
    per_task_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            per_task_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_task_timeout = timeout;
        self
    }

    pub fn register(&mut self, task: impl ShutdownCleanup + 'static) {
        self.tasks.push(Box::new(task));
    }

    /// 返回没有成功完成的清理项名称
    pub async fn run_cleanup(&self) -> Vec<&'static str> {
        let mut unfinished = Vec::new();
        for task in &self.tasks {
            let label = task.label();
            match tokio::time::timeout(self.per_task_timeout, task.run()).await {
                Ok(Ok(())) => tracing::info!(task = label, "Shutdown cleanup finished"),
                Ok(Err(e)) => {
                    tracing::error!(task = label, "Shutdown cleanup failed: {:#}", e);
                    unfinished.push(label);
                }
                Err(_) => {
                    tracing::warn!(
                        task = label,
                        timeout_ms = self.per_task_timeout.as_millis() as u64,
                        "Shutdown cleanup timed out"
                    );
                    unfinished.push(label);
                }
            }
        }
        unfinished
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// 进程退出收尾：关闭会话连接，再执行清理任务（如删除 Agent）。
///
/// 无论控制台以何种方式结束都应调用；返回没有成功完成的清理项名称。
pub async fn finish_session(
    session: &mut Session,
    coordinator: Option<ShutdownCoordinator>,
) -> Vec<&'static str> {
    session.cleanup().await;
    match coordinator {
        Some(coordinator) => coordinator.run_cleanup().await,
        None => Vec::new(),
    }
}

/// 进程退出时删除远端 Agent；没有可复用连接时临时打开一条，用完关闭
pub struct AgentTeardown {
    agents: Arc<AgentRegistry>,
    credentials: Arc<CredentialProvider>,
    connector: Arc<dyn ServiceConnector>,
    client: Option<Arc<dyn AgentService>>,
}

impl AgentTeardown {
    pub fn new(
        agents: Arc<AgentRegistry>,
        credentials: Arc<CredentialProvider>,
        connector: Arc<dyn ServiceConnector>,
    ) -> Self {
        Self {
            agents,
            credentials,
            connector,
            client: None,
        }
    }

    /// 复用一条仍然打开的连接
    pub fn with_client(mut self, client: Arc<dyn AgentService>) -> Self {
        self.client = Some(client);
        self
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for AgentTeardown {
    async fn run(&self) -> anyhow::Result<()> {
        if self.agents.current_id().await.is_none() {
            tracing::debug!("No agent to delete on shutdown");
            return Ok(());
        }

        let (client, temporary) = match &self.client {
            Some(client) => (client.clone(), false),
            None => {
                let credential = self.credentials.get().await?;
                (self.connector.connect(credential).await?, true)
            }
        };

        let result = self.agents.forget(client.as_ref()).await;

        if temporary {
            if let Err(e) = client.close().await {
                tracing::warn!("Failed to close temporary shutdown client: {}", e);
            }
        }

        result?;
        Ok(())
    }

    fn label(&self) -> &'static str {
        "agent_teardown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_first_reason_wins() {
        let manager = ShutdownManager::new();
        let token = manager.token();
        assert!(!manager.is_shutdown());
        assert_eq!(manager.reason(), None);

        manager.shutdown(ShutdownReason::InputClosed);
        manager.shutdown(ShutdownReason::Signal);

        assert!(token.is_cancelled());
        assert_eq!(manager.reason(), Some(ShutdownReason::InputClosed));
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl ShutdownCleanup for Counting {
        async fn run(&self) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn label(&self) -> &'static str {
            "counting"
        }
    }

    struct Stuck;

    #[async_trait::async_trait]
    impl ShutdownCleanup for Stuck {
        async fn run(&self) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }

        fn label(&self) -> &'static str {
            "stuck"
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl ShutdownCleanup for Failing {
        async fn run(&self) -> anyhow::Result<()> {
            anyhow::bail!("remote unavailable")
        }

        fn label(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_and_failing_tasks_do_not_block_the_rest() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut coordinator = ShutdownCoordinator::new().with_timeout(Duration::from_secs(1));
        coordinator.register(Stuck);
        coordinator.register(Failing);
        coordinator.register(Counting(runs.clone()));

        let unfinished = coordinator.run_cleanup().await;

        assert_eq!(unfinished, vec!["stuck", "failing"]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
