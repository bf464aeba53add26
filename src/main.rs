//! Stockdesk 入口：加载配置、初始化日志、装配依赖，运行控制台会话，退出时清理远端 Agent。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use stockdesk::agent::{AgentProfile, AgentRegistry, FileAgentIdStore};
use stockdesk::config::load_config;
use stockdesk::core::{
    finish_session, AgentTeardown, RunOrchestrator, RunSettings, Session, SessionDeps,
    ShutdownCoordinator, ShutdownManager, ShutdownReason,
};
use stockdesk::service::{CredentialProvider, HttpConnector, ServiceConnector};
use stockdesk::tools::{stock_registry, ToolDispatcher};
use stockdesk::{console, observability};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load configuration")?;
    observability::init(&cfg.app.log_level);

    // 凭据在启动时获取一次；拿不到就不启动
    let credentials = Arc::new(CredentialProvider::from_config(&cfg.service));
    credentials
        .get()
        .await
        .context("Failed to obtain service credential")?;

    let connector: Arc<dyn ServiceConnector> = Arc::new(HttpConnector::from_config(&cfg.service));
    let store = Arc::new(FileAgentIdStore::new(&cfg.agent.state_file));
    let agents = Arc::new(AgentRegistry::new(
        AgentProfile::from_config(&cfg.agent),
        store,
    ));

    let tools = Arc::new(stock_registry(&cfg.tools.stockdata)?);
    tracing::info!(tools = ?tools.tool_names(), "Registered tools");
    let dispatcher = ToolDispatcher::new(
        tools.clone(),
        cfg.tools.tool_timeout_secs,
        cfg.run.failed_call_policy,
    );
    let settings = RunSettings::from_config(&cfg.run)?;
    let orchestrator = Arc::new(RunOrchestrator::new(dispatcher, settings));

    let deps = Arc::new(SessionDeps {
        credentials: credentials.clone(),
        connector: connector.clone(),
        agents: agents.clone(),
        tools,
        orchestrator,
    });

    let shutdown = ShutdownManager::new();
    shutdown.install_signal_handlers();

    let mut session = Session::new(deps);
    if let Err(e) = session.initialize().await {
        // 首条消息时会重试
        tracing::warn!("Initial session setup failed: {}", e);
    }

    let console_result = console::run(
        &mut session,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown.token(),
    )
    .await;
    shutdown.shutdown(match &console_result {
        Ok(reason) => *reason,
        Err(_) => ShutdownReason::ConsoleFailed,
    });
    tracing::info!(reason = ?shutdown.reason(), "Shutting down");

    // 控制台出错时同样先收尾，再返回错误
    let coordinator = cfg.agent.delete_on_shutdown.then(|| {
        let mut coordinator = ShutdownCoordinator::new()
            .with_timeout(Duration::from_secs(cfg.agent.shutdown_timeout_secs));
        coordinator.register(AgentTeardown::new(agents, credentials, connector));
        coordinator
    });
    let unfinished = finish_session(&mut session, coordinator).await;
    if !unfinished.is_empty() {
        tracing::warn!(?unfinished, "Some shutdown cleanup did not complete");
    }

    console_result.context("Console I/O failed")?;
    Ok(())
}
