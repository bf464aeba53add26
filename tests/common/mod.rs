//! 集成测试共用的装配代码

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use stockdesk::agent::{AgentIdStore, AgentProfile, AgentRegistry};
use stockdesk::core::{RunOrchestrator, RunSettings, SessionDeps};
use stockdesk::service::{
    AuthScheme, Credential, CredentialProvider, MockAgentService, MockConnector,
};
use stockdesk::tools::{FailedCallPolicy, Tool, ToolDispatcher, ToolRegistry};

/// 返回固定报价的工具
pub struct FakeQuote;

#[async_trait]
impl Tool for FakeQuote {
    fn name(&self) -> &str {
        "get_quote"
    }

    fn description(&self) -> &str {
        "fixed quote"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let symbols = args["symbols"].as_str().ok_or("missing symbols")?;
        Ok(format!(r#"{{"symbol":"{symbols}","price":420.5}}"#))
    }
}

/// 总是失败的工具
pub struct Exploding;

#[async_trait]
impl Tool for Exploding {
    fn name(&self) -> &str {
        "get_news"
    }

    fn description(&self) -> &str {
        "always fails"
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        Err("news feed down".to_string())
    }
}

pub fn profile() -> AgentProfile {
    AgentProfile {
        model: "gpt-4o-mini".to_string(),
        name: "Nasdaq Stock Assistant".to_string(),
        instructions: "You support people to get information or news about Nasdaq Stocks."
            .to_string(),
    }
}

pub fn tools() -> Arc<ToolRegistry> {
    let mut tools = ToolRegistry::new();
    tools.register(FakeQuote);
    tools.register(Exploding);
    Arc::new(tools)
}

pub fn orchestrator(
    tools: Arc<ToolRegistry>,
    policy: FailedCallPolicy,
    timeout_secs: u64,
    poll_secs: u64,
) -> RunOrchestrator {
    RunOrchestrator::new(
        ToolDispatcher::new(tools, 5, policy),
        RunSettings {
            timeout: Duration::from_secs(timeout_secs),
            poll_interval: Duration::from_secs(poll_secs),
        },
    )
}

pub fn credentials() -> Arc<CredentialProvider> {
    Arc::new(CredentialProvider::fixed(Credential::new(
        AuthScheme::ApiKey,
        "test-key",
    )))
}

/// 基于共享 Mock 服务装配完整的会话依赖
pub fn deps(
    service: Arc<MockAgentService>,
    store: Arc<dyn AgentIdStore>,
) -> (Arc<SessionDeps>, Arc<MockConnector>) {
    let connector = Arc::new(MockConnector::new(service));
    let tools = tools();
    let deps = SessionDeps {
        credentials: credentials(),
        connector: connector.clone(),
        agents: Arc::new(AgentRegistry::new(profile(), store)),
        tools: tools.clone(),
        orchestrator: Arc::new(orchestrator(tools, FailedCallPolicy::Report, 60, 2)),
    };
    (Arc::new(deps), connector)
}
