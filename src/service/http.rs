//! Assistants 风格 REST API 客户端
//!
//! 基于 reqwest：所有请求带认证头与可选 `api-version` 查询参数；
//! 404 映射为 ServiceError::NotFound（AgentRegistry 据此自愈过期的 Agent ID），其它非 2xx 映射为 Http。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ServiceSection;
use crate::service::types::MessageList;
use crate::service::{
    AgentRecord, AgentService, CreateAgentRequest, Credential, RunRecord, ServiceConnector,
    ServiceError, ThreadMessage, ThreadRecord, ToolOutput,
};

/// 一条 HTTP 连接：持有 reqwest Client 与共享凭据
pub struct HttpAgentService {
    client: Client,
    endpoint: String,
    api_version: Option<String>,
    credential: Arc<Credential>,
    closed: AtomicBool,
}

impl HttpAgentService {
    pub fn new(
        client: Client,
        endpoint: &str,
        api_version: Option<String>,
        credential: Arc<Credential>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_version,
            credential,
            closed: AtomicBool::new(false),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ServiceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ServiceError::Closed);
        }
        let mut req = self
            .client
            .request(method, self.url(path))
            .header("OpenAI-Beta", "assistants=v2");
        if let Some(version) = &self.api_version {
            req = req.query(&[("api-version", version.as_str())]);
        }
        Ok(self.credential.apply(req))
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ServiceError> {
        let resp = req
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(if status == StatusCode::NOT_FOUND {
                ServiceError::NotFound(body)
            } else {
                ServiceError::Http {
                    status: status.as_u16(),
                    body,
                }
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl AgentService for HttpAgentService {
    async fn get_agent(&self, agent_id: &str) -> Result<AgentRecord, ServiceError> {
        let req = self.request(Method::GET, &format!("assistants/{agent_id}"))?;
        self.send(req).await
    }

    async fn create_agent(&self, request: &CreateAgentRequest) -> Result<AgentRecord, ServiceError> {
        let req = self.request(Method::POST, "assistants")?.json(&request.to_json());
        self.send(req).await
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<(), ServiceError> {
        let req = self.request(Method::DELETE, &format!("assistants/{agent_id}"))?;
        let _: Value = self.send(req).await?;
        Ok(())
    }

    async fn create_thread(&self) -> Result<ThreadRecord, ServiceError> {
        let req = self
            .request(Method::POST, "threads")?
            .json(&serde_json::json!({}));
        self.send(req).await
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<ThreadMessage, ServiceError> {
        let req = self
            .request(Method::POST, &format!("threads/{thread_id}/messages"))?
            .json(&serde_json::json!({ "role": "user", "content": content }));
        self.send(req).await
    }

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<RunRecord, ServiceError> {
        let req = self
            .request(Method::POST, &format!("threads/{thread_id}/runs"))?
            .json(&serde_json::json!({ "assistant_id": agent_id }));
        self.send(req).await
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunRecord, ServiceError> {
        let req = self.request(Method::GET, &format!("threads/{thread_id}/runs/{run_id}"))?;
        self.send(req).await
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<RunRecord, ServiceError> {
        let req = self.request(
            Method::POST,
            &format!("threads/{thread_id}/runs/{run_id}/cancel"),
        )?;
        self.send(req).await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunRecord, ServiceError> {
        let req = self
            .request(
                Method::POST,
                &format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            )?
            .json(&serde_json::json!({ "tool_outputs": outputs }));
        self.send(req).await
    }

    async fn latest_message(&self, thread_id: &str) -> Result<Option<ThreadMessage>, ServiceError> {
        let req = self
            .request(Method::GET, &format!("threads/{thread_id}/messages"))?
            .query(&[("order", "desc"), ("limit", "1")]);
        let list: MessageList = self.send(req).await?;
        Ok(list.data.into_iter().next())
    }

    async fn close(&self) -> Result<(), ServiceError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(ServiceError::Closed);
        }
        Ok(())
    }
}

/// 按 [service] 配置打开 HTTP 连接
pub struct HttpConnector {
    endpoint: String,
    api_version: Option<String>,
    request_timeout: Duration,
}

impl HttpConnector {
    pub fn from_config(section: &ServiceSection) -> Self {
        Self {
            endpoint: section.endpoint.clone(),
            api_version: section.api_version.clone().filter(|v| !v.is_empty()),
            request_timeout: Duration::from_secs(section.request_timeout_secs),
        }
    }
}

#[async_trait]
impl ServiceConnector for HttpConnector {
    async fn connect(&self, credential: Arc<Credential>) -> Result<Arc<dyn AgentService>, ServiceError> {
        let client = Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        tracing::debug!(endpoint = %self.endpoint, "Opened agent service connection");
        Ok(Arc::new(HttpAgentService::new(
            client,
            &self.endpoint,
            self.api_version.clone(),
            credential,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> HttpAgentService {
        HttpAgentService::new(
            Client::new(),
            "https://agents.example.com/api/",
            Some("2024-12-01-preview".to_string()),
            Arc::new(Credential::ApiKey("k".into())),
        )
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let svc = service();
        assert_eq!(
            svc.url("/threads/t1/runs"),
            "https://agents.example.com/api/threads/t1/runs"
        );
    }

    #[test]
    fn test_request_carries_api_version_and_key() {
        let svc = service();
        let req = svc.request(Method::GET, "assistants/a1").unwrap().build().unwrap();
        assert_eq!(req.url().query(), Some("api-version=2024-12-01-preview"));
        assert_eq!(req.headers().get("api-key").unwrap(), "k");
    }

    #[tokio::test]
    async fn test_closed_service_rejects_requests() {
        let svc = service();
        svc.close().await.unwrap();
        assert!(matches!(svc.get_agent("a1").await, Err(ServiceError::Closed)));
        assert!(matches!(svc.close().await, Err(ServiceError::Closed)));
    }
}
