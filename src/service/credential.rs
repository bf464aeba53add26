//! 服务凭据
//!
//! 进程启动时构建一个 CredentialProvider 并注入各会话；首次 get 解析凭据后缓存到进程结束，
//! 之后所有连接共享同一个只读 `Arc<Credential>`。

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::config::ServiceSection;
use crate::core::AssistantError;

/// 未在配置中提供 api_key 时读取的环境变量
pub const API_KEY_ENV: &str = "AGENT_SERVICE_API_KEY";

/// 认证方式：`api-key` 请求头或 `Authorization: Bearer`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    #[default]
    ApiKey,
    Bearer,
}

/// 不透明的身份凭据；Debug 输出不含密钥
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    Bearer(String),
}

impl Credential {
    pub fn new(scheme: AuthScheme, secret: impl Into<String>) -> Self {
        match scheme {
            AuthScheme::ApiKey => Credential::ApiKey(secret.into()),
            AuthScheme::Bearer => Credential::Bearer(secret.into()),
        }
    }

    /// 给请求加上认证头
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Credential::ApiKey(key) => request.header("api-key", key),
            Credential::Bearer(token) => request.bearer_auth(token),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ApiKey(_) => f.write_str("Credential::ApiKey(***)"),
            Credential::Bearer(_) => f.write_str("Credential::Bearer(***)"),
        }
    }
}

enum CredentialSource {
    Fixed(Credential),
    Configured {
        scheme: AuthScheme,
        api_key: Option<String>,
    },
}

/// 凭据提供者：解析一次，缓存到进程结束
pub struct CredentialProvider {
    source: CredentialSource,
    cached: OnceCell<Arc<Credential>>,
}

impl CredentialProvider {
    /// 从 [service] 配置构建；api_key 为空时回退到环境变量 AGENT_SERVICE_API_KEY
    pub fn from_config(section: &ServiceSection) -> Self {
        Self {
            source: CredentialSource::Configured {
                scheme: section.auth,
                api_key: section.api_key.clone(),
            },
            cached: OnceCell::new(),
        }
    }

    /// 直接使用给定凭据（测试与嵌入场景）
    pub fn fixed(credential: Credential) -> Self {
        Self {
            source: CredentialSource::Fixed(credential),
            cached: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<Arc<Credential>, AssistantError> {
        self.cached
            .get_or_try_init(|| async { self.resolve().map(Arc::new) })
            .await
            .cloned()
    }

    fn resolve(&self) -> Result<Credential, AssistantError> {
        match &self.source {
            CredentialSource::Fixed(credential) => Ok(credential.clone()),
            CredentialSource::Configured { scheme, api_key } => {
                let secret = api_key
                    .clone()
                    .filter(|k| !k.trim().is_empty())
                    .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()))
                    .ok_or_else(|| {
                        AssistantError::Credential(format!(
                            "no api key configured ([service].api_key or {API_KEY_ENV})"
                        ))
                    })?;
                tracing::debug!(scheme = ?scheme, "Resolved service credential");
                Ok(Credential::new(*scheme, secret))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_credential_is_cached() {
        let section = ServiceSection {
            api_key: Some("secret-1".to_string()),
            auth: AuthScheme::Bearer,
            ..ServiceSection::default()
        };
        let provider = CredentialProvider::from_config(&section);
        let first = provider.get().await.unwrap();
        let second = provider.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, Credential::Bearer("secret-1".to_string()));
    }

    #[test]
    fn test_debug_hides_secret() {
        let c = Credential::ApiKey("top-secret".to_string());
        assert!(!format!("{c:?}").contains("top-secret"));
    }

    #[tokio::test]
    async fn test_fixed_credential() {
        let provider = CredentialProvider::fixed(Credential::ApiKey("k".into()));
        assert_eq!(*provider.get().await.unwrap(), Credential::ApiKey("k".into()));
    }
}
