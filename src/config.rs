//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `STOCKDESK__*` 覆盖（双下划线表示嵌套，如 `STOCKDESK__RUN__TIMEOUT_SECS=90`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::service::AuthScheme;
use crate::tools::FailedCallPolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub service: ServiceSection,
    pub agent: AgentSection,
    pub run: RunSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名与日志级别（RUST_LOG 优先）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub log_level: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "stockdesk".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// [service] 段：远端 Agent 服务地址与认证
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    /// 服务根地址，如 https://<resource>.services.ai.azure.com/api/projects/<project>
    pub endpoint: String,
    /// 附加为 `api-version` 查询参数；为空则不带
    pub api_version: Option<String>,
    /// 未设置时读环境变量 AGENT_SERVICE_API_KEY
    pub api_key: Option<String>,
    pub auth: AuthScheme,
    pub request_timeout_secs: u64,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_version: None,
            api_key: None,
            auth: AuthScheme::default(),
            request_timeout_secs: 30,
        }
    }
}

/// [agent] 段：Agent 定义、ID 持久化文件与退出时是否删除
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub model: String,
    pub name: String,
    pub instructions: String,
    pub state_file: PathBuf,
    pub delete_on_shutdown: bool,
    pub shutdown_timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            name: "Nasdaq Stock Assistant".to_string(),
            instructions: "You support people to get information or news about Nasdaq Stocks."
                .to_string(),
            state_file: PathBuf::from("state/agent.json"),
            delete_on_shutdown: true,
            shutdown_timeout_secs: 5,
        }
    }
}

/// [run] 段：单条消息的超时、轮询间隔与失败工具调用的处理策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub failed_call_policy: FailedCallPolicy,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            poll_interval_ms: 2000,
            failed_call_policy: FailedCallPolicy::default(),
        }
    }
}

/// [tools] 段：单次工具调用超时与行情数据源
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
    pub stockdata: StockDataSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            stockdata: StockDataSection::default(),
        }
    }
}

/// [tools.stockdata] 段：StockData API 地址、令牌、新闻条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StockDataSection {
    pub base_url: String,
    pub api_token: Option<String>,
    pub news_limit: u32,
    pub timeout_secs: u64,
}

impl Default for StockDataSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.stockdata.org/v1".to_string(),
            api_token: None,
            news_limit: 2,
            timeout_secs: 15,
        }
    }
}

/// 从 config 目录加载配置，环境变量 STOCKDESK__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（可覆盖前面的键）；文件不存在时报错
/// 3. 最后叠加环境变量 STOCKDESK__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    // 显式指定的文件必须存在
    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("STOCKDESK")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
