//! 行情数据工具：报价、新闻、历史日线（StockData REST API）
//!
//! 三个工具共享一个 StockDataApi（reqwest Client + base_url + token）；GET 请求带超时。
//! 网络或上游错误不向上抛出，而是以 `{"error": ...}` 字符串返回给模型；只有参数错误返回 Err。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::config::StockDataSection;
use crate::core::AssistantError;
use crate::tools::schema::parameters_schema;
use crate::tools::{Tool, ToolRegistry};

/// StockData API 访问端
pub struct StockDataApi {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    news_limit: u32,
}

impl StockDataApi {
    pub fn from_config(section: &StockDataSection) -> Result<Self, AssistantError> {
        if section.timeout_secs == 0 {
            return Err(AssistantError::ConfigError(
                "tools.stockdata.timeout_secs must be greater than 0".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs))
            .build()
            .map_err(|e| AssistantError::ConfigError(format!("StockData HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: section.base_url.trim_end_matches('/').to_string(),
            api_token: section.api_token.clone().filter(|t| !t.is_empty()),
            news_limit: section.news_limit,
        })
    }

    /// GET `{base_url}/{path}`，返回响应 JSON 文本；失败时返回错误载荷
    async fn get(&self, path: &str, params: &[(&str, String)]) -> String {
        match self.fetch(path, params).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(path, "StockData request failed: {}", e);
                serde_json::json!({ "error": e }).to_string()
            }
        }
    }

    async fn fetch(&self, path: &str, params: &[(&str, String)]) -> Result<String, String> {
        let token = self
            .api_token
            .as_deref()
            .ok_or_else(|| "StockData API token not configured".to_string())?;
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(&[("api_token", token)])
            .query(params)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| format!("Invalid response: {}", e))?;
        tracing::debug!(path, "StockData response received");
        Ok(body.to_string())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SymbolsArgs {
    /// One or more ticker symbols separated by commas, e.g. "MSFT,GOOGL"
    symbols: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SymbolArgs {
    /// A single ticker symbol, e.g. "AAPL"
    symbol: String,
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {e}"))
}

fn non_empty(value: &str, field: &str) -> Result<String, String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(format!("Missing '{field}'"));
    }
    Ok(v.to_uppercase())
}

/// 实时报价
pub struct QuoteTool {
    api: Arc<StockDataApi>,
}

impl QuoteTool {
    pub fn new(api: Arc<StockDataApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for QuoteTool {
    fn name(&self) -> &str {
        "get_quote"
    }

    fn description(&self) -> &str {
        "Get the latest quote (price, day high/low, volume, market cap) for one or more symbols separated by commas."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema::<SymbolsArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: SymbolsArgs = parse_args(args)?;
        let symbols = non_empty(&args.symbols, "symbols")?;
        tracing::info!(%symbols, "Getting quote");
        Ok(self.api.get("data/quote", &[("symbols", symbols)]).await)
    }
}

/// 相关新闻
pub struct NewsTool {
    api: Arc<StockDataApi>,
}

impl NewsTool {
    pub fn new(api: Arc<StockDataApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for NewsTool {
    fn name(&self) -> &str {
        "get_news"
    }

    fn description(&self) -> &str {
        "Get recent news articles (title, description, snippet, url, sentiment) for one or more symbols separated by commas."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema::<SymbolsArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: SymbolsArgs = parse_args(args)?;
        let symbols = non_empty(&args.symbols, "symbols")?;
        tracing::info!(%symbols, "Getting news");
        let limit = self.api.news_limit.to_string();
        Ok(self
            .api
            .get("news/all", &[("symbols", symbols), ("limit", limit)])
            .await)
    }
}

/// 历史日线（已按拆股调整）
pub struct HistoricalEodTool {
    api: Arc<StockDataApi>,
}

impl HistoricalEodTool {
    pub fn new(api: Arc<StockDataApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Tool for HistoricalEodTool {
    fn name(&self) -> &str {
        "get_historical_eod"
    }

    fn description(&self) -> &str {
        "Get historical end-of-day open/high/low/close/volume data for one US stock symbol, adjusted for splits."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema::<SymbolArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: SymbolArgs = parse_args(args)?;
        let symbol = non_empty(&args.symbol, "symbol")?;
        tracing::info!(%symbol, "Getting historical quotes");
        Ok(self.api.get("data/eod", &[("symbols", symbol)]).await)
    }
}

/// 注册全部行情工具
pub fn stock_registry(section: &StockDataSection) -> Result<ToolRegistry, AssistantError> {
    let api = Arc::new(StockDataApi::from_config(section)?);
    let mut tools = ToolRegistry::new();
    tools.register(QuoteTool::new(api.clone()));
    tools.register(NewsTool::new(api.clone()));
    tools.register(HistoricalEodTool::new(api));
    Ok(tools)
}
