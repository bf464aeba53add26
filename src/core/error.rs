//! 错误类型
//!
//! AssistantError 是会话初始化边界上唯一允许向上传播的错误；
//! ToolCallError 只在 ToolDispatcher 内部出现，记录日志后按策略丢弃或转为错误输出。

use thiserror::Error;

use crate::service::ServiceError;

/// 会话初始化 / Agent 供给过程中的错误
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Connect failed: {0}")]
    Connect(#[source] ServiceError),

    /// 远端 Agent 或线程创建失败
    #[error("Provisioning failed: {0}")]
    Provisioning(#[source] ServiceError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 单次工具调用失败的原因
#[derive(Error, Debug)]
pub enum ToolCallError {
    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),
}
