//! 远程 Agent 服务层：数据模型、凭据、服务抽象与实现（HTTP / Mock）

pub mod credential;
pub mod error;
pub mod http;
pub mod mock;
pub mod traits;
pub mod types;

pub use credential::{AuthScheme, Credential, CredentialProvider};
pub use error::ServiceError;
pub use http::{HttpAgentService, HttpConnector};
pub use mock::{CallCounts, MockAgentService, MockConnector, ScriptedRun};
pub use traits::{AgentService, ServiceConnector};
pub use types::{
    AgentRecord, CreateAgentRequest, MessageContent, RequiredAction, RunError, RunRecord,
    RunStatus, TextContent, ThreadMessage, ThreadRecord, ToolCallRequest, ToolOutput, ToolSpec,
};
