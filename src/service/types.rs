//! 远程 Agent 服务的数据模型
//!
//! 与 Assistants 风格 REST API 的 JSON 结构一一对应：Agent、Thread、Message、Run、工具调用与工具输出。
//! 工具声明与工具调用在线上是 `{"type": "function", "function": {...}}` 包裹格式，这里展开为扁平结构。

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 工具声明：名称、描述、参数 JSON Schema（创建 Agent 时整体提交）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_parameters")]
    pub parameters: Value,
}

fn empty_parameters() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

#[derive(Serialize, Deserialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function: Option<ToolSpec>,
}

/// 将工具声明转为线上格式
pub fn tools_to_wire(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .map(|spec| {
            serde_json::json!({
                "type": "function",
                "function": spec,
            })
        })
        .collect()
}

/// 只保留 function 类工具（远端 Agent 可能还挂着 code_interpreter 等内置工具）
fn function_tools<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<ToolSpec>, D::Error> {
    let raw: Option<Vec<WireTool>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter(|t| t.kind == "function")
        .filter_map(|t| t.function)
        .collect())
}

fn nullable_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// 远端 Agent 定义
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub model: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub instructions: String,
    #[serde(default, deserialize_with = "function_tools")]
    pub tools: Vec<ToolSpec>,
}

/// 创建 Agent 的请求体
#[derive(Debug, Clone, PartialEq)]
pub struct CreateAgentRequest {
    pub model: String,
    pub name: String,
    pub instructions: String,
    pub tools: Vec<ToolSpec>,
}

impl CreateAgentRequest {
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "model": self.model,
            "name": self.name,
            "instructions": self.instructions,
            "tools": tools_to_wire(&self.tools),
        })
    }
}

/// 会话线程（每个会话一个，不复用）
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThreadRecord {
    pub id: String,
}

/// Run 状态。`cancelling` 仍在进行中；`incomplete` 与未知状态按终态处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// 仍需继续轮询
    pub fn is_active(self) -> bool {
        matches!(
            self,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::RequiresAction | RunStatus::Cancelling
        )
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Expired => "expired",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run 等待客户端处理的动作
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequiredAction {
    SubmitToolOutputs { submit_tool_outputs: SubmitToolOutputs },
    #[serde(other)]
    Other,
}

impl RequiredAction {
    pub fn submit_tool_outputs(tool_calls: Vec<ToolCallRequest>) -> Self {
        RequiredAction::SubmitToolOutputs {
            submit_tool_outputs: SubmitToolOutputs { tool_calls },
        }
    }

    /// 「提交工具输出」类动作的工具调用批次；其它动作返回 None
    pub fn tool_calls(&self) -> Option<&[ToolCallRequest]> {
        match self {
            RequiredAction::SubmitToolOutputs { submit_tool_outputs } => {
                Some(&submit_tool_outputs.tool_calls)
            }
            RequiredAction::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmitToolOutputs {
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
}

/// 远端 Run 请求执行的一次工具调用；arguments 为未解析的 JSON 字符串
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "WireToolCall")]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(default)]
    function: WireFunctionCall,
}

#[derive(Deserialize, Default)]
struct WireFunctionCall {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

impl From<WireToolCall> for ToolCallRequest {
    fn from(wire: WireToolCall) -> Self {
        Self {
            id: wire.id,
            name: wire.function.name,
            arguments: wire.function.arguments,
        }
    }
}

/// 单个工具调用的输出，tool_call_id 必须来自同一批次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// 一次 Run 的快照（轮询读取，submit / cancel 写入）
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub thread_id: String,
    #[serde(alias = "assistant_id")]
    pub agent_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

/// 线程中的一条消息
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl ThreadMessage {
    /// 拼接所有文本片段
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                MessageContent::Text { text } => Some(text.value.as_str()),
                MessageContent::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextContent {
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MessageList {
    #[serde(default)]
    pub data: Vec<ThreadMessage>,
}
