//! 工具调用分发
//!
//! 对远端 Run 的一批工具调用逐个执行：按名查找、解析参数 JSON、在超时内调用，
//! 每次调用输出一行结构化审计日志（JSON）。单个调用失败互不影响，整批从不返回错误。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use tokio::time::timeout;

use crate::core::ToolCallError;
use crate::service::{ToolCallRequest, ToolOutput};
use crate::tools::ToolRegistry;

/// 失败调用的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailedCallPolicy {
    /// 不为失败调用提交输出
    Drop,
    /// 提交 `{"error": "..."}` 作为输出，避免远端一直等待未应答的 call id
    #[default]
    Report,
}

/// 工具分发器：持有注册表、单次调用超时与失败策略
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    policy: FailedCallPolicy,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64, policy: FailedCallPolicy) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            policy,
        }
    }

    /// 执行一批工具调用并组装输出批次。
    ///
    /// 成功且非空的结果产生一条输出；空结果总是丢弃；失败按 FailedCallPolicy 丢弃或上报。
    /// 空批次直接返回空 Vec，由调用方决定是否取消 Run。
    pub async fn dispatch(&self, calls: &[ToolCallRequest]) -> Vec<ToolOutput> {
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            match self.invoke(call).await {
                Ok(output) if output.is_empty() => {
                    tracing::warn!(call_id = %call.id, tool = %call.name, "Tool returned no output, dropping call");
                }
                Ok(output) => outputs.push(ToolOutput {
                    tool_call_id: call.id.clone(),
                    output,
                }),
                Err(e) => {
                    tracing::error!(call_id = %call.id, tool = %call.name, "Error executing tool call: {}", e);
                    if self.policy == FailedCallPolicy::Report {
                        outputs.push(ToolOutput {
                            tool_call_id: call.id.clone(),
                            output: serde_json::json!({ "error": e.to_string() }).to_string(),
                        });
                    }
                }
            }
        }
        outputs
    }

    /// 执行单个调用；未知工具 / 参数解析失败 / 超时 / 工具返回 Err 均映射为 ToolCallError
    async fn invoke(&self, call: &ToolCallRequest) -> Result<String, ToolCallError> {
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| ToolCallError::HallucinatedTool(call.name.clone()))?;
        let args = parse_arguments(&call.arguments)?;

        let start = Instant::now();
        let result = timeout(self.timeout, tool.execute(args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "call_id": call.id,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(ToolCallError::ToolExecutionFailed(e)),
            Err(_) => Err(ToolCallError::ToolTimeout(call.name.clone())),
        }
    }
}

/// 空参数视为 `{}`
fn parse_arguments(raw: &str) -> Result<Value, ToolCallError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| ToolCallError::JsonParseError(e.to_string()))
}

fn args_preview(args: &str) -> String {
    if args.chars().count() > 200 {
        format!("{}...", args.chars().take(200).collect::<String>())
    } else {
        args.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echo text"
        }
        async fn execute(&self, args: Value) -> Result<String, String> {
            Ok(args.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string())
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            Err("upstream exploded".to_string())
        }
    }

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "never finishes in time"
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("late".to_string())
        }
    }

    fn dispatcher(policy: FailedCallPolicy) -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        registry.register(Broken);
        registry.register(Slow);
        ToolDispatcher::new(Arc::new(registry), 5, policy)
    }

    #[tokio::test]
    async fn test_drop_policy_omits_failures() {
        let d = dispatcher(FailedCallPolicy::Drop);
        let calls = vec![
            ToolCallRequest::new("c1", "broken", "{}"),
            ToolCallRequest::new("c2", "echo", r#"{"text":"hi"}"#),
            ToolCallRequest::new("c3", "missing", "{}"),
            ToolCallRequest::new("c4", "echo", "not json"),
        ];
        let outputs = d.dispatch(&calls).await;
        assert_eq!(
            outputs,
            vec![ToolOutput {
                tool_call_id: "c2".into(),
                output: "hi".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_report_policy_answers_every_failed_call() {
        let d = dispatcher(FailedCallPolicy::Report);
        let calls = vec![
            ToolCallRequest::new("c1", "broken", "{}"),
            ToolCallRequest::new("c2", "missing", "{}"),
        ];
        let outputs = d.dispatch(&calls).await;
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].tool_call_id, "c1");
        let payload: Value = serde_json::from_str(&outputs[0].output).unwrap();
        assert!(payload["error"].as_str().unwrap().contains("upstream exploded"));
        assert!(outputs[1].output.contains("missing"));
    }

    #[tokio::test]
    async fn test_empty_result_is_dropped_under_any_policy() {
        let d = dispatcher(FailedCallPolicy::Report);
        let outputs = d.dispatch(&[ToolCallRequest::new("c1", "echo", "")]).await;
        assert!(outputs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let d = dispatcher(FailedCallPolicy::Drop);
        let outputs = d.dispatch(&[ToolCallRequest::new("c1", "slow", "{}")]).await;
        assert!(outputs.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let d = dispatcher(FailedCallPolicy::Report);
        assert!(d.dispatch(&[]).await.is_empty());
    }
}
