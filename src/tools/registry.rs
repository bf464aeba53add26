//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找；
//! 创建 Agent 时 definitions() 按注册顺序整体提交给远端，ToolDispatcher 在 Run 请求时按名调用。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::service::ToolSpec;

/// 工具 trait：名称、描述（供模型理解）、参数 schema、异步执行（args 为 JSON）
///
/// 基础设施层面的失败（网络、上游 API）应在工具内部捕获并以错误载荷字符串返回；
/// 返回 Err 或空字符串时，该调用的输出会被 ToolDispatcher 丢弃或上报为错误。
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（远端工具调用中的 function.name）
    fn name(&self) -> &str;

    /// 工具描述（供模型理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 工具注册表：保持注册顺序，同名重复注册时替换原位置
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        let tool: Arc<dyn Tool> = Arc::new(tool);
        match self.index.get(&name) {
            Some(&i) => self.tools[i] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| self.tools[i].clone())
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, String> {
        let tool = self.get(name).ok_or_else(|| format!("Unknown tool: {name}"))?;
        tool.execute(args).await
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 按注册顺序生成工具声明，用于创建 Agent
    pub fn definitions(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 固定返回值的工具
    pub(crate) struct StaticTool {
        name: String,
        output: String,
    }

    impl StaticTool {
        pub(crate) fn new(name: &str, output: &str) -> Self {
            Self {
                name: name.to_string(),
                output: output.to_string(),
            }
        }
    }

    #[async_trait]
    impl Tool for StaticTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "returns a fixed string"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            Ok(self.output.clone())
        }
    }

    #[test]
    fn test_definitions_keep_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(StaticTool::new("get_quote", "q"));
        registry.register(StaticTool::new("get_news", "n"));
        registry.register(StaticTool::new("get_historical_eod", "e"));

        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["get_quote", "get_news", "get_historical_eod"]);
        assert_eq!(registry.definitions()[0].parameters["type"], "object");
    }

    #[tokio::test]
    async fn test_reregister_replaces_in_place() {
        let mut registry = ToolRegistry::new();
        registry.register(StaticTool::new("a", "first"));
        registry.register(StaticTool::new("b", "b"));
        registry.register(StaticTool::new("a", "second"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.tool_names(), vec!["a", "b"]);
        assert_eq!(registry.execute("a", Value::Null).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.execute("nope", Value::Null).await.unwrap_err();
        assert!(err.contains("nope"));
    }
}
