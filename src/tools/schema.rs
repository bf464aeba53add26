//! 工具参数 JSON Schema 生成（schemars 从参数结构体自动生成）
//!
//! 去掉顶层 `$schema` / `title`，得到可直接放入 function 声明 `parameters` 的对象。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 返回参数类型 T 的 JSON Schema
pub fn parameters_schema<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct Args {
        /// 股票代码
        symbol: String,
    }

    #[test]
    fn test_schema_is_plain_object() {
        let schema = parameters_schema::<Args>();
        assert_eq!(schema["type"], "object");
        assert!(schema.get("$schema").is_none());
        assert_eq!(schema["required"][0], "symbol");
        assert_eq!(schema["properties"]["symbol"]["description"], "股票代码");
    }
}
