//! 参与者可调用的工具
//!
//! 工具只面向 AssistantAgent：模型输出 {"tool", "args"}，由 ToolExecutor 查表执行。
//! 注册表同时生成提示词里的工具目录。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 schema；不声明时视为不接受参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    /// Err 中的文本会作为工具失败原因记入对话
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 提示词中的一条工具说明
#[derive(Debug, Clone, Serialize)]
pub struct ToolEntry {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 名称 -> 工具；BTreeMap 使工具目录顺序固定
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名工具后注册者覆盖先注册者
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, String> {
        match self.tools.get(name) {
            Some(tool) => tool.execute(args).await,
            None => Err(format!("Unknown tool: {name}")),
        }
    }

    pub fn entries(&self) -> Vec<ToolEntry> {
        self.tools
            .values()
            .map(|tool| ToolEntry {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    /// 工具目录 JSON，拼入 assistant 的 system prompt
    pub fn catalog_json(&self) -> String {
        serde_json::to_string_pretty(&self.entries()).unwrap_or_else(|_| "[]".to_string())
    }
}
