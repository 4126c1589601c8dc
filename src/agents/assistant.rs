//! AssistantAgent：LLM 驱动的助手，可选工具调用
//!
//! 一轮内：拼 system（含工具 schema）+ Transcript + 指令 -> 调用 LLM（可流式推送片段）->
//! 若输出为 `{"tool": ..., "args": {...}}` 则执行工具；reflect_on_tool_use 时再调用一次 LLM 总结工具结果。
//! 保留工具名 `ask_human` 不执行，而是返回 RequestHumanInput 控制信号。

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::agents::{Agent, AgentDescriptor, Capability, ChunkSink, ContextSnapshot};
use crate::core::AgentError;
use crate::llm::{ChatMessage, LlmClient, LlmError};
use crate::team::oracle::extract_json_object;
use crate::team::{ControlSignal, MessageContent};
use crate::tools::{tool_call_schema_json, ToolExecutor};

/// 请求人类介入的保留工具名
pub const ASK_HUMAN_TOOL: &str = "ask_human";

/// LLM 返回的 Tool Call（{"tool": "code_execution", "args": {"code": "..."}}）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone)]
pub enum AssistantOutput {
    Response(String),
    ToolCall(ToolCall),
}

/// 解析模型输出：含合法 tool call JSON 时为 ToolCall，其余一律视为文本回复
pub fn parse_assistant_output(output: &str) -> AssistantOutput {
    let trimmed = output.trim();
    extract_json_object(trimmed)
        .and_then(|json| serde_json::from_str::<ToolCall>(json).ok())
        .filter(|tc| !tc.tool.trim().is_empty())
        .map(AssistantOutput::ToolCall)
        .unwrap_or_else(|| AssistantOutput::Response(trimmed.to_string()))
}

pub struct AssistantAgent {
    descriptor: AgentDescriptor,
    llm: Arc<dyn LlmClient>,
    system_message: String,
    tools: Option<ToolExecutor>,
    model_client_stream: bool,
    reflect_on_tool_use: bool,
}

impl AssistantAgent {
    pub fn new(id: impl Into<String>, description: impl Into<String>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            descriptor: AgentDescriptor::new(id, [Capability::TextReply], description),
            llm,
            system_message: "You are a helpful AI assistant.".to_string(),
            tools: None,
            model_client_stream: false,
            reflect_on_tool_use: false,
        }
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = message.into();
        self
    }

    pub fn with_tools(mut self, tools: ToolExecutor) -> Self {
        self.descriptor.capabilities.insert(Capability::ToolExec);
        self.tools = Some(tools);
        self
    }

    /// 流式调用模型并把 token 推给 Sink
    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.model_client_stream = enabled;
        self
    }

    pub fn with_reflection(mut self, enabled: bool) -> Self {
        self.reflect_on_tool_use = enabled;
        self
    }

    fn system_prompt(&self) -> String {
        let mut s = self.system_message.clone();
        if let Some(tools) = &self.tools {
            s.push_str(&format!(
                "\n\nTo use a tool, reply with ONLY one JSON object of this form:\n{}\n\nAvailable tools:\n{}",
                tool_call_schema_json(),
                tools.schema_json()
            ));
        }
        s.push_str(&format!(
            "\n\nIf you need the human to act (login, cookies, confirmation), reply with {{\"tool\": \"{}\", \"args\": {{\"question\": \"...\"}}}}.",
            ASK_HUMAN_TOOL
        ));
        s
    }

    fn build_messages(&self, instructions: &str, context: &ContextSnapshot) -> Vec<ChatMessage> {
        let mut messages = vec![
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(format!("Task: {}", context.task)),
        ];
        for m in context.transcript.iter() {
            if m.sender == self.descriptor.id {
                messages.push(ChatMessage::assistant(m.content.as_text()));
            } else {
                messages.push(ChatMessage::user(format!("[{}]: {}", m.sender, m.content.as_text())));
            }
        }
        let instructions = instructions.trim();
        if !instructions.is_empty() {
            messages.push(ChatMessage::user(instructions.to_string()));
        }
        messages
    }

    async fn generate(&self, messages: &[ChatMessage], sink: &ChunkSink) -> Result<String, AgentError> {
        if !self.model_client_stream {
            return Ok(self.llm.complete(messages).await?);
        }
        let mut stream = self.llm.complete_stream(messages).await?;
        let mut out = String::new();
        while let Some(token) = stream.next().await {
            let token = token?;
            sink.send(token.as_str());
            out.push_str(&token);
        }
        if out.is_empty() {
            return Err(LlmError::EmptyResponse.into());
        }
        Ok(out)
    }
}

#[async_trait]
impl Agent for AssistantAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    async fn act(
        &self,
        instructions: &str,
        context: ContextSnapshot,
        sink: ChunkSink,
    ) -> Result<MessageContent, AgentError> {
        let mut messages = self.build_messages(instructions, &context);
        let output = self.generate(&messages, &sink).await?;

        let call = match parse_assistant_output(&output) {
            AssistantOutput::Response(text) => return Ok(MessageContent::text(text)),
            AssistantOutput::ToolCall(call) => call,
        };

        if call.tool == ASK_HUMAN_TOOL {
            let reason = call
                .args
                .get("question")
                .and_then(|v| v.as_str())
                .unwrap_or("The assistant needs your input.")
                .to_string();
            return Ok(MessageContent::control(ControlSignal::RequestHumanInput { reason }));
        }

        let tools = match &self.tools {
            Some(t) if t.has_tool(&call.tool) => t,
            _ => {
                return Err(AgentError::ExecutionFailed(format!(
                    "{} has no tool named '{}'",
                    self.descriptor.id, call.tool
                )))
            }
        };
        tracing::info!(agent = %self.descriptor.id, tool = %call.tool, "assistant tool call");
        let result = tools.execute(&call.tool, call.args.clone()).await?;

        if !self.reflect_on_tool_use {
            return Ok(MessageContent::ToolResult {
                tool: call.tool,
                output: result,
            });
        }

        messages.push(ChatMessage::assistant(output));
        messages.push(ChatMessage::user(format!(
            "Tool `{}` returned:\n{}\n\nReflect on this result and reply to the team in plain text (no tool calls).",
            call.tool, result
        )));
        let reflection = self.generate(&messages, &sink).await?;
        Ok(MessageContent::text(reflection.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::team::{Message, Transcript};
    use crate::tools::{Tool, ToolRegistry};
    use serde_json::Value;

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "uppercases text"
        }

        async fn execute(&self, args: Value) -> Result<String, String> {
            Ok(args["text"].as_str().unwrap_or_default().to_uppercase())
        }
    }

    fn context() -> ContextSnapshot {
        let mut t = Transcript::new();
        t.append("web_agent", MessageContent::text("page says hello"), false);
        let transcript: Arc<[Message]> = t.snapshot();
        ContextSnapshot {
            task: "shout the greeting".into(),
            transcript,
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(UpperTool);
        ToolExecutor::new(registry, 5)
    }

    #[test]
    fn test_parse_output() {
        assert!(matches!(
            parse_assistant_output("just text"),
            AssistantOutput::Response(t) if t == "just text"
        ));
        assert!(matches!(
            parse_assistant_output(r#"{"tool": "upper", "args": {"text": "hi"}}"#),
            AssistantOutput::ToolCall(tc) if tc.tool == "upper"
        ));
        // 花括号但不是 tool call -> 文本
        assert!(matches!(
            parse_assistant_output("use a dict like {\"a\": 1}"),
            AssistantOutput::Response(_)
        ));
    }

    #[tokio::test]
    async fn test_text_reply_streams_chunks() {
        let llm = Arc::new(MockLlmClient::with_responses(["Here is a summary of the page."]));
        let agent = AssistantAgent::new("assistant", "helper", llm).with_streaming(true);
        let sink = ChunkSink::detached("assistant");
        let content = agent.act("summarize", context(), sink.clone()).await.unwrap();
        assert_eq!(content, MessageContent::text("Here is a summary of the page."));
        assert!(sink.emitted());
    }

    #[tokio::test]
    async fn test_tool_call_without_reflection() {
        let llm = Arc::new(MockLlmClient::with_responses([
            r#"{"tool": "upper", "args": {"text": "hello"}}"#,
        ]));
        let agent = AssistantAgent::new("coder_agent", "coder", llm).with_tools(executor());
        assert!(agent.descriptor().capabilities.contains(&Capability::ToolExec));
        let content = agent
            .act("", context(), ChunkSink::detached("coder_agent"))
            .await
            .unwrap();
        assert_eq!(
            content,
            MessageContent::ToolResult {
                tool: "upper".into(),
                output: "HELLO".into()
            }
        );
    }

    #[tokio::test]
    async fn test_tool_call_with_reflection() {
        let llm = Arc::new(MockLlmClient::with_responses([
            r#"{"tool": "upper", "args": {"text": "hello"}}"#,
            "The greeting shouted is HELLO.",
        ]));
        let agent = AssistantAgent::new("assistant", "helper", llm)
            .with_tools(executor())
            .with_reflection(true);
        let content = agent
            .act("", context(), ChunkSink::detached("assistant"))
            .await
            .unwrap();
        assert_eq!(content, MessageContent::text("The greeting shouted is HELLO."));
    }

    #[tokio::test]
    async fn test_ask_human_and_unknown_tool() {
        let llm = Arc::new(MockLlmClient::with_responses([
            r#"{"tool": "ask_human", "args": {"question": "Proceed?"}}"#,
            r#"{"tool": "rm_rf", "args": {}}"#,
        ]));
        let agent = AssistantAgent::new("assistant", "helper", llm).with_tools(executor());
        let content = agent
            .act("", context(), ChunkSink::detached("assistant"))
            .await
            .unwrap();
        assert_eq!(content.human_input_request(), Some("Proceed?"));
        let err = agent
            .act("", context(), ChunkSink::detached("assistant"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ExecutionFailed(_)));
    }
}
