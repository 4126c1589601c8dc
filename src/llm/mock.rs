//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 按顺序返回预置回复；预置回复耗尽后回显最后一条 User 消息。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{ChatMessage, LlmClient, LlmError, Role, TokenStream};

/// 流式回复时每段字符数
const CHUNK_CHARS: usize = 8;

#[derive(Debug, Default)]
pub struct MockLlmClient {
    scripted: Mutex<VecDeque<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scripted: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }

    fn next_scripted(&self) -> Option<String> {
        self.scripted.lock().ok().and_then(|mut q| q.pop_front())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        if let Some(reply) = self.next_scripted() {
            return Ok(reply);
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {}", last_user))
    }

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        let content = self.complete(messages).await?;
        let chars: Vec<char> = content.chars().collect();
        let chunks: Vec<Result<String, LlmError>> = chars
            .chunks(CHUNK_CHARS)
            .map(|c| Ok(c.iter().collect()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_scripted_then_echo() {
        let llm = MockLlmClient::with_responses(["first"]);
        let msgs = vec![ChatMessage::user("hello")];
        assert_eq!(llm.complete(&msgs).await.unwrap(), "first");
        assert_eq!(llm.complete(&msgs).await.unwrap(), "Echo from Mock: hello");
    }

    #[tokio::test]
    async fn test_stream_reassembles() {
        let llm = MockLlmClient::with_responses(["a fairly long scripted reply"]);
        let mut stream = llm.complete_stream(&[]).await.unwrap();
        let mut out = String::new();
        let mut pieces = 0;
        while let Some(tok) = stream.next().await {
            out.push_str(&tok.unwrap());
            pieces += 1;
        }
        assert_eq!(out, "a fairly long scripted reply");
        assert!(pieces > 1);
    }
}
