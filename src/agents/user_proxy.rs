//! UserProxyAgent：人类参与者
//!
//! 轮到它时阻塞等待一行输入（stdin 或 channel）；输入命中 abort 关键词返回 Abort 控制信号，
//! 命中 approve 关键词返回 Approve，其余原样作为文本。输入流关闭视为 Abort。

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, Mutex};

use crate::agents::{Agent, AgentDescriptor, Capability, ChunkSink, ContextSnapshot};
use crate::core::AgentError;
use crate::team::{ControlSignal, MessageContent};

/// 人类输入来源；None 表示输入已关闭
#[async_trait]
pub trait InputSource: Send + Sync {
    async fn read_line(&self, prompt: &str) -> Result<Option<String>, AgentError>;
}

#[async_trait]
impl InputSource for Box<dyn InputSource> {
    async fn read_line(&self, prompt: &str) -> Result<Option<String>, AgentError> {
        (**self).read_line(prompt).await
    }
}

/// 终端输入
pub struct StdinInput {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl StdinInput {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InputSource for StdinInput {
    async fn read_line(&self, prompt: &str) -> Result<Option<String>, AgentError> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("\n{}\n> ", prompt).as_bytes())
            .await
            .map_err(|e| AgentError::Input(e.to_string()))?;
        let _ = stdout.flush().await;
        self.lines
            .lock()
            .await
            .next_line()
            .await
            .map_err(|e| AgentError::Input(e.to_string()))
    }
}

/// 由其他任务（测试、Web 前端）推送的输入
pub struct ChannelInput {
    rx: Mutex<mpsc::Receiver<String>>,
}

impl ChannelInput {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx: Mutex::new(rx) }
    }

    /// 创建 (发送端, 输入源)
    pub fn pair(buffer: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl InputSource for ChannelInput {
    async fn read_line(&self, _prompt: &str) -> Result<Option<String>, AgentError> {
        Ok(self.rx.lock().await.recv().await)
    }
}

pub struct UserProxyAgent {
    descriptor: AgentDescriptor,
    input: Box<dyn InputSource>,
    abort_keywords: Vec<String>,
    approve_keywords: Vec<String>,
}

impl UserProxyAgent {
    pub fn new(id: impl Into<String>, input: impl InputSource + 'static) -> Self {
        Self {
            descriptor: AgentDescriptor::new(
                id,
                [Capability::HumanBlock],
                "A human user. Select when the task needs a login, a confirmation or a decision only a person can make.",
            ),
            input: Box::new(input),
            abort_keywords: vec!["abort".to_string()],
            approve_keywords: vec!["approve".to_string()],
        }
    }

    pub fn with_keywords(mut self, abort: Vec<String>, approve: Vec<String>) -> Self {
        self.abort_keywords = abort;
        self.approve_keywords = approve;
        self
    }

    fn classify(&self, line: &str) -> MessageContent {
        let trimmed = line.trim();
        let matches = |keywords: &[String]| keywords.iter().any(|k| k.eq_ignore_ascii_case(trimmed));
        if matches(&self.abort_keywords) {
            MessageContent::control(ControlSignal::Abort)
        } else if matches(&self.approve_keywords) {
            MessageContent::control(ControlSignal::Approve)
        } else {
            MessageContent::text(trimmed)
        }
    }
}

#[async_trait]
impl Agent for UserProxyAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    async fn act(
        &self,
        instructions: &str,
        _context: ContextSnapshot,
        _sink: ChunkSink,
    ) -> Result<MessageContent, AgentError> {
        let prompt = if instructions.trim().is_empty() {
            "Enter your response:"
        } else {
            instructions
        };
        match self.input.read_line(prompt).await? {
            Some(line) => Ok(self.classify(&line)),
            None => {
                tracing::warn!(agent = %self.descriptor.id, "human input closed, aborting");
                Ok(MessageContent::control(ControlSignal::Abort))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ctx() -> ContextSnapshot {
        ContextSnapshot {
            task: "t".into(),
            transcript: Arc::from(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_keywords_and_text() {
        let (tx, input) = ChannelInput::pair(4);
        let agent = UserProxyAgent::new("User", input)
            .with_keywords(vec!["abort".into(), "stop".into()], vec!["approve".into()]);
        tx.send("  APPROVE ".into()).await.unwrap();
        tx.send("the password is in the vault".into()).await.unwrap();
        tx.send("Stop".into()).await.unwrap();

        let a = agent.act("Please confirm", ctx(), ChunkSink::detached("User")).await.unwrap();
        assert_eq!(a, MessageContent::control(ControlSignal::Approve));
        let b = agent.act("", ctx(), ChunkSink::detached("User")).await.unwrap();
        assert_eq!(b, MessageContent::text("the password is in the vault"));
        let c = agent.act("", ctx(), ChunkSink::detached("User")).await.unwrap();
        assert!(c.is_abort());
    }

    #[tokio::test]
    async fn test_closed_input_aborts() {
        let (tx, input) = ChannelInput::pair(1);
        drop(tx);
        let agent = UserProxyAgent::new("User", input);
        let out = agent.act("", ctx(), ChunkSink::detached("User")).await.unwrap();
        assert!(out.is_abort());
        assert!(agent.descriptor().capabilities.contains(&Capability::HumanBlock));
    }
}
