//! Transcript：一次运行的全序、只追加消息序列
//!
//! 序号由 append 分配（从 0 开始、严格递增、无空洞）；对外只暴露只读访问，
//! snapshot 返回值拷贝（Arc<[Message]>），Agent 拿到后看不到后续轮次的写入。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type AgentId = String;

/// 控制信号：由 Agent 返回，影响调度而非仅作为对话内容
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum ControlSignal {
    /// 人类要求终止：强制 Terminated，不做最终答案汇总
    Abort,
    Approve,
    /// 请求人类介入：下一轮跳过决策服务，直接转给 human proxy
    RequestHumanInput { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    ToolResult { tool: String, output: String },
    Control { signal: ControlSignal },
    /// Agent 执行失败或超时，作为对话内容记录
    Error { error: String },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text { text: text.into() }
    }

    pub fn error(error: impl Into<String>) -> Self {
        MessageContent::Error {
            error: error.into(),
        }
    }

    pub fn control(signal: ControlSignal) -> Self {
        MessageContent::Control { signal }
    }

    /// 可用于匹配与渲染的文本
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text { text } => text.clone(),
            MessageContent::ToolResult { output, .. } => output.clone(),
            MessageContent::Error { error } => error.clone(),
            MessageContent::Control { signal } => match signal {
                ControlSignal::Abort => "ABORT".to_string(),
                ControlSignal::Approve => "APPROVE".to_string(),
                ControlSignal::RequestHumanInput { reason } => {
                    format!("REQUEST_HUMAN_INPUT: {}", reason)
                }
            },
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            MessageContent::Control {
                signal: ControlSignal::Abort
            }
        )
    }

    pub fn human_input_request(&self) -> Option<&str> {
        match self {
            MessageContent::Control {
                signal: ControlSignal::RequestHumanInput { reason },
            } => Some(reason),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub sender: AgentId,
    pub content: MessageContent,
    pub sequence: u64,
    /// 该消息生成过程中是否向 Sink 推送过增量片段
    pub streamed: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, sender: &str, content: MessageContent, streamed: bool) -> &Message {
        let sequence = self.messages.len() as u64;
        self.messages.push(Message {
            sender: sender.to_string(),
            content,
            sequence,
            streamed,
            timestamp: Utc::now(),
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn snapshot(&self) -> Arc<[Message]> {
        Arc::from(self.messages.as_slice())
    }

    /// 最近 n 条（保持原顺序）
    pub fn tail(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_gapless() {
        let mut t = Transcript::new();
        for i in 0..5 {
            t.append("a", MessageContent::text(format!("m{i}")), false);
        }
        let seqs: Vec<u64> = t.messages().iter().map(|m| m.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut t = Transcript::new();
        t.append("a", MessageContent::text("one"), false);
        let snap = t.snapshot();
        t.append("b", MessageContent::text("two"), true);
        assert_eq!(snap.len(), 1);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_tail_and_control_text() {
        let mut t = Transcript::new();
        t.append("a", MessageContent::text("one"), false);
        t.append(
            "b",
            MessageContent::control(ControlSignal::RequestHumanInput {
                reason: "login wall".into(),
            }),
            false,
        );
        assert_eq!(t.tail(1)[0].sender, "b");
        assert_eq!(t.tail(10).len(), 2);
        let last = t.last().unwrap();
        assert_eq!(last.content.as_text(), "REQUEST_HUMAN_INPUT: login wall");
        assert_eq!(last.content.human_input_request(), Some("login wall"));
    }
}
