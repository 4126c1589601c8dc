//! 参与者层：Agent 统一接口与内置实现
//!
//! - **Agent**: 单一的 `act(instructions, context, sink)` 契约；能力差异只体现在 AgentDescriptor 元数据上
//! - **AssistantAgent**: LLM 文本回复，可选工具调用（代码执行）
//! - **WebSurferAgent**: 抓取网页并按指令摘要
//! - **UserProxyAgent**: 阻塞等待人类输入，可返回 abort / approve 控制信号

pub mod assistant;
pub mod user_proxy;
pub mod web_surfer;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::team::{EventSender, Message, MessageContent, TeamEvent};

pub use assistant::AssistantAgent;
pub use user_proxy::{ChannelInput, InputSource, StdinInput, UserProxyAgent};
pub use web_surfer::WebSurferAgent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    TextReply,
    ToolExec,
    Browse,
    HumanBlock,
}

/// 参与者描述：整个运行期间不可变，发给决策服务用于选人
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,
    pub capabilities: BTreeSet<Capability>,
    pub description: String,
}

impl AgentDescriptor {
    pub fn new(
        id: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            capabilities: capabilities.into_iter().collect(),
            description: description.into(),
        }
    }
}

/// 派发时的只读上下文：任务与 Transcript 的值拷贝
#[derive(Clone, Debug)]
pub struct ContextSnapshot {
    pub task: String,
    pub transcript: Arc<[Message]>,
}

/// 流式片段出口；片段只发往 Sink，不影响调度
#[derive(Clone)]
pub struct ChunkSink {
    agent_id: String,
    tx: Option<EventSender>,
    emitted: Arc<AtomicBool>,
}

impl ChunkSink {
    pub fn new(agent_id: impl Into<String>, tx: Option<EventSender>) -> Self {
        Self {
            agent_id: agent_id.into(),
            tx,
            emitted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 不连接任何 Sink（测试或离线调用）
    pub fn detached(agent_id: impl Into<String>) -> Self {
        Self::new(agent_id, None)
    }

    pub fn send(&self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        self.emitted.store(true, Ordering::Relaxed);
        if let Some(tx) = &self.tx {
            let _ = tx.send(TeamEvent::Chunk {
                agent_id: self.agent_id.clone(),
                text,
            });
        }
    }

    pub fn emitted(&self) -> bool {
        self.emitted.load(Ordering::Relaxed)
    }
}

/// 参与者接口：返回本轮的终结消息内容
///
/// 实现方可以在内部阻塞（等待人类、浏览器、子进程），对编排器而言与慢计算无异。
/// 不得修改编排器状态，只能读取传入的快照。
#[async_trait]
pub trait Agent: Send + Sync {
    fn descriptor(&self) -> &AgentDescriptor;

    fn id(&self) -> &str {
        &self.descriptor().id
    }

    async fn act(
        &self,
        instructions: &str,
        context: ContextSnapshot,
        sink: ChunkSink,
    ) -> Result<MessageContent, AgentError>;
}

/// 将 Transcript 渲染为 `[sender]: text` 形式的单行列表（供 prompt 拼接）
pub(crate) fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("[{}]: {}", m.sender, m.content.as_text()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 截断到 max_chars 个字符，超出时追加省略标记
pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        s.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        s.to_string()
    }
}
