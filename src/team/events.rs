//! 运行事件：供 Stream Sink（控制台、SSE 等）展示
//!
//! 纯观察通道：编排器只发送、从不读取，发送失败（接收端已关闭）直接忽略。

use serde::Serialize;
use tokio::sync::mpsc;

use crate::team::Message;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TeamEvent {
    /// 第 turn 轮开始（从 1 计数）
    TurnStarted { agent_id: String, turn: u32 },
    /// Agent 流式输出的一小段；不会进入 Transcript
    Chunk { agent_id: String, text: String },
    /// 已整合进 Transcript 的终结消息
    TurnEnded { message: Message },
    RunTerminated { answer: Option<String> },
    RunStalled { stall_count: u32 },
    RunFailed { reason: String },
    RunCancelled,
}

pub type EventSender = mpsc::UnboundedSender<TeamEvent>;

pub(crate) fn send_event(tx: &Option<EventSender>, ev: TeamEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
