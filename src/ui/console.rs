//! 控制台 Sink：把 TeamEvent 流渲染到终端
//!
//! 每轮打印带发言者的分隔标题；流式片段原样追加，轮结束时只补换行；非流式消息整段打印。
//! 工具结果过长时折叠。控制信号与错误用不同颜色标出。

use std::io::Write;

use crossterm::style::Stylize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::team::{ControlSignal, Message, MessageContent, TeamEvent};

/// 工具结果在控制台显示的最大字符数
const MAX_TOOL_DISPLAY_CHARS: usize = 600;

fn fold_for_display(content: &str, limit: usize) -> String {
    let total = content.chars().count();
    if total <= limit {
        return content.to_string();
    }
    let head: String = content.chars().take(limit).collect();
    format!("{}\n... [{} chars total, output folded]", head, total)
}

/// 渲染状态：当前是否处于流式输出中
#[derive(Debug, Default)]
pub struct ConsoleRenderer {
    /// 正在流式输出的 agent（含 TurnStarted 之外的最终答案流）
    streaming: Option<String>,
    /// 最终答案已经以片段形式打印过
    final_streamed: bool,
    in_turn: bool,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn header(title: &str) -> String {
        format!("\n{}\n", format!("---------- {} ----------", title).cyan().bold())
    }

    fn render_message(message: &Message) -> String {
        match &message.content {
            MessageContent::Text { text } => format!("{}\n", text),
            MessageContent::ToolResult { tool, output } => format!(
                "{}\n{}\n",
                format!("[tool: {}]", tool).magenta(),
                fold_for_display(output, MAX_TOOL_DISPLAY_CHARS)
            ),
            MessageContent::Control { signal } => {
                let text = match signal {
                    ControlSignal::Abort => "ABORT".to_string(),
                    ControlSignal::Approve => "APPROVE".to_string(),
                    ControlSignal::RequestHumanInput { reason } => {
                        format!("Requesting human input: {}", reason)
                    }
                };
                format!("{}\n", text.yellow().bold())
            }
            MessageContent::Error { error } => format!("{}\n", format!("error: {}", error).red()),
        }
    }

    /// 事件 -> 要写到终端的文本
    pub fn render(&mut self, event: &TeamEvent) -> String {
        match event {
            TeamEvent::TurnStarted { agent_id, turn } => {
                self.in_turn = true;
                self.streaming = None;
                Self::header(&format!("{} (turn {})", agent_id, turn))
            }
            TeamEvent::Chunk { agent_id, text } => {
                let mut out = String::new();
                if !self.in_turn && self.streaming.as_deref() != Some(agent_id.as_str()) {
                    // 轮次之外的片段来自最终答案汇总
                    out.push_str(&Self::header(&format!("{} (final answer)", agent_id)));
                    self.final_streamed = true;
                }
                self.streaming = Some(agent_id.clone());
                out.push_str(text);
                out
            }
            TeamEvent::TurnEnded { message } => {
                self.in_turn = false;
                let was_streaming = self.streaming.take().is_some();
                match (&message.content, message.streamed && was_streaming) {
                    // 片段已经打印，文本内容不再重复
                    (MessageContent::Text { .. }, true) => "\n".to_string(),
                    (_, true) => format!("\n{}", Self::render_message(message)),
                    (_, false) => Self::render_message(message),
                }
            }
            TeamEvent::RunTerminated { answer } => {
                let streamed = std::mem::take(&mut self.final_streamed);
                self.streaming = None;
                match answer {
                    Some(_) if streamed => format!("\n{}\n", "========== done ==========".green().bold()),
                    Some(answer) => format!(
                        "\n{}\n{}\n",
                        "========== Final answer ==========".green().bold(),
                        answer
                    ),
                    None => format!("\n{}\n", "========== Aborted by user ==========".yellow().bold()),
                }
            }
            TeamEvent::RunStalled { stall_count } => format!(
                "\n{}\n",
                format!("========== Stalled after {} stalls ==========", stall_count)
                    .yellow()
                    .bold()
            ),
            TeamEvent::RunFailed { reason } => {
                format!("\n{}\n", format!("========== Failed: {} ==========", reason).red().bold())
            }
            TeamEvent::RunCancelled => format!("\n{}\n", "========== Cancelled ==========".yellow().bold()),
        }
    }
}

/// 后台任务消费事件并打印到 stdout；发送端全部 drop 后结束
pub fn spawn_console(mut rx: mpsc::UnboundedReceiver<TeamEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut renderer = ConsoleRenderer::new();
        while let Some(event) = rx.recv().await {
            let text = renderer.render(&event);
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team::Transcript;

    fn message(sender: &str, content: MessageContent, streamed: bool) -> Message {
        let mut t = Transcript::new();
        t.append(sender, content, streamed).clone()
    }

    #[test]
    fn test_streamed_turn_not_repeated() {
        let mut r = ConsoleRenderer::new();
        let header = r.render(&TeamEvent::TurnStarted {
            agent_id: "assistant".into(),
            turn: 1,
        });
        assert!(header.contains("assistant (turn 1)"));
        assert_eq!(
            r.render(&TeamEvent::Chunk {
                agent_id: "assistant".into(),
                text: "Hello wor".into()
            }),
            "Hello wor"
        );
        let end = r.render(&TeamEvent::TurnEnded {
            message: message("assistant", MessageContent::text("Hello world"), true),
        });
        assert!(!end.contains("Hello world"));
    }

    #[test]
    fn test_final_answer_stream_gets_header() {
        let mut r = ConsoleRenderer::new();
        let out = r.render(&TeamEvent::Chunk {
            agent_id: "assistant".into(),
            text: "# Report".into(),
        });
        assert!(out.contains("final answer"));
        assert!(out.ends_with("# Report"));
        let done = r.render(&TeamEvent::RunTerminated {
            answer: Some("# Report".into()),
        });
        assert!(!done.contains("# Report"));
    }

    #[test]
    fn test_non_streamed_and_folded() {
        let mut r = ConsoleRenderer::new();
        let long = "x".repeat(MAX_TOOL_DISPLAY_CHARS + 10);
        let out = r.render(&TeamEvent::TurnEnded {
            message: message(
                "coder_agent",
                MessageContent::ToolResult {
                    tool: "code_execution".into(),
                    output: long,
                },
                false,
            ),
        });
        assert!(out.contains("output folded"));
        let out = r.render(&TeamEvent::RunTerminated { answer: Some("42".into()) });
        assert!(out.contains("42"));
    }
}
