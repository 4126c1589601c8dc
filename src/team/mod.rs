//! 编排核心：Transcript、任务账本、终止条件、决策服务契约、运行事件与主循环

pub mod events;
pub mod ledger;
pub mod oracle;
pub mod orchestrator;
pub mod termination;
pub mod transcript;

pub use events::{EventSender, TeamEvent};
pub use ledger::{LedgerSummary, TaskLedger};
pub use oracle::{
    Decision, DecisionKind, DecisionOracle, LlmOracle, OracleRequest, OracleResponse,
};
pub use orchestrator::{GroupChat, Outcome, RunResult, TeamConfig, DEFAULT_FINAL_ANSWER_PROMPT};
pub use termination::TerminationCondition;
pub use transcript::{AgentId, ControlSignal, Message, MessageContent, Transcript};
