//! 错误类型：运行级致命错误、Agent 执行错误、决策服务错误
//!
//! 与 RecoveryEngine 配合：TeamError 直接结束运行（Outcome::Failed），
//! AgentError 写入 Transcript 作为对话内容，OracleError 在有限次重试后升级为 TeamError::OracleFailure。

use thiserror::Error;

use crate::llm::LlmError;

/// 运行级错误：只有这两类（及构造期配置错误）会以 Outcome::Failed 暴露给调用方
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TeamError {
    /// 决策服务不可达或持续返回非法决策（已用尽重试）
    #[error("Oracle failure: {0}")]
    OracleFailure(String),

    /// 决策引用了不在参与者集合中的 Agent，不重试
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Invalid team config: {0}")]
    InvalidConfig(String),
}

/// Agent 单轮执行错误：可恢复，记录为 Error 消息后继续调度
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 单轮超过 turn_timeout，由编排器生成
    #[error("Turn timed out after {0}s")]
    Timeout(u64),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// 人类输入通道读取失败
    #[error("Input error: {0}")]
    Input(String),
}

/// 决策服务错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("Oracle unreachable: {0}")]
    Unreachable(String),

    #[error("Malformed decision: {0}")]
    Malformed(String),
}
