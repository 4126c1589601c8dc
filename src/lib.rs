//! Hive - 多智能体群聊编排
//!
//! 一个编排器按「规划 -> 派发 -> 等待 -> 整合」循环选择发言者，直到终止、停滞、失败或取消。
//!
//! 模块划分：
//! - **agents**: Agent 契约与内置参与者（Assistant / WebSurfer / UserProxy）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复策略、运行阶段、会话监管、团队构建
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Azure OpenAI / Mock）
//! - **observability**: tracing 日志初始化
//! - **team**: Transcript、任务账本、终止条件、决策服务、编排主循环
//! - **tools**: 工具注册表、执行器与 Python 代码执行
//! - **ui**: 控制台事件渲染

pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod team;
pub mod tools;
pub mod ui;

pub use crate::core::TeamBuilder;
pub use team::{GroupChat, Outcome, RunResult, TeamConfig, TerminationCondition};
