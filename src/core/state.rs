//! 运行阶段：编排器状态机
//!
//! Planning -> Dispatching -> Awaiting -> Integrating -> (Planning | Stalled | Terminated)；
//! Finalizing 为终止前由 finalizer 汇总答案的阶段。

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// 向决策服务请求下一步
    Planning,
    /// 选定 Agent，准备上下文快照
    Dispatching,
    /// 等待 Agent 返回终结消息（唯一挂起点）
    Awaiting,
    /// 写入 Transcript、更新账本、判定终止
    Integrating,
    Finalizing,
    Stalled,
    Terminated,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Stalled | RunPhase::Terminated)
    }

    /// 状态机允许的迁移；编排器在 debug 构建下断言
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::{Awaiting, Dispatching, Finalizing, Integrating, Planning, Stalled, Terminated};
        match (self, next) {
            (Planning, Dispatching | Finalizing | Stalled | Terminated) => true,
            (Dispatching, Awaiting) => true,
            (Awaiting, Integrating | Terminated) => true,
            (Integrating, Planning | Finalizing | Stalled | Terminated) => true,
            (Finalizing, Terminated) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunPhase::Planning => "planning",
            RunPhase::Dispatching => "dispatching",
            RunPhase::Awaiting => "awaiting",
            RunPhase::Integrating => "integrating",
            RunPhase::Finalizing => "finalizing",
            RunPhase::Stalled => "stalled",
            RunPhase::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(RunPhase::Planning.can_transition_to(RunPhase::Dispatching));
        assert!(RunPhase::Integrating.can_transition_to(RunPhase::Planning));
        assert!(!RunPhase::Planning.can_transition_to(RunPhase::Integrating));
        assert!(!RunPhase::Terminated.can_transition_to(RunPhase::Planning));
        assert!(RunPhase::Stalled.is_terminal());
    }
}
