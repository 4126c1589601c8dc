//! 任务账本：编排器的工作记忆
//!
//! 原始任务、计划、已收集事实与轮次/停滞计数。纯状态容器，不做 I/O；
//! 只由编排器在每轮整合后、每次决策后修改。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default)]
pub struct TaskLedger {
    original_task: String,
    plan: Vec<String>,
    facts: BTreeMap<String, String>,
    turn_count: u32,
    stall_count: u32,
    last_progress_turn: u32,
}

/// 账本的可序列化拷贝（发往决策服务）
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub task: String,
    pub plan: Vec<String>,
    pub facts: BTreeMap<String, String>,
    pub turn_count: u32,
    pub stall_count: u32,
    pub last_progress_turn: u32,
}

impl TaskLedger {
    pub fn new(original_task: impl Into<String>) -> Self {
        Self {
            original_task: original_task.into(),
            ..Self::default()
        }
    }

    /// 每次 Agent 派发整合后调用一次
    pub fn record_turn(&mut self, progress_made: bool) {
        self.turn_count += 1;
        if progress_made {
            self.stall_count = 0;
            self.last_progress_turn = self.turn_count;
        } else {
            self.stall_count += 1;
        }
    }

    pub fn record_fact(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.facts.insert(name.into(), value.into());
    }

    pub fn set_plan(&mut self, steps: Vec<String>) {
        self.plan = steps;
    }

    pub fn original_task(&self) -> &str {
        &self.original_task
    }

    pub fn plan(&self) -> &[String] {
        &self.plan
    }

    pub fn facts(&self) -> &BTreeMap<String, String> {
        &self.facts
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn stall_count(&self) -> u32 {
        self.stall_count
    }

    pub fn last_progress_turn(&self) -> u32 {
        self.last_progress_turn
    }

    /// 停滞计数清零的副本；用于判断终止条件是否「仅因停滞」而触发
    pub fn without_stalls(&self) -> TaskLedger {
        TaskLedger {
            stall_count: 0,
            ..self.clone()
        }
    }

    pub fn summary(&self) -> LedgerSummary {
        LedgerSummary {
            task: self.original_task.clone(),
            plan: self.plan.clone(),
            facts: self.facts.clone(),
            turn_count: self.turn_count,
            stall_count: self.stall_count,
            last_progress_turn: self.last_progress_turn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_resets_stalls() {
        let mut ledger = TaskLedger::new("task");
        ledger.record_turn(false);
        ledger.record_turn(false);
        assert_eq!(ledger.stall_count(), 2);
        ledger.record_turn(true);
        assert_eq!(ledger.stall_count(), 0);
        assert_eq!(ledger.last_progress_turn(), 3);
        ledger.record_turn(false);
        assert_eq!(ledger.turn_count(), 4);
        assert_eq!(ledger.stall_count(), 1);
        assert!(ledger.turn_count() >= ledger.last_progress_turn());
    }

    #[test]
    fn test_record_fact_upserts() {
        let mut ledger = TaskLedger::new("task");
        ledger.record_fact("url", "https://a");
        ledger.record_fact("url", "https://a");
        assert_eq!(ledger.facts().len(), 1);
        ledger.record_fact("url", "https://b");
        assert_eq!(ledger.facts()["url"], "https://b");
    }

    #[test]
    fn test_without_stalls_keeps_turns() {
        let mut ledger = TaskLedger::new("task");
        ledger.set_plan(vec!["open page".into()]);
        ledger.record_turn(false);
        let masked = ledger.without_stalls();
        assert_eq!(masked.stall_count(), 0);
        assert_eq!(masked.turn_count(), 1);
        assert_eq!(masked.plan(), ledger.plan());
    }
}
