//! 错误恢复引擎
//!
//! 根据错误类型返回恢复动作：Agent 错误决定是否额外计入停滞，决策服务错误决定重试（指数退避）还是放弃。

use std::time::Duration;

use crate::core::{AgentError, OracleError};

/// Agent 单轮出错后的处理方式（两者都会把错误写入 Transcript）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRecovery {
    /// 作为 Error 消息记录，停滞计数仍以决策服务的 progress 判定为准
    RecordError,
    /// 记录并强制计为一次无进展（超时）
    RecordErrorAsStall,
}

/// 决策服务出错后的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleRecovery {
    Retry(Duration),
    Fail,
}

/// 重试退避上限
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    max_oracle_retries: u32,
    base_delay: Duration,
}

impl RecoveryEngine {
    pub fn new(max_oracle_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_oracle_retries,
            base_delay,
        }
    }

    pub fn for_agent_error(&self, err: &AgentError) -> TurnRecovery {
        match err {
            AgentError::Timeout(_) => TurnRecovery::RecordErrorAsStall,
            _ => TurnRecovery::RecordError,
        }
    }

    /// attempt 从 0 开始计数（第一次失败为 0）
    pub fn for_oracle_error(&self, err: &OracleError, attempt: u32) -> OracleRecovery {
        if attempt >= self.max_oracle_retries {
            return OracleRecovery::Fail;
        }
        match err {
            OracleError::Unreachable(_) | OracleError::Malformed(_) => {
                let factor = 2u32.saturating_pow(attempt);
                let delay = self.base_delay.saturating_mul(factor).min(MAX_BACKOFF);
                OracleRecovery::Retry(delay)
            }
        }
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_counts_as_stall() {
        let engine = RecoveryEngine::default();
        assert_eq!(
            engine.for_agent_error(&AgentError::Timeout(30)),
            TurnRecovery::RecordErrorAsStall
        );
        assert_eq!(
            engine.for_agent_error(&AgentError::ToolExecutionFailed("boom".into())),
            TurnRecovery::RecordError
        );
    }

    #[test]
    fn test_oracle_backoff_doubles() {
        let engine = RecoveryEngine::new(3, Duration::from_millis(100));
        let err = OracleError::Malformed("no kind".into());
        assert_eq!(
            engine.for_oracle_error(&err, 0),
            OracleRecovery::Retry(Duration::from_millis(100))
        );
        assert_eq!(
            engine.for_oracle_error(&err, 2),
            OracleRecovery::Retry(Duration::from_millis(400))
        );
        assert_eq!(engine.for_oracle_error(&err, 3), OracleRecovery::Fail);
    }

    #[test]
    fn test_zero_retries_fails_immediately() {
        let engine = RecoveryEngine::new(0, Duration::from_millis(100));
        let err = OracleError::Unreachable("connection refused".into());
        assert_eq!(engine.for_oracle_error(&err, 0), OracleRecovery::Fail);
    }

    #[test]
    fn test_backoff_is_capped() {
        let engine = RecoveryEngine::new(40, Duration::from_secs(1));
        let err = OracleError::Unreachable("down".into());
        assert_eq!(
            engine.for_oracle_error(&err, 20),
            OracleRecovery::Retry(MAX_BACKOFF)
        );
    }
}
