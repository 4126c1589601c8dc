//! 核心层：错误与恢复、运行阶段、会话监管、团队构建

pub mod builder;
pub mod error;
pub mod recovery;
pub mod session_supervisor;
pub mod state;

pub use builder::TeamBuilder;
pub use error::{AgentError, OracleError, TeamError};
pub use recovery::{OracleRecovery, RecoveryEngine, TurnRecovery};
pub use session_supervisor::SessionSupervisor;
pub use state::RunPhase;
