//! 群聊编排器：规划-派发-等待-整合主循环
//!
//! 每次 `run` 创建独立的 OrchestratorRun（自有 TaskLedger 与 Transcript），同一 GroupChat 可并发运行多个任务。
//! 单次运行内同一时刻只有一个派发在途，因此 Transcript 天然全序、账本更新无需加锁。
//!
//! 终止优先级：人类 abort > 终止条件（MaxTurns 等）> 停滞。终止条件若只因停滞计数触发，归类为 Stalled。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::agents::{Agent, AgentDescriptor, ChunkSink, ContextSnapshot};
use crate::core::{AgentError, OracleRecovery, RecoveryEngine, RunPhase, TeamError, TurnRecovery};
use crate::team::events::send_event;
use crate::team::{
    Decision, DecisionOracle, EventSender, LedgerSummary, Message, MessageContent, OracleRequest,
    TaskLedger, TeamEvent, TerminationCondition, Transcript,
};

pub const DEFAULT_FINAL_ANSWER_PROMPT: &str =
    "Review the conversation above and provide a final answer to the original task in simple markdown.";

/// 编排参数；在 GroupChat 构造时校验
#[derive(Clone, Debug)]
pub struct TeamConfig {
    /// 总轮数上限（与 termination 取 OR）
    pub max_turns: u32,
    /// 停滞计数超过此值即 Stalled
    pub max_stalls: u32,
    pub termination: Option<TerminationCondition>,
    pub final_answer_prompt: String,
    /// 单轮等待上限；None 表示不限
    pub turn_timeout: Option<Duration>,
    pub oracle_max_retries: u32,
    pub oracle_retry_delay: Duration,
    /// 发给决策服务的最近消息条数
    pub transcript_tail_len: usize,
    /// 负责汇总最终答案的参与者
    pub finalizer: String,
    /// RequestHumanInput 决策的派发目标
    pub human_proxy: Option<String>,
}

impl TeamConfig {
    pub fn new(finalizer: impl Into<String>) -> Self {
        Self {
            max_turns: 20,
            max_stalls: 3,
            termination: None,
            final_answer_prompt: DEFAULT_FINAL_ANSWER_PROMPT.to_string(),
            turn_timeout: Some(Duration::from_secs(300)),
            oracle_max_retries: 3,
            oracle_retry_delay: Duration::from_millis(500),
            transcript_tail_len: 20,
            finalizer: finalizer.into(),
            human_proxy: None,
        }
    }

    pub fn with_termination(mut self, condition: TerminationCondition) -> Self {
        self.termination = Some(condition);
        self
    }

    pub fn with_human_proxy(mut self, agent_id: impl Into<String>) -> Self {
        self.human_proxy = Some(agent_id.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// 正常结束并由 finalizer 给出最终答案
    Finalized { answer: String },
    /// 人类 abort：立即终止，不汇总答案
    Aborted { by: String },
    Stalled { stall_count: u32 },
    Cancelled,
    Failed(TeamError),
}

/// 一次运行的结果：结局 + 最终 Transcript 与账本
#[derive(Debug)]
pub struct RunResult {
    pub outcome: Outcome,
    pub transcript: Vec<Message>,
    pub ledger: LedgerSummary,
}

/// 群聊团队：参与者、决策服务与编排参数（运行间共享且只读）
pub struct GroupChat {
    participants: Vec<Arc<dyn Agent>>,
    index: HashMap<String, usize>,
    descriptors: Vec<AgentDescriptor>,
    oracle: Arc<dyn DecisionOracle>,
    config: TeamConfig,
    /// MaxTurns(max_turns) OR 用户条件
    condition: TerminationCondition,
    recovery: RecoveryEngine,
    event_tx: Option<EventSender>,
}

impl GroupChat {
    pub fn new(
        participants: Vec<Arc<dyn Agent>>,
        oracle: Arc<dyn DecisionOracle>,
        config: TeamConfig,
    ) -> Result<Self, TeamError> {
        if participants.is_empty() {
            return Err(TeamError::InvalidConfig("no participants".to_string()));
        }
        let mut index = HashMap::new();
        for (i, agent) in participants.iter().enumerate() {
            if index.insert(agent.id().to_string(), i).is_some() {
                return Err(TeamError::InvalidConfig(format!(
                    "duplicate participant id: {}",
                    agent.id()
                )));
            }
        }
        if !index.contains_key(&config.finalizer) {
            return Err(TeamError::UnknownAgent(config.finalizer.clone()));
        }
        if let Some(human) = &config.human_proxy {
            if !index.contains_key(human) {
                return Err(TeamError::UnknownAgent(human.clone()));
            }
        }

        if config.max_turns == 0 {
            return Err(TeamError::InvalidConfig("max_turns must be at least 1".to_string()));
        }
        let condition = match &config.termination {
            Some(c) => TerminationCondition::MaxTurns(config.max_turns) | c.clone(),
            None => TerminationCondition::MaxTurns(config.max_turns),
        };
        // 空记录上已满足的条件（如 MaxTurns(0)）会在第一轮之后才被检查到
        if condition.evaluate(&Transcript::new(), &TaskLedger::new("")) {
            return Err(TeamError::InvalidConfig(format!(
                "termination condition holds before the first turn: {}",
                condition
            )));
        }
        let descriptors = participants.iter().map(|a| a.descriptor().clone()).collect();
        let recovery = RecoveryEngine::new(config.oracle_max_retries, config.oracle_retry_delay);

        Ok(Self {
            participants,
            index,
            descriptors,
            oracle,
            config,
            condition,
            recovery,
            event_tx: None,
        })
    }

    pub fn with_event_sink(mut self, tx: EventSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn participants(&self) -> &[AgentDescriptor] {
        &self.descriptors
    }

    pub fn config(&self) -> &TeamConfig {
        &self.config
    }

    pub fn termination_condition(&self) -> &TerminationCondition {
        &self.condition
    }

    fn agent(&self, id: &str) -> Option<&Arc<dyn Agent>> {
        self.index.get(id).map(|&i| &self.participants[i])
    }

    fn is_human_proxy(&self, id: &str) -> bool {
        self.config.human_proxy.as_deref() == Some(id)
    }

    pub async fn run(&self, task: &str) -> RunResult {
        self.run_with_cancel(task, CancellationToken::new()).await
    }

    pub async fn run_with_cancel(&self, task: &str, cancel: CancellationToken) -> RunResult {
        let run_id = uuid::Uuid::new_v4();
        tracing::info!(%run_id, condition = %self.condition, "Team run started");

        let mut run = OrchestratorRun::new(self, task, cancel);
        let outcome = run.drive().await;
        self.emit_outcome(&outcome);

        tracing::info!(
            %run_id,
            turns = run.ledger.turn_count(),
            stalls = run.ledger.stall_count(),
            outcome = ?outcome,
            "Team run finished"
        );
        RunResult {
            outcome,
            transcript: run.transcript.messages().to_vec(),
            ledger: run.ledger.summary(),
        }
    }

    fn emit_outcome(&self, outcome: &Outcome) {
        let ev = match outcome {
            Outcome::Finalized { answer } => TeamEvent::RunTerminated {
                answer: Some(answer.clone()),
            },
            Outcome::Aborted { .. } => TeamEvent::RunTerminated { answer: None },
            Outcome::Stalled { stall_count } => TeamEvent::RunStalled {
                stall_count: *stall_count,
            },
            Outcome::Cancelled => TeamEvent::RunCancelled,
            Outcome::Failed(e) => TeamEvent::RunFailed {
                reason: e.to_string(),
            },
        };
        send_event(&self.event_tx, ev);
    }
}

/// 规划阶段被打断的原因
enum Interrupt {
    Cancelled,
    Failed(TeamError),
}

/// 整合后的去向
enum Next {
    Continue,
    Abort,
    Terminate,
    Stall,
}

/// 单次运行的会话对象：独占账本与 Transcript
struct OrchestratorRun<'a> {
    team: &'a GroupChat,
    task: String,
    ledger: TaskLedger,
    transcript: Transcript,
    phase: RunPhase,
    /// Agent 返回控制请求时替代下一次决策
    pending: Option<Decision>,
    cancel: CancellationToken,
}

impl<'a> OrchestratorRun<'a> {
    fn new(team: &'a GroupChat, task: &str, cancel: CancellationToken) -> Self {
        Self {
            team,
            task: task.to_string(),
            ledger: TaskLedger::new(task),
            transcript: Transcript::new(),
            phase: RunPhase::Planning,
            pending: None,
            cancel,
        }
    }

    fn transition(&mut self, next: RunPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "invalid phase transition {} -> {}",
            self.phase,
            next
        );
        tracing::debug!(from = %self.phase, to = %next, "phase");
        self.phase = next;
    }

    async fn drive(&mut self) -> Outcome {
        let team = self.team;
        loop {
            if self.cancel.is_cancelled() {
                self.transition(RunPhase::Terminated);
                return Outcome::Cancelled;
            }

            let (decision, progress_made) = match self.plan().await {
                Ok(step) => step,
                Err(Interrupt::Cancelled) => {
                    self.transition(RunPhase::Terminated);
                    return Outcome::Cancelled;
                }
                Err(Interrupt::Failed(e)) => {
                    tracing::error!(error = %e, "Run failed during planning");
                    self.transition(RunPhase::Terminated);
                    return Outcome::Failed(e);
                }
            };

            let (agent, instructions) = match decision {
                Decision::Stalled => {
                    tracing::warn!(stalls = self.ledger.stall_count(), "Oracle declared the team stalled");
                    self.transition(RunPhase::Stalled);
                    return Outcome::Stalled {
                        stall_count: self.ledger.stall_count(),
                    };
                }
                Decision::Finalize { answer_prompt } => {
                    return self.finalize(answer_prompt).await;
                }
                Decision::RequestHumanInput { reason } => {
                    let human = team
                        .config
                        .human_proxy
                        .as_deref()
                        .and_then(|id| team.agent(id));
                    match human {
                        Some(agent) => (agent, reason),
                        None => {
                            self.transition(RunPhase::Terminated);
                            return Outcome::Failed(TeamError::UnknownAgent(
                                "<human proxy>".to_string(),
                            ));
                        }
                    }
                }
                Decision::SelectSpeaker {
                    agent_id,
                    instructions,
                } => match team.agent(&agent_id) {
                    Some(agent) => (agent, instructions),
                    None => {
                        tracing::error!(agent = %agent_id, "Oracle selected an unknown agent");
                        self.transition(RunPhase::Terminated);
                        return Outcome::Failed(TeamError::UnknownAgent(agent_id));
                    }
                },
            };

            let (result, streamed) = match self.dispatch(agent.as_ref(), &instructions).await {
                Some(r) => r,
                None => {
                    tracing::info!(agent = %agent.id(), "Run cancelled while awaiting agent");
                    self.transition(RunPhase::Terminated);
                    return Outcome::Cancelled;
                }
            };

            match self.integrate(agent.id(), result, streamed, progress_made) {
                Next::Continue => self.transition(RunPhase::Planning),
                Next::Abort => {
                    tracing::info!(agent = %agent.id(), "Human proxy aborted the run");
                    self.transition(RunPhase::Terminated);
                    return Outcome::Aborted {
                        by: agent.id().to_string(),
                    };
                }
                Next::Terminate => return self.finalize(None).await,
                Next::Stall => {
                    self.transition(RunPhase::Stalled);
                    return Outcome::Stalled {
                        stall_count: self.ledger.stall_count(),
                    };
                }
            }
        }
    }

    /// Planning：取替代决策或咨询决策服务（有限次重试）
    async fn plan(&mut self) -> Result<(Decision, bool), Interrupt> {
        if let Some(decision) = self.pending.take() {
            tracing::debug!(?decision, "Using substituted decision");
            return Ok((decision, true));
        }

        let team = self.team;
        let request = OracleRequest {
            task: self.task.clone(),
            transcript_tail: self.transcript.tail(team.config.transcript_tail_len).to_vec(),
            ledger: self.ledger.summary(),
            participants: team.descriptors.clone(),
        };

        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Interrupt::Cancelled),
                r = team.oracle.decide(&request) => r,
            };
            let parsed = result.and_then(|resp| Decision::try_from(&resp).map(|d| (d, resp)));

            match parsed {
                Ok((decision, resp)) => {
                    if let Some(plan) = resp.plan {
                        self.ledger.set_plan(plan);
                    }
                    for (name, value) in resp.facts {
                        self.ledger.record_fact(name, value);
                    }
                    tracing::debug!(?decision, progress = resp.progress_made, "Oracle decision");
                    return Ok((decision, resp.progress_made));
                }
                Err(e) => match team.recovery.for_oracle_error(&e, attempt) {
                    OracleRecovery::Retry(delay) => {
                        tracing::warn!(error = %e, attempt, "Oracle call failed, retrying in {:?}", delay);
                        tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => return Err(Interrupt::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                        attempt += 1;
                    }
                    OracleRecovery::Fail => {
                        return Err(Interrupt::Failed(TeamError::OracleFailure(e.to_string())));
                    }
                },
            }
        }
    }

    /// Dispatching + Awaiting：返回 None 表示运行被取消（本轮不整合）
    async fn dispatch(
        &mut self,
        agent: &dyn Agent,
        instructions: &str,
    ) -> Option<(Result<MessageContent, AgentError>, bool)> {
        self.transition(RunPhase::Dispatching);
        let turn = self.ledger.turn_count() + 1;
        tracing::info!(agent = %agent.id(), turn, "Dispatching turn");
        send_event(
            &self.team.event_tx,
            TeamEvent::TurnStarted {
                agent_id: agent.id().to_string(),
                turn,
            },
        );

        self.transition(RunPhase::Awaiting);
        let sink = ChunkSink::new(agent.id(), self.team.event_tx.clone());
        let result = self.await_agent(agent, instructions, sink.clone()).await?;
        Some((result, sink.emitted()))
    }

    /// 唯一挂起点：等待终结消息、单轮超时或取消
    async fn await_agent(
        &self,
        agent: &dyn Agent,
        instructions: &str,
        sink: ChunkSink,
    ) -> Option<Result<MessageContent, AgentError>> {
        let context = ContextSnapshot {
            task: self.task.clone(),
            transcript: self.transcript.snapshot(),
        };
        let act = agent.act(instructions, context, sink);
        let timeout = self.team.config.turn_timeout;

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            r = async {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, act)
                        .await
                        .unwrap_or_else(|_| Err(AgentError::Timeout(limit.as_secs()))),
                    None => act.await,
                }
            } => r,
        };

        if self.cancel.is_cancelled() {
            return None;
        }
        Some(result)
    }

    /// Integrating：同步执行，不含 await，对取消而言是原子的
    fn integrate(
        &mut self,
        agent_id: &str,
        result: Result<MessageContent, AgentError>,
        streamed: bool,
        progress_made: bool,
    ) -> Next {
        self.transition(RunPhase::Integrating);
        let team = self.team;

        let (content, progress) = match result {
            Ok(content) => (content, progress_made),
            Err(e) => {
                tracing::warn!(agent = %agent_id, error = %e, "Agent turn failed, recording as error");
                let progress = match team.recovery.for_agent_error(&e) {
                    TurnRecovery::RecordError => progress_made,
                    TurnRecovery::RecordErrorAsStall => false,
                };
                (MessageContent::error(e.to_string()), progress)
            }
        };

        let message = self.transcript.append(agent_id, content, streamed).clone();
        self.ledger.record_turn(progress);
        tracing::info!(
            agent = %agent_id,
            turn = self.ledger.turn_count(),
            stalls = self.ledger.stall_count(),
            progress,
            "Turn integrated"
        );
        send_event(&team.event_tx, TeamEvent::TurnEnded { message: message.clone() });

        // 只有人类代理能中止运行；其他参与者的 Abort 只是普通对话内容
        if message.content.is_abort() && team.is_human_proxy(agent_id) {
            return Next::Abort;
        }

        if team.condition.evaluate(&self.transcript, &self.ledger) {
            // 停滞计数清零后仍满足 -> 由轮数/文本等触发，正常终止优先
            return if team
                .condition
                .evaluate(&self.transcript, &self.ledger.without_stalls())
            {
                tracing::info!(condition = %team.condition, "Termination condition met");
                Next::Terminate
            } else {
                tracing::warn!(stalls = self.ledger.stall_count(), "Stall limit reached");
                Next::Stall
            };
        }

        if self.ledger.stall_count() > team.config.max_stalls {
            tracing::warn!(
                stalls = self.ledger.stall_count(),
                max = team.config.max_stalls,
                "Too many stalls"
            );
            return Next::Stall;
        }

        if let Some(reason) = message.content.human_input_request() {
            self.pending = Some(Decision::RequestHumanInput {
                reason: reason.to_string(),
            });
        }
        Next::Continue
    }

    /// 请 finalizer 基于 Transcript 汇总最终答案；不计入轮次
    async fn finalize(&mut self, answer_prompt: Option<String>) -> Outcome {
        self.transition(RunPhase::Finalizing);
        let team = self.team;
        let prompt = answer_prompt.unwrap_or_else(|| team.config.final_answer_prompt.clone());

        let Some(finalizer) = team.agent(&team.config.finalizer) else {
            self.transition(RunPhase::Terminated);
            return Outcome::Failed(TeamError::UnknownAgent(team.config.finalizer.clone()));
        };
        tracing::info!(agent = %finalizer.id(), "Synthesizing final answer");

        let sink = ChunkSink::new(finalizer.id(), team.event_tx.clone());
        let result = self.await_agent(finalizer.as_ref(), &prompt, sink).await;
        self.transition(RunPhase::Terminated);

        let answer = match result {
            None => return Outcome::Cancelled,
            Some(Ok(content)) if content.is_abort() && team.is_human_proxy(finalizer.id()) => {
                return Outcome::Aborted {
                    by: finalizer.id().to_string(),
                };
            }
            Some(Ok(content)) => content.as_text(),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Final answer synthesis failed, using last message");
                self.transcript
                    .last()
                    .map(|m| m.content.as_text())
                    .unwrap_or_default()
            }
        };
        Outcome::Finalized { answer }
    }
}
