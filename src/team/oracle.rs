//! 决策服务（Decision Oracle）：请求/响应契约与基于 LLM 的实现
//!
//! 编排器只依赖 DecisionOracle trait；决策由规则、模型还是人给出对调度正确性无影响。
//! 响应中 `kind` 缺失或字段不全视为契约违规（OracleError::Malformed），由编排器有限次重试。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::agents::AgentDescriptor;
use crate::core::OracleError;
use crate::llm::{ChatMessage, LlmClient};
use crate::team::{LedgerSummary, Message};

#[derive(Clone, Debug, Serialize)]
pub struct OracleRequest {
    pub task: String,
    pub transcript_tail: Vec<Message>,
    pub ledger: LedgerSummary,
    pub participants: Vec<AgentDescriptor>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    SelectSpeaker,
    RequestHumanInput,
    Finalize,
    Stalled,
}

/// 决策服务原始响应
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OracleResponse {
    /// 决策类型：select_speaker / request_human_input / finalize / stalled
    pub kind: Option<DecisionKind>,
    /// select_speaker 时必填：下一位发言者 id
    #[serde(default)]
    pub agent_id: Option<String>,
    /// 给发言者的具体指令
    #[serde(default)]
    pub instructions: Option<String>,
    /// request_human_input 时向人类说明原因
    #[serde(default)]
    pub reason: Option<String>,
    /// finalize 时覆盖默认的最终答案提示
    #[serde(default)]
    pub answer_prompt: Option<String>,
    /// 自上次决策以来是否有实质进展
    #[serde(default)]
    pub progress_made: bool,
    /// 修订后的计划（可选，整体替换）
    #[serde(default)]
    pub plan: Option<Vec<String>>,
    /// 新获得的事实（合并进账本）
    #[serde(default)]
    pub facts: BTreeMap<String, String>,
}

impl OracleResponse {
    pub fn select(agent_id: impl Into<String>, instructions: impl Into<String>, progress_made: bool) -> Self {
        Self {
            kind: Some(DecisionKind::SelectSpeaker),
            agent_id: Some(agent_id.into()),
            instructions: Some(instructions.into()),
            progress_made,
            ..Self::default()
        }
    }

    pub fn request_human(reason: impl Into<String>, progress_made: bool) -> Self {
        Self {
            kind: Some(DecisionKind::RequestHumanInput),
            reason: Some(reason.into()),
            progress_made,
            ..Self::default()
        }
    }

    pub fn finalize(progress_made: bool) -> Self {
        Self {
            kind: Some(DecisionKind::Finalize),
            progress_made,
            ..Self::default()
        }
    }

    pub fn stalled() -> Self {
        Self {
            kind: Some(DecisionKind::Stalled),
            ..Self::default()
        }
    }
}

/// 经校验的决策
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    SelectSpeaker {
        agent_id: String,
        instructions: String,
    },
    RequestHumanInput {
        reason: String,
    },
    Finalize {
        answer_prompt: Option<String>,
    },
    Stalled,
}

impl TryFrom<&OracleResponse> for Decision {
    type Error = OracleError;

    fn try_from(resp: &OracleResponse) -> Result<Self, Self::Error> {
        let kind = resp
            .kind
            .ok_or_else(|| OracleError::Malformed("missing `kind`".to_string()))?;
        let non_empty = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        match kind {
            DecisionKind::SelectSpeaker => {
                let agent_id = non_empty(&resp.agent_id).ok_or_else(|| {
                    OracleError::Malformed("select_speaker without `agent_id`".to_string())
                })?;
                Ok(Decision::SelectSpeaker {
                    agent_id,
                    instructions: resp.instructions.clone().unwrap_or_default(),
                })
            }
            DecisionKind::RequestHumanInput => Ok(Decision::RequestHumanInput {
                reason: non_empty(&resp.reason)
                    .or_else(|| non_empty(&resp.instructions))
                    .unwrap_or_else(|| "The team needs your input.".to_string()),
            }),
            DecisionKind::Finalize => Ok(Decision::Finalize {
                answer_prompt: non_empty(&resp.answer_prompt),
            }),
            DecisionKind::Stalled => Ok(Decision::Stalled),
        }
    }
}

#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError>;
}

/// 响应格式的 JSON Schema，拼入 prompt
pub fn oracle_response_schema_json() -> String {
    let schema = schema_for!(OracleResponse);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 从模型输出中提取 JSON 对象（```json 代码块或最外层花括号）
pub fn extract_json_object(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

pub fn parse_oracle_output(output: &str) -> Result<OracleResponse, OracleError> {
    let json = extract_json_object(output)
        .ok_or_else(|| OracleError::Malformed(format!("no JSON object in: {}", output.trim())))?;
    serde_json::from_str(json).map_err(|e| OracleError::Malformed(format!("{}: {}", e, json)))
}

const ORACLE_SYSTEM_PROMPT: &str = "You are the orchestrator of a team of agents working on a task. \
After every turn you review the conversation and decide what happens next. \
Select the single best team member to speak next and give them precise instructions, \
request human input when a login, cookie prompt or explicit confirmation is needed, \
finalize when the task is complete, or declare the team stalled when no further progress is possible. \
Set progress_made to false when the last turns repeated themselves or produced nothing new. \
Reply with ONE JSON object matching this schema and nothing else:";

/// 基于 LLM 的决策服务
pub struct LlmOracle {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl LlmOracle {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            system_prompt: format!("{}\n{}", ORACLE_SYSTEM_PROMPT, oracle_response_schema_json()),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    fn build_prompt(request: &OracleRequest) -> String {
        let mut s = format!("## Task\n{}\n\n## Team\n", request.task);
        for p in &request.participants {
            let caps: Vec<String> = p
                .capabilities
                .iter()
                .map(|c| format!("{:?}", c))
                .collect();
            s.push_str(&format!("- {} [{}]: {}\n", p.id, caps.join(", "), p.description));
        }
        let ledger = &request.ledger;
        s.push_str(&format!(
            "\n## Ledger\nturns: {}, stalls: {}, last progress at turn {}\n",
            ledger.turn_count, ledger.stall_count, ledger.last_progress_turn
        ));
        if !ledger.plan.is_empty() {
            s.push_str("Plan:\n");
            for (i, step) in ledger.plan.iter().enumerate() {
                s.push_str(&format!("{}. {}\n", i + 1, step));
            }
        }
        if !ledger.facts.is_empty() {
            s.push_str("Facts:\n");
            for (k, v) in &ledger.facts {
                s.push_str(&format!("- {}: {}\n", k, v));
            }
        }
        s.push_str("\n## Recent conversation\n");
        if request.transcript_tail.is_empty() {
            s.push_str("(nothing yet)\n");
        } else {
            s.push_str(&crate::agents::render_transcript(&request.transcript_tail));
            s.push('\n');
        }
        s
    }
}

#[async_trait]
impl DecisionOracle for LlmOracle {
    async fn decide(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError> {
        let messages = vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(Self::build_prompt(request)),
        ];
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| OracleError::Unreachable(e.to_string()))?;
        parse_oracle_output(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Capability;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_parse_fenced_json() {
        let out = "Next:\n```json\n{\"kind\": \"select_speaker\", \"agent_id\": \"web_agent\", \"instructions\": \"open the page\", \"progress_made\": true}\n```";
        let resp = parse_oracle_output(out).unwrap();
        assert_eq!(resp.kind, Some(DecisionKind::SelectSpeaker));
        assert!(resp.progress_made);
        assert_eq!(
            Decision::try_from(&resp).unwrap(),
            Decision::SelectSpeaker {
                agent_id: "web_agent".into(),
                instructions: "open the page".into()
            }
        );
    }

    #[test]
    fn test_missing_kind_is_malformed() {
        let resp = parse_oracle_output(r#"{"agent_id": "assistant"}"#).unwrap();
        assert!(matches!(
            Decision::try_from(&resp),
            Err(OracleError::Malformed(_))
        ));
        assert!(parse_oracle_output("I think the assistant should go").is_err());
    }

    #[test]
    fn test_select_without_agent_is_malformed() {
        let resp = OracleResponse {
            kind: Some(DecisionKind::SelectSpeaker),
            agent_id: Some("  ".into()),
            ..OracleResponse::default()
        };
        assert!(Decision::try_from(&resp).is_err());
    }

    #[test]
    fn test_finalize_and_human_defaults() {
        assert_eq!(
            Decision::try_from(&OracleResponse::finalize(true)).unwrap(),
            Decision::Finalize { answer_prompt: None }
        );
        let human = OracleResponse {
            kind: Some(DecisionKind::RequestHumanInput),
            instructions: Some("accept cookies?".into()),
            ..OracleResponse::default()
        };
        assert_eq!(
            Decision::try_from(&human).unwrap(),
            Decision::RequestHumanInput {
                reason: "accept cookies?".into()
            }
        );
    }

    #[test]
    fn test_schema_mentions_kind() {
        let schema = oracle_response_schema_json();
        assert!(schema.contains("progress_made"));
        assert!(schema.contains("select_speaker"));
    }

    #[tokio::test]
    async fn test_llm_oracle_decides() {
        let llm = Arc::new(MockLlmClient::with_responses([
            r#"{"kind": "finalize", "progress_made": true, "facts": {"title": "DocAider"}}"#,
        ]));
        let oracle = LlmOracle::new(llm);
        let request = OracleRequest {
            task: "summarize".into(),
            transcript_tail: vec![],
            ledger: LedgerSummary::default(),
            participants: vec![AgentDescriptor::new(
                "assistant",
                [Capability::TextReply],
                "helper",
            )],
        };
        let resp = oracle.decide(&request).await.unwrap();
        assert_eq!(resp.kind, Some(DecisionKind::Finalize));
        assert_eq!(resp.facts["title"], "DocAider");
        assert!(LlmOracle::build_prompt(&request).contains("- assistant [TextReply]: helper"));
    }
}
