//! 团队构建器：由 AppConfig 组装默认团队
//!
//! 默认团队：web_agent（浏览）、User（人类代理）、assistant（汇总，带代码执行）、coder_agent（代码执行）；
//! 决策服务为 LlmOracle，最终答案由 assistant 汇总。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::agents::{Agent, AssistantAgent, InputSource, StdinInput, UserProxyAgent, WebSurferAgent};
use crate::config::AppConfig;
use crate::core::TeamError;
use crate::llm::LlmClient;
use crate::team::{GroupChat, LlmOracle, TeamConfig, TerminationCondition, DEFAULT_FINAL_ANSWER_PROMPT};
use crate::tools::{LocalCommandLineExecutor, PythonCodeExecutionTool, ToolExecutor, ToolRegistry};

pub const WEB_AGENT: &str = "web_agent";
pub const HUMAN_AGENT: &str = "User";
pub const ASSISTANT_AGENT: &str = "assistant";
pub const CODER_AGENT: &str = "coder_agent";

pub struct TeamBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    human_input: Option<Box<dyn InputSource>>,
}

impl TeamBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            human_input: None,
        }
    }

    /// 指定 LLM；未指定时按配置与环境变量选择
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 指定人类输入来源；默认读 stdin
    pub fn with_human_input(mut self, input: impl InputSource + 'static) -> Self {
        self.human_input = Some(Box::new(input));
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build_llm(&self) -> Arc<dyn LlmClient> {
        match &self.llm {
            Some(llm) => Arc::clone(llm),
            None => crate::llm::create_llm_from_config(&self.config),
        }
    }

    /// [team] 段 -> 编排参数
    pub fn team_config(&self) -> TeamConfig {
        let team = &self.config.team;
        let mut cfg = TeamConfig::new(ASSISTANT_AGENT).with_human_proxy(HUMAN_AGENT);
        cfg.max_turns = team.max_turns;
        cfg.max_stalls = team.max_stalls;
        cfg.final_answer_prompt = team
            .final_answer_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FINAL_ANSWER_PROMPT.to_string());
        cfg.turn_timeout = (team.turn_timeout_secs > 0).then(|| Duration::from_secs(team.turn_timeout_secs));
        cfg.oracle_max_retries = team.oracle_max_retries;
        cfg.oracle_retry_delay = Duration::from_millis(team.oracle_retry_delay_ms);
        cfg.transcript_tail_len = team.transcript_tail_len;
        if !team.termination_text.trim().is_empty() {
            cfg = cfg.with_termination(TerminationCondition::text_mention(team.termination_text.trim()));
        }
        cfg
    }

    fn code_tools(&self) -> ToolExecutor {
        let tools = &self.config.tools;
        let executor = LocalCommandLineExecutor::new(
            self.config.app.work_dir.clone(),
            tools.python.clone(),
            tools.code_timeout_secs,
        );
        let mut registry = ToolRegistry::new();
        registry.register(PythonCodeExecutionTool::new(executor));
        // 工具自身有超时，执行器多留一点余量
        ToolExecutor::new(registry, tools.code_timeout_secs + 5)
    }

    fn debug_dir(&self) -> Option<PathBuf> {
        self.config.app.debug_dir.clone()
    }

    pub fn build_participants(&mut self, llm: Arc<dyn LlmClient>) -> Vec<Arc<dyn Agent>> {
        let web = &self.config.web;
        let web_agent = WebSurferAgent::new(WEB_AGENT, web.timeout_secs, web.max_result_chars)
            .with_llm(Arc::clone(&llm))
            .with_start_page(web.start_page.clone())
            .with_debug_dir(self.debug_dir());

        let human = &self.config.human;
        let input: Box<dyn InputSource> = self
            .human_input
            .take()
            .unwrap_or_else(|| Box::new(StdinInput::new()) as Box<dyn InputSource>);
        let user_proxy = UserProxyAgent::new(HUMAN_AGENT, input)
            .with_keywords(human.abort_keywords.clone(), human.approve_keywords.clone());

        let assistant = AssistantAgent::new(
            ASSISTANT_AGENT,
            "An agent that helps summarize information and prepare for distribution using Python code execution.",
            Arc::clone(&llm),
        )
        .with_system_message("You are an AI assistant.")
        .with_tools(self.code_tools())
        .with_streaming(true)
        .with_reflection(true);

        let coder = AssistantAgent::new(CODER_AGENT, "An agent that executes Python code.", llm)
            .with_system_message("You are a coder agent that executes Python code.")
            .with_tools(self.code_tools())
            .with_streaming(true)
            .with_reflection(true);

        vec![
            Arc::new(web_agent) as Arc<dyn Agent>,
            Arc::new(user_proxy),
            Arc::new(assistant),
            Arc::new(coder),
        ]
    }

    /// 组装 GroupChat（事件 Sink 由调用方 with_event_sink 接入）
    pub fn build(mut self) -> Result<GroupChat, TeamError> {
        let llm = self.build_llm();
        let participants = self.build_participants(Arc::clone(&llm));
        let oracle = Arc::new(LlmOracle::new(llm));
        GroupChat::new(participants, oracle, self.team_config())
    }
}
