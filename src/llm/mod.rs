//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Azure OpenAI / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::MockLlmClient;
pub use openai::{AzureSettings, OpenAiClient, TokenUsage};
pub use traits::{ChatMessage, LlmClient, LlmError, Role, TokenStream};

use crate::config::AppConfig;

/// 默认 Azure API 版本（AZURE_OPENAI_API_VERSION 未设置时）
const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

/// 根据配置与环境变量选择 LLM 后端（Azure OpenAI / OpenAI 兼容 / Mock）
///
/// 凭据只从环境变量读取；端点、部署名等可由配置文件给出，环境变量优先。
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

    let azure_key = env("AZURE_OPENAI_API_KEY");
    let azure_endpoint = env("AZURE_OPENAI_ENDPOINT").or_else(|| cfg.llm.azure.endpoint.clone());

    if provider == "azure" {
        if let (Some(api_key), Some(endpoint)) = (azure_key, azure_endpoint) {
            let model = env("AZURE_OPENAI_MODEL").unwrap_or_else(|| cfg.llm.model.clone());
            let settings = AzureSettings {
                endpoint,
                deployment: env("AZURE_OPENAI_DEPLOYMENT")
                    .or_else(|| cfg.llm.azure.deployment.clone())
                    .unwrap_or_else(|| model.clone()),
                api_version: env("AZURE_OPENAI_API_VERSION")
                    .or_else(|| cfg.llm.azure.api_version.clone())
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
                api_key,
            };
            tracing::info!(deployment = %settings.deployment, "Using Azure OpenAI LLM ({})", model);
            return Arc::new(OpenAiClient::azure(&settings, &model));
        }
    }

    if let Some(api_key) = env("OPENAI_API_KEY") {
        let model = cfg.llm.model.clone();
        tracing::info!("Using OpenAI LLM ({})", model);
        return Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &model,
            Some(api_key.as_str()),
        ));
    }

    tracing::warn!("No API key set or provider unknown, using Mock LLM");
    Arc::new(MockLlmClient::new())
}
