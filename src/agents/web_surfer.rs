//! WebSurferAgent：抓取网页并按指令提取信息
//!
//! 从指令中取第一个 URL（没有则用 start_page），GET 带超时与浏览器 UA；HTML 用 html2text 转为可读文本，
//! 超过 max_result_chars 截断。配置了 LLM 时按指令对页面做摘要，否则直接返回页面文本。
//! 401/403 视为登录墙或 Cookie 墙，返回 RequestHumanInput 让人类介入。

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, StatusCode};

use crate::agents::{truncate_chars, Agent, AgentDescriptor, Capability, ChunkSink, ContextSnapshot};
use crate::core::AgentError;
use crate::llm::{ChatMessage, LlmClient};
use crate::team::{ControlSignal, MessageContent};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

fn url_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s"'<>()\[\]]+"#).ok())
        .as_ref()
}

/// 指令中的第一个 URL（去掉句末标点）
pub fn extract_url(text: &str) -> Option<String> {
    url_regex()?
        .find(text)
        .map(|m| m.as_str().trim_end_matches(&['.', ',', ';', ':', '!', '?'][..]).to_string())
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.starts_with("<html")
        || s.starts_with("<HTML")
        || (s.len() > 20 && s.contains('<') && (s.contains("</") || s.contains("<head") || s.contains("<title")))
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn html_to_text(html: &str) -> String {
    match from_read(html.as_bytes(), 120) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => strip_html_tags(html),
    }
}

enum Fetched {
    Page(String),
    AuthWall(StatusCode),
}

pub struct WebSurferAgent {
    descriptor: AgentDescriptor,
    client: Client,
    llm: Option<Arc<dyn LlmClient>>,
    start_page: Option<String>,
    max_result_chars: usize,
    debug_dir: Option<PathBuf>,
}

impl WebSurferAgent {
    pub fn new(id: impl Into<String>, timeout_secs: u64, max_result_chars: usize) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .unwrap_or_default();
        Self {
            descriptor: AgentDescriptor::new(
                id,
                [Capability::Browse],
                "Browses the web: give it a URL and say what to look for on the page.",
            ),
            client,
            llm: None,
            start_page: None,
            max_result_chars,
            debug_dir: None,
        }
    }

    /// 替换 HTTP 客户端（代理、证书等自定义）
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// 用 LLM 按指令摘要页面
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.descriptor.capabilities.insert(Capability::TextReply);
        self.llm = Some(llm);
        self
    }

    pub fn with_start_page(mut self, url: Option<String>) -> Self {
        self.start_page = url.filter(|u| !u.trim().is_empty());
        self
    }

    /// 抓取到的页面文本另存到该目录（排查用）
    pub fn with_debug_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.debug_dir = dir;
        self
    }

    async fn fetch(&self, url: &str) -> Result<Fetched, AgentError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AgentError::ExecutionFailed(format!("Request {} failed: {}", url, e)))?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(Fetched::AuthWall(status));
        }
        if !status.is_success() {
            return Err(AgentError::ExecutionFailed(format!("{} returned HTTP {}", url, status)));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| AgentError::ExecutionFailed(format!("Read body: {}", e)))?;
        let body = body.trim_start_matches('\u{FEFF}');
        let text = if looks_like_html(body) {
            html_to_text(body)
        } else {
            body.to_string()
        };
        Ok(Fetched::Page(truncate_chars(text.trim(), self.max_result_chars)))
    }

    async fn save_debug(&self, url: &str, text: &str) {
        let Some(dir) = &self.debug_dir else {
            return;
        };
        let path = dir.join(format!("page_{}.txt", uuid::Uuid::new_v4().simple()));
        let result = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, format!("{}\n\n{}", url, text)).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "failed to write page debug file");
        }
    }

    async fn summarize(
        &self,
        llm: &Arc<dyn LlmClient>,
        url: &str,
        page: &str,
        instructions: &str,
        context: &ContextSnapshot,
    ) -> Result<String, AgentError> {
        let messages = vec![
            ChatMessage::system(
                "You are a web surfer. Answer the request using only the page content. Quote exact figures and names.",
            ),
            ChatMessage::user(format!(
                "Overall task: {}\nRequest: {}\n\nPage {}:\n{}",
                context.task, instructions, url, page
            )),
        ];
        Ok(llm.complete(&messages).await?)
    }
}

#[async_trait]
impl Agent for WebSurferAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    async fn act(
        &self,
        instructions: &str,
        context: ContextSnapshot,
        sink: ChunkSink,
    ) -> Result<MessageContent, AgentError> {
        let Some(url) = extract_url(instructions).or_else(|| self.start_page.clone()) else {
            return Ok(MessageContent::text(
                "I need a URL (http:// or https://) to browse. Please include one in the request.",
            ));
        };
        tracing::info!(agent = %self.descriptor.id, url = %url, "web surfer fetch");
        sink.send(format!("Visiting {}\n", url));

        let page = match self.fetch(&url).await? {
            Fetched::Page(text) => text,
            Fetched::AuthWall(status) => {
                return Ok(MessageContent::control(ControlSignal::RequestHumanInput {
                    reason: format!(
                        "{} returned HTTP {}. Please log in or accept cookies, then reply to continue.",
                        url,
                        status.as_u16()
                    ),
                }))
            }
        };
        self.save_debug(&url, &page).await;

        match &self.llm {
            Some(llm) => {
                let summary = self.summarize(llm, &url, &page, instructions, &context).await?;
                Ok(MessageContent::text(summary.trim()))
            }
            None => Ok(MessageContent::text(format!("Content of {}:\n{}", url, page))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// 起一个只应答一次的本地 HTTP 服务，返回其 URL
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}/page", addr)
    }

    /// 直连本地测试服务，不走环境中的代理
    fn local_surfer() -> WebSurferAgent {
        let client = Client::builder().no_proxy().build().unwrap();
        WebSurferAgent::new("web_agent", 5, 1000).with_http_client(client)
    }

    fn ctx() -> ContextSnapshot {
        ContextSnapshot {
            task: "find the price".into(),
            transcript: Arc::from(Vec::new()),
        }
    }

    #[test]
    fn test_extract_url() {
        assert_eq!(
            extract_url("Open https://www.example.com/rings?q=1. Then report."),
            Some("https://www.example.com/rings?q=1".to_string())
        );
        assert_eq!(extract_url("(see http://a.b/c)"), Some("http://a.b/c".to_string()));
        assert_eq!(extract_url("no link here"), None);
    }

    #[test]
    fn test_html_detection_and_strip() {
        assert!(looks_like_html("<!DOCTYPE html><html></html>"));
        assert!(!looks_like_html("plain text body"));
        assert_eq!(strip_html_tags("<p>Ring</p><b>$12</b>"), "Ring $12");
    }

    #[tokio::test]
    async fn test_missing_url_asks_for_one() {
        let agent = WebSurferAgent::new("web_agent", 5, 1000);
        let out = agent.act("look it up", ctx(), ChunkSink::detached("web_agent")).await.unwrap();
        assert!(out.as_text().contains("need a URL"));
    }

    #[tokio::test]
    async fn test_forbidden_requests_human() {
        let url = serve_once("HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let agent = local_surfer();
        let out = agent
            .act(&format!("open {}", url), ctx(), ChunkSink::detached("web_agent"))
            .await
            .unwrap();
        assert!(out.human_input_request().unwrap().contains("403"));
    }

    #[tokio::test]
    async fn test_page_text_and_summary() {
        const PAGE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 21\r\nConnection: close\r\n\r\nThe ring costs $12.99";
        let url = serve_once(PAGE).await;
        let sink = ChunkSink::detached("web_agent");
        let agent = local_surfer().with_start_page(Some(url.clone()));
        let out = agent.act("read the page", ctx(), sink.clone()).await.unwrap();
        assert!(out.as_text().contains("$12.99"));
        assert!(sink.emitted());

        let url = serve_once(PAGE).await;
        let llm = Arc::new(MockLlmClient::with_responses(["Price: $12.99"]));
        let agent = local_surfer().with_llm(llm);
        let out = agent
            .act(&format!("price at {}", url), ctx(), ChunkSink::detached("web_agent"))
            .await
            .unwrap();
        assert_eq!(out, MessageContent::text("Price: $12.99"));
    }
}
