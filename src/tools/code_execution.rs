//! Python 代码执行工具：在本地工作目录中运行模型生成的代码
//!
//! 代码写入 work_dir 下的 tmp_code_<uuid>.py，用配置的解释器执行，带超时，执行后删除；
//! 返回退出码与 stdout/stderr。非零退出码作为正常输出返回，便于模型据此修正；
//! 解释器无法启动或超时才视为工具失败。不提供沙箱隔离。

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::Tool;

/// 单次执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeResult {
    pub exit_code: i32,
    pub output: String,
}

/// 本地命令行执行器
#[derive(Debug, Clone)]
pub struct LocalCommandLineExecutor {
    work_dir: PathBuf,
    python: String,
    timeout: Duration,
}

impl LocalCommandLineExecutor {
    pub fn new(work_dir: impl Into<PathBuf>, python: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            work_dir: work_dir.into(),
            python: python.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub async fn run_python(&self, code: &str) -> Result<CodeResult, String> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| format!("Create work dir {}: {}", self.work_dir.display(), e))?;

        let file_name = format!("tmp_code_{}.py", uuid::Uuid::new_v4().simple());
        let path = self.work_dir.join(&file_name);
        tokio::fs::write(&path, code)
            .await
            .map_err(|e| format!("Write {}: {}", path.display(), e))?;

        tracing::info!(file = %file_name, work_dir = %self.work_dir.display(), "code execution");

        let mut cmd = Command::new(&self.python);
        cmd.arg(&file_name).current_dir(&self.work_dir).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output()).await;
        // 无论成功、失败还是超时，脚本文件都不保留
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(file = %file_name, error = %e, "failed to remove code file");
        }
        let output = output
            .map_err(|_| format!("Code execution timed out after {}s", self.timeout.as_secs()))?
            .map_err(|e| format!("Failed to start {}: {}", self.python, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut text = stdout.trim_end().to_string();
        if !stderr.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr.trim_end());
        }
        Ok(CodeResult {
            exit_code: output.status.code().unwrap_or(-1),
            output: text,
        })
    }
}

/// 去掉 ```python ... ``` 围栏，只保留代码
pub fn strip_code_fence(code: &str) -> &str {
    let trimmed = code.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

pub struct PythonCodeExecutionTool {
    executor: LocalCommandLineExecutor,
}

impl PythonCodeExecutionTool {
    pub fn new(executor: LocalCommandLineExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for PythonCodeExecutionTool {
    fn name(&self) -> &str {
        "code_execution"
    }

    fn description(&self) -> &str {
        "Execute Python code in the local working directory and return exit code, stdout and stderr. Use print() to output results. Args: {\"code\": \"...\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The Python code to execute"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let code = args.get("code").and_then(|v| v.as_str()).unwrap_or("");
        let code = strip_code_fence(code);
        if code.is_empty() {
            return Err("Missing code".to_string());
        }
        let result = self.executor.run_python(code).await?;
        Ok(format!("exit code: {}\n{}", result.exit_code, result.output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```python\nprint(1)\n```"), "print(1)");
        assert_eq!(strip_code_fence("print(2)"), "print(2)");
        assert_eq!(strip_code_fence("```\nx = 1\n```\n"), "x = 1");
    }

    #[tokio::test]
    async fn test_missing_code_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = PythonCodeExecutionTool::new(LocalCommandLineExecutor::new(dir.path(), "python3", 5));
        assert!(tool.execute(json!({})).await.is_err());
        assert!(tool.execute(json!({"code": "```python\n```"})).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor =
            LocalCommandLineExecutor::new(dir.path().join("coding"), "definitely-not-a-python-binary", 5);
        let err = executor.run_python("print('hi')").await.unwrap_err();
        assert!(err.contains("Failed to start"));
        // 工作目录已创建，临时脚本已删除
        let left = std::fs::read_dir(executor.work_dir()).unwrap().count();
        assert_eq!(left, 0);
    }

    #[tokio::test]
    async fn test_code_file_removed_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        // sh 把脚本当 shell 执行：sleep 超过超时时间
        let executor = LocalCommandLineExecutor::new(dir.path(), "sh", 1);
        let err = executor.run_python("sleep 5").await.unwrap_err();
        assert!(err.contains("timed out"));
        assert_eq!(std::fs::read_dir(executor.work_dir()).unwrap().count(), 0);
    }
}
