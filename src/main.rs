//! Hive - 多智能体群聊编排
//!
//! 入口：载入 .env、初始化日志、加载配置、组装默认团队，把事件流接到控制台，运行任务并打印结局。
//! 任务取自命令行参数，未给出时使用默认任务；Ctrl+C 取消当前运行。

use std::sync::Arc;

use anyhow::Context;
use hive::config::{load_config, load_env_file};
use hive::core::{SessionSupervisor, TeamBuilder};
use hive::observability;
use hive::team::Outcome;
use hive::ui::spawn_console;
use tokio::sync::mpsc;

const DEFAULT_TASK: &str =
    "Immediately ask the user (User agent) what assistance they require before starting any work. Do not ask other agents.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 中的凭据与 RUST_LOG 需在读取环境之前载入；文件不存在时忽略
    let dotenv_path = load_env_file(None);
    observability::init();
    if let Some(path) = dotenv_path {
        tracing::debug!(path = %path.display(), "Loaded .env");
    }

    let config = load_config(None).context("Failed to load config")?;
    let _ = std::fs::create_dir_all(&config.app.work_dir);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let task = if args.is_empty() {
        DEFAULT_TASK.to_string()
    } else {
        args.join(" ")
    };

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let team = TeamBuilder::new(config)
        .build()
        .context("Failed to build team")?
        .with_event_sink(event_tx);
    let console = spawn_console(event_rx);

    let supervisor = Arc::new(SessionSupervisor::new());
    supervisor.install_ctrl_c();

    let result = team.run_with_cancel(&task, supervisor.child_token()).await;
    // 关闭事件流，等待控制台打印完剩余事件
    drop(team);
    let _ = console.await;

    tracing::info!(
        turns = result.ledger.turn_count,
        stalls = result.ledger.stall_count,
        messages = result.transcript.len(),
        "Run summary"
    );
    match result.outcome {
        Outcome::Failed(e) => Err(anyhow::Error::new(e).context("Team run failed")),
        _ => Ok(()),
    }
}
