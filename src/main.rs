//! Sporky 终端客户端
//!
//! 入口：初始化日志、按配置构建运行时，然后在标准输入上进行对话（每次启动一个新会话）。
//! 输入 exit / quit 退出。

use std::path::PathBuf;

use anyhow::Context;
use sporky::config::load_config;
use sporky::{AgentRuntime, QueryRequest};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sporky::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let runtime = AgentRuntime::from_config(&cfg).context("Failed to create agent runtime")?;

    let session_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(session_id = %session_id, "new chat session");

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    stdout
        .write_all(b"Sporky here! Ask me for some music (exit to quit).\n> ")
        .await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        if matches!(query, "exit" | "quit") {
            break;
        }
        if !query.is_empty() {
            let request = QueryRequest::new(query, session_id.clone());
            let reply = match runtime.handle_query(request).await {
                Ok(resp) => {
                    let mut text = resp.response;
                    if resp.awaiting_approval {
                        text.push_str("\n(waiting for your yes / no)");
                    }
                    text
                }
                Err(e) => {
                    tracing::error!(error = %e, "request failed");
                    format!("Something went wrong: {e}")
                }
            };
            stdout.write_all(format!("\n{reply}\n").as_bytes()).await?;
        }
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
    }

    Ok(())
}
