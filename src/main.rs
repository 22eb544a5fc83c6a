//! SkillPilot - 技能驱动的智能体
//!
//! 入口：加载配置、初始化日志、装配部件，然后进入交互循环（输入 exit 退出，Ctrl-C 取消当前运行）。

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use skillpilot::config::{load_config, CONFIG_PATH_ENV};
use skillpilot::{create_agent_components, RunEvent, RunStatus};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn print_event(ev: &RunEvent, max_chars: usize) {
    match ev {
        RunEvent::Start { .. } => {}
        RunEvent::Thinking { step, max_steps, content } => {
            println!("[step {}/{}]", step, max_steps);
            if !content.trim().is_empty() {
                println!("  thought: {}", preview(content, max_chars));
            }
        }
        RunEvent::ToolCall { tool, args, .. } => {
            println!("  action: {} {}", tool, preview(args, max_chars));
        }
        RunEvent::ToolResult { payload, .. } => {
            let text = match payload {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            println!("  output: {}", preview(&text, max_chars));
        }
        RunEvent::ToolError { tool, message, .. } => {
            println!("  error from {}: {}", tool, preview(message, max_chars));
        }
        RunEvent::Complete { status, steps, .. } => match status {
            RunStatus::Done => println!("[done in {} steps]", steps),
            RunStatus::StepLimitReached => println!("[step limit reached after {} steps]", steps),
            RunStatus::Cancelled => println!("[cancelled]"),
            RunStatus::Error(e) => println!("[error: {}]", e),
        },
        RunEvent::Error { text } => println!("[backend error: {}]", text),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    skillpilot::observability::init();

    let config_path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let components = create_agent_components(&cfg).context("Failed to create agent")?;
    let preview_chars = cfg.agent.output_preview_chars;

    println!("SkillPilot ({} tools)", components.invoker.capability_names().len());
    for (name, desc) in components.invoker.skills().summaries() {
        println!("  - {}: {}", name, desc);
    }
    println!("Type a question, or 'exit' to quit.\n");

    let mut orchestrator = components.new_conversation();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("exit") {
            break;
        }

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                print_event(&ev, preview_chars);
            }
        });
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let outcome = orchestrator.run_with_events(query, cancel, &tx).await;
        interrupt.abort();
        drop(tx);
        let _ = printer.await;

        if !outcome.answer.is_empty() {
            println!("\n{}\n", outcome.answer);
        }
    }

    if let Some(session) = orchestrator.session() {
        println!("Artifacts: {}", session.dir.display());
    }
    Ok(())
}
