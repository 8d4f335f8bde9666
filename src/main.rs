//! Task Nudge - Main entry point
//!
//! Headless host: requests arrive as JSON lines on stdin, responses go to
//! stdout, logs go to stderr.

use std::sync::Arc;
use task_nudge_lib::background::{self, KeepAliveWorker};
use task_nudge_lib::clock::SystemClock;
use task_nudge_lib::commands::CommandContext;
use task_nudge_lib::config::RunnerConfig;
use task_nudge_lib::notifier::LogDispatcher;
use task_nudge_lib::scheduler_runner::SchedulerRunner;
use task_nudge_lib::storage::{Database, KvStore};
use task_nudge_lib::task_scheduler::TaskScheduler;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Task Nudge...");

    let config = RunnerConfig::from_env();
    std::fs::create_dir_all(&config.data_dir)?;
    tracing::info!("Data directory: {:?}", config.data_dir);

    let kv: Arc<dyn KvStore> = Arc::new(Database::open(&config.database_path())?);
    let scheduler = Arc::new(TaskScheduler::new(
        Arc::new(SystemClock),
        kv.clone(),
        Arc::new(LogDispatcher),
    ));

    let (link, endpoint) = background::channel(1);
    let worker = KeepAliveWorker::new(endpoint, config.background_interval).spawn();
    let runner =
        SchedulerRunner::new(scheduler.clone(), config.tick_interval).with_background(link);
    let handle = runner.handle();
    let runner_task = tokio::spawn(runner.run());

    let ctx = CommandContext::new(scheduler, handle.clone(), kv);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    let response = ctx.handle_line(&line);
                    let mut out = serde_json::to_string(&response)?;
                    out.push('\n');
                    stdout.write_all(out.as_bytes()).await?;
                    stdout.flush().await?;
                }
                Ok(None) => {
                    tracing::info!("stdin closed, running until interrupted");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::error!("Failed to read command: {}", e);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, shutting down");
                break;
            }
        }
    }

    handle.shutdown();
    if let Err(e) = runner_task.await {
        tracing::error!("Scheduler runner failed: {}", e);
    }
    worker.abort();
    Ok(())
}
