//! jobnik - デモ用ワーカー
//!
//! 1. handler を登録して Worker を設定から組み立てる
//! 2. デモジョブを投入し、全件が落ち着くまで check でポーリング
//! 3. Ctrl-C か全件完了で shutdown（実行中ジョブは Cancelled になる）

mod handlers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use jobnik_core::{HandlerConfig, JobOrder, JobQueue, JobState, JobStatus, Worker, WorkerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jobnik", about = "Runs demo jobs through an in-process job queue")]
struct Args {
    /// Worker config (JSON). Defaults to both demo handlers on the in-memory queue.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of demo jobs to submit
    #[arg(long, default_value_t = 4)]
    jobs: usize,
}

fn default_config() -> WorkerConfig {
    let mut config = WorkerConfig::default();
    config.handlers.push(HandlerConfig {
        name: handlers::PRINT_ATTRIBUTES.to_string(),
        config: Some(serde_json::json!({ "info": true })),
    });
    config.handlers.push(HandlerConfig {
        name: handlers::LOOP_TILL_CANCEL.to_string(),
        config: Some(serde_json::json!({ "warnings": true, "info": true })),
    });
    config
}

fn demo_order(index: usize) -> JobOrder {
    if index % 2 == 0 {
        JobOrder::new(handlers::PRINT_ATTRIBUTES)
            .with_attribute("index", index.to_string())
            .with_attribute("kind", "demo")
    } else {
        JobOrder::new(handlers::LOOP_TILL_CANCEL)
            .with_payload(serde_json::json!({ "loops": 100, "sleep_ms": 10 }).to_string())
    }
}

/// Poll until every job has left the queue or reached a terminal state.
async fn wait_settled(queue: &Arc<dyn JobQueue>, submitted: &[JobStatus]) -> jobnik_core::Result<()> {
    loop {
        let mut pending = 0;
        for status in submitted {
            let current = queue.check(status).await?;
            if current.state != JobState::Unknown && !current.state.is_terminal() {
                pending += 1;
            }
        }
        if pending == 0 {
            return Ok(());
        }
        tracing::debug!(pending, "waiting for jobs");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    handlers::register();

    let config = match &args.config {
        Some(path) => WorkerConfig::from_path(path)?,
        None => default_config(),
    };

    let worker = Worker::from_config(&config).await?;
    let queue = worker.queue();
    let handle = worker.start().await?;

    let mut submitted = Vec::with_capacity(args.jobs);
    for index in 0..args.jobs {
        let status = queue.submit(demo_order(index)).await?;
        tracing::info!(uid = %status.uid, "submitted");
        submitted.push(status);
    }

    tokio::select! {
        result = wait_settled(&queue, &submitted) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted, shutting down"),
    }

    handle.shutdown_and_join().await;

    for status in &submitted {
        let current = queue.check(status).await?;
        // finished jobs are dropped from tracking, so Unknown here means done
        let state = match current.state {
            JobState::Unknown => JobState::Finished,
            other => other,
        };
        tracing::info!(uid = %status.uid, %state, memento = ?current.memento, "result");
    }

    queue.stop();
    Ok(())
}
