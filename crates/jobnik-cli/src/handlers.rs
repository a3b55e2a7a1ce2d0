//! Demo handlers: `printAttributes` and `loopTillCancel`.
//!
//! One jobnik type serves both names; the job's handler name selects the
//! action, so the factory is registered twice.

use std::time::Duration;

use async_trait::async_trait;
use jobnik_core::{Job, JobState, JobStatus, Jobnik, OrderView, Result, StatusView, register_factory};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

pub const PRINT_ATTRIBUTES: &str = "printAttributes";
pub const LOOP_TILL_CANCEL: &str = "loopTillCancel";

pub fn register() {
    register_factory(PRINT_ATTRIBUTES, || Ok(Box::new(DemoHandler::default()) as Box<dyn Jobnik>));
    register_factory(LOOP_TILL_CANCEL, || Ok(Box::new(DemoHandler::default()) as Box<dyn Jobnik>));
}

/// Which messages the handler logs. Errors are on unless switched off.
#[derive(Debug, Clone, Deserialize)]
struct LogConfig {
    #[serde(default = "enabled")]
    errors: bool,
    #[serde(default)]
    warnings: bool,
    #[serde(default)]
    info: bool,
}

fn enabled() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            errors: true,
            warnings: false,
            info: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoopPayload {
    #[serde(default = "default_loops")]
    loops: u32,
    #[serde(default = "default_sleep_ms")]
    sleep_ms: u64,
}

fn default_loops() -> u32 {
    100
}

fn default_sleep_ms() -> u64 {
    1
}

impl Default for LoopPayload {
    fn default() -> Self {
        Self {
            loops: default_loops(),
            sleep_ms: default_sleep_ms(),
        }
    }
}

#[derive(Default)]
struct DemoHandler {
    log: LogConfig,
}

impl DemoHandler {
    fn print_attributes(&self, job: &Job) -> JobStatus {
        for attr in job.attributes() {
            tracing::info!(uid = %job.uid(), name = %attr.name, value = %attr.value, "attribute");
        }
        JobStatus::new(*job.uid(), JobState::Finished)
    }

    async fn loop_till_cancel(&self, cancel: CancellationToken, job: &Job) -> Result<JobStatus> {
        let payload = if job.payload().is_empty() {
            LoopPayload::default()
        } else {
            job.order().decode_payload::<LoopPayload>().inspect_err(|err| {
                if self.log.errors {
                    tracing::error!(uid = %job.uid(), error = %err, "bad loop payload");
                }
            })?
        };

        for done in 0..payload.loops {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if self.log.warnings {
                        tracing::warn!(uid = %job.uid(), done, "loop cancelled");
                    }
                    return Ok(JobStatus::new(*job.uid(), JobState::Cancelled)
                        .with_memento(format!("cancelled after {done} loops")));
                }
                _ = tokio::time::sleep(Duration::from_millis(payload.sleep_ms)) => {}
            }
        }
        Ok(JobStatus::new(*job.uid(), JobState::Finished))
    }
}

#[async_trait]
impl Jobnik for DemoHandler {
    async fn init_once(&mut self, config: &str) -> Result<()> {
        if !config.is_empty() {
            self.log = serde_json::from_str(config)?;
        }
        Ok(())
    }

    async fn process(&mut self, cancel: CancellationToken, job: &Job) -> Result<JobStatus> {
        match job.handler().to_lowercase().as_str() {
            "printattributes" => Ok(self.print_attributes(job)),
            "looptillcancel" => self.loop_till_cancel(cancel, job).await,
            other => Ok(JobStatus::new(*job.uid(), JobState::Failed)
                .with_memento(format!("{other} is not supported"))),
        }
    }

    async fn finish_once(&mut self) -> Result<()> {
        if self.log.info {
            tracing::info!("demo handler finished");
        }
        Ok(())
    }
}
