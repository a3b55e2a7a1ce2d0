//! Worker - キューとジョブニクをつなぐ接着剤
//!
//! 1. queue の callback で配送された Job を channel 経由で受け取る
//! 2. handler 名から Guard を引いて process
//! 3. 結果の JobStatus を ack（同時に次の配送を arm）

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{HandlerConfig, WorkerConfig};
use crate::domain::{Job, JobState, JobStatus, OrderView, StatusView};
use crate::error::Result;
use crate::jobnik::{Guard, new_jobnik};
use crate::queue::{INMEMORY_QUEUE, InMemoryJobQueue, JobQueue, create_job_queue};

/// Consumer side: one queue, one guard per handler name.
pub struct Worker {
    queue: Arc<dyn JobQueue>,
    guards: HashMap<String, Arc<Guard>>,
}

impl Worker {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self {
            queue,
            guards: HashMap::new(),
        }
    }

    /// Build the queue and initialize every configured handler.
    pub async fn from_config(config: &WorkerConfig) -> Result<Self> {
        let queue: Arc<dyn JobQueue> = if config.queue.eq_ignore_ascii_case(INMEMORY_QUEUE) {
            Arc::new(InMemoryJobQueue::with_config(&config.queue_config()))
        } else {
            create_job_queue(&config.queue)?
        };

        let mut worker = Self::new(queue);
        for handler in &config.handlers {
            if let Err(err) = worker.init_handler(handler).await {
                tracing::error!(handler = %handler.name, error = %err, "handler setup failed");
                finish_guards(&worker.guards).await;
                return Err(err);
            }
        }
        Ok(worker)
    }

    async fn init_handler(&mut self, handler: &HandlerConfig) -> Result<()> {
        let guard = new_jobnik(&handler.name)?;
        guard.init_once(&handler.init_text()?).await?;
        tracing::info!(handler = %handler.name, "handler initialized");
        self.add_guard(guard);
        Ok(())
    }

    /// Route jobs for `guard.name()` (case-insensitive) to `guard`.
    pub fn add_guard(&mut self, guard: Guard) -> &mut Self {
        self.guards
            .insert(guard.name().to_lowercase(), Arc::new(guard));
        self
    }

    pub fn queue(&self) -> Arc<dyn JobQueue> {
        Arc::clone(&self.queue)
    }

    /// Register the receiver, arm the first delivery and spawn the loop.
    pub async fn start(self) -> Result<WorkerHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::downgrade(&self.queue);
        self.queue
            .on_receive(Arc::new(move |job: Job| {
                if let Err(mpsc::error::SendError(job)) = tx.send(job)
                    && let Some(queue) = queue.upgrade()
                {
                    release(&*queue, job);
                }
            }))
            .await?;
        self.queue.ack(None).await?;

        let shutdown = CancellationToken::new();
        let join = tokio::spawn(worker_loop(
            Arc::clone(&self.queue),
            self.guards,
            rx,
            shutdown.clone(),
        ));
        tracing::info!("worker started");

        Ok(WorkerHandle {
            queue: self.queue,
            shutdown,
            join,
        })
    }
}

/// Running worker.
/// - `request_shutdown()` cancels in-flight jobs through their token
/// - `shutdown_and_join()` waits for the loop, which finishes every guard
pub struct WorkerHandle {
    queue: Arc<dyn JobQueue>,
    shutdown: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn queue(&self) -> Arc<dyn JobQueue> {
        Arc::clone(&self.queue)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(err) = self.join.await {
            tracing::error!(error = %err, "worker task failed");
        }
    }
}

async fn worker_loop(
    queue: Arc<dyn JobQueue>,
    guards: HashMap<String, Arc<Guard>>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    shutdown: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let status = process_job(&guards, &job, shutdown.child_token()).await;
        tracing::debug!(uid = %status.uid, state = %status.state, "job processed");

        if let Err(err) = queue.ack(Some(status)).await {
            tracing::warn!(uid = %job.uid(), error = %err, "ack failed");
        }
    }

    // the last ack re-armed delivery; whatever reaches us now goes back
    jobs.close();
    while let Ok(job) = jobs.try_recv() {
        release(&*queue, job);
    }

    finish_guards(&guards).await;
    tracing::info!("worker stopped");
}

fn release(queue: &dyn JobQueue, job: Job) {
    let uid = *job.uid();
    match queue.release(job) {
        Ok(()) => tracing::info!(uid = %uid, "worker stopped, job returned to the queue"),
        Err(err) => tracing::warn!(uid = %uid, error = %err, "worker stopped, job lost"),
    }
}

async fn finish_guards(guards: &HashMap<String, Arc<Guard>>) {
    for guard in guards.values() {
        if let Err(err) = guard.finish_once().await {
            tracing::warn!(handler = guard.name(), error = %err, "finish failed");
        }
    }
}

/// Never fails: routing and input errors become a `Failed` status.
async fn process_job(
    guards: &HashMap<String, Arc<Guard>>,
    job: &Job,
    cancel: CancellationToken,
) -> JobStatus {
    let uid = *job.uid();
    let Some(guard) = guards.get(&job.handler().to_lowercase()) else {
        tracing::warn!(uid = %uid, handler = job.handler(), "no handler for job");
        return JobStatus::new(uid, JobState::Failed)
            .with_memento(format!("{} is not supported", job.handler()));
    };

    match guard.process(Some(cancel), job).await {
        Ok(mut status) => {
            if status.uid != uid {
                tracing::warn!(uid = %uid, reported = %status.uid, "handler reported foreign uid");
                status.uid = uid;
            }
            status
        }
        Err(err) => {
            tracing::warn!(uid = %uid, error = %err, "job rejected by handler");
            JobStatus::new(uid, JobState::Failed).with_memento(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::domain::JobOrder;
    use crate::error::JobnikError;
    use crate::jobnik::testing::{Probe, ScriptedJobnik};
    use crate::jobnik::{GuardState, Jobnik, register_factory};

    async fn wait_for(queue: &Arc<dyn JobQueue>, status: &JobStatus, state: JobState) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let current = queue.check(status).await.unwrap();
            if current.state == state {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "stuck in {} waiting for {state}",
                current.state
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn ready_guard(name: &str, jobnik: ScriptedJobnik) -> Guard {
        let guard = Guard::new(name, Box::new(jobnik));
        guard.init_once("").await.unwrap();
        guard
    }

    #[tokio::test]
    async fn processes_jobs_and_retires_finished() {
        let probe = Arc::new(Probe::default());
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        let mut worker = Worker::new(Arc::clone(&queue));
        worker.add_guard(ready_guard("Scripted", ScriptedJobnik::new(probe.clone())).await);
        let handle = worker.start().await.unwrap();

        let mut submitted = Vec::new();
        for _ in 0..3 {
            submitted.push(queue.submit(JobOrder::new("scripted")).await.unwrap());
        }
        for status in &submitted {
            wait_for(&queue, status, JobState::Unknown).await;
        }

        assert_eq!(probe.processed.load(Ordering::SeqCst), 3);
        handle.shutdown_and_join().await;
        assert_eq!(probe.finishes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_handler_fails_the_job() {
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        let handle = Worker::new(Arc::clone(&queue)).start().await.unwrap();

        let status = queue.submit(JobOrder::new("nobody")).await.unwrap();
        wait_for(&queue, &status, JobState::Failed).await;

        let tracked = queue.check(&status).await.unwrap();
        assert_eq!(tracked.memento, Some("nobody is not supported".into()));
        handle.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn guard_errors_fail_the_job() {
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        let mut worker = Worker::new(Arc::clone(&queue));
        // never initialized, so every process call is a state error
        worker.add_guard(Guard::new(
            "scripted",
            Box::new(ScriptedJobnik::new(Arc::new(Probe::default()))),
        ));
        let handle = worker.start().await.unwrap();

        let status = queue.submit(JobOrder::new("scripted")).await.unwrap();
        wait_for(&queue, &status, JobState::Failed).await;
        let tracked = queue.check(&status).await.unwrap();
        assert_eq!(
            tracked.memento,
            Some("Process disabled for init allowed".into())
        );
        handle.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_job() {
        let probe = Arc::new(Probe::default());
        let mut jobnik = ScriptedJobnik::new(probe.clone());
        jobnik.process_delay = Duration::from_secs(60);
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        let mut worker = Worker::new(Arc::clone(&queue));
        worker.add_guard(ready_guard("scripted", jobnik).await);
        let handle = worker.start().await.unwrap();

        let status = queue.submit(JobOrder::new("scripted")).await.unwrap();
        wait_for(&queue, &status, JobState::InProcess).await;

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown_and_join())
            .await
            .unwrap();
        wait_for(&queue, &status, JobState::Cancelled).await;
        assert_eq!(probe.processed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_returns_queued_job_to_the_queue() {
        let probe = Arc::new(Probe::default());
        let mut slow = ScriptedJobnik::new(probe.clone());
        slow.process_delay = Duration::from_secs(60);
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        let mut worker = Worker::new(Arc::clone(&queue));
        worker.add_guard(ready_guard("scripted", slow).await);
        let handle = worker.start().await.unwrap();

        let first = queue.submit(JobOrder::new("scripted")).await.unwrap();
        let second = queue.submit(JobOrder::new("scripted")).await.unwrap();
        wait_for(&queue, &first, JobState::InProcess).await;

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown_and_join())
            .await
            .unwrap();
        wait_for(&queue, &first, JobState::Cancelled).await;

        // a fresh worker still gets the second job
        let mut worker = Worker::new(Arc::clone(&queue));
        worker.add_guard(ready_guard("scripted", ScriptedJobnik::new(probe.clone())).await);
        let handle = worker.start().await.unwrap();
        wait_for(&queue, &second, JobState::Unknown).await;

        assert_eq!(probe.processed.load(Ordering::SeqCst), 2);
        handle.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn failed_setup_finishes_handlers_already_initialized() {
        let probe = Arc::new(Probe::default());
        let shared = probe.clone();
        register_factory("setup-first", move || {
            Ok(Box::new(ScriptedJobnik::new(shared.clone())) as Box<dyn Jobnik>)
        });

        let config = WorkerConfig::from_json_str(
            r#"{ "handlers": [ { "name": "setup-first" }, { "name": "setup-missing" } ] }"#,
        )
        .unwrap();
        let err = Worker::from_config(&config).await.err().unwrap();

        assert!(matches!(err, JobnikError::FactoryNotFound(name) if name == "setup-missing"));
        assert_eq!(probe.inits.load(Ordering::SeqCst), 1);
        assert_eq!(probe.finishes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn guards_are_closed_after_shutdown() {
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        let guard = ready_guard("scripted", ScriptedJobnik::new(Arc::new(Probe::default()))).await;
        let mut worker = Worker::new(queue);
        worker.add_guard(guard);
        let shared = Arc::clone(&worker.guards["scripted"]);

        worker.start().await.unwrap().shutdown_and_join().await;
        assert_eq!(shared.state().await, GuardState::Closed);
    }
}
