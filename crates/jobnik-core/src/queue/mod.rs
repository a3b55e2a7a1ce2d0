//! Queue module: submit/receive/ack contract, backend registry, and the
//! in-memory reference implementation.

mod memory;

pub use memory::{INMEMORY_QUEUE, InMemoryJobQueue};

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;

use crate::domain::{Job, JobOrder, JobStatus};
use crate::error::Result;
use crate::registry::FactoryRegistry;

/// Delivery callback. Invoked once per delivered job.
pub type ReceiveCallback = Arc<dyn Fn(Job) + Send + Sync>;

/// Connection lifecycle. Every queue operation fails with
/// `JobnikError::NotConnected` once disconnected.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<()>;

    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Shutdown: disconnect and release a pending delivery waiter.
    fn stop(&self) {
        self.disconnect();
    }
}

#[async_trait]
pub trait Submitter: Send + Sync {
    /// Submit a job. The returned status carries the new UID for tracking.
    async fn submit(&self, order: JobOrder) -> Result<JobStatus>;

    /// Current tracked status. Absence is reported as `JobState::Unknown`,
    /// not as an error.
    async fn check(&self, status: &JobStatus) -> Result<JobStatus>;
}

#[async_trait]
pub trait Receiver: Send + Sync {
    /// Register the single delivery callback. Nothing is delivered before
    /// a callback exists.
    async fn on_receive(&self, callback: ReceiveCallback) -> Result<()>;

    /// Report a status update for a delivered job (or `None` to only arm
    /// delivery) and re-arm the next delivery.
    async fn ack(&self, status: Option<JobStatus>) -> Result<()>;

    /// Put a delivered job that the consumer never took back at the head of
    /// the queue as `Submitted`. Does not arm delivery.
    fn release(&self, job: Job) -> Result<()>;
}

/// Queue port (interface).
pub trait JobQueue: Connector + Submitter + Receiver {}

impl<T: Connector + Submitter + Receiver> JobQueue for T {}

/// Produces a fresh, connected queue.
pub type JobQueueFactory = Arc<dyn Fn() -> Result<Arc<dyn JobQueue>> + Send + Sync>;

static FACTORIES: LazyLock<FactoryRegistry<JobQueueFactory>> = LazyLock::new(|| {
    let registry = FactoryRegistry::new("job queue");
    let inmemory: JobQueueFactory =
        Arc::new(|| Ok(Arc::new(InMemoryJobQueue::new()) as Arc<dyn JobQueue>));
    if let Err(err) = registry.register(INMEMORY_QUEUE, inmemory) {
        tracing::error!(error = %err, "builtin queue registration failed");
    }
    registry
});

/// Register a queue backend factory under `name` (stored lowercased).
///
/// # Panics
/// On an empty or duplicate name.
pub fn register_job_queue_factory<F>(name: &str, factory: F)
where
    F: Fn() -> Result<Arc<dyn JobQueue>> + Send + Sync + 'static,
{
    if let Err(err) = FACTORIES.register(name, Arc::new(factory)) {
        tracing::error!(name, error = %err, "job queue registration failed");
        panic!("{err}");
    }
    tracing::debug!(name, "job queue factory registered");
}

pub fn create_job_queue(name: &str) -> Result<Arc<dyn JobQueue>> {
    let factory = FACTORIES
        .get(name)
        .ok_or_else(|| crate::error::JobnikError::FactoryNotFound(name.to_string()))?;
    factory()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobState;
    use crate::error::JobnikError;

    #[tokio::test]
    async fn inmemory_queue_is_builtin() {
        let queue = create_job_queue("InMemoryQueue").unwrap();
        assert!(queue.is_connected());
        let status = queue.submit(JobOrder::new("Any")).await.unwrap();
        assert_eq!(status.state, JobState::Submitted);
        queue.stop();
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let err = create_job_queue("kafka").err().unwrap();
        assert!(matches!(err, JobnikError::FactoryNotFound(_)));
    }

    #[test]
    fn custom_backend_is_created_by_name() {
        register_job_queue_factory("QueueRegistryCustom", || {
            Ok(Arc::new(InMemoryJobQueue::new()) as Arc<dyn JobQueue>)
        });
        assert!(create_job_queue("queueregistrycustom").is_ok());
    }

    #[test]
    #[should_panic(expected = "already exists")]
    fn builtin_name_cannot_be_reused() {
        register_job_queue_factory(INMEMORY_QUEUE, || {
            Ok(Arc::new(InMemoryJobQueue::new()) as Arc<dyn JobQueue>)
        });
    }
}
