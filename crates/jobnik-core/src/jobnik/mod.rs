//! Jobnik - job handler plugins
//!
//! A jobnik is a small plugin responsible for processing jobs of one kind,
//! driven through `init_once -> process* -> finish_once`.
//!
//! # Flow
//! 1. Submitter: builds a `JobOrder` and submits it to a queue
//! 2. Worker: receives the `Job`, routes it to the jobnik's [`Guard`]
//! 3. Jobnik: processes the job, returns a `JobStatus`
//! 4. Worker: acks the status back to the queue
//!
//! Factories are registered process-wide during startup and looked up by
//! case-insensitive name.

mod guard;

pub use self::guard::{Guard, GuardState, Lifecycle};

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{Job, JobStatus};
use crate::error::Result;
use crate::registry::FactoryRegistry;

/// Handler plugin contract.
///
/// The error channel of `process` is reserved for malformed input (e.g. an
/// unparsable payload). Failure and cancellation are valid outcomes and are
/// reported through the returned `JobStatus`.
#[async_trait]
pub trait Jobnik: Send {
    /// Once per lifecycle. `config` is a JSON string; empty means defaults.
    async fn init_once(&mut self, config: &str) -> Result<()>;

    /// `cancel` fires on external cancel; a long running job must observe it
    /// and return a `Cancelled` status promptly.
    async fn process(&mut self, cancel: CancellationToken, job: &Job) -> Result<JobStatus>;

    /// Stop processing and clean resources. Once per lifecycle.
    async fn finish_once(&mut self) -> Result<()>;
}

/// Produces a fresh, uninitialized jobnik.
pub type JobnikFactory = Arc<dyn Fn() -> Result<Box<dyn Jobnik>> + Send + Sync>;

static FACTORIES: LazyLock<FactoryRegistry<JobnikFactory>> =
    LazyLock::new(|| FactoryRegistry::new("jobnik"));

/// Register a jobnik factory under `name` (stored lowercased).
///
/// # Panics
/// On an empty or duplicate name. Registration happens at startup and a
/// failure here is a coding defect.
pub fn register_factory<F>(name: &str, factory: F)
where
    F: Fn() -> Result<Box<dyn Jobnik>> + Send + Sync + 'static,
{
    if let Err(err) = FACTORIES.register(name, Arc::new(factory)) {
        tracing::error!(name, error = %err, "jobnik registration failed");
        panic!("{err}");
    }
    tracing::debug!(name, "jobnik factory registered");
}

/// Create a jobnik by name and wrap it in a [`Guard`].
pub fn new_jobnik(name: &str) -> Result<Guard> {
    Guard::create(&FACTORIES, name)
}

/// Names of all registered jobniks, lowercased and sorted.
pub fn registered_jobniks() -> Vec<String> {
    FACTORIES.registered_names()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted jobnik used by guard, registry and worker tests.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::domain::{JobState, StatusView};
    use crate::error::JobnikError;

    #[derive(Default)]
    pub struct Probe {
        pub inits: AtomicUsize,
        pub processed: AtomicUsize,
        pub finishes: AtomicUsize,
        pub in_flight: AtomicBool,
        pub overlapped: AtomicBool,
    }

    pub struct ScriptedJobnik {
        pub probe: Arc<Probe>,
        pub fail_init: bool,
        pub process_delay: Duration,
    }

    impl ScriptedJobnik {
        pub fn new(probe: Arc<Probe>) -> Self {
            Self {
                probe,
                fail_init: false,
                process_delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl Jobnik for ScriptedJobnik {
        async fn init_once(&mut self, _config: &str) -> Result<()> {
            self.probe.inits.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                return Err(JobnikError::Other("bad config".to_string()));
            }
            Ok(())
        }

        async fn process(&mut self, cancel: CancellationToken, job: &Job) -> Result<JobStatus> {
            if self.probe.in_flight.swap(true, Ordering::SeqCst) {
                self.probe.overlapped.store(true, Ordering::SeqCst);
            }
            let state = tokio::select! {
                _ = cancel.cancelled() => JobState::Cancelled,
                _ = tokio::time::sleep(self.process_delay) => JobState::Finished,
            };
            self.probe.processed.fetch_add(1, Ordering::SeqCst);
            self.probe.in_flight.store(false, Ordering::SeqCst);
            Ok(JobStatus::new(*job.uid(), state))
        }

        async fn finish_once(&mut self) -> Result<()> {
            self.probe.finishes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
