//! Guard - jobnik のライフサイクル強制
//!
//! Wraps one jobnik instance, validates the call order and serializes every
//! lifecycle call behind a single lock (held across the delegate call).
//!
//! ```text
//! InitAllowed --init ok--> Ready --finish--> Closed
//!      |                                       ^
//!      +-------------init error----------------+
//! ```

use std::fmt;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{Jobnik, JobnikFactory};
use crate::domain::{Job, JobStatus, StatusView};
use crate::error::{JobnikError, Result};
use crate::registry::FactoryRegistry;

/// Guard lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// Jobnik exists, only `init_once` is permitted.
    InitAllowed,
    /// Processing (and finishing) permitted.
    Ready,
    /// Terminal.
    Closed,
}

impl fmt::Display for GuardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GuardState::InitAllowed => "init allowed",
            GuardState::Ready => "ready",
            GuardState::Closed => "closed",
        })
    }
}

/// Lifecycle operation, used in state errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Init,
    Process,
    Finish,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lifecycle::Init => "Init",
            Lifecycle::Process => "Process",
            Lifecycle::Finish => "Finish",
        })
    }
}

struct Inner {
    state: GuardState,
    jobnik: Box<dyn Jobnik>,
}

/// Lifecycle-enforcing wrapper around one jobnik.
///
/// All calls through one guard are strictly serialized, `process` included.
/// Concurrent processing needs several guard + jobnik instances.
pub struct Guard {
    name: String,
    inner: Mutex<Inner>,
}

impl Guard {
    pub fn new(name: impl Into<String>, jobnik: Box<dyn Jobnik>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                state: GuardState::InitAllowed,
                jobnik,
            }),
        }
    }

    pub(crate) fn create(factories: &FactoryRegistry<JobnikFactory>, name: &str) -> Result<Self> {
        let factory = factories
            .get(name)
            .ok_or_else(|| JobnikError::FactoryNotFound(name.to_string()))?;
        let jobnik = factory()?;
        Ok(Self::new(name, jobnik))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> GuardState {
        self.inner.lock().await.state
    }

    pub async fn init_once(&self, config: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state != GuardState::InitAllowed {
            return Err(JobnikError::Disabled {
                operation: Lifecycle::Init,
                state: inner.state,
            });
        }

        if let Err(err) = inner.jobnik.init_once(config).await {
            inner.state = GuardState::Closed;
            tracing::warn!(jobnik = %self.name, error = %err, "init failed, guard closed");
            return Err(err);
        }

        inner.state = GuardState::Ready;
        tracing::debug!(jobnik = %self.name, "initialized");
        Ok(())
    }

    /// `None` is replaced with a token that never fires.
    pub async fn process(&self, cancel: Option<CancellationToken>, job: &Job) -> Result<JobStatus> {
        let mut inner = self.inner.lock().await;
        if inner.state != GuardState::Ready {
            return Err(JobnikError::Disabled {
                operation: Lifecycle::Process,
                state: inner.state,
            });
        }

        let cancel = cancel.unwrap_or_else(CancellationToken::new);
        tracing::trace!(jobnik = %self.name, uid = %job.uid(), "process");
        inner.jobnik.process(cancel, job).await
    }

    /// Never initialized: no-op success. Ready: delegates, then closes
    /// regardless of the outcome. Closed: state error.
    pub async fn finish_once(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            GuardState::InitAllowed => Ok(()),
            GuardState::Ready => {
                let result = inner.jobnik.finish_once().await;
                inner.state = GuardState::Closed;
                tracing::debug!(jobnik = %self.name, ok = result.is_ok(), "finished");
                result
            }
            GuardState::Closed => Err(JobnikError::Disabled {
                operation: Lifecycle::Finish,
                state: inner.state,
            }),
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").field("name", &self.name).finish_non_exhaustive()
    }
}
