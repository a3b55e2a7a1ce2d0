//! In-memory queue implementation.
//!
//! Delivery is single-slot and flow-controlled: `ack` arms one background
//! waiter, the waiter delivers exactly one job and disarms. No further job is
//! delivered until the next `ack`, however many are queued.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::{Connector, ReceiveCallback, Receiver, Submitter};
use crate::config::QueueConfig;
use crate::domain::{Job, JobOrder, JobState, JobStatus, JobUid, OrderView, StatusView};
use crate::error::{JobnikError, Result};
use crate::ports::{SystemClock, UidGenerator, UlidGenerator};

/// Registry name of the in-memory queue.
pub const INMEMORY_QUEUE: &str = "inmemoryqueue";

/// FIFO store + delivery bookkeeping, guarded by one lock.
///
/// The lock is only held for bookkeeping, never across the wait for a job.
struct Delivery {
    jobs: VecDeque<Job>,

    /// A waiter is pending.
    armed: bool,

    callback: Option<ReceiveCallback>,

    /// Raised on disconnect; replaced on reconnect.
    stop: CancellationToken,
}

struct Shared {
    connected: AtomicBool,
    delivery: Mutex<Delivery>,
    available: Notify,

    /// UID -> last tracked status. `Unknown` is never stored.
    statuses: DashMap<JobUid, JobStatus>,

    uids: Box<dyn UidGenerator>,
    capacity: Option<usize>,
}

impl Shared {
    fn delivery(&self) -> MutexGuard<'_, Delivery> {
        // no bookkeeping step can panic halfway, a poisoned lock is still consistent
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(JobnikError::NotConnected)
        }
    }

    /// Waits for a job or the stop signal, then delivers at most one job to
    /// the callback registered at that moment.
    async fn deliver_one(self: Arc<Self>, stop: CancellationToken) {
        loop {
            let next = {
                let mut delivery = self.delivery();
                if stop.is_cancelled() {
                    // disconnect already disarmed us; pass on a wakeup we may have taken
                    drop(delivery);
                    self.available.notify_one();
                    tracing::debug!("delivery waiter released by stop");
                    return;
                }
                match (delivery.callback.clone(), delivery.jobs.pop_front()) {
                    (Some(callback), Some(job)) => {
                        delivery.armed = false;
                        Some((callback, job))
                    }
                    (_, job) => {
                        if let Some(job) = job {
                            delivery.jobs.push_front(job);
                        }
                        None
                    }
                }
            };

            if let Some((callback, mut job)) = next {
                let uid = *job.uid();
                job.set_state(JobState::InProcess);
                self.statuses
                    .insert(uid, JobStatus::new(uid, JobState::InProcess));
                tracing::debug!(uid = %uid, handler = job.handler(), "delivering job");
                callback(job);
                return;
            }

            tokio::select! {
                _ = stop.cancelled() => {}
                _ = self.available.notified() => {}
            }
        }
    }
}

/// Volatile, single-process job queue with one consumer.
pub struct InMemoryJobQueue {
    shared: Arc<Shared>,
}

impl InMemoryJobQueue {
    /// Connected queue without a capacity limit.
    pub fn new() -> Self {
        Self::with_config(&QueueConfig::default())
    }

    pub fn with_config(config: &QueueConfig) -> Self {
        Self::with_uid_generator(config, UlidGenerator::new(SystemClock))
    }

    pub fn with_uid_generator(config: &QueueConfig, uids: impl UidGenerator + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                connected: AtomicBool::new(true),
                delivery: Mutex::new(Delivery {
                    jobs: VecDeque::new(),
                    armed: false,
                    callback: None,
                    stop: CancellationToken::new(),
                }),
                available: Notify::new(),
                statuses: DashMap::new(),
                uids: Box::new(uids),
                capacity: config.capacity,
            }),
        }
    }

    /// Number of queued, not yet delivered jobs.
    pub fn pending(&self) -> usize {
        self.shared.delivery().jobs.len()
    }

    /// Start a delivery waiter unless one is pending or no callback exists.
    fn arm(&self) {
        let stop = {
            let mut delivery = self.shared.delivery();
            if delivery.armed || !self.shared.connected.load(Ordering::Acquire) {
                return;
            }
            if delivery.callback.is_none() {
                tracing::trace!("ack without receiver, delivery not armed");
                return;
            }
            delivery.armed = true;
            delivery.stop.clone()
        };

        tokio::spawn(Arc::clone(&self.shared).deliver_one(stop));
    }

    fn update_status(&self, status: JobStatus) {
        match self.shared.statuses.entry(status.uid) {
            Entry::Vacant(_) => {
                tracing::trace!(uid = %status.uid, "ack for untracked job ignored");
            }
            Entry::Occupied(entry)
                if matches!(status.state, JobState::Finished | JobState::Unknown) =>
            {
                // Finished jobs are retired; Failed/Cancelled stay queryable.
                // Unknown means "no record", so it is never stored.
                entry.remove();
                tracing::debug!(uid = %status.uid, state = %status.state, "job retired");
            }
            Entry::Occupied(mut entry) => {
                if entry.get().state != status.state {
                    tracing::debug!(
                        uid = %status.uid,
                        from = %entry.get().state,
                        to = %status.state,
                        "job state updated"
                    );
                    entry.insert(status);
                }
            }
        }
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InMemoryJobQueue {
    fn drop(&mut self) {
        self.shared.delivery().stop.cancel();
    }
}

impl Connector for InMemoryJobQueue {
    fn connect(&self) -> Result<()> {
        let mut delivery = self.shared.delivery();
        if delivery.stop.is_cancelled() {
            delivery.stop = CancellationToken::new();
        }
        self.shared.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn disconnect(&self) {
        let mut delivery = self.shared.delivery();
        self.shared.connected.store(false, Ordering::Release);
        delivery.armed = false;
        delivery.stop.cancel();
        tracing::info!(pending = delivery.jobs.len(), "in-memory queue disconnected");
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Submitter for InMemoryJobQueue {
    async fn submit(&self, order: JobOrder) -> Result<JobStatus> {
        self.shared.ensure_connected()?;

        let uid = self.shared.uids.generate();
        let mut job = Job::new(uid, order)?;
        job.set_state(JobState::Submitted);
        let status = JobStatus::new(uid, JobState::Submitted);

        {
            let mut delivery = self.shared.delivery();
            if let Some(capacity) = self.shared.capacity
                && delivery.jobs.len() >= capacity
            {
                tracing::warn!(capacity, "job queue at capacity, submit rejected");
                return Err(JobnikError::QueueFull(capacity));
            }
            // status before the job is visible to the waiter
            self.shared.statuses.insert(uid, status.clone());
            delivery.jobs.push_back(job);
        }
        self.shared.available.notify_one();

        tracing::debug!(uid = %uid, "job submitted");
        Ok(status)
    }

    async fn check(&self, status: &JobStatus) -> Result<JobStatus> {
        self.shared.ensure_connected()?;

        Ok(self
            .shared
            .statuses
            .get(&status.uid)
            .map(|tracked| tracked.value().clone())
            .unwrap_or_else(|| JobStatus::unknown(status.uid)))
    }
}

#[async_trait]
impl Receiver for InMemoryJobQueue {
    async fn on_receive(&self, callback: ReceiveCallback) -> Result<()> {
        self.shared.ensure_connected()?;

        let mut delivery = self.shared.delivery();
        if delivery.callback.replace(callback).is_some() {
            tracing::debug!("receive callback replaced");
        }
        Ok(())
    }

    async fn ack(&self, status: Option<JobStatus>) -> Result<()> {
        self.shared.ensure_connected()?;

        if let Some(status) = status {
            self.update_status(status);
        }
        self.arm();
        Ok(())
    }

    fn release(&self, mut job: Job) -> Result<()> {
        self.shared.ensure_connected()?;

        let uid = *job.uid();
        job.set_state(JobState::Submitted);
        {
            let mut delivery = self.shared.delivery();
            self.shared
                .statuses
                .insert(uid, JobStatus::new(uid, JobState::Submitted));
            delivery.jobs.push_front(job);
        }
        self.shared.available.notify_one();

        tracing::debug!(uid = %uid, "undelivered job returned to the queue");
        Ok(())
    }
}
