//! jobnik-core
//!
//! Pluggable job processing: handler plugins ("jobniks") driven through a
//! strict `init_once -> process -> finish_once` lifecycle, and jobs flowing
//! from submitters to a single consumer through a queue.
//!
//! # モジュール構成
//! - **domain**: Job, JobOrder, JobStatus, JobState, JobUid, message bridge
//! - **jobnik**: plugin contract, lifecycle Guard, process-wide factory registry
//! - **queue**: Submitter / Receiver / Connector contract, backend registry, InMemoryJobQueue
//! - **app**: Worker（配送 → Guard::process → ack のループ）
//! - **ports**: Clock, UidGenerator
//! - **config**: JSON configuration

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod jobnik;
pub mod ports;
pub mod queue;
pub mod registry;

pub use app::{Worker, WorkerHandle};
pub use config::{HandlerConfig, QueueConfig, WorkerConfig};
pub use domain::{
    Job, JobAttribute, JobOrder, JobState, JobStatus, JobUid, Message, MessageCodec, OrderView,
    StatusView,
};
pub use error::{JobnikError, RegistryError, Result};
pub use jobnik::{Guard, GuardState, Jobnik, JobnikFactory, Lifecycle, new_jobnik, register_factory};
pub use queue::{
    Connector, INMEMORY_QUEUE, InMemoryJobQueue, JobQueue, JobQueueFactory, ReceiveCallback,
    Receiver, Submitter, create_job_queue, register_job_queue_factory,
};

// Used in `Jobnik` impls.
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
