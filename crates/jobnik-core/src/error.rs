use thiserror::Error;

use crate::jobnik::{GuardState, Lifecycle};

/// Recoverable errors of handlers, guards and queues.
#[derive(Debug, Error)]
pub enum JobnikError {
    /// Lifecycle call out of sequence.
    #[error("{operation} disabled for {state}")]
    Disabled {
        operation: Lifecycle,
        state: GuardState,
    },

    #[error("not connected")]
    NotConnected,

    #[error("factory for {0} does not exist")]
    FactoryNotFound(String),

    #[error("job queue is full (capacity {0})")]
    QueueFull(usize),

    /// Malformed or unusable job input.
    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Startup registration defects. Not meant to be handled at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("empty {0} name")]
    EmptyName(&'static str),

    #[error("{kind} factory for {name} already exists")]
    AlreadyRegistered { kind: &'static str, name: String },
}

pub type Result<T> = std::result::Result<T, JobnikError>;
