//! Job records: order, status, and the delivered job.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::JobUid;
use super::state::JobState;
use crate::error::{JobnikError, Result};

/// Opaque (name, value) metadata pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAttribute {
    pub name: String,
    pub value: String,
}

impl JobAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Read access to the order part of a job.
pub trait OrderView {
    /// Name of the handler responsible for processing.
    fn handler(&self) -> &str;

    /// Attributes in submission order, duplicates allowed.
    fn attributes(&self) -> &[JobAttribute];

    /// Payload bytes, conventionally JSON. Never validated by the queue.
    fn payload(&self) -> &[u8];
}

/// Read access to the tracked status of a job.
pub trait StatusView {
    fn uid(&self) -> &JobUid;

    fn state(&self) -> JobState;

    fn memento(&self) -> Option<&serde_json::Value>;
}

/// Submission payload. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOrder {
    handler: String,
    #[serde(default)]
    attributes: Vec<JobAttribute>,
    #[serde(default)]
    payload: Vec<u8>,
}

impl JobOrder {
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            attributes: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(JobAttribute::new(name, value));
        self
    }

    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = JobAttribute>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Decode the payload as JSON into `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        if self.payload.is_empty() {
            return Err(JobnikError::InvalidJob("empty job payload".to_string()));
        }
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

impl OrderView for JobOrder {
    fn handler(&self) -> &str {
        &self.handler
    }

    fn attributes(&self) -> &[JobAttribute] {
        &self.attributes
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Tracked outcome of a job, keyed by UID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub uid: JobUid,
    pub state: JobState,

    /// Any useful information, e.g. initiator of a cancel or reason of failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memento: Option<serde_json::Value>,
}

impl JobStatus {
    pub fn new(uid: JobUid, state: JobState) -> Self {
        Self {
            uid,
            state,
            memento: None,
        }
    }

    pub fn unknown(uid: JobUid) -> Self {
        Self::new(uid, JobState::Unknown)
    }

    pub fn with_memento(mut self, memento: impl Into<serde_json::Value>) -> Self {
        self.memento = Some(memento.into());
        self
    }
}

impl StatusView for JobStatus {
    fn uid(&self) -> &JobUid {
        &self.uid
    }

    fn state(&self) -> JobState {
        self.state
    }

    fn memento(&self) -> Option<&serde_json::Value> {
        self.memento.as_ref()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.memento {
            None => write!(f, "ID {} State {}", self.uid, self.state),
            Some(m) => write!(f, "ID {} State {} Additional information {m}", self.uid, self.state),
        }
    }
}

/// A submitted job: the order plus the status assigned by the queue.
///
/// Holds one value of each part and exposes both through `OrderView` and `StatusView`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    status: JobStatus,
    order: JobOrder,
}

impl Job {
    /// Fails for an empty handler name; the payload is not validated.
    pub fn new(uid: JobUid, order: JobOrder) -> Result<Self> {
        validate(&uid, &order)?;
        Ok(Self {
            status: JobStatus::new(uid, JobState::Created),
            order,
        })
    }

    pub fn order(&self) -> &JobOrder {
        &self.order
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    pub(crate) fn set_state(&mut self, state: JobState) {
        self.status.state = state;
    }

    /// Re-check a job that was built without going through [`Job::new`].
    pub(crate) fn validated(self) -> Result<Self> {
        validate(&self.status.uid, &self.order)?;
        Ok(self)
    }
}

fn validate(uid: &JobUid, order: &JobOrder) -> Result<()> {
    if order.handler.is_empty() {
        return Err(JobnikError::InvalidJob(format!("empty handler name for {uid}")));
    }
    Ok(())
}

impl OrderView for Job {
    fn handler(&self) -> &str {
        self.order.handler()
    }

    fn attributes(&self) -> &[JobAttribute] {
        self.order.attributes()
    }

    fn payload(&self) -> &[u8] {
        self.order.payload()
    }
}

impl StatusView for Job {
    fn uid(&self) -> &JobUid {
        self.status.uid()
    }

    fn state(&self) -> JobState {
        self.status.state()
    }

    fn memento(&self) -> Option<&serde_json::Value> {
        self.status.memento()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job ID {} Handler {}", self.status.uid, self.order.handler)
    }
}
