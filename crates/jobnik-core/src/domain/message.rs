//! Message bridge - job data <-> string-keyed field map
//!
//! Transports that move jobs between processes work on a flat field map.
//! The conversion here is a plain serde pass-through; naming of transport
//! specific fields is left to the transport integration.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::job::{Job, JobOrder, JobStatus};
use crate::error::{JobnikError, Result};

/// String-keyed field map used by transports.
pub type Message = BTreeMap<String, serde_json::Value>;

/// Conversion to and from a [`Message`].
pub trait MessageCodec: Sized {
    fn to_message(&self) -> Result<Message>;

    fn from_message(message: &Message) -> Result<Self>;
}

fn encode<T: Serialize>(value: &T) -> Result<Message> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(fields) => Ok(fields.into_iter().collect()),
        other => Err(JobnikError::Other(format!(
            "expected an object, got {other}"
        ))),
    }
}

fn decode<T: DeserializeOwned>(message: &Message) -> Result<T> {
    let fields: serde_json::Map<String, serde_json::Value> = message
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Ok(serde_json::from_value(serde_json::Value::Object(fields))?)
}

impl MessageCodec for JobOrder {
    fn to_message(&self) -> Result<Message> {
        encode(self)
    }

    fn from_message(message: &Message) -> Result<Self> {
        decode(message)
    }
}

impl MessageCodec for JobStatus {
    fn to_message(&self) -> Result<Message> {
        encode(self)
    }

    fn from_message(message: &Message) -> Result<Self> {
        decode(message)
    }
}

impl MessageCodec for Job {
    fn to_message(&self) -> Result<Message> {
        encode(self)
    }

    /// Same validation as [`Job::new`].
    fn from_message(message: &Message) -> Result<Self> {
        decode::<Job>(message)?.validated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobState, JobUid};
    use ulid::Ulid;

    #[test]
    fn status_fields_are_flat() {
        let status = JobStatus::new(JobUid::from_ulid(Ulid::new()), JobState::Failed)
            .with_memento("boom");
        let msg = status.to_message().unwrap();
        assert_eq!(msg["state"], "failed");
        assert_eq!(msg["memento"], "boom");
        assert_eq!(JobStatus::from_message(&msg).unwrap(), status);
    }

    #[test]
    fn order_without_optional_fields_decodes() {
        let mut msg = Message::new();
        msg.insert("handler".to_string(), "printattributes".into());
        let order = JobOrder::from_message(&msg).unwrap();
        assert_eq!(order, JobOrder::new("printattributes"));
    }

    #[test]
    fn job_with_empty_handler_is_rejected() {
        let order = JobOrder::new("printattributes").with_attribute("a", "b");
        let job = Job::new(JobUid::from_ulid(Ulid::new()), order).unwrap();
        let mut msg = job.to_message().unwrap();
        assert_eq!(Job::from_message(&msg).unwrap(), job);

        msg.get_mut("order").unwrap()["handler"] = "".into();
        let err = Job::from_message(&msg).unwrap_err();
        assert!(matches!(err, JobnikError::InvalidJob(_)));
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let msg = Message::new();
        assert!(JobStatus::from_message(&msg).is_err());
    }
}
