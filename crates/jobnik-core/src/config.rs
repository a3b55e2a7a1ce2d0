//! Configuration loaded from a JSON file.
//!
//! ```json
//! {
//!   "queue": "inmemoryqueue",
//!   "capacity": 1024,
//!   "handlers": [
//!     { "name": "printAttributes", "config": { "info": true } },
//!     { "name": "loopTillCancel" }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::queue::INMEMORY_QUEUE;

/// In-memory queue settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of queued, undelivered jobs. `None` = unbounded.
    #[serde(default)]
    pub capacity: Option<usize>,
}

/// One handler to create and initialize at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    pub name: String,

    /// Passed to `init_once` as JSON text. Absent means defaults.
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

impl HandlerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: None,
        }
    }

    /// JSON text for `init_once`; empty when no config is given.
    pub fn init_text(&self) -> Result<String> {
        match &self.config {
            None => Ok(String::new()),
            Some(value) => Ok(serde_json::to_string(value)?),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Registered queue backend name.
    #[serde(default = "default_queue")]
    pub queue: String,

    #[serde(default)]
    pub capacity: Option<usize>,

    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

fn default_queue() -> String {
    INMEMORY_QUEUE.to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: default_queue(),
            capacity: None,
            handlers: Vec::new(),
        }
    }
}

impl WorkerConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobnikError;

    #[test]
    fn empty_object_uses_defaults() {
        let config = WorkerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.queue, "inmemoryqueue");
    }

    #[test]
    fn handlers_keep_their_config_as_text() {
        let config = WorkerConfig::from_json_str(
            r#"{
                "capacity": 8,
                "handlers": [
                    { "name": "printAttributes", "config": { "info": true } },
                    { "name": "loopTillCancel" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.queue_config(), QueueConfig { capacity: Some(8) });
        assert_eq!(config.handlers[0].init_text().unwrap(), r#"{"info":true}"#);
        assert_eq!(config.handlers[1].init_text().unwrap(), "");
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = WorkerConfig::from_json_str("{ handlers: ").unwrap_err();
        assert!(matches!(err, JobnikError::Json(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = WorkerConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, JobnikError::Io(_)));
    }
}
