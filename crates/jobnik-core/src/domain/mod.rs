//! Domain model: identifiers, job records, states, and the message bridge.

pub mod ids;
pub mod job;
pub mod message;
pub mod state;

pub use ids::{JobUid, ParseUidError};
pub use job::{Job, JobAttribute, JobOrder, JobStatus, OrderView, StatusView};
pub use message::{Message, MessageCodec};
pub use state::JobState;
