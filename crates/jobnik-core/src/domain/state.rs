//! State - ジョブの状態

use serde::{Deserialize, Serialize};
use std::fmt;

/// JobState はジョブのライフサイクル上の段階
///
/// # 状態遷移
/// - Submitted -> InProcess -> Finished | Failed | Cancelled
///
/// `Unknown` は「記録なし」を表す読み取り時のデフォルトで、status table には保存されない。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Unknown,

    /// All information was added, ready for submit.
    Created,

    /// Within the queue.
    Submitted,

    /// Received on the worker side.
    Received,

    /// Handed to a handler.
    InProcess,

    /// Cancelled by a user or another application.
    Cancelled,

    Finished,

    Failed,
}

impl JobState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Cancelled | JobState::Finished | JobState::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Unknown => "Unknown",
            JobState::Created => "Created",
            JobState::Submitted => "Submitted",
            JobState::Received => "Received",
            JobState::InProcess => "InProcess",
            JobState::Cancelled => "Cancelled",
            JobState::Finished => "Finished",
            JobState::Failed => "Failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
