//! Lifecycle states for scan tasks.
//!
//! A task moves `pending → running → parsing → completed` in the normal
//! case. `aborted` is reachable from `running` via an operator stop,
//! `hidden` replaces `completed` when the module opts out of result
//! persistence, and `result` is a legacy display-suppression state kept so
//! old rows keep rendering; it is excluded from default listings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Parsing,
    Completed,
    Aborted,
    Hidden,
    Result,
}

impl TaskStatus {
    /// States in which a (module, target) pair blocks a duplicate launch.
    pub const DUPLICATE_BLOCKING: [TaskStatus; 4] = [
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Parsing,
        TaskStatus::Hidden,
    ];

    /// Whether the task has reached a state it cannot leave.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Aborted
                | TaskStatus::Hidden
                | TaskStatus::Result
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Parsing => "parsing",
            TaskStatus::Completed => "completed",
            TaskStatus::Aborted => "aborted",
            TaskStatus::Hidden => "hidden",
            TaskStatus::Result => "result",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown task status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for TaskStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "parsing" => Ok(TaskStatus::Parsing),
            "completed" => Ok(TaskStatus::Completed),
            "aborted" => Ok(TaskStatus::Aborted),
            "hidden" => Ok(TaskStatus::Hidden),
            "result" => Ok(TaskStatus::Result),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_strings() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Parsing,
            TaskStatus::Completed,
            TaskStatus::Aborted,
            TaskStatus::Hidden,
            TaskStatus::Result,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
    }

    #[test]
    fn aborted_does_not_block_duplicates() {
        assert!(!TaskStatus::DUPLICATE_BLOCKING.contains(&TaskStatus::Aborted));
        assert!(TaskStatus::DUPLICATE_BLOCKING.contains(&TaskStatus::Hidden));
    }

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Aborted.is_terminal());
        assert!(TaskStatus::Result.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Parsing.is_terminal());
    }
}
