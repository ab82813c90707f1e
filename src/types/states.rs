use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a pending-keyword job. `Pending` is the only non-terminal
/// state: nothing ever moves a job back into it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Completed,
    Error,
}

impl JobState {
    pub fn is_finished(self) -> bool {
        !matches!(self, JobState::Pending)
    }

    pub fn as_str(self) -> &'static str {
        use JobState::*;

        match self {
            Pending => "pending",
            Completed => "completed",
            Error => "error",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
