use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::protocol::KeywordsStatusResponse;
use super::states::JobState;

#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// One batch of keywords submitted for a domain, tracked until the backend
/// reports them processed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub domain: Option<String>,
    pub pending_keywords: Option<Vec<u64>>,
    pub keyword_status: Option<KeywordsStatusResponse>,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    /// Set exactly when `state` leaves `Pending`.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        domain: Option<String>,
        pending_keywords: Option<Vec<u64>>,
        keyword_status: Option<KeywordsStatusResponse>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            domain,
            pending_keywords,
            keyword_status,
            state: JobState::Pending,
            created_at: now,
            finished_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == JobState::Pending
    }

    /// Keyword ids still awaited, if there are any.
    pub fn awaited_keywords(&self) -> Option<&[u64]> {
        self.pending_keywords
            .as_deref()
            .filter(|keywords| !keywords.is_empty())
    }

    /// Moves the job into a finished state. Returns false, leaving the job
    /// untouched, if it has already finished or `state` is `Pending`.
    pub(crate) fn finish(&mut self, state: JobState, at: DateTime<Utc>) -> bool {
        if self.state.is_finished() || !state.is_finished() {
            return false;
        }

        self.state = state;
        self.finished_at = Some(at);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_is_forward_only() {
        let now = Utc::now();
        let mut job = Job::new(Some("1".into()), Some(vec![7]), None, now);

        assert!(!job.finish(JobState::Pending, now));
        assert!(job.finished_at.is_none());

        assert!(job.finish(JobState::Completed, now));
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.finished_at, Some(now));

        assert!(!job.finish(JobState::Error, now));
        assert_eq!(job.state, JobState::Completed);
    }

    #[test]
    fn test_awaited_keywords() {
        let now = Utc::now();

        let job = Job::new(None, None, None, now);
        assert_eq!(job.awaited_keywords(), None);

        let job = Job::new(None, Some(vec![]), None, now);
        assert_eq!(job.awaited_keywords(), None);

        let job = Job::new(None, Some(vec![1, 2]), None, now);
        assert_eq!(job.awaited_keywords(), Some(&[1, 2][..]));
    }

    #[test]
    fn test_serialised_field_names() {
        let job = Job::new(Some("42".into()), Some(vec![101]), None, Utc::now());
        let value = serde_json::to_value(&job).unwrap();

        assert_eq!(value["domain"], "42");
        assert_eq!(value["pendingKeywords"], serde_json::json!([101]));
        assert_eq!(value["state"], "pending");
        assert!(value["finishedAt"].is_null());
        assert!(value.get("createdAt").is_some());
    }
}
