//! Request and response bodies of the Keyword API.
use serde::{Deserialize, Serialize};

/// Country/device pair a keyword is tracked for.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub country: String,
    pub device: String,
}

/// Body of `POST /keywords/multiple/create`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CreateKeywordsRequest {
    pub keywords: Vec<String>,
    pub domain: u64,
    pub star_keyword: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Response of `POST /keywords/multiple/create`.
///
/// The backend reports some failures in-band with a 2xx status, using either
/// `error` or `detail`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct CreateKeywordsResponse {
    #[serde(default)]
    pub keyword_list: Vec<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl CreateKeywordsResponse {
    pub fn rejection(&self) -> Option<&str> {
        self.error.as_deref().or(self.detail.as_deref())
    }
}

/// Body of `POST /keywords/status`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct KeywordsStatusRequest<'a> {
    pub keyword_list: &'a [u64],
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordProcessing {
    Processed,
    Pending,
    Error,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct KeywordStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_fetch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<KeywordProcessing>,
}

/// Response of `POST /keywords/status`, kept on the job as its last known
/// status.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct KeywordsStatusResponse {
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub keywords_status: Vec<KeywordStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a status response says about the batch as a whole.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BatchProgress {
    Processed,
    Failed,
    Processing,
}

impl KeywordsStatusResponse {
    /// Overall completion wins over any per-keyword error.
    pub fn progress(&self) -> BatchProgress {
        if self.status {
            BatchProgress::Processed
        } else if self.error.is_some()
            || self
                .keywords_status
                .iter()
                .any(|k| k.status == Some(KeywordProcessing::Error))
        {
            BatchProgress::Failed
        } else {
            BatchProgress::Processing
        }
    }
}
