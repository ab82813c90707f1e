//! Client for the external Keyword API.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::ApiError;
use crate::types::protocol::{
    CreateKeywordsRequest, CreateKeywordsResponse, KeywordsStatusRequest,
    KeywordsStatusResponse,
};

/// The two Keyword API calls the job store depends on.
#[async_trait]
pub trait KeywordApi: Send + Sync {
    /// Creates a batch of keywords, returning their ids.
    async fn create_keywords(
        &self,
        request: &CreateKeywordsRequest,
    ) -> Result<Vec<u64>, ApiError>;

    /// Reports processing status of the given keyword ids.
    async fn keywords_status(
        &self,
        keyword_list: &[u64],
    ) -> Result<KeywordsStatusResponse, ApiError>;
}

pub struct HttpKeywordApi {
    http_client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpKeywordApi {
    /// Builds a client against `base_url`, sending `token` as a bearer token
    /// when one is given.
    ///
    /// # Errors
    /// * If the TLS backend can't be initialised.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        let mut request = self.http_client.post(self.url(path)).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            status => {
                let text = response.text().await?;
                Err(ApiError::UnexpectedStatus { status, text })
            },
        }
    }
}

#[async_trait]
impl KeywordApi for HttpKeywordApi {
    #[instrument(
        skip_all,
        fields(domain = request.domain, n = request.keywords.len()),
        err
    )]
    async fn create_keywords(
        &self,
        request: &CreateKeywordsRequest,
    ) -> Result<Vec<u64>, ApiError> {
        let response: CreateKeywordsResponse =
            self.post("keywords/multiple/create", request).await?;

        if let Some(reason) = response.rejection() {
            return Err(ApiError::Rejected(reason.to_string()));
        }

        debug!(ids = ?response.keyword_list, "keywords created");
        Ok(response.keyword_list)
    }

    #[instrument(skip_all, fields(n = keyword_list.len()), err)]
    async fn keywords_status(
        &self,
        keyword_list: &[u64],
    ) -> Result<KeywordsStatusResponse, ApiError> {
        self.post("keywords/status", &KeywordsStatusRequest { keyword_list })
            .await
    }
}

#[cfg(test)]
pub(crate) mod fake;
