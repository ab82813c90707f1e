//! Scripted `KeywordApi` for tests.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::Semaphore;

use super::KeywordApi;
use crate::error::ApiError;
use crate::types::protocol::{CreateKeywordsRequest, KeywordsStatusResponse};

#[derive(Clone, Debug)]
pub(crate) enum Scripted<T> {
    Ok(T),
    Fail(StatusCode),
    Panic,
}

impl<T: Clone> Scripted<T> {
    fn result(&self) -> Result<T, ApiError> {
        match self {
            Scripted::Ok(v) => Ok(v.clone()),
            Scripted::Fail(status) => Err(ApiError::UnexpectedStatus {
                status: *status,
                text: "scripted failure".into(),
            }),
            Scripted::Panic => panic!("scripted panic"),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeKeywordApi {
    create: Mutex<Option<Scripted<Vec<u64>>>>,
    /// Status replies keyed by the exact keyword list asked about.
    status: Mutex<HashMap<Vec<u64>, Scripted<KeywordsStatusResponse>>>,
    pub(crate) created: Mutex<Vec<CreateKeywordsRequest>>,
    pub(crate) status_calls: Mutex<Vec<Vec<u64>>>,
    /// When set, each status call waits for a permit before replying.
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeKeywordApi {
    pub(crate) fn on_create(&self, reply: Scripted<Vec<u64>>) {
        *self.create.lock().unwrap() = Some(reply);
    }

    pub(crate) fn on_status(
        &self,
        keywords: &[u64],
        reply: Scripted<KeywordsStatusResponse>,
    ) {
        self.status.lock().unwrap().insert(keywords.to_vec(), reply);
    }

    /// Holds status calls until permits are added to the returned gate.
    pub(crate) fn hold_status(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub(crate) fn status_call_count(&self) -> usize {
        self.status_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl KeywordApi for FakeKeywordApi {
    async fn create_keywords(
        &self,
        request: &CreateKeywordsRequest,
    ) -> Result<Vec<u64>, ApiError> {
        self.created.lock().unwrap().push(request.clone());
        let reply = self.create.lock().unwrap().clone();
        reply
            .unwrap_or(Scripted::Fail(StatusCode::NOT_IMPLEMENTED))
            .result()
    }

    async fn keywords_status(
        &self,
        keyword_list: &[u64],
    ) -> Result<KeywordsStatusResponse, ApiError> {
        self.status_calls.lock().unwrap().push(keyword_list.to_vec());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let reply = self.status.lock().unwrap().get(keyword_list).cloned();
        reply
            .unwrap_or(Scripted::Fail(StatusCode::NOT_FOUND))
            .result()
    }
}

pub(crate) fn processing() -> KeywordsStatusResponse {
    KeywordsStatusResponse::default()
}

pub(crate) fn processed() -> KeywordsStatusResponse {
    KeywordsStatusResponse {
        status: true,
        ..Default::default()
    }
}
