//! Tracks keyword-creation batches until the backend has processed them.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::api::KeywordApi;
use crate::error::PersistError;
use crate::notifier::Notifier;
use crate::persistence::KeyValueStore;
use crate::settings::{Settings, DEFAULT_STORAGE_KEY};
use crate::types::job::{Job, JobId};
use crate::types::protocol::{
    BatchProgress, CreateKeywordsRequest, KeywordsStatusResponse,
};
use crate::types::states::JobState;

/// Source tag attached to refresh signals raised by finished jobs.
pub const REFRESH_SOURCE: &str = "pending-keywords";

#[derive(Clone, Debug)]
pub struct StoreOptions {
    pub pending_timeout: Duration,
    pub retention: Duration,
    pub storage_key: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            pending_timeout: Duration::from_secs(15 * 60),
            retention: Duration::from_secs(24 * 60 * 60),
            storage_key: DEFAULT_STORAGE_KEY.into(),
        }
    }
}

impl From<&Settings> for StoreOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            pending_timeout: settings.pending_timeout(),
            retention: settings.retention(),
            storage_key: settings.storage_key.clone(),
        }
    }
}

/// Result of `JobStore::add_keywords`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddKeywordsOutcome {
    pub success: bool,
    pub domain: u64,
    /// The submitted keywords, on success.
    pub keywords: Option<Vec<String>>,
    pub job_id: Option<JobId>,
}

/// What one reconciliation pass decided for a single job.
#[derive(Debug)]
enum Verdict {
    Completed(Option<KeywordsStatusResponse>),
    Failed(Option<KeywordsStatusResponse>),
    StillPending,
}

/// Owns the job list. Every mutation replaces the list under one lock and
/// persists it before the lock is released.
pub struct JobStore {
    jobs: Mutex<Vec<Job>>,
    api: Arc<dyn KeywordApi>,
    kv: Arc<dyn KeyValueStore>,
    notifier: Notifier,
    job_added: Notify,
    options: StoreOptions,
}

impl JobStore {
    /// Loads the persisted job list and drops jobs past the retention window.
    pub fn open(
        api: Arc<dyn KeywordApi>,
        kv: Arc<dyn KeyValueStore>,
        notifier: Notifier,
        options: StoreOptions,
    ) -> Result<Self, PersistError> {
        let jobs: Vec<Job> =
            kv.load(&options.storage_key)?.unwrap_or_default();
        debug!(n = jobs.len(), key = %options.storage_key, "loaded jobs");

        let store = Self {
            jobs: Mutex::new(jobs),
            api,
            kv,
            notifier,
            job_added: Notify::new(),
            options,
        };
        store.clean_up_jobs();

        Ok(store)
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Job>> {
        self.jobs.lock().unwrap()
    }

    /// Writes the list out. Persistence failures are logged, not raised: the
    /// in-memory list stays authoritative for this process.
    fn persist(&self, jobs: &[Job]) {
        if let Err(error) = self.kv.save(&self.options.storage_key, &jobs) {
            warn!(%error, "failed to persist jobs");
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Job>) -> R) -> R {
        self.mutate_if(|jobs| (f(jobs), true))
    }

    /// As `mutate`, but only persists when `f` reports a change.
    fn mutate_if<R>(&self, f: impl FnOnce(&mut Vec<Job>) -> (R, bool)) -> R {
        let mut jobs = self.lock();
        let (ret, changed) = f(&mut jobs);
        if changed {
            self.persist(&jobs);
        }
        ret
    }

    /// Records a new pending job at the front of the list.
    pub fn add_job(
        &self,
        domain: Option<String>,
        pending_keywords: Option<Vec<u64>>,
        keyword_status: Option<KeywordsStatusResponse>,
    ) -> Job {
        let job =
            Job::new(domain, pending_keywords, keyword_status, Utc::now());

        self.mutate(|jobs| {
            jobs.retain(|j| j.id != job.id);
            jobs.insert(0, job.clone());
        });
        info!(id = %job.id, domain = ?job.domain, "job added");

        self.job_added.notify_one();
        job
    }

    /// Finishes the job with `id`. Does nothing if it is absent, already
    /// finished, or `state` is `Pending`.
    pub fn update_job(&self, id: JobId, state: JobState) -> bool {
        let now = Utc::now();
        let updated = self.mutate(|jobs| {
            jobs.iter_mut()
                .find(|j| j.id == id)
                .is_some_and(|j| j.finish(state, now))
        });

        if updated {
            info!(%id, %state, "job updated");
        }
        updated
    }

    pub fn remove_job(&self, id: JobId) -> Option<Job> {
        self.mutate(|jobs| {
            let pos = jobs.iter().position(|j| j.id == id)?;
            Some(jobs.remove(pos))
        })
    }

    pub fn get_job(&self, id: JobId) -> Option<Job> {
        self.lock().iter().find(|j| j.id == id).cloned()
    }

    pub fn get_job_by_domain(&self, domain: &str) -> Option<Job> {
        self.lock()
            .iter()
            .find(|j| j.domain.as_deref() == Some(domain))
            .cloned()
    }

    /// Snapshot of every job, most recent first.
    pub fn jobs(&self) -> Vec<Job> {
        self.lock().clone()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().iter().filter(|j| j.is_pending()).count()
    }

    /// Drops jobs created longer ago than the retention window.
    pub fn clean_up_jobs(&self) -> usize {
        self.clean_up_jobs_at(Utc::now())
    }

    fn clean_up_jobs_at(&self, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::from_std(self.options.retention)
            .unwrap_or(chrono::Duration::MAX);

        let removed = self.mutate_if(|jobs| {
            let before = jobs.len();
            jobs.retain(|j| now - j.created_at < retention);
            let removed = before - jobs.len();
            (removed, removed > 0)
        });

        if removed > 0 {
            info!(removed, "cleaned up expired jobs");
        }
        removed
    }

    /// Removes every finished job, returning how many went.
    pub fn clear_finished(&self) -> usize {
        self.mutate(|jobs| {
            let (pending, finished): (Vec<Job>, Vec<Job>) =
                jobs.drain(..).partition(Job::is_pending);
            *jobs = pending;
            finished.len()
        })
    }

    /// Resolves once a job has been added since the last call.
    pub(crate) async fn job_added(&self) {
        self.job_added.notified().await
    }

    /// Submits keywords to the backend and, if accepted, starts tracking the
    /// returned keyword ids.
    #[instrument(skip_all, fields(domain = request.domain))]
    pub async fn add_keywords(
        &self,
        request: CreateKeywordsRequest,
    ) -> AddKeywordsOutcome {
        match self.api.create_keywords(&request).await {
            Ok(keyword_ids) => {
                let job = self.add_job(
                    Some(request.domain.to_string()),
                    Some(keyword_ids),
                    None,
                );
                AddKeywordsOutcome {
                    success: true,
                    domain: request.domain,
                    keywords: Some(request.keywords),
                    job_id: Some(job.id),
                }
            },
            Err(error) => {
                warn!(%error, "failed to create keywords");
                AddKeywordsOutcome {
                    success: false,
                    domain: request.domain,
                    keywords: None,
                    job_id: None,
                }
            },
        }
    }

    /// Checks every pending job against the backend and finishes those that
    /// are done, failed, or timed out. Returns how many jobs finished.
    ///
    /// Only jobs pending when the pass starts are checked. Results are merged
    /// back by id, so jobs added or removed meanwhile are left alone.
    #[instrument(skip_all)]
    pub async fn revalidate_jobs(&self) -> usize {
        let pending: Vec<Job> =
            self.lock().iter().filter(|j| j.is_pending()).cloned().collect();
        if pending.is_empty() {
            return 0;
        }

        let started = Utc::now();
        let timeout = chrono::Duration::from_std(self.options.pending_timeout)
            .unwrap_or(chrono::Duration::MAX);

        let mut checks = JoinSet::new();
        let mut tasks = HashMap::new();
        for job in pending {
            let api = Arc::clone(&self.api);
            let (id, created_at) = (job.id, job.created_at);
            let task = checks.spawn(async move {
                check_job(api.as_ref(), &job, started, timeout).await
            });
            tasks.insert(task.id(), (id, created_at));
        }

        let mut verdicts = Vec::new();
        while let Some(joined) = checks.join_next_with_id().await {
            match joined {
                Ok((task, verdict)) => {
                    if let Some(&(id, _)) = tasks.get(&task) {
                        verdicts.push((id, verdict));
                    }
                },
                Err(error) => {
                    let Some(&(id, created_at)) = tasks.get(&error.id()) else {
                        continue;
                    };
                    warn!(%id, %error, "job check panicked");
                    // Still subject to the timeout, so a check that always
                    // panics can't keep a job pending forever.
                    if started - created_at > timeout {
                        warn!(%id, "job timed out");
                        verdicts.push((id, Verdict::Failed(None)));
                    }
                },
            }
        }

        let now = Utc::now();
        let (finished, refreshes) = self.mutate_if(|jobs| {
            let mut finished = 0;
            let mut refreshes = Vec::new();
            for (id, verdict) in verdicts {
                let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
                    continue;
                };
                let (state, status) = match verdict {
                    Verdict::StillPending => continue,
                    Verdict::Completed(s) => (JobState::Completed, s),
                    Verdict::Failed(s) => (JobState::Error, s),
                };
                if !job.finish(state, now) {
                    continue;
                }
                finished += 1;
                info!(%id, %state, "job finished");

                if let Some(status) = status {
                    job.keyword_status = Some(status);
                    // Empty batches complete without touching keyword data.
                    if state == JobState::Completed {
                        refreshes.extend(job.domain.clone());
                    }
                }
            }
            ((finished, refreshes), finished > 0)
        });

        // Publish outside the lock.
        for domain in refreshes.iter().unique() {
            self.notifier.publish(domain, REFRESH_SOURCE);
        }

        debug!(finished, "revalidation pass done");
        finished
    }
}

async fn check_job(
    api: &dyn KeywordApi,
    job: &Job,
    now: DateTime<Utc>,
    timeout: chrono::Duration,
) -> Verdict {
    let Some(keywords) = job.awaited_keywords() else {
        return Verdict::Completed(None);
    };

    let status = match api.keywords_status(keywords).await {
        Ok(status) => status,
        Err(error) => {
            warn!(id = %job.id, %error, "status check failed");
            return Verdict::Failed(None);
        },
    };

    match status.progress() {
        BatchProgress::Processed => Verdict::Completed(Some(status)),
        BatchProgress::Failed => Verdict::Failed(Some(status)),
        BatchProgress::Processing if now - job.created_at > timeout => {
            warn!(id = %job.id, "job timed out");
            Verdict::Failed(None)
        },
        BatchProgress::Processing => Verdict::StillPending,
    }
}
