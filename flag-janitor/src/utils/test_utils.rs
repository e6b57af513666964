use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use rand::{distributions::Alphanumeric, Rng};
use uuid::Uuid;

use crate::config::Config;
use crate::flags::flag_models::{
    CleanupJob, CleanupJobId, Flag, FlagId, FlagStatus, FlagWithCleanup, NewFlag,
};
use crate::flags::flag_store::{FlagStore, StoreError};
use crate::flags::memory_store::MemoryFlagStore;
use crate::issue_tracker::{CleanupIssue, IssueTracker, IssueTrackerError, TrackedIssue};
use crate::rules::rule_engine::RuleEngine;
use crate::state::AppState;

pub static DEFAULT_TEST_CONFIG: Lazy<Config> = Lazy::new(Config::default_for_test);

pub fn random_string(prefix: &str, length: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, suffix)
}

pub fn days_ago(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}

/// An `Active` flag created a year ago by "tester".
pub fn new_flag(
    key: &str,
    rollout_percent: i32,
    last_evaluated_at: Option<DateTime<Utc>>,
) -> NewFlag {
    NewFlag {
        key: key.to_string(),
        name: key.replace('_', " "),
        description: None,
        created_at: days_ago(Utc::now(), 365),
        created_by: "tester".to_string(),
        rollout_percent,
        last_evaluated_at,
        status: FlagStatus::Active,
    }
}

/// A standalone `Flag` with a random key, for code that never touches a store.
pub fn flag_with(rollout_percent: i32, last_evaluated_at: Option<DateTime<Utc>>) -> Flag {
    new_flag(&random_string("flag_", 8), rollout_percent, last_evaluated_at)
        .into_flag(Uuid::new_v4())
}

/// Records every issue it is asked to open. Numbers issues from 1 unless built with
/// `failing()`, in which case every call errors.
#[derive(Default)]
pub struct MockIssueTracker {
    fail: bool,
    calls: AtomicUsize,
    drafts: Mutex<Vec<CleanupIssue>>,
}

impl MockIssueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn drafts(&self) -> Vec<CleanupIssue> {
        self.drafts.lock().unwrap().clone()
    }
}

#[async_trait]
impl IssueTracker for MockIssueTracker {
    async fn create_cleanup_issue(
        &self,
        issue: &CleanupIssue,
    ) -> Result<TrackedIssue, IssueTrackerError> {
        let number = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.drafts.lock().unwrap().push(issue.clone());

        if self.fail {
            return Err(IssueTrackerError::UnexpectedStatus {
                status: 503,
                body: "tracker unavailable".to_string(),
            });
        }

        Ok(TrackedIssue {
            url: format!("https://github.com/acme/webapp/issues/{number}"),
            number: number as i32,
        })
    }
}

/// Wraps a `MemoryFlagStore` and injects failures into individual writes.
///
/// `racing_reservations` makes every reservation lose to a competing request that
/// reserves the same flag first.
pub struct FaultyFlagStore {
    pub inner: Arc<MemoryFlagStore>,
    fail_attach: AtomicBool,
    racing_reservations: AtomicBool,
    status_updates_before_failure: Option<usize>,
    status_updates: AtomicUsize,
}

impl FaultyFlagStore {
    pub fn new(inner: Arc<MemoryFlagStore>) -> Self {
        Self {
            inner,
            fail_attach: AtomicBool::new(false),
            racing_reservations: AtomicBool::new(false),
            status_updates_before_failure: None,
            status_updates: AtomicUsize::new(0),
        }
    }

    pub fn failing_attach(self) -> Self {
        self.fail_attach.store(true, Ordering::SeqCst);
        self
    }

    pub fn racing_reservations(self) -> Self {
        self.racing_reservations.store(true, Ordering::SeqCst);
        self
    }

    /// Lets `successes` status updates through, then fails every later one.
    pub fn failing_status_updates_after(mut self, successes: usize) -> Self {
        self.status_updates_before_failure = Some(successes);
        self
    }

    pub fn heal(&self) {
        self.fail_attach.store(false, Ordering::SeqCst);
        self.racing_reservations.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl FlagStore for FaultyFlagStore {
    async fn list_flags(&self) -> Result<Vec<FlagWithCleanup>, StoreError> {
        self.inner.list_flags().await
    }

    async fn get_flag(&self, id: FlagId) -> Result<Option<Flag>, StoreError> {
        self.inner.get_flag(id).await
    }

    async fn get_flag_with_cleanup(
        &self,
        id: FlagId,
    ) -> Result<Option<FlagWithCleanup>, StoreError> {
        self.inner.get_flag_with_cleanup(id).await
    }

    async fn flags_with_status(&self, statuses: &[FlagStatus]) -> Result<Vec<Flag>, StoreError> {
        self.inner.flags_with_status(statuses).await
    }

    async fn set_flag_status(&self, id: FlagId, status: FlagStatus) -> Result<(), StoreError> {
        let attempt = self.status_updates.fetch_add(1, Ordering::SeqCst);
        if self
            .status_updates_before_failure
            .is_some_and(|successes| attempt >= successes)
        {
            return Err(StoreError::Unavailable);
        }
        self.inner.set_flag_status(id, status).await
    }

    async fn insert_flag(&self, new_flag: NewFlag) -> Result<Flag, StoreError> {
        self.inner.insert_flag(new_flag).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear().await
    }

    async fn active_cleanup_job(
        &self,
        flag_id: FlagId,
    ) -> Result<Option<CleanupJob>, StoreError> {
        self.inner.active_cleanup_job(flag_id).await
    }

    async fn reserve_cleanup_job(
        &self,
        flag_id: FlagId,
        triggered_at: DateTime<Utc>,
    ) -> Result<CleanupJob, StoreError> {
        if self.racing_reservations.load(Ordering::SeqCst) {
            self.inner.reserve_cleanup_job(flag_id, triggered_at).await?;
        }
        self.inner.reserve_cleanup_job(flag_id, triggered_at).await
    }

    async fn release_cleanup_job(&self, job_id: CleanupJobId) -> Result<(), StoreError> {
        self.inner.release_cleanup_job(job_id).await
    }

    async fn attach_issue(
        &self,
        job_id: CleanupJobId,
        flag_id: FlagId,
        issue_url: &str,
        issue_number: i32,
    ) -> Result<CleanupJob, StoreError> {
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        self.inner
            .attach_issue(job_id, flag_id, issue_url, issue_number)
            .await
    }
}

/// App state over an in-memory store, using the test config's stale threshold.
pub fn memory_state(
    store: Arc<MemoryFlagStore>,
    tracker: Arc<MockIssueTracker>,
    config: Option<&Config>,
) -> AppState {
    let config = config.unwrap_or(&DEFAULT_TEST_CONFIG);
    AppState::new(
        store,
        tracker,
        Arc::new(RuleEngine::with_default_rules(config.stale_after_days)),
        *config.enable_metrics,
    )
}
