use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::flags::flag_models::{CleanupJob, FlagId, FlagStatus};
use crate::flags::flag_store::{FlagStore, StoreError};
use crate::issue_tracker::{CleanupIssue, IssueTracker, IssueTrackerError, TrackedIssue};
use crate::metrics::consts::{CLEANUP_REQUESTS_COUNTER, ISSUE_TRACKER_ERRORS_COUNTER};
use crate::metrics::inc;
use crate::rules::rule_engine::RuleEngine;

#[derive(Error, Debug)]
pub enum CleanupError {
    #[error("Flag not found")]
    NotFound,
    #[error("Cleanup already in progress for this flag")]
    Conflict(CleanupJob),
    #[error("Flag is {} and cannot be cleaned up again", .0.as_str())]
    NotCleanable(FlagStatus),
    #[error("Issue tracker request failed: {0}")]
    UpstreamFailure(#[source] IssueTrackerError),
    #[error("Failed to persist cleanup: {0}")]
    PersistenceFailure(#[from] StoreError),
}

impl CleanupError {
    fn outcome(&self) -> &'static str {
        match self {
            CleanupError::NotFound => "not_found",
            CleanupError::Conflict(_) => "conflict",
            CleanupError::NotCleanable(_) => "not_cleanable",
            CleanupError::UpstreamFailure(_) => "upstream_failure",
            CleanupError::PersistenceFailure(_) => "persistence_failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupOutcome {
    pub cleanup_job: CleanupJob,
    pub issue: TrackedIssue,
}

/// Drives one cleanup request: reserve a job, open the issue, then record both.
pub struct CleanupService {
    store: Arc<dyn FlagStore + Send + Sync>,
    tracker: Arc<dyn IssueTracker + Send + Sync>,
    engine: Arc<RuleEngine>,
}

impl CleanupService {
    pub fn new(
        store: Arc<dyn FlagStore + Send + Sync>,
        tracker: Arc<dyn IssueTracker + Send + Sync>,
        engine: Arc<RuleEngine>,
    ) -> Self {
        Self {
            store,
            tracker,
            engine,
        }
    }

    /// `flag_id` is taken as sent by the client; anything that is not a UUID cannot name a
    /// flag and is reported as `NotFound`.
    #[instrument(skip(self))]
    pub async fn request_cleanup(
        &self,
        flag_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CleanupOutcome, CleanupError> {
        let result = match Uuid::parse_str(flag_id.trim()) {
            Ok(id) => self.cleanup_flag(id, now).await,
            Err(_) => Err(CleanupError::NotFound),
        };

        let outcome = match &result {
            Ok(_) => "issue_created",
            Err(e) => e.outcome(),
        };
        inc(CLEANUP_REQUESTS_COUNTER, &[("outcome", outcome.to_string())], 1);

        result
    }

    async fn cleanup_flag(
        &self,
        flag_id: FlagId,
        now: DateTime<Utc>,
    ) -> Result<CleanupOutcome, CleanupError> {
        let flag = self
            .store
            .get_flag(flag_id)
            .await?
            .ok_or(CleanupError::NotFound)?;

        if let Some(existing) = self.store.active_cleanup_job(flag.id).await? {
            return Err(CleanupError::Conflict(existing));
        }
        if !flag.status.accepts_cleanup() {
            return Err(CleanupError::NotCleanable(flag.status));
        }

        let job = match self.store.reserve_cleanup_job(flag.id, now).await {
            Ok(job) => job,
            Err(StoreError::ActiveJobExists(_)) => {
                // Lost the race to a concurrent request; report the job that won
                return match self.store.active_cleanup_job(flag.id).await? {
                    Some(existing) => Err(CleanupError::Conflict(existing)),
                    None => Err(CleanupError::PersistenceFailure(
                        StoreError::ActiveJobExists(flag.id),
                    )),
                };
            }
            Err(e) => return Err(e.into()),
        };

        let reason = self.engine.evaluate(&flag, now).reason;
        let draft = CleanupIssue::for_flag(&flag, reason);

        let issue = match self.tracker.create_cleanup_issue(&draft).await {
            Ok(issue) => issue,
            Err(e) => {
                tracing::error!(flag_id = %flag.id, error = %e, "Failed to create cleanup issue");
                inc(ISSUE_TRACKER_ERRORS_COUNTER, &[], 1);
                if let Err(release_error) = self.store.release_cleanup_job(job.id).await {
                    tracing::error!(
                        job_id = %job.id,
                        error = %release_error,
                        "Failed to release cleanup reservation"
                    );
                }
                return Err(CleanupError::UpstreamFailure(e));
            }
        };

        match self
            .store
            .attach_issue(job.id, flag.id, &issue.url, issue.number)
            .await
        {
            Ok(cleanup_job) => {
                tracing::info!(
                    flag_key = %flag.key,
                    issue_number = issue.number,
                    "Cleanup issue created"
                );
                Ok(CleanupOutcome { cleanup_job, issue })
            }
            Err(e) => {
                // The issue exists upstream but is not recorded. The PENDING row stays
                // behind and blocks duplicate issues until someone reconciles it.
                tracing::error!(
                    flag_id = %flag.id,
                    job_id = %job.id,
                    issue_url = %issue.url,
                    error = %e,
                    "Cleanup issue created but not recorded, needs manual reconciliation"
                );
                Err(CleanupError::PersistenceFailure(e))
            }
        }
    }
}
