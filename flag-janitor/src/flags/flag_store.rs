use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::flags::flag_models::{
    CleanupJob, CleanupJobId, Flag, FlagId, FlagStatus, FlagWithCleanup, NewFlag,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database unavailable")]
    Unavailable,
    #[error("database error: {0}")]
    Query(#[from] sqlx::Error),
    #[error("an in-flight cleanup job already exists for flag {0}")]
    ActiveJobExists(FlagId),
    #[error("invalid flag: {0}")]
    InvalidFlag(String),
    #[error("cleanup job {0} not found")]
    JobNotFound(CleanupJobId),
    #[error("flag {0} not found")]
    FlagNotFound(FlagId),
}

/// Persistence for flags and their cleanup jobs.
///
/// Every write is committed on return. The only multi-row write is `attach_issue`,
/// which moves the job and its flag forward together.
#[async_trait]
pub trait FlagStore {
    /// All flags, newest created first, each with its most recent cleanup job.
    async fn list_flags(&self) -> Result<Vec<FlagWithCleanup>, StoreError>;

    async fn get_flag(&self, id: FlagId) -> Result<Option<Flag>, StoreError>;

    async fn get_flag_with_cleanup(
        &self,
        id: FlagId,
    ) -> Result<Option<FlagWithCleanup>, StoreError>;

    async fn flags_with_status(&self, statuses: &[FlagStatus]) -> Result<Vec<Flag>, StoreError>;

    async fn set_flag_status(&self, id: FlagId, status: FlagStatus) -> Result<(), StoreError>;

    async fn insert_flag(&self, new_flag: NewFlag) -> Result<Flag, StoreError>;

    /// Removes every flag and cleanup job. Only the seed tool calls this.
    async fn clear(&self) -> Result<(), StoreError>;

    async fn active_cleanup_job(&self, flag_id: FlagId)
        -> Result<Option<CleanupJob>, StoreError>;

    /// Inserts a `Pending` job for the flag. Fails with `ActiveJobExists` when another
    /// in-flight job already holds the slot.
    async fn reserve_cleanup_job(
        &self,
        flag_id: FlagId,
        triggered_at: DateTime<Utc>,
    ) -> Result<CleanupJob, StoreError>;

    /// Drops a `Pending` reservation that never got an issue.
    async fn release_cleanup_job(&self, job_id: CleanupJobId) -> Result<(), StoreError>;

    /// Marks the job `IssueCreated` with the issue coordinates and moves the flag to
    /// `CleanupPending`, atomically. Fails with `JobNotFound` or `FlagNotFound`, leaving
    /// both rows untouched, when either side is missing.
    async fn attach_issue(
        &self,
        job_id: CleanupJobId,
        flag_id: FlagId,
        issue_url: &str,
        issue_number: i32,
    ) -> Result<CleanupJob, StoreError>;
}

/// Determines if a sqlx::Error represents a unique constraint violation
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => {
            // Class 23 is Integrity Constraint Violation, 23505 = unique_violation
            if let Some(code) = db_error.code() {
                code.as_ref() == "23505"
            } else {
                db_error
                    .message()
                    .to_lowercase()
                    .contains("duplicate key value")
            }
        }
        _ => false,
    }
}
