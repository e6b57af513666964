use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::flags::flag_models::{
    CleanupJob, CleanupJobId, CleanupStatus, Flag, FlagId, FlagStatus, FlagWithCleanup, NewFlag,
};
use crate::flags::flag_store::{FlagStore, StoreError};

#[derive(Default)]
struct Tables {
    flags: Vec<Flag>,
    jobs: Vec<CleanupJob>,
}

impl Tables {
    fn latest_job(&self, flag_id: FlagId) -> Option<&CleanupJob> {
        self.jobs
            .iter()
            .filter(|job| job.flag_id == flag_id)
            .max_by_key(|job| job.triggered_at)
    }

    fn with_cleanup(&self, flag: &Flag) -> FlagWithCleanup {
        FlagWithCleanup {
            flag: flag.clone(),
            cleanup_jobs: self.latest_job(flag.id).cloned().into_iter().collect(),
        }
    }
}

/// In-process `FlagStore`, holding the same invariants as the Postgres tables:
/// unique flag keys and at most one in-flight cleanup job per flag.
///
/// Used by the integration tests and for running the dashboard without a database.
#[derive(Default)]
pub struct MemoryFlagStore {
    tables: Mutex<Tables>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| {
            tracing::error!("poisoned MemoryFlagStore mutex");
            StoreError::Unavailable
        })
    }

    /// Every job ever recorded for a flag, oldest first.
    pub fn jobs_for(&self, flag_id: FlagId) -> Vec<CleanupJob> {
        let Ok(tables) = self.tables.lock() else {
            return vec![];
        };
        let mut jobs: Vec<CleanupJob> = tables
            .jobs
            .iter()
            .filter(|job| job.flag_id == flag_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.triggered_at);
        jobs
    }

    #[cfg(test)]
    pub(crate) fn finish_job(&self, job_id: CleanupJobId, status: CleanupStatus) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(job) = tables.jobs.iter_mut().find(|job| job.id == job_id) {
            job.status = status;
        }
    }
}

#[async_trait]
impl FlagStore for MemoryFlagStore {
    async fn list_flags(&self) -> Result<Vec<FlagWithCleanup>, StoreError> {
        let tables = self.lock()?;
        let mut flags: Vec<FlagWithCleanup> = tables
            .flags
            .iter()
            .map(|flag| tables.with_cleanup(flag))
            .collect();
        flags.sort_by(|a, b| b.flag.created_at.cmp(&a.flag.created_at));
        Ok(flags)
    }

    async fn get_flag(&self, id: FlagId) -> Result<Option<Flag>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.flags.iter().find(|flag| flag.id == id).cloned())
    }

    async fn get_flag_with_cleanup(
        &self,
        id: FlagId,
    ) -> Result<Option<FlagWithCleanup>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .flags
            .iter()
            .find(|flag| flag.id == id)
            .map(|flag| tables.with_cleanup(flag)))
    }

    async fn flags_with_status(&self, statuses: &[FlagStatus]) -> Result<Vec<Flag>, StoreError> {
        let tables = self.lock()?;
        let mut flags: Vec<Flag> = tables
            .flags
            .iter()
            .filter(|flag| statuses.contains(&flag.status))
            .cloned()
            .collect();
        flags.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(flags)
    }

    async fn set_flag_status(&self, id: FlagId, status: FlagStatus) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if let Some(flag) = tables.flags.iter_mut().find(|flag| flag.id == id) {
            flag.status = status;
        }
        Ok(())
    }

    async fn insert_flag(&self, new_flag: NewFlag) -> Result<Flag, StoreError> {
        new_flag.validate().map_err(StoreError::InvalidFlag)?;

        let mut tables = self.lock()?;
        if tables.flags.iter().any(|flag| flag.key == new_flag.key) {
            return Err(StoreError::InvalidFlag(format!(
                "flag key {} already exists",
                new_flag.key
            )));
        }
        let flag = new_flag.into_flag(Uuid::new_v4());
        tables.flags.push(flag.clone());
        Ok(flag)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.jobs.clear();
        tables.flags.clear();
        Ok(())
    }

    async fn active_cleanup_job(
        &self,
        flag_id: FlagId,
    ) -> Result<Option<CleanupJob>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .jobs
            .iter()
            .filter(|job| job.flag_id == flag_id && job.status.is_in_flight())
            .max_by_key(|job| job.triggered_at)
            .cloned())
    }

    async fn reserve_cleanup_job(
        &self,
        flag_id: FlagId,
        triggered_at: DateTime<Utc>,
    ) -> Result<CleanupJob, StoreError> {
        let mut tables = self.lock()?;
        if tables
            .jobs
            .iter()
            .any(|job| job.flag_id == flag_id && job.status.is_in_flight())
        {
            return Err(StoreError::ActiveJobExists(flag_id));
        }

        let job = CleanupJob {
            id: Uuid::new_v4(),
            flag_id,
            github_issue_url: None,
            github_issue_number: None,
            status: CleanupStatus::Pending,
            triggered_at,
        };
        tables.jobs.push(job.clone());
        Ok(job)
    }

    async fn release_cleanup_job(&self, job_id: CleanupJobId) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables
            .jobs
            .retain(|job| !(job.id == job_id && job.status == CleanupStatus::Pending));
        Ok(())
    }

    async fn attach_issue(
        &self,
        job_id: CleanupJobId,
        flag_id: FlagId,
        issue_url: &str,
        issue_number: i32,
    ) -> Result<CleanupJob, StoreError> {
        let mut tables = self.lock()?;

        // Both rows are checked before either is touched, so a miss leaves nothing half-written.
        let job_idx = tables
            .jobs
            .iter()
            .position(|job| job.id == job_id)
            .ok_or(StoreError::JobNotFound(job_id))?;
        let flag_idx = tables
            .flags
            .iter()
            .position(|flag| flag.id == flag_id)
            .ok_or(StoreError::FlagNotFound(flag_id))?;

        let job = &mut tables.jobs[job_idx];
        job.status = CleanupStatus::IssueCreated;
        job.github_issue_url = Some(issue_url.to_string());
        job.github_issue_number = Some(issue_number);
        let job = job.clone();

        tables.flags[flag_idx].status = FlagStatus::CleanupPending;
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{days_ago, new_flag};

    #[tokio::test]
    async fn test_list_is_newest_first_with_latest_job() {
        let store = MemoryFlagStore::new();
        let now = Utc::now();

        let mut older = new_flag("older_flag", 100, None);
        older.created_at = days_ago(now, 10);
        let older = store.insert_flag(older).await.unwrap();
        let mut newer = new_flag("newer_flag", 100, None);
        newer.created_at = days_ago(now, 1);
        store.insert_flag(newer).await.unwrap();

        let first = store
            .reserve_cleanup_job(older.id, days_ago(now, 2))
            .await
            .unwrap();
        store.release_cleanup_job(first.id).await.unwrap();
        let second = store.reserve_cleanup_job(older.id, now).await.unwrap();

        let flags = store.list_flags().await.unwrap();
        assert_eq!(flags[0].flag.key, "newer_flag");
        assert_eq!(flags[1].flag.key, "older_flag");
        assert_eq!(flags[1].latest_job().map(|j| j.id), Some(second.id));
        assert_eq!(store.jobs_for(older.id).len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_duplicate_keys_and_bad_rollout() {
        let store = MemoryFlagStore::new();
        store.insert_flag(new_flag("dup", 100, None)).await.unwrap();

        assert!(matches!(
            store.insert_flag(new_flag("dup", 100, None)).await,
            Err(StoreError::InvalidFlag(_))
        ));
        assert!(matches!(
            store.insert_flag(new_flag("too_much", 150, None)).await,
            Err(StoreError::InvalidFlag(_))
        ));
    }

    #[tokio::test]
    async fn test_one_in_flight_job_per_flag() {
        let store = MemoryFlagStore::new();
        let flag = store.insert_flag(new_flag("stale", 100, None)).await.unwrap();

        let job = store.reserve_cleanup_job(flag.id, Utc::now()).await.unwrap();
        assert!(matches!(
            store.reserve_cleanup_job(flag.id, Utc::now()).await,
            Err(StoreError::ActiveJobExists(_))
        ));

        let job = store
            .attach_issue(job.id, flag.id, "https://github.com/acme/app/issues/3", 3)
            .await
            .unwrap();
        assert_eq!(job.status, CleanupStatus::IssueCreated);

        // An issued job is no longer releasable and still blocks new reservations
        store.release_cleanup_job(job.id).await.unwrap();
        assert_eq!(
            store.active_cleanup_job(flag.id).await.unwrap().map(|j| j.id),
            Some(job.id)
        );
        assert_eq!(
            store.get_flag(flag.id).await.unwrap().unwrap().status,
            FlagStatus::CleanupPending
        );
    }

    #[tokio::test]
    async fn test_attach_issue_to_unknown_job() {
        let store = MemoryFlagStore::new();
        let flag = store.insert_flag(new_flag("stale", 100, None)).await.unwrap();

        let result = store
            .attach_issue(Uuid::new_v4(), flag.id, "https://example.com/1", 1)
            .await;
        assert!(matches!(result, Err(StoreError::JobNotFound(_))));
        assert_eq!(
            store.get_flag(flag.id).await.unwrap().unwrap().status,
            FlagStatus::Active
        );
    }

    #[tokio::test]
    async fn test_attach_issue_for_unknown_flag_leaves_job_pending() {
        let store = MemoryFlagStore::new();
        let flag = store.insert_flag(new_flag("stale", 100, None)).await.unwrap();
        let job = store.reserve_cleanup_job(flag.id, Utc::now()).await.unwrap();

        let result = store
            .attach_issue(job.id, Uuid::new_v4(), "https://example.com/1", 1)
            .await;
        assert!(matches!(result, Err(StoreError::FlagNotFound(_))));

        let jobs = store.jobs_for(flag.id);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, CleanupStatus::Pending);
        assert_eq!(jobs[0].github_issue_url, None);
    }
}
