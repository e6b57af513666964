use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{pool::PoolConnection, postgres::PgPool, Postgres};
use tracing::instrument;
use uuid::Uuid;

use crate::flags::flag_models::{
    CleanupJob, CleanupJobId, CleanupStatus, Flag, FlagId, FlagStatus, FlagWithCleanup, NewFlag,
};
use crate::flags::flag_store::{is_unique_violation, FlagStore, StoreError};

const FLAG_COLUMNS: &str = r#"
    id, key, name, description, created_at, created_by,
    rollout_percent, last_evaluated_at, status
"#;

const JOB_COLUMNS: &str = r#"
    id, flag_id, github_issue_url, github_issue_number, status, triggered_at
"#;

/// `FlagStore` backed by the `flags` and `cleanup_jobs` tables.
#[derive(Clone)]
pub struct PgFlagStore {
    pool: PgPool,
}

impl PgFlagStore {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn get_connection(&self) -> Result<PoolConnection<Postgres>, StoreError> {
        self.pool.acquire().await.map_err(|e| {
            tracing::error!("Failed to get database connection: {}", e);
            StoreError::Unavailable
        })
    }

    async fn latest_jobs_for(
        &self,
        flag_ids: &[FlagId],
    ) -> Result<HashMap<FlagId, CleanupJob>, StoreError> {
        if flag_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.get_connection().await?;
        let query = format!(
            r#"
            SELECT DISTINCT ON (flag_id) {JOB_COLUMNS}
              FROM cleanup_jobs
             WHERE flag_id = ANY($1)
             ORDER BY flag_id, triggered_at DESC
            "#
        );
        let jobs = sqlx::query_as::<_, CleanupJob>(&query)
            .bind(flag_ids)
            .fetch_all(&mut *conn)
            .await?;

        Ok(jobs.into_iter().map(|job| (job.flag_id, job)).collect())
    }
}

#[async_trait]
impl FlagStore for PgFlagStore {
    #[instrument(skip_all)]
    async fn list_flags(&self) -> Result<Vec<FlagWithCleanup>, StoreError> {
        let flags = {
            let mut conn = self.get_connection().await?;
            let query = format!("SELECT {FLAG_COLUMNS} FROM flags ORDER BY created_at DESC");
            sqlx::query_as::<_, Flag>(&query)
                .fetch_all(&mut *conn)
                .await?
        };

        let ids: Vec<FlagId> = flags.iter().map(|flag| flag.id).collect();
        let mut latest_jobs = self.latest_jobs_for(&ids).await?;

        Ok(flags
            .into_iter()
            .map(|flag| {
                let cleanup_jobs = latest_jobs.remove(&flag.id).into_iter().collect();
                FlagWithCleanup { flag, cleanup_jobs }
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn get_flag(&self, id: FlagId) -> Result<Option<Flag>, StoreError> {
        let mut conn = self.get_connection().await?;
        let query = format!("SELECT {FLAG_COLUMNS} FROM flags WHERE id = $1");
        let flag = sqlx::query_as::<_, Flag>(&query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(flag)
    }

    #[instrument(skip(self))]
    async fn get_flag_with_cleanup(
        &self,
        id: FlagId,
    ) -> Result<Option<FlagWithCleanup>, StoreError> {
        let Some(flag) = self.get_flag(id).await? else {
            return Ok(None);
        };
        let cleanup_jobs = self
            .latest_jobs_for(&[id])
            .await?
            .remove(&id)
            .into_iter()
            .collect();
        Ok(Some(FlagWithCleanup { flag, cleanup_jobs }))
    }

    #[instrument(skip(self))]
    async fn flags_with_status(&self, statuses: &[FlagStatus]) -> Result<Vec<Flag>, StoreError> {
        let mut conn = self.get_connection().await?;
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let query = format!(
            "SELECT {FLAG_COLUMNS} FROM flags WHERE status::text = ANY($1) ORDER BY created_at DESC"
        );
        let flags = sqlx::query_as::<_, Flag>(&query)
            .bind(&statuses)
            .fetch_all(&mut *conn)
            .await?;
        Ok(flags)
    }

    #[instrument(skip(self))]
    async fn set_flag_status(&self, id: FlagId, status: FlagStatus) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        sqlx::query("UPDATE flags SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(key = %new_flag.key))]
    async fn insert_flag(&self, new_flag: NewFlag) -> Result<Flag, StoreError> {
        new_flag.validate().map_err(StoreError::InvalidFlag)?;

        let mut conn = self.get_connection().await?;
        let query = format!(
            r#"
            INSERT INTO flags
                (id, key, name, description, created_at, created_by,
                 rollout_percent, last_evaluated_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {FLAG_COLUMNS}
            "#
        );
        let flag = sqlx::query_as::<_, Flag>(&query)
            .bind(Uuid::new_v4())
            .bind(&new_flag.key)
            .bind(&new_flag.name)
            .bind(&new_flag.description)
            .bind(new_flag.created_at)
            .bind(&new_flag.created_by)
            .bind(new_flag.rollout_percent)
            .bind(new_flag.last_evaluated_at)
            .bind(new_flag.status)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::InvalidFlag(format!("flag key {} already exists", new_flag.key))
                } else {
                    StoreError::Query(e)
                }
            })?;
        Ok(flag)
    }

    #[instrument(skip_all)]
    async fn clear(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cleanup_jobs")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM flags").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn active_cleanup_job(
        &self,
        flag_id: FlagId,
    ) -> Result<Option<CleanupJob>, StoreError> {
        let mut conn = self.get_connection().await?;
        let statuses: Vec<String> = CleanupStatus::IN_FLIGHT
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let query = format!(
            r#"
            SELECT {JOB_COLUMNS}
              FROM cleanup_jobs
             WHERE flag_id = $1 AND status::text = ANY($2)
             ORDER BY triggered_at DESC
             LIMIT 1
            "#
        );
        let job = sqlx::query_as::<_, CleanupJob>(&query)
            .bind(flag_id)
            .bind(&statuses)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(job)
    }

    #[instrument(skip(self))]
    async fn reserve_cleanup_job(
        &self,
        flag_id: FlagId,
        triggered_at: DateTime<Utc>,
    ) -> Result<CleanupJob, StoreError> {
        let mut conn = self.get_connection().await?;
        let query = format!(
            r#"
            INSERT INTO cleanup_jobs (id, flag_id, status, triggered_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {JOB_COLUMNS}
            "#
        );
        sqlx::query_as::<_, CleanupJob>(&query)
            .bind(Uuid::new_v4())
            .bind(flag_id)
            .bind(CleanupStatus::Pending)
            .bind(triggered_at)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::ActiveJobExists(flag_id)
                } else {
                    StoreError::Query(e)
                }
            })
    }

    #[instrument(skip(self))]
    async fn release_cleanup_job(&self, job_id: CleanupJobId) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        sqlx::query("DELETE FROM cleanup_jobs WHERE id = $1 AND status = $2")
            .bind(job_id)
            .bind(CleanupStatus::Pending)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn attach_issue(
        &self,
        job_id: CleanupJobId,
        flag_id: FlagId,
        issue_url: &str,
        issue_number: i32,
    ) -> Result<CleanupJob, StoreError> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            UPDATE cleanup_jobs
               SET status = $2, github_issue_url = $3, github_issue_number = $4
             WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        );
        let job = sqlx::query_as::<_, CleanupJob>(&query)
            .bind(job_id)
            .bind(CleanupStatus::IssueCreated)
            .bind(issue_url)
            .bind(issue_number)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::JobNotFound(job_id))?;

        let updated = sqlx::query("UPDATE flags SET status = $2 WHERE id = $1")
            .bind(flag_id)
            .bind(FlagStatus::CleanupPending)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls back the job update
            return Err(StoreError::FlagNotFound(flag_id));
        }

        tx.commit().await?;
        Ok(job)
    }
}
