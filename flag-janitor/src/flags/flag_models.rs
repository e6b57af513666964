use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub type FlagId = Uuid;
pub type CleanupJobId = Uuid;

/// Lifecycle of a feature flag as tracked by the janitor.
///
/// Only `Active -> Expired` (scan) and `Expired/Active -> CleanupPending` (cleanup) are
/// produced here. The remaining states are set by whoever follows up on the tracking issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "flag_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagStatus {
    Active,
    Expired,
    CleanupPending,
    CleanupInProgress,
    CleanedUp,
}

impl FlagStatus {
    /// Statuses a scan looks at.
    pub const SCANNABLE: [FlagStatus; 2] = [FlagStatus::Active, FlagStatus::Expired];

    /// Whether a cleanup request may move this flag to `CleanupPending`. Flags already
    /// handed over for removal never go back.
    pub fn accepts_cleanup(&self) -> bool {
        matches!(self, FlagStatus::Active | FlagStatus::Expired | FlagStatus::CleanupPending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlagStatus::Active => "ACTIVE",
            FlagStatus::Expired => "EXPIRED",
            FlagStatus::CleanupPending => "CLEANUP_PENDING",
            FlagStatus::CleanupInProgress => "CLEANUP_IN_PROGRESS",
            FlagStatus::CleanedUp => "CLEANED_UP",
        }
    }

    /// Human readable badge text for the dashboard.
    pub fn label(&self) -> &'static str {
        match self {
            FlagStatus::Active => "Active",
            FlagStatus::Expired => "Expired",
            FlagStatus::CleanupPending => "Cleanup Pending",
            FlagStatus::CleanupInProgress => "In Progress",
            FlagStatus::CleanedUp => "Cleaned Up",
        }
    }

    /// CSS class used to color the dashboard badge.
    pub fn badge_class(&self) -> &'static str {
        match self {
            FlagStatus::Active => "badge-active",
            FlagStatus::Expired => "badge-expired",
            FlagStatus::CleanupPending => "badge-pending",
            FlagStatus::CleanupInProgress => "badge-in-progress",
            FlagStatus::CleanedUp => "badge-cleaned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "cleanup_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CleanupStatus {
    Pending,
    IssueCreated,
    InProgress,
    Completed,
    Failed,
}

impl CleanupStatus {
    /// Statuses that block a new cleanup request for the same flag.
    pub const IN_FLIGHT: [CleanupStatus; 3] = [
        CleanupStatus::Pending,
        CleanupStatus::IssueCreated,
        CleanupStatus::InProgress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupStatus::Pending => "PENDING",
            CleanupStatus::IssueCreated => "ISSUE_CREATED",
            CleanupStatus::InProgress => "IN_PROGRESS",
            CleanupStatus::Completed => "COMPLETED",
            CleanupStatus::Failed => "FAILED",
        }
    }

    pub fn is_in_flight(&self) -> bool {
        Self::IN_FLIGHT.contains(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub id: FlagId,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub rollout_percent: i32,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub status: FlagStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CleanupJob {
    pub id: CleanupJobId,
    pub flag_id: FlagId,
    pub github_issue_url: Option<String>,
    pub github_issue_number: Option<i32>,
    pub status: CleanupStatus,
    pub triggered_at: DateTime<Utc>,
}

/// A flag together with its most recent cleanup job, if it ever had one.
///
/// `cleanup_jobs` holds at most one element; it stays a list so the wire format
/// matches what the dashboard has always consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagWithCleanup {
    #[serde(flatten)]
    pub flag: Flag,
    pub cleanup_jobs: Vec<CleanupJob>,
}

impl FlagWithCleanup {
    pub fn latest_job(&self) -> Option<&CleanupJob> {
        self.cleanup_jobs.first()
    }
}

/// Input for creating a flag, used by the seed tool and by tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFlag {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub rollout_percent: i32,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub status: FlagStatus,
}

impl NewFlag {
    pub fn validate(&self) -> Result<(), String> {
        if self.key.trim().is_empty() {
            return Err("flag key must not be empty".to_string());
        }
        if !(0..=100).contains(&self.rollout_percent) {
            return Err(format!(
                "rollout percent must be between 0 and 100, got {}",
                self.rollout_percent
            ));
        }
        Ok(())
    }

    pub fn into_flag(self, id: FlagId) -> Flag {
        Flag {
            id,
            key: self.key,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
            created_by: self.created_by,
            rollout_percent: self.rollout_percent,
            last_evaluated_at: self.last_evaluated_at,
            status: self.status,
        }
    }
}

/// Counts shown on the dashboard stat cards.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagStats {
    pub total: usize,
    pub expired: usize,
    pub cleanup_pending: usize,
    pub cleaned_up: usize,
}

impl FlagStats {
    pub fn from_flags<'a>(flags: impl IntoIterator<Item = &'a Flag>) -> Self {
        flags
            .into_iter()
            .fold(FlagStats::default(), |mut stats, flag| {
                stats.total += 1;
                match flag.status {
                    FlagStatus::Expired => stats.expired += 1,
                    FlagStatus::CleanupPending => stats.cleanup_pending += 1,
                    FlagStatus::CleanedUp => stats.cleaned_up += 1,
                    FlagStatus::Active | FlagStatus::CleanupInProgress => {}
                }
                stats
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn sample_flag(status: FlagStatus) -> Flag {
        NewFlag {
            key: "dark_mode".to_string(),
            name: "Dark Mode".to_string(),
            description: None,
            created_at: Utc::now() - Duration::days(3),
            created_by: "alice".to_string(),
            rollout_percent: 100,
            last_evaluated_at: None,
            status,
        }
        .into_flag(Uuid::new_v4())
    }

    #[test]
    fn test_status_serializes_in_screaming_case() {
        assert_eq!(
            serde_json::to_value(FlagStatus::CleanupPending).unwrap(),
            json!("CLEANUP_PENDING")
        );
        assert_eq!(
            serde_json::to_value(CleanupStatus::IssueCreated).unwrap(),
            json!("ISSUE_CREATED")
        );
        assert_eq!(FlagStatus::CleanupInProgress.as_str(), "CLEANUP_IN_PROGRESS");
    }

    #[test]
    fn test_flag_serializes_with_camel_case_fields() {
        let flag = sample_flag(FlagStatus::Active);
        let value = serde_json::to_value(FlagWithCleanup {
            flag,
            cleanup_jobs: vec![],
        })
        .unwrap();

        assert_eq!(value["rolloutPercent"], json!(100));
        assert_eq!(value["lastEvaluatedAt"], json!(null));
        assert_eq!(value["createdBy"], json!("alice"));
        assert_eq!(value["cleanupJobs"], json!([]));
        assert_eq!(value["status"], json!("ACTIVE"));
    }

    #[test]
    fn test_in_flight_statuses() {
        assert!(CleanupStatus::Pending.is_in_flight());
        assert!(CleanupStatus::IssueCreated.is_in_flight());
        assert!(CleanupStatus::InProgress.is_in_flight());
        assert!(!CleanupStatus::Completed.is_in_flight());
        assert!(!CleanupStatus::Failed.is_in_flight());
    }

    #[test]
    fn test_only_live_flags_accept_cleanup() {
        assert!(FlagStatus::Active.accepts_cleanup());
        assert!(FlagStatus::Expired.accepts_cleanup());
        assert!(FlagStatus::CleanupPending.accepts_cleanup());
        assert!(!FlagStatus::CleanupInProgress.accepts_cleanup());
        assert!(!FlagStatus::CleanedUp.accepts_cleanup());
    }

    #[test]
    fn test_new_flag_validation() {
        let mut new_flag = NewFlag {
            key: "beta".to_string(),
            name: "Beta".to_string(),
            description: None,
            created_at: Utc::now(),
            created_by: "bob".to_string(),
            rollout_percent: 101,
            last_evaluated_at: None,
            status: FlagStatus::Active,
        };
        assert!(new_flag.validate().is_err());

        new_flag.rollout_percent = -1;
        assert!(new_flag.validate().is_err());

        new_flag.rollout_percent = 100;
        assert!(new_flag.validate().is_ok());

        new_flag.key = "  ".to_string();
        assert!(new_flag.validate().is_err());
    }

    #[test]
    fn test_stats_count_each_bucket() {
        let flags = vec![
            sample_flag(FlagStatus::Active),
            sample_flag(FlagStatus::Expired),
            sample_flag(FlagStatus::Expired),
            sample_flag(FlagStatus::CleanupPending),
            sample_flag(FlagStatus::CleanedUp),
            sample_flag(FlagStatus::CleanupInProgress),
        ];

        let stats = FlagStats::from_flags(&flags);
        assert_eq!(
            stats,
            FlagStats {
                total: 6,
                expired: 2,
                cleanup_pending: 1,
                cleaned_up: 1,
            }
        );
    }
}
