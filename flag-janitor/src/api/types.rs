use serde::{Deserialize, Serialize};

use crate::flags::flag_models::{CleanupJob, FlagWithCleanup};
use crate::issue_tracker::TrackedIssue;
use crate::rules::rule_engine::FlagAnalysis;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    pub flag_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub success: bool,
    pub cleanup_job: CleanupJob,
    pub issue: TrackedIssue,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagDetailResponse {
    #[serde(flatten)]
    pub flag: FlagWithCleanup,
    pub analysis: FlagAnalysis,
}

/// Body of every non-2xx API response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_job: Option<CleanupJob>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            cleanup_job: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_cleanup_job(mut self, job: CleanupJob) -> Self {
        self.cleanup_job = Some(job);
        self
    }
}
