use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

use crate::api::types::ErrorResponse;
use crate::cleanup::cleanup_service::CleanupError;
use crate::flags::flag_store::StoreError;
use crate::scan::scan_service::ScanError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Flag not found")]
    FlagNotFound,
    #[error("Failed to fetch flags: {0}")]
    FetchFailed(#[from] StoreError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Cleanup(#[from] CleanupError),
}

impl ApiError {
    fn status_and_body(self) -> (StatusCode, ErrorResponse) {
        match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("Invalid request").with_details(msg),
            ),
            ApiError::FlagNotFound | ApiError::Cleanup(CleanupError::NotFound) => {
                (StatusCode::NOT_FOUND, ErrorResponse::new("Flag not found"))
            }
            ApiError::FetchFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("Failed to fetch flags"),
            ),
            ApiError::Scan(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("Scan failed").with_details(e.to_string()),
            ),
            ApiError::Cleanup(CleanupError::Conflict(job)) => (
                StatusCode::CONFLICT,
                ErrorResponse::new("Cleanup already in progress for this flag")
                    .with_cleanup_job(job),
            ),
            ApiError::Cleanup(e @ CleanupError::NotCleanable(_)) => (
                StatusCode::CONFLICT,
                ErrorResponse::new("Flag cannot be cleaned up").with_details(e.to_string()),
            ),
            ApiError::Cleanup(
                e @ (CleanupError::UpstreamFailure(_) | CleanupError::PersistenceFailure(_)),
            ) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("Cleanup failed").with_details(e.to_string()),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::FetchFailed(e) = &self {
            tracing::error!("Failed to fetch flags: {}", e);
        }
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::flag_models::{CleanupJob, CleanupStatus, FlagStatus};
    use crate::issue_tracker::IssueTrackerError;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use uuid::Uuid;

    async fn render(error: ApiError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_not_found_has_only_error() {
        let (status, body) = render(CleanupError::NotFound.into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Flag not found"}));
    }

    #[tokio::test]
    async fn test_conflict_carries_existing_job() {
        let job = CleanupJob {
            id: Uuid::new_v4(),
            flag_id: Uuid::new_v4(),
            github_issue_url: Some("https://github.com/acme/app/issues/9".to_string()),
            github_issue_number: Some(9),
            status: CleanupStatus::IssueCreated,
            triggered_at: chrono::Utc::now(),
        };

        let (status, body) = render(CleanupError::Conflict(job.clone()).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Cleanup already in progress for this flag");
        assert_eq!(body["cleanupJob"]["id"], json!(job.id));
        assert_eq!(body["cleanupJob"]["status"], "ISSUE_CREATED");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_upstream_failure_is_internal_error_with_details() {
        let error = CleanupError::UpstreamFailure(IssueTrackerError::UnexpectedStatus {
            status: 401,
            body: "Bad credentials".to_string(),
        });

        let (status, body) = render(error.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Cleanup failed");
        assert!(body["details"].as_str().unwrap().contains("Bad credentials"));
    }

    #[tokio::test]
    async fn test_cleaned_up_flag_is_a_conflict() {
        let error = CleanupError::NotCleanable(FlagStatus::CleanedUp);
        let (status, body) = render(error.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Flag cannot be cleaned up");
        assert_eq!(body["details"], "Flag is CLEANED_UP and cannot be cleaned up again");
        assert!(body.get("cleanupJob").is_none());
    }

    #[tokio::test]
    async fn test_store_failures_are_internal_errors() {
        let (status, body) = render(ApiError::FetchFailed(StoreError::Unavailable)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Failed to fetch flags"}));

        let (status, body) =
            render(ScanError::PersistenceFailure(StoreError::Unavailable).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Scan failed");
        assert_eq!(body["details"], "scan aborted: database unavailable");

        let (status, _) =
            render(CleanupError::PersistenceFailure(StoreError::Unavailable).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
