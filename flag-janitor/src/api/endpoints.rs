use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    api::{
        dashboard,
        errors::ApiError,
        types::{CleanupRequest, CleanupResponse, FlagDetailResponse},
    },
    cleanup::cleanup_service::CleanupService,
    flags::flag_models::FlagWithCleanup,
    scan::scan_service::FlagScanner,
    state::AppState,
};

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

pub async fn dashboard_page(state: State<AppState>) -> Result<Html<String>, ApiError> {
    let flags = state.store.list_flags().await?;
    Ok(Html(dashboard::render(&flags, Utc::now())))
}

pub async fn list_flags(state: State<AppState>) -> Result<Json<Vec<FlagWithCleanup>>, ApiError> {
    let flags = state.store.list_flags().await?;
    Ok(Json(flags))
}

pub async fn get_flag(
    state: State<AppState>,
    Path(flag_id): Path<String>,
) -> Result<Json<FlagDetailResponse>, ApiError> {
    let id = Uuid::parse_str(&flag_id).map_err(|_| ApiError::FlagNotFound)?;
    let flag = state
        .store
        .get_flag_with_cleanup(id)
        .await?
        .ok_or(ApiError::FlagNotFound)?;

    let analysis = state.engine.analyze(&flag.flag, Utc::now());
    Ok(Json(FlagDetailResponse { flag, analysis }))
}

/// Browsers posting the dashboard form are sent back to `/`; API clients asking for
/// JSON get the scan summary instead.
pub async fn scan(state: State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let scanner = FlagScanner::new(state.store.clone(), state.engine.clone());
    let summary = scanner.run_scan(Utc::now()).await?;

    if wants_json(&headers) {
        Ok(Json(summary).into_response())
    } else {
        Ok(Redirect::to("/").into_response())
    }
}

pub async fn cleanup(
    state: State<AppState>,
    payload: Result<Json<CleanupRequest>, JsonRejection>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let service = CleanupService::new(
        state.store.clone(),
        state.tracker.clone(),
        state.engine.clone(),
    );
    let outcome = service.request_cleanup(&request.flag_id, Utc::now()).await?;

    Ok(Json(CleanupResponse {
        success: true,
        cleanup_job: outcome.cleanup_job,
        issue: outcome.issue,
    }))
}
