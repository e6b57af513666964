use std::sync::Arc;

use anyhow::Result;
use assert_json_diff::assert_json_include;
use chrono::Utc;
use flag_janitor::{
    flags::{flag_models::FlagStatus, flag_store::FlagStore, memory_store::MemoryFlagStore},
    utils::test_utils::{days_ago, memory_state, new_flag, random_string, MockIssueTracker},
};
use reqwest::{redirect::Policy, StatusCode};
use serde_json::{json, Value};

use crate::helpers::*;

pub mod helpers;

fn client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .redirect(Policy::none())
        .build()?)
}

#[tokio::test]
async fn should_return_200_for_liveness_check() -> Result<()> {
    setup_tracing();
    let state = memory_state(
        Arc::new(MemoryFlagStore::new()),
        Arc::new(MockIssueTracker::new()),
        None,
    );
    let server = ServerHandle::for_state(state).await;

    let response = client()?.get(server.url("/_liveness")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client()?.get(server.url("/_readiness")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn should_scan_then_create_one_cleanup_issue() -> Result<()> {
    setup_tracing();
    let store = Arc::new(MemoryFlagStore::new());
    let tracker = Arc::new(MockIssueTracker::new());
    let key = random_string("stale_", 6);
    let flag = store
        .insert_flag(new_flag(&key, 100, Some(days_ago(Utc::now(), 35))))
        .await?;

    let server = ServerHandle::for_state(memory_state(store.clone(), tracker.clone(), None)).await;
    let client = client()?;

    // Dashboard form post redirects home
    let response = client.post(server.url("/scan")).send().await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()["location"], "/");

    let flags: Value = client.get(server.url("/api/flags")).send().await?.json().await?;
    assert_json_include!(
        actual: flags,
        expected: json!([{"id": flag.id, "key": key, "status": "EXPIRED", "cleanupJobs": []}])
    );

    let detail: Value = client
        .get(server.url(&format!("/flags/{}", flag.id)))
        .send()
        .await?
        .json()
        .await?;
    let reason = detail["analysis"]["reason"].as_str().unwrap_or_default();
    assert!(reason.contains("35 days"), "unexpected reason: {reason}");
    assert!(reason.contains("30 days"), "unexpected reason: {reason}");

    let response = client
        .post(server.url("/cleanup"))
        .json(&json!({"flagId": flag.id}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let created: Value = response.json().await?;
    assert_json_include!(
        actual: created.clone(),
        expected: json!({
            "success": true,
            "cleanupJob": {"flagId": flag.id, "status": "ISSUE_CREATED", "githubIssueNumber": 1},
            "issue": {"url": "https://github.com/acme/webapp/issues/1", "number": 1},
        })
    );
    assert_eq!(
        store.get_flag(flag.id).await?.map(|f| f.status),
        Some(FlagStatus::CleanupPending)
    );

    let response = client
        .post(server.url("/api/cleanup"))
        .json(&json!({"flagId": flag.id}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let conflict: Value = response.json().await?;
    assert_eq!(conflict["error"], "Cleanup already in progress for this flag");
    assert_eq!(conflict["cleanupJob"]["id"], created["cleanupJob"]["id"]);

    assert_eq!(tracker.calls(), 1);
    assert!(tracker.drafts()[0].reason.as_deref().unwrap_or_default().contains("35 days"));

    Ok(())
}

#[tokio::test]
async fn should_return_404_for_unknown_flag() -> Result<()> {
    setup_tracing();
    let tracker = Arc::new(MockIssueTracker::new());
    let state = memory_state(Arc::new(MemoryFlagStore::new()), tracker.clone(), None);
    let server = ServerHandle::for_state(state).await;

    let response = client()?
        .post(server.url("/cleanup"))
        .json(&json!({"flagId": "6f1c1b7e-5c7a-4c39-9f57-2f1f3f0b9d11"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({"error": "Flag not found"}));
    assert_eq!(tracker.calls(), 0);

    Ok(())
}

#[tokio::test]
async fn should_return_500_and_keep_flag_when_tracker_fails() -> Result<()> {
    setup_tracing();
    let store = Arc::new(MemoryFlagStore::new());
    let flag = store
        .insert_flag(new_flag("stale_flag", 100, Some(days_ago(Utc::now(), 40))))
        .await?;
    store.set_flag_status(flag.id, FlagStatus::Expired).await?;

    let state = memory_state(store.clone(), Arc::new(MockIssueTracker::failing()), None);
    let server = ServerHandle::for_state(state).await;

    let response = client()?
        .post(server.url("/cleanup"))
        .json(&json!({"flagId": flag.id}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "Cleanup failed");
    assert!(body["details"].as_str().unwrap_or_default().contains("503"));

    assert!(store.active_cleanup_job(flag.id).await?.is_none());
    assert_eq!(
        store.get_flag(flag.id).await?.map(|f| f.status),
        Some(FlagStatus::Expired)
    );

    Ok(())
}
