use chrono::{DateTime, Duration, Utc};

use crate::flags::flag_models::{Flag, FlagStatus, NewFlag};
use crate::flags::flag_store::{FlagStore, StoreError};

fn demo_flag(
    key: &str,
    name: &str,
    description: &str,
    created_by: &str,
    created_at: DateTime<Utc>,
    rollout_percent: i32,
    last_evaluated_at: DateTime<Utc>,
) -> NewFlag {
    NewFlag {
        key: key.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        created_at,
        created_by: created_by.to_string(),
        rollout_percent,
        last_evaluated_at: Some(last_evaluated_at),
        status: FlagStatus::Active,
    }
}

/// The demo data set, dated relative to `now`. With the default 30 day threshold a scan
/// expires three of these and leaves two active.
pub fn demo_flags(now: DateTime<Utc>) -> Vec<NewFlag> {
    let days_ago = |days: i64| now - Duration::days(days);

    vec![
        demo_flag(
            "patient_data_insights",
            "Patient Data Insights",
            "Patient data insights dashboard",
            "lengieng",
            days_ago(90),
            100,
            days_ago(47),
        ),
        demo_flag(
            "beta_ai_assisted_decision_support",
            "Beta AI-assisted Decision Support",
            "AI-assisted decision integration",
            "charlie",
            days_ago(365),
            100,
            days_ago(120),
        ),
        demo_flag(
            "dark_mode",
            "Dark Mode",
            "Dark theme for the application",
            "alice",
            days_ago(30),
            100,
            days_ago(2),
        ),
        demo_flag(
            "doctors_note",
            "Doctor's note",
            "Doctors Note feature",
            "bob",
            days_ago(15),
            50,
            now,
        ),
        demo_flag(
            "new_dashboard_layout",
            "New Dashboard Layout",
            "Redesigned dashboard with widgets",
            "diana",
            days_ago(60),
            100,
            days_ago(35),
        ),
    ]
}

/// Wipes all flags and cleanup jobs, then inserts the demo set.
pub async fn reseed(
    store: &(dyn FlagStore + Send + Sync),
    now: DateTime<Utc>,
) -> Result<Vec<Flag>, StoreError> {
    store.clear().await?;
    tracing::info!("Cleared existing flags and cleanup jobs");

    let mut created = Vec::new();
    for new_flag in demo_flags(now) {
        let flag = store.insert_flag(new_flag).await?;
        tracing::info!(key = %flag.key, "Created flag");
        created.push(flag);
    }
    Ok(created)
}
