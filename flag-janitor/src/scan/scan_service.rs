use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::flags::flag_models::{FlagId, FlagStatus};
use crate::flags::flag_store::{FlagStore, StoreError};
use crate::metrics::consts::{
    SCAN_DURATION_SECONDS, SCAN_FLAGS_EXPIRED_COUNTER, SCAN_RUNS_COUNTER,
};
use crate::metrics::{histogram, inc};
use crate::rules::rule_engine::RuleEngine;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("scan aborted: {0}")]
    PersistenceFailure(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiredFlag {
    pub id: FlagId,
    pub key: String,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub scanned_count: usize,
    pub expired_count: usize,
    pub expired_flags: Vec<ExpiredFlag>,
}

/// Applies the rule engine to every scannable flag and marks newly expired ones.
pub struct FlagScanner {
    store: Arc<dyn FlagStore + Send + Sync>,
    engine: Arc<RuleEngine>,
}

impl FlagScanner {
    pub fn new(store: Arc<dyn FlagStore + Send + Sync>, engine: Arc<RuleEngine>) -> Self {
        Self { store, engine }
    }

    /// Flags that are already `Expired` are counted as scanned but never reported again.
    /// Each status update commits on its own; on error the loop stops and earlier updates stay.
    #[instrument(skip(self))]
    pub async fn run_scan(&self, now: DateTime<Utc>) -> Result<ScanSummary, ScanError> {
        let start = Instant::now();
        let result = self.scan_flags(now).await;
        let outcome = if result.is_ok() { "success" } else { "error" };

        inc(SCAN_RUNS_COUNTER, &[("outcome", outcome.to_string())], 1);
        histogram(
            SCAN_DURATION_SECONDS,
            &[("outcome", outcome.to_string())],
            start.elapsed().as_secs_f64(),
        );

        match &result {
            Ok(summary) => {
                inc(SCAN_FLAGS_EXPIRED_COUNTER, &[], summary.expired_count as u64);
                tracing::info!(
                    scanned = summary.scanned_count,
                    expired = summary.expired_count,
                    "Scan complete"
                );
            }
            Err(e) => tracing::error!(error = %e, "Scan failed"),
        }

        result
    }

    async fn scan_flags(&self, now: DateTime<Utc>) -> Result<ScanSummary, ScanError> {
        let flags = self.store.flags_with_status(&FlagStatus::SCANNABLE).await?;
        let mut summary = ScanSummary {
            scanned_count: flags.len(),
            ..Default::default()
        };

        for flag in flags {
            let evaluation = self.engine.evaluate(&flag, now);
            if !evaluation.expired || flag.status == FlagStatus::Expired {
                continue;
            }

            self.store
                .set_flag_status(flag.id, FlagStatus::Expired)
                .await?;

            let reason = evaluation.reason.unwrap_or_default();
            tracing::debug!(flag_key = %flag.key, %reason, "Marked flag expired");
            summary.expired_flags.push(ExpiredFlag {
                id: flag.id,
                key: flag.key,
                name: flag.name,
                reason,
            });
        }

        summary.expired_count = summary.expired_flags.len();
        Ok(summary)
    }
}
