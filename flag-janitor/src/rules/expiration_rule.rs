use chrono::{DateTime, Utc};

use crate::flags::flag_models::Flag;

pub const DEFAULT_STALE_AFTER_DAYS: i64 = 30;

/// A named condition under which a flag is considered expired.
///
/// `now` is supplied by the caller so that every rule in a pass sees the same instant.
pub trait ExpirationRule: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, flag: &Flag, now: DateTime<Utc>) -> bool;

    /// Only called after `check` returned true for the same flag and instant.
    fn reason(&self, flag: &Flag, now: DateTime<Utc>) -> String;
}

/// Whole days elapsed between `then` and `now`, truncated towards zero.
pub fn whole_days_between(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - then).num_days()
}

/// Fully rolled out, and nobody has evaluated it for longer than the threshold.
#[derive(Debug, Clone)]
pub struct FullyRolledOutRule {
    name: String,
    threshold_days: i64,
}

impl FullyRolledOutRule {
    pub fn new(threshold_days: i64) -> Self {
        Self {
            name: format!("Fully rolled out and inactive for {threshold_days}+ days"),
            threshold_days,
        }
    }

    pub fn threshold_days(&self) -> i64 {
        self.threshold_days
    }

    fn days_since_eval(flag: &Flag, now: DateTime<Utc>) -> Option<i64> {
        flag.last_evaluated_at
            .map(|evaluated_at| whole_days_between(evaluated_at, now))
    }
}

impl Default for FullyRolledOutRule {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER_DAYS)
    }
}

impl ExpirationRule for FullyRolledOutRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, flag: &Flag, now: DateTime<Utc>) -> bool {
        if flag.rollout_percent != 100 {
            return false;
        }
        match Self::days_since_eval(flag, now) {
            Some(days) => days > self.threshold_days,
            None => false,
        }
    }

    fn reason(&self, flag: &Flag, now: DateTime<Utc>) -> String {
        let days = Self::days_since_eval(flag, now).unwrap_or_default();
        format!(
            "Flag is 100% enabled and hasn't been evaluated in {} days (threshold: {} days)",
            days, self.threshold_days
        )
    }
}

type CheckFn = dyn Fn(&Flag, DateTime<Utc>) -> bool + Send + Sync;
type ReasonFn = dyn Fn(&Flag, DateTime<Utc>) -> String + Send + Sync;

/// A rule built from two closures. Handy for one-off policies and for tests.
pub struct PredicateRule {
    name: String,
    check: Box<CheckFn>,
    reason: Box<ReasonFn>,
}

impl PredicateRule {
    pub fn new<C, R>(name: impl Into<String>, check: C, reason: R) -> Self
    where
        C: Fn(&Flag, DateTime<Utc>) -> bool + Send + Sync + 'static,
        R: Fn(&Flag, DateTime<Utc>) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Box::new(check),
            reason: Box::new(reason),
        }
    }
}

impl ExpirationRule for PredicateRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, flag: &Flag, now: DateTime<Utc>) -> bool {
        (self.check)(flag, now)
    }

    fn reason(&self, flag: &Flag, now: DateTime<Utc>) -> String {
        (self.reason)(flag, now)
    }
}
