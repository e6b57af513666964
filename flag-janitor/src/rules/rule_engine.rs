use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::flags::flag_models::Flag;
use crate::rules::expiration_rule::{whole_days_between, ExpirationRule, FullyRolledOutRule};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub expired: bool,
    pub reason: Option<String>,
    /// Name of the rule that matched.
    pub rule: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagAnalysis {
    pub expired: bool,
    pub reason: Option<String>,
    pub age_in_days: i64,
    pub days_since_eval: Option<i64>,
}

/// Ordered, immutable set of expiration rules. The first rule that matches decides.
pub struct RuleEngine {
    rules: Vec<Box<dyn ExpirationRule>>,
}

impl RuleEngine {
    pub fn new(rules: Vec<Box<dyn ExpirationRule>>) -> Self {
        Self { rules }
    }

    pub fn with_default_rules(stale_after_days: i64) -> Self {
        Self::new(vec![Box::new(FullyRolledOutRule::new(stale_after_days))])
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    pub fn evaluate(&self, flag: &Flag, now: DateTime<Utc>) -> Evaluation {
        self.rules
            .iter()
            .find(|rule| rule.check(flag, now))
            .map(|rule| Evaluation {
                expired: true,
                reason: Some(rule.reason(flag, now)),
                rule: Some(rule.name().to_string()),
            })
            .unwrap_or_default()
    }

    pub fn analyze(&self, flag: &Flag, now: DateTime<Utc>) -> FlagAnalysis {
        let Evaluation {
            expired, reason, ..
        } = self.evaluate(flag, now);

        FlagAnalysis {
            expired,
            reason,
            age_in_days: whole_days_between(flag.created_at, now),
            days_since_eval: flag
                .last_evaluated_at
                .map(|evaluated_at| whole_days_between(evaluated_at, now)),
        }
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(vec![Box::new(FullyRolledOutRule::default())])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::rules::expiration_rule::PredicateRule;
    use crate::utils::test_utils::{days_ago, flag_with};

    #[test]
    fn test_default_engine_flags_stale_rollout() {
        let now = Utc::now();
        let engine = RuleEngine::default();

        let evaluation = engine.evaluate(&flag_with(100, Some(days_ago(now, 31))), now);
        assert!(evaluation.expired);
        assert!(evaluation.reason.unwrap().contains("31 days"));
        assert_eq!(
            evaluation.rule.as_deref(),
            Some("Fully rolled out and inactive for 30+ days")
        );

        let evaluation = engine.evaluate(&flag_with(100, Some(days_ago(now, 30))), now);
        assert_eq!(evaluation, Evaluation::default());
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let now = Utc::now();
        let later_calls = Arc::new(AtomicUsize::new(0));
        let counter = later_calls.clone();

        let engine = RuleEngine::new(vec![
            Box::new(PredicateRule::new(
                "never matches",
                |_: &Flag, _| false,
                |_: &Flag, _| unreachable!(),
            )),
            Box::new(PredicateRule::new(
                "always matches",
                |_: &Flag, _| true,
                |_: &Flag, _| "first".to_string(),
            )),
            Box::new(PredicateRule::new(
                "also matches",
                move |_: &Flag, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    true
                },
                |_: &Flag, _| "second".to_string(),
            )),
        ]);

        let evaluation = engine.evaluate(&flag_with(10, None), now);
        assert_eq!(evaluation.rule.as_deref(), Some("always matches"));
        assert_eq!(evaluation.reason.as_deref(), Some("first"));
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_engine_never_expires() {
        let now = Utc::now();
        let engine = RuleEngine::new(vec![]);

        assert!(!engine.evaluate(&flag_with(100, Some(days_ago(now, 999))), now).expired);
        assert!(engine.rule_names().is_empty());
    }

    #[test]
    fn test_configured_threshold() {
        let now = Utc::now();
        let engine = RuleEngine::with_default_rules(60);
        let flag = flag_with(100, Some(days_ago(now, 45)));

        assert!(!engine.evaluate(&flag, now).expired);
        assert_eq!(
            engine.rule_names(),
            vec!["Fully rolled out and inactive for 60+ days"]
        );
    }

    #[test]
    fn test_analyze_reports_ages() {
        let now = Utc::now();
        let engine = RuleEngine::default();

        let mut flag = flag_with(100, Some(days_ago(now, 47)));
        flag.created_at = days_ago(now, 90);
        let analysis = engine.analyze(&flag, now);
        assert!(analysis.expired);
        assert_eq!(analysis.age_in_days, 90);
        assert_eq!(analysis.days_since_eval, Some(47));
        assert!(analysis.reason.unwrap().contains("47 days"));

        let mut flag = flag_with(50, None);
        flag.created_at = days_ago(now, 15);
        let analysis = engine.analyze(&flag, now);
        assert_eq!(
            analysis,
            FlagAnalysis {
                expired: false,
                reason: None,
                age_in_days: 15,
                days_since_eval: None,
            }
        );
    }
}
