use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flags::flag_models::Flag;

pub mod github;

pub const CLEANUP_LABEL: &str = "feature-flag-cleanup";

#[derive(Error, Debug)]
pub enum IssueTrackerError {
    #[error("issue tracker request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("issue tracker responded with {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("issue tracker is not configured: {0}")]
    NotConfigured(String),
}

/// Everything the tracker needs to open a cleanup issue for one flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupIssue {
    pub flag_key: String,
    pub flag_name: String,
    pub description: Option<String>,
    pub reason: Option<String>,
}

impl CleanupIssue {
    pub fn for_flag(flag: &Flag, reason: Option<String>) -> Self {
        Self {
            flag_key: flag.key.clone(),
            flag_name: flag.name.clone(),
            description: flag.description.clone(),
            reason,
        }
    }

    pub fn title(&self) -> String {
        format!("Clean up feature flag `{}`", self.flag_key)
    }

    pub fn body(&self) -> String {
        let mut body = format!(
            "## Feature flag cleanup\n\n\
             **Flag:** {} (`{}`)\n",
            self.flag_name, self.flag_key
        );
        if let Some(description) = &self.description {
            body.push_str(&format!("**Description:** {description}\n"));
        }
        if let Some(reason) = &self.reason {
            body.push_str(&format!("**Why:** {reason}\n"));
        }
        body.push_str(&format!(
            "\n### Checklist\n\n\
             - [ ] Remove every code path that reads `{}`, keeping the enabled branch\n\
             - [ ] Delete the flag from the flag service\n\
             - [ ] Close this issue\n",
            self.flag_key
        ));
        body
    }
}

/// A created issue, as reported back by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedIssue {
    pub url: String,
    pub number: i32,
}

#[async_trait]
pub trait IssueTracker {
    async fn create_cleanup_issue(
        &self,
        issue: &CleanupIssue,
    ) -> Result<TrackedIssue, IssueTrackerError>;
}
