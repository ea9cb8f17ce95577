//! The review output: issues, recommendation, and the state trail.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::issue::{Issue, Severity};

/// Pipeline states. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Extracting,
    Retrieving,
    Generating,
    Critiquing,
    Done,
    Failed,
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Extracting => "EXTRACTING",
            Self::Retrieving => "RETRIEVING",
            Self::Generating => "GENERATING",
            Self::Critiquing => "CRITIQUING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        })
    }
}

/// One entry in a review's state trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub state: ReviewState,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl StageRecord {
    pub fn now(state: ReviewState, detail: impl Into<String>) -> Self {
        Self {
            state,
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Approve,
    Hold,
    Reject,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approve => "APPROVE",
            Self::Hold => "HOLD",
            Self::Reject => "REJECT",
        })
    }
}

/// Final review for one case. Issues are ordered by severity (highest first),
/// then id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewObject {
    pub case_id: String,
    pub timestamp: DateTime<Utc>,
    pub issues: Vec<Issue>,
    pub summary: String,
    pub recommendation: Recommendation,
    /// Case ids of the precedents consulted.
    #[serde(default)]
    pub precedents: Vec<String>,
    #[serde(default)]
    pub trail: Vec<StageRecord>,
}

impl ReviewObject {
    pub fn metrics(&self) -> ReviewMetrics {
        let mut by_severity: BTreeMap<String, usize> = Severity::ALL
            .iter()
            .map(|s| (s.to_string(), 0))
            .collect();
        let mut by_section = BTreeMap::new();
        for issue in &self.issues {
            *by_severity.entry(issue.severity.to_string()).or_default() += 1;
            *by_section.entry(issue.section.to_string()).or_default() += 1;
        }
        ReviewMetrics {
            case_id: self.case_id.clone(),
            total_issues: self.issues.len(),
            by_severity,
            by_section,
            resolved_by_precedent: self
                .issues
                .iter()
                .filter(|i| i.precedent_reference.is_some())
                .count(),
            precedents_consulted: self.precedents.len(),
            recommendation: self.recommendation,
        }
    }
}

/// Issue counts for a finished review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewMetrics {
    pub case_id: String,
    pub total_issues: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_section: BTreeMap<String, usize>,
    pub resolved_by_precedent: usize,
    pub precedents_consulted: usize,
    pub recommendation: Recommendation,
}
