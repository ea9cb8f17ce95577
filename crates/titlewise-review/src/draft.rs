//! Parsing Generator and Critic responses into issues.
//!
//! Models are asked for `{"overall_summary", "sections": {<section>: [issue]}}`
//! but the parser also takes a flat `{"issues": [...]}` object or a bare
//! array. Field names from the older report vocabulary (`message_for_maker`,
//! `from_report`, `from_source_docs`, `minor`/`major`/`critical`) are
//! accepted. A response without a recognizable issue container, or with any
//! entry that is not an issue object, is an error so the stage can retry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use titlewise_ai::extract_json;
use titlewise_core::{Evidence, Issue, IssueCategory, ReportSection, Severity};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no JSON found in response")]
    NoJson,
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("response has no `sections` or `issues`")]
    MissingIssues,
    #[error("issue {index} is not a valid issue object: {error}")]
    InvalidIssue { index: usize, error: String },
}

/// Issue as written by a model, before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
struct DraftIssue {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default, alias = "message_for_maker", alias = "message")]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    rule: Option<String>,
    #[serde(default)]
    suggested_fix: Option<String>,
    #[serde(default)]
    evidence: DraftEvidence,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DraftEvidence {
    #[serde(default, alias = "from_source_docs", alias = "source")]
    source_doc: Option<String>,
    #[serde(default, alias = "from_report")]
    report: Option<String>,
}

impl DraftIssue {
    fn into_issue(self, section_hint: Option<ReportSection>, fallback_id: String) -> Issue {
        let description = self
            .description
            .or(self.location.clone())
            .unwrap_or_default()
            .trim()
            .to_string();

        let category = match self.category {
            Some(c) => match IssueCategory::from(c) {
                IssueCategory::Other => IssueCategory::infer(&description),
                known => known,
            },
            None => IssueCategory::infer(&description),
        };
        let section = self
            .section
            .as_deref()
            .and_then(ReportSection::parse)
            .or(section_hint)
            .unwrap_or_else(|| category.default_section());
        // A missing or unreadable severity starts at the category floor.
        let severity = self
            .severity
            .and_then(|s| Severity::try_from(s).ok())
            .unwrap_or_else(|| category.severity_floor());

        Issue {
            id: self
                .id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .unwrap_or(fallback_id),
            section,
            category,
            severity,
            description,
            evidence: Evidence {
                source_doc: self.evidence.source_doc.unwrap_or_default(),
                report: self.evidence.report.unwrap_or_default(),
            },
            rule: self.rule.filter(|r| !r.trim().is_empty()),
            suggested_fix: self.suggested_fix.filter(|f| !f.trim().is_empty()),
            precedent_reference: None,
        }
    }
}

/// A parsed model response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DraftReview {
    pub summary: String,
    pub issues: Vec<Issue>,
}

impl DraftReview {
    /// JSON handed to the Critic as the candidate list.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".into())
    }
}

/// Parse a model response. Issues are given `TEMP-NN` ids when the model
/// leaves them out.
pub fn parse_response(text: &str) -> Result<DraftReview, ParseError> {
    let json = extract_json(text).ok_or(ParseError::NoJson)?;
    let value: Value = serde_json::from_str(json).map_err(|e| ParseError::Json(e.to_string()))?;

    let (summary, raw): (String, Vec<(Option<ReportSection>, Value)>) = match value {
        Value::Array(items) => (String::new(), items.into_iter().map(|v| (None, v)).collect()),
        Value::Object(mut map) => {
            let summary = ["overall_summary", "summary"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .unwrap_or_default()
                .trim()
                .to_string();
            let raw = if let Some(Value::Object(sections)) = map.remove("sections") {
                sections
                    .into_iter()
                    .flat_map(|(name, items)| {
                        let hint = ReportSection::parse(&name);
                        if hint.is_none() {
                            warn!(section = %name, "unknown report section in response");
                        }
                        as_items(items).into_iter().map(move |v| (hint, v))
                    })
                    .collect()
            } else if let Some(items) = map.remove("issues") {
                as_items(items).into_iter().map(|v| (None, v)).collect()
            } else {
                return Err(ParseError::MissingIssues);
            };
            (summary, raw)
        }
        _ => return Err(ParseError::MissingIssues),
    };

    let mut issues = Vec::with_capacity(raw.len());
    for (index, (hint, item)) in raw.into_iter().enumerate() {
        let draft = serde_json::from_value::<DraftIssue>(item)
            .map_err(|e| ParseError::InvalidIssue { index, error: e.to_string() })?;
        issues.push(draft.into_issue(hint, format!("TEMP-{:02}", index + 1)));
    }
    Ok(DraftReview { summary, issues })
}

fn as_items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}
