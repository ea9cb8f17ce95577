//! Batch evaluation over a directory of merged cases.
//!
//! Every `*.json` case is reviewed in file-name order. Reviews are saved as
//! usual; the run also writes `metrics_<stamp>.json` (per-case metrics plus
//! totals) and `scoring_template_<stamp>.csv`, one row per issue with blank
//! `true_positive` and `notes` columns for manual precision scoring.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use titlewise_core::{MergedCase, ReviewMetrics, ReviewObject};
use titlewise_review::ReviewPipeline;

const SCORING_HEADER: [&str; 8] = [
    "case_id",
    "issue_id",
    "section",
    "category",
    "severity",
    "description",
    "true_positive",
    "notes",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseFailure {
    pub case: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct Evaluation {
    pub reviews: Vec<ReviewObject>,
    pub failures: Vec<CaseFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub generated_at: DateTime<Utc>,
    pub total_cases: usize,
    pub reviewed: usize,
    pub aggregate: Aggregate,
    pub per_case: Vec<ReviewMetrics>,
    pub failures: Vec<CaseFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregate {
    pub total_issues: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_recommendation: BTreeMap<String, usize>,
    pub resolved_by_precedent: usize,
    pub avg_issues_per_case: f64,
}

#[derive(Debug, PartialEq, Serialize)]
struct ScoringRow<'a> {
    case_id: &'a str,
    issue_id: &'a str,
    section: &'static str,
    category: &'static str,
    severity: &'static str,
    description: &'a str,
    true_positive: &'static str,
    notes: &'static str,
}

/// The `*.json` files directly under `dir`, sorted.
pub fn case_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("reading cases directory {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "json") {
            files.push(path);
        }
    }
    files.sort();
    anyhow::ensure!(!files.is_empty(), "no case JSON files in {}", dir.display());
    Ok(files)
}

/// Review each case, saving reviews under `reviews_dir`. A case that fails
/// to load or review is recorded and skipped; cancellation stops the batch.
pub async fn run(
    pipeline: &ReviewPipeline,
    files: &[PathBuf],
    reviews_dir: &Path,
    cancel: &CancellationToken,
) -> anyhow::Result<Evaluation> {
    let mut evaluation = Evaluation::default();
    for (i, path) in files.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(remaining = files.len() - i, "evaluation cancelled");
            break;
        }
        let name = path.display().to_string();
        let merged = match std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|text| MergedCase::from_json(&text).map_err(anyhow::Error::from))
        {
            Ok(merged) => merged,
            Err(e) => {
                warn!(case = %name, error = %e, "skipping unreadable case");
                evaluation.failures.push(CaseFailure { case: name, error: e.to_string() });
                continue;
            }
        };
        let case_id = crate::default_case_id(&merged, path);
        info!(case_id = %case_id, n = i + 1, of = files.len(), "reviewing");
        match pipeline.review(&case_id, &merged, cancel).await {
            Ok(review) => {
                crate::write_review(&review, reviews_dir)?;
                evaluation.reviews.push(review);
            }
            Err(failure) => {
                warn!(case_id = %case_id, error = %failure, "review failed");
                evaluation.failures.push(CaseFailure {
                    case: case_id,
                    error: failure.to_string(),
                });
            }
        }
    }
    Ok(evaluation)
}

pub fn summarize(evaluation: &Evaluation, generated_at: DateTime<Utc>) -> EvaluationSummary {
    let per_case: Vec<ReviewMetrics> = evaluation.reviews.iter().map(ReviewObject::metrics).collect();

    let mut by_severity = BTreeMap::new();
    let mut by_recommendation = BTreeMap::new();
    for m in &per_case {
        for (severity, count) in &m.by_severity {
            *by_severity.entry(severity.clone()).or_insert(0) += count;
        }
        *by_recommendation.entry(m.recommendation.to_string()).or_insert(0) += 1;
    }
    let total_issues: usize = per_case.iter().map(|m| m.total_issues).sum();
    let avg_issues_per_case = if per_case.is_empty() {
        0.0
    } else {
        total_issues as f64 / per_case.len() as f64
    };

    EvaluationSummary {
        generated_at,
        total_cases: per_case.len() + evaluation.failures.len(),
        reviewed: per_case.len(),
        aggregate: Aggregate {
            total_issues,
            by_severity,
            by_recommendation,
            resolved_by_precedent: per_case.iter().map(|m| m.resolved_by_precedent).sum(),
            avg_issues_per_case,
        },
        per_case,
        failures: evaluation.failures.clone(),
    }
}

fn scoring_rows(reviews: &[ReviewObject]) -> Vec<ScoringRow<'_>> {
    reviews
        .iter()
        .flat_map(|review| {
            review.issues.iter().map(|issue| ScoringRow {
                case_id: &review.case_id,
                issue_id: &issue.id,
                section: issue.section.as_str(),
                category: issue.category.as_str(),
                severity: issue.severity.as_str(),
                description: &issue.description,
                true_positive: "",
                notes: "",
            })
        })
        .collect()
}

/// Write the scoring sheet; the header is present even with no issues.
pub fn write_scoring_template(reviews: &[ReviewObject], path: &Path) -> anyhow::Result<usize> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(SCORING_HEADER)?;
    let rows = scoring_rows(reviews);
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(rows.len())
}

/// Write the metrics JSON and scoring CSV into `out_dir`, stamped with the
/// summary's generation time.
pub fn write_outputs(
    summary: &EvaluationSummary,
    reviews: &[ReviewObject],
    out_dir: &Path,
) -> anyhow::Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    let stamp = summary.generated_at.format("%Y%m%d_%H%M%S");

    let metrics_path = out_dir.join(format!("metrics_{stamp}.json"));
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(&metrics_path, json)
        .with_context(|| format!("writing {}", metrics_path.display()))?;

    let scoring_path = out_dir.join(format!("scoring_template_{stamp}.csv"));
    let rows = write_scoring_template(reviews, &scoring_path)?;
    info!(rows, path = %scoring_path.display(), "wrote scoring template");
    Ok((metrics_path, scoring_path))
}
