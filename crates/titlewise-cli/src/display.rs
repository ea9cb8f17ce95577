//! Terminal output for reviews, metrics, evaluations and the precedent index.
//!
//! Reviews render as a card: header, recommendation, then issues grouped by
//! report section in severity order.

use titlewise_core::{Issue, ReportSection, ReviewMetrics, ReviewObject, Severity, StageRecord};
use titlewise_store::{IngestReport, StoreStats};

use crate::evaluate::EvaluationSummary;

const MAX_EXCERPT: usize = 120;

// ── Reviews ──

pub fn print_review(review: &ReviewObject) {
    println!("=== Review {} ===", review.case_id);
    println!("  {:<22} {}", "recommendation", review.recommendation);
    println!("  {:<22} {}", "reviewed_at", review.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    if !review.precedents.is_empty() {
        println!("  {:<22} {}", "precedents", review.precedents.join(", "));
    }
    println!();
    println!("{}", review.summary);

    for section in ReportSection::ALL {
        let issues: Vec<&Issue> = review.issues.iter().filter(|i| i.section == section).collect();
        if issues.is_empty() {
            continue;
        }
        println!();
        println!("{section}");
        for issue in issues {
            print_issue(issue);
        }
    }
    println!();
    print_trail(&review.trail);
}

fn print_issue(issue: &Issue) {
    println!(
        "  [{}] {:<6} {:<20} {}",
        issue.id,
        issue.severity.as_str(),
        issue.category.as_str(),
        issue.description
    );
    println!("      {:<10} {}", "report:", excerpt(&issue.evidence.report));
    println!("      {:<10} {}", "source:", excerpt(&issue.evidence.source_doc));
    if let Some(fix) = &issue.suggested_fix {
        println!("      {:<10} {}", "fix:", fix);
    }
    if let Some(reference) = &issue.precedent_reference {
        println!("      {:<10} {}", "precedent:", reference);
    }
}

pub fn print_trail(trail: &[StageRecord]) {
    println!("Trail");
    for record in trail {
        println!(
            "  {} {:<11} {}",
            record.timestamp.format("%H:%M:%S"),
            record.state.to_string(),
            record.detail
        );
    }
}

// ── Metrics ──

pub fn print_metrics(metrics: &ReviewMetrics) {
    println!("=== Metrics {} ===", metrics.case_id);
    println!("  {:<22} {}", "recommendation", metrics.recommendation);
    println!("  {:<22} {}", "total_issues", metrics.total_issues);
    println!("  {:<22} {}", "resolved_by_precedent", metrics.resolved_by_precedent);
    println!("  {:<22} {}", "precedents_consulted", metrics.precedents_consulted);

    println!("By severity");
    for severity in Severity::ALL {
        let count = metrics.by_severity.get(severity.as_str()).copied().unwrap_or(0);
        println!("  {:<22} {}", severity.as_str(), count);
    }
    if !metrics.by_section.is_empty() {
        println!("By section");
        for (section, count) in &metrics.by_section {
            println!("  {:<22} {}", section, count);
        }
    }
}

pub fn print_evaluation(summary: &EvaluationSummary) {
    println!("=== Evaluation ===");
    println!("  {:<22} {}", "cases", summary.total_cases);
    println!("  {:<22} {}", "reviewed", summary.reviewed);
    println!("  {:<22} {}", "total_issues", summary.aggregate.total_issues);
    println!("  {:<22} {:.1}", "avg_issues_per_case", summary.aggregate.avg_issues_per_case);
    println!("  {:<22} {}", "resolved_by_precedent", summary.aggregate.resolved_by_precedent);
    println!("By severity");
    for severity in Severity::ALL {
        let count = summary.aggregate.by_severity.get(severity.as_str()).copied().unwrap_or(0);
        println!("  {:<22} {}", severity.as_str(), count);
    }
    println!("By recommendation");
    for (recommendation, count) in &summary.aggregate.by_recommendation {
        println!("  {:<22} {}", recommendation, count);
    }
    if !summary.failures.is_empty() {
        println!("{} cases failed:", summary.failures.len());
        for failure in &summary.failures {
            println!("  {}: {}", failure.case, failure.error);
        }
    }
}

// ── Index ──

pub fn print_ingest_report(report: &IngestReport) {
    println!(
        "Ingested {} files ({} chunks)",
        report.files_processed, report.total_chunks
    );
    if !report.errors.is_empty() {
        println!("{} files failed:", report.errors.len());
        for (path, error) in &report.errors {
            println!("  {}: {}", path.display(), error);
        }
    }
}

pub fn print_stats(stats: &StoreStats) {
    println!("Precedent index");
    println!("  {:<22} {}", "cases", stats.cases);
    println!("  {:<22} {}", "chunks", stats.chunks);
}

// ── Helpers ──

/// Quote an evidence excerpt on one line, truncated on a char boundary.
fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.is_empty() {
        return "(none)".to_string();
    }
    if flat.chars().count() <= MAX_EXCERPT {
        return format!("\"{flat}\"");
    }
    let cut: String = flat.chars().take(MAX_EXCERPT).collect();
    format!("\"{cut}…\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("East:\n  Road"), "\"East: Road\"");
        assert_eq!(excerpt("   "), "(none)");
        let long = "ఆ".repeat(MAX_EXCERPT + 5);
        let out = excerpt(&long);
        assert!(out.ends_with("…\""));
        assert_eq!(out.chars().count(), MAX_EXCERPT + 3);
    }
}
