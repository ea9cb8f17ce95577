//! Deterministic enforcement applied to the Critic's output.
//!
//! The model proposes; these rules decide. They run in a fixed order:
//! evidence verification, merging, severity floors, precedent exceptions,
//! recommendation. Ids are then renumbered and issues sorted.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use titlewise_core::evidence::normalize_excerpt;
use titlewise_core::{
    EvidenceCorpus, Issue, IssueCategory, Recommendation, ReportSection, Severity,
};
use titlewise_store::PrecedentSummary;

/// Drop issues whose evidence is not a literal excerpt of the inputs.
/// Returns the kept issues and the number dropped.
pub fn verify_evidence(issues: Vec<Issue>, corpus: &EvidenceCorpus) -> (Vec<Issue>, usize) {
    let before = issues.len();
    let kept: Vec<Issue> = issues
        .into_iter()
        .filter(|issue| match corpus.verify(&issue.evidence) {
            Ok(()) => true,
            Err(e) => {
                info!(issue = %issue.id, category = %issue.category, error = %e, "dropping issue with unverifiable evidence");
                false
            }
        })
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.union(b).count();
    shared as f32 / union as f32
}

fn contains_either(a: &str, b: &str) -> bool {
    let (a, b) = (normalize_excerpt(a), normalize_excerpt(b));
    !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a))
}

/// Whether two issues cite overlapping evidence: one excerpt contains the
/// other, or their tokens overlap by at least `threshold`.
pub fn evidence_overlaps(a: &Issue, b: &Issue, threshold: f32) -> bool {
    if contains_either(&a.evidence.source_doc, &b.evidence.source_doc)
        || contains_either(&a.evidence.report, &b.evidence.report)
    {
        return true;
    }
    let ta = tokens(&format!("{} {}", a.evidence.source_doc, a.evidence.report));
    let tb = tokens(&format!("{} {}", b.evidence.source_doc, b.evidence.report));
    jaccard(&ta, &tb) >= threshold
}

/// Merge same-category issues with overlapping evidence. The merged issue
/// keeps the more severe of the two (the earlier one on a tie) and inherits a
/// suggested fix or rule it lacked.
pub fn merge_overlapping(issues: Vec<Issue>, threshold: f32) -> Vec<Issue> {
    let mut merged: Vec<Issue> = Vec::with_capacity(issues.len());
    for issue in issues {
        let existing = merged
            .iter_mut()
            .find(|m| m.category == issue.category && evidence_overlaps(m, &issue, threshold));
        match existing {
            None => merged.push(issue),
            Some(m) => {
                debug!(kept = %m.id, merged = %issue.id, "merging duplicate issues");
                let (mut winner, loser) = if issue.severity > m.severity {
                    (issue, m.clone())
                } else {
                    (m.clone(), issue)
                };
                winner.suggested_fix = winner.suggested_fix.or(loser.suggested_fix);
                winner.rule = winner.rule.or(loser.rule);
                *m = winner;
            }
        }
    }
    merged
}

/// Raise every issue to at least its category's severity floor.
pub fn apply_severity_floors(issues: &mut [Issue]) {
    for issue in issues {
        let floor = issue.category.severity_floor();
        if issue.severity < floor {
            issue.severity = floor;
        }
    }
}

/// Downgrade to LOW every issue covered by a precedent exception of the same
/// category whose state matches `case_state` (or is unset). Precedents are
/// consulted in rank order; the first match is recorded.
pub fn apply_precedent_exceptions(
    issues: &mut [Issue],
    precedents: &[PrecedentSummary],
    case_state: Option<&str>,
) -> usize {
    let mut resolved = 0;
    for issue in issues {
        let hit = precedents.iter().find_map(|p| {
            p.exceptions
                .iter()
                .find(|e| e.applies_to(issue.category, case_state))
                .map(|e| (p, e))
        });
        if let Some((precedent, exception)) = hit {
            info!(
                issue = %issue.id,
                precedent = %precedent.case_id,
                "downgrading issue accepted by precedent"
            );
            issue.severity = Severity::Low;
            issue.precedent_reference = Some(format!("{}: {}", precedent.case_id, exception.note));
            resolved += 1;
        }
    }
    resolved
}

/// REJECT on an unresolved hard-fail issue, HOLD on any issue at or above
/// `hold_threshold`, otherwise APPROVE.
pub fn recommend(
    issues: &[Issue],
    hard_fail: &[IssueCategory],
    hold_threshold: Severity,
) -> Recommendation {
    if issues
        .iter()
        .any(|i| hard_fail.contains(&i.category) && i.precedent_reference.is_none())
    {
        Recommendation::Reject
    } else if issues.iter().any(|i| i.severity >= hold_threshold) {
        Recommendation::Hold
    } else {
        Recommendation::Approve
    }
}

/// Assign `<PREFIX>-NN` ids per section (most severe first, then input
/// order) and sort by severity descending, then id.
pub fn finalize(mut issues: Vec<Issue>) -> Vec<Issue> {
    // Stable: equal severities keep input order.
    issues.sort_by(|a, b| b.severity.cmp(&a.severity));
    let mut counters: BTreeMap<ReportSection, usize> = BTreeMap::new();
    for issue in &mut issues {
        let n = counters.entry(issue.section).or_default();
        *n += 1;
        issue.id = format!("{}-{:02}", issue.section.prefix(), n);
    }
    issues.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.id.cmp(&b.id)));
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use titlewise_core::{Evidence, MergedCase, PrecedentException, PrecedentMeta};

    fn issue(id: &str, category: IssueCategory, severity: Severity, source: &str, report: &str) -> Issue {
        Issue {
            id: id.into(),
            section: category.default_section(),
            category,
            severity,
            description: format!("{category} issue"),
            evidence: Evidence {
                source_doc: source.into(),
                report: report.into(),
            },
            rule: None,
            suggested_fix: None,
            precedent_reference: None,
        }
    }

    fn precedent(case_id: &str, exceptions: Vec<PrecedentException>) -> PrecedentSummary {
        PrecedentSummary {
            case_id: case_id.into(),
            meta: PrecedentMeta::default(),
            key_fields: vec![],
            ec_transactions: vec![],
            review_notes: vec![],
            exceptions,
            flow_of_title: vec![],
            matched_chunks: vec![],
            best_score: 0.9,
        }
    }

    fn exception(category: IssueCategory, state: Option<&str>) -> PrecedentException {
        PrecedentException {
            category,
            state: state.map(str::to_string),
            note: "accepted variation".into(),
        }
    }

    #[test]
    fn unverifiable_evidence_dropped() {
        let case = MergedCase::from_json(
            r#"{"attachments": ["East: Road"], "reportJson": {"sections": [{"content": "East: Survey 456"}]}}"#,
        )
        .unwrap();
        let corpus = EvidenceCorpus::from_case(&case);
        let issues = vec![
            issue("T1", IssueCategory::BoundaryMismatch, Severity::Medium, "East: Road", "East: Survey 456"),
            issue("T2", IssueCategory::BoundaryMismatch, Severity::Medium, "East: Canal", "East: Survey 456"),
            issue("T3", IssueCategory::Other, Severity::Low, "", "East: Survey 456"),
        ];
        let (kept, dropped) = verify_evidence(issues, &corpus);
        assert_eq!(dropped, 2);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "T1");
    }

    #[test]
    fn containment_merges_and_keeps_higher_severity() {
        let mut low = issue("T1", IssueCategory::OwnerMismatch, Severity::Low, "K. Ravi Kumar", "Ravi");
        low.suggested_fix = Some("Use full name".into());
        let high = issue("T2", IssueCategory::OwnerMismatch, Severity::High, "Ravi Kumar", "R. Kumar");
        let other = issue("T3", IssueCategory::ExtentMismatch, Severity::Low, "Ravi Kumar", "Ravi");
        let merged = merge_overlapping(vec![low, high, other], 0.7);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, "T2");
        assert_eq!(merged[0].severity, Severity::High);
        assert_eq!(merged[0].suggested_fix.as_deref(), Some("Use full name"));
        assert_eq!(merged[1].category, IssueCategory::ExtentMismatch);
    }

    #[test]
    fn token_overlap_threshold() {
        let a = issue("A", IssueCategory::SurveyMismatch, Severity::Medium, "Sy No 12 village Kapra", "Sy 21 Kapra");
        let b = issue("B", IssueCategory::SurveyMismatch, Severity::Medium, "village Kapra Sy No 12", "Kapra Sy 21");
        let c = issue("C", IssueCategory::SurveyMismatch, Severity::Medium, "Patta 88", "Khata 9");
        assert!(evidence_overlaps(&a, &b, 0.7));
        assert!(!evidence_overlaps(&a, &c, 0.7));
        assert_eq!(merge_overlapping(vec![a, b, c], 0.7).len(), 2);
    }

    #[test]
    fn floors_raise_severity() {
        let mut issues = vec![
            issue("A", IssueCategory::MortgageMismatch, Severity::Low, "x", "y"),
            issue("B", IssueCategory::BoundaryMismatch, Severity::Low, "x", "y"),
            issue("C", IssueCategory::DateMismatch, Severity::Low, "x", "y"),
            issue("D", IssueCategory::ExtentMismatch, Severity::High, "x", "y"),
        ];
        apply_severity_floors(&mut issues);
        let severities: Vec<Severity> = issues.iter().map(|i| i.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::High, Severity::Medium, Severity::Low, Severity::High]
        );
    }

    #[test]
    fn exceptions_downgrade_matching_category_and_state() {
        let mut issues = vec![
            issue("A", IssueCategory::BoundaryMismatch, Severity::Medium, "x", "y"),
            issue("B", IssueCategory::OwnerMismatch, Severity::Medium, "x", "y"),
        ];
        let precedents = vec![
            precedent("P-TS", vec![exception(IssueCategory::BoundaryMismatch, Some("Telangana"))]),
            precedent("P-AP", vec![exception(IssueCategory::BoundaryMismatch, Some("Andhra Pradesh"))]),
        ];
        let resolved = apply_precedent_exceptions(&mut issues, &precedents, Some("Andhra Pradesh"));
        assert_eq!(resolved, 1);
        assert_eq!(issues[0].severity, Severity::Low);
        assert_eq!(issues[0].precedent_reference.as_deref(), Some("P-AP: accepted variation"));
        assert_eq!(issues[1].severity, Severity::Medium);
        assert!(issues[1].precedent_reference.is_none());
    }

    #[test]
    fn stateless_exception_applies_anywhere() {
        let mut issues = vec![issue("A", IssueCategory::MortgageMismatch, Severity::High, "x", "y")];
        let precedents = vec![precedent("P-1", vec![exception(IssueCategory::MortgageMismatch, None)])];
        apply_precedent_exceptions(&mut issues, &precedents, None);
        assert_eq!(issues[0].severity, Severity::Low);
    }

    #[test]
    fn recommendation_rules() {
        let hard = [IssueCategory::MortgageMismatch];
        let mortgage = issue("A", IssueCategory::MortgageMismatch, Severity::High, "x", "y");
        let boundary = issue("B", IssueCategory::BoundaryMismatch, Severity::Medium, "x", "y");
        let minor = issue("C", IssueCategory::Other, Severity::Low, "x", "y");

        assert_eq!(recommend(&[mortgage.clone()], &hard, Severity::Medium), Recommendation::Reject);
        assert_eq!(recommend(&[boundary.clone()], &hard, Severity::Medium), Recommendation::Hold);
        assert_eq!(recommend(&[boundary], &hard, Severity::High), Recommendation::Approve);
        assert_eq!(recommend(&[minor.clone()], &hard, Severity::Medium), Recommendation::Approve);
        assert_eq!(recommend(&[], &hard, Severity::Medium), Recommendation::Approve);

        let mut resolved = mortgage;
        resolved.severity = Severity::Low;
        resolved.precedent_reference = Some("P-1: discharged".into());
        assert_eq!(recommend(&[resolved, minor], &hard, Severity::Medium), Recommendation::Approve);
    }

    #[test]
    fn finalize_renumbers_per_section_and_sorts() {
        let issues = vec![
            issue("T1", IssueCategory::BoundaryMismatch, Severity::Low, "x", "y"),
            issue("T2", IssueCategory::OwnerMismatch, Severity::Medium, "x", "y"),
            issue("T3", IssueCategory::ExtentMismatch, Severity::High, "x", "y"),
            issue("T4", IssueCategory::SroMismatch, Severity::Medium, "x", "y"),
        ];
        let out = finalize(issues);
        let ids: Vec<&str> = out.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["SP-01", "PD-01", "PD-02", "SP-02"]);
        assert_eq!(out[0].category, IssueCategory::ExtentMismatch);
        assert_eq!(out[1].category, IssueCategory::OwnerMismatch);
        assert_eq!(out[3].category, IssueCategory::BoundaryMismatch);
    }
}
