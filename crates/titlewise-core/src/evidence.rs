//! Literal-excerpt verification for issue evidence.
//!
//! An excerpt is accepted when, after collapsing whitespace runs and trimming
//! the ellipses models put around quotes, it occurs verbatim in the
//! corresponding corpus. There is no fuzzy matching.

use thiserror::Error;

use crate::case::MergedCase;
use crate::fields::collapse_whitespace;
use crate::issue::Evidence;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvidenceVerificationError {
    #[error("{field} excerpt is empty")]
    Empty { field: &'static str },

    #[error("{field} excerpt not found in input: {excerpt:?}")]
    NotFound { field: &'static str, excerpt: String },
}

/// Whitespace-collapsed texts an issue's evidence is checked against.
#[derive(Debug, Clone, Default)]
pub struct EvidenceCorpus {
    /// Deed OCR text and EC entry fields.
    source: String,
    /// Report sections, fields, and boundaries.
    report: String,
}

impl EvidenceCorpus {
    pub fn from_case(case: &MergedCase) -> Self {
        let source = case
            .attachments
            .iter()
            .map(String::as_str)
            .chain(case.encumbrance_details.entries().iter().flat_map(|e| e.texts()))
            .map(collapse_whitespace)
            .collect::<Vec<_>>()
            .join("\n");
        let report = case
            .report_json
            .as_ref()
            .map(|r| r.texts())
            .unwrap_or_default()
            .iter()
            .map(|t| collapse_whitespace(t))
            .collect::<Vec<_>>()
            .join("\n");
        Self { source, report }
    }

    pub fn verify(&self, evidence: &Evidence) -> Result<(), EvidenceVerificationError> {
        check("source_doc", &evidence.source_doc, &self.source)?;
        check("report", &evidence.report, &self.report)
    }
}

/// Collapse whitespace and strip leading/trailing ellipses.
pub fn normalize_excerpt(excerpt: &str) -> String {
    let collapsed = collapse_whitespace(excerpt);
    collapsed
        .trim_start_matches("...")
        .trim_start_matches('…')
        .trim_end_matches("...")
        .trim_end_matches('…')
        .trim()
        .to_string()
}

fn check(field: &'static str, excerpt: &str, corpus: &str) -> Result<(), EvidenceVerificationError> {
    let needle = normalize_excerpt(excerpt);
    if needle.is_empty() {
        return Err(EvidenceVerificationError::Empty { field });
    }
    if corpus.contains(&needle) {
        Ok(())
    } else {
        Err(EvidenceVerificationError::NotFound {
            field,
            excerpt: needle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> EvidenceCorpus {
        let case = MergedCase::from_json(
            r#"{
            "attachments": ["bounded by\n  East:   Road, West: House"],
            "encumbranceDetails": [{"description": "[E]: Survey 456"}],
            "reportJson": {"sections": [{"title": "Schedule", "content": "East: Survey 456"}], "ownerName1": "K. Ravi"}
        }"#,
        )
        .unwrap();
        EvidenceCorpus::from_case(&case)
    }

    fn evidence(source_doc: &str, report: &str) -> Evidence {
        Evidence {
            source_doc: source_doc.into(),
            report: report.into(),
        }
    }

    #[test]
    fn verbatim_excerpts_pass() {
        let c = corpus();
        assert_eq!(c.verify(&evidence("East: Road", "East: Survey 456")), Ok(()));
        assert_eq!(c.verify(&evidence("[E]: Survey 456", "K. Ravi")), Ok(()));
    }

    #[test]
    fn whitespace_and_ellipses_ignored() {
        let c = corpus();
        assert_eq!(c.verify(&evidence("...bounded by East: Road...", "…East:  Survey 456")), Ok(()));
    }

    #[test]
    fn paraphrase_rejected() {
        let c = corpus();
        assert_eq!(
            c.verify(&evidence("East side: Road", "East: Survey 456")),
            Err(EvidenceVerificationError::NotFound {
                field: "source_doc",
                excerpt: "East side: Road".into()
            })
        );
        // Report text is not a valid source excerpt.
        assert!(c.verify(&evidence("K. Ravi", "K. Ravi")).is_err());
    }

    #[test]
    fn empty_excerpt_rejected() {
        let c = corpus();
        assert_eq!(
            c.verify(&evidence("East: Road", "  ... ")),
            Err(EvidenceVerificationError::Empty { field: "report" })
        );
    }
}
