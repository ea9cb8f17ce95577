//! Review issues: severity, category, report section, evidence.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Issue severity. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }

    pub const ALL: [Severity; 3] = [Self::High, Self::Medium, Self::Low];
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Severity {
    type Error = String;

    /// Accepts the reviewers' older vocabulary (`minor`/`major`/`critical`).
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" | "MINOR" => Ok(Self::Low),
            "MEDIUM" | "MODERATE" | "MAJOR" => Ok(Self::Medium),
            "HIGH" | "CRITICAL" => Ok(Self::High),
            other => Err(format!("unknown severity {other:?}")),
        }
    }
}

/// What kind of discrepancy an issue reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum IssueCategory {
    BoundaryMismatch,
    OwnerMismatch,
    SurveyMismatch,
    ExtentMismatch,
    DocNumberMismatch,
    DeedTypeMismatch,
    DateMismatch,
    ValueMismatch,
    SroMismatch,
    MortgageMismatch,
    MutationPending,
    MissingDocument,
    Other,
}

impl IssueCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BoundaryMismatch => "BOUNDARY_MISMATCH",
            Self::OwnerMismatch => "OWNER_MISMATCH",
            Self::SurveyMismatch => "SURVEY_MISMATCH",
            Self::ExtentMismatch => "EXTENT_MISMATCH",
            Self::DocNumberMismatch => "DOC_NUMBER_MISMATCH",
            Self::DeedTypeMismatch => "DEED_TYPE_MISMATCH",
            Self::DateMismatch => "DATE_MISMATCH",
            Self::ValueMismatch => "VALUE_MISMATCH",
            Self::SroMismatch => "SRO_MISMATCH",
            Self::MortgageMismatch => "MORTGAGE_MISMATCH",
            Self::MutationPending => "MUTATION_PENDING",
            Self::MissingDocument => "MISSING_DOCUMENT",
            Self::Other => "OTHER",
        }
    }

    /// Minimum severity an issue of this category may carry.
    pub fn severity_floor(&self) -> Severity {
        match self {
            Self::MortgageMismatch => Severity::High,
            Self::BoundaryMismatch
            | Self::OwnerMismatch
            | Self::SurveyMismatch
            | Self::ExtentMismatch
            | Self::DocNumberMismatch => Severity::Medium,
            _ => Severity::Low,
        }
    }

    /// The report section an issue of this category belongs to when the model
    /// does not say.
    pub fn default_section(&self) -> ReportSection {
        match self {
            Self::BoundaryMismatch | Self::SurveyMismatch | Self::ExtentMismatch => {
                ReportSection::ScheduleOfProperty
            }
            Self::OwnerMismatch | Self::SroMismatch => ReportSection::PropertyDetails,
            Self::DocNumberMismatch | Self::DeedTypeMismatch | Self::DateMismatch | Self::MissingDocument => {
                ReportSection::DocumentsScrutinized
            }
            Self::ValueMismatch | Self::MortgageMismatch => ReportSection::EncumbranceCertificate,
            Self::MutationPending => ReportSection::MutationAndTax,
            Self::Other => ReportSection::ConclusionAndRemarks,
        }
    }

    /// Infer a category from free text such as a reviewer's exception note.
    ///
    /// Keywords are checked in a fixed order; the first hit wins.
    pub fn infer(text: &str) -> Self {
        let lower = text.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if has(&["mortgage", "encumbrance", "charge", "lien"]) {
            Self::MortgageMismatch
        } else if has(&["boundar", "north", "south", "east", "west"]) {
            Self::BoundaryMismatch
        } else if has(&["survey", "sy. no", "sy no"]) {
            Self::SurveyMismatch
        } else if has(&["extent", "area", "sq.", "sq ", "acre", "cents"]) {
            Self::ExtentMismatch
        } else if has(&["document number", "doc no", "doc. no", "registration no"]) {
            Self::DocNumberMismatch
        } else if has(&["deed type", "nature of deed", "gift", "sale deed", "conveyance"]) {
            Self::DeedTypeMismatch
        } else if has(&["owner", "name", "spelling", "party", "parties", "s/o", "son of"]) {
            Self::OwnerMismatch
        } else if has(&["sro", "sub-registrar", "sub registrar"]) {
            Self::SroMismatch
        } else if has(&["date"]) {
            Self::DateMismatch
        } else if has(&["value", "consideration"]) {
            Self::ValueMismatch
        } else if has(&["mutation", "khata", "patta", "tax"]) {
            Self::MutationPending
        } else if has(&["missing", "not provided", "not submitted"]) {
            Self::MissingDocument
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for IssueCategory {
    fn from(s: String) -> Self {
        let key = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        match key.as_str() {
            "BOUNDARY_MISMATCH" => Self::BoundaryMismatch,
            "OWNER_MISMATCH" | "NAME_MISMATCH" => Self::OwnerMismatch,
            "SURVEY_MISMATCH" => Self::SurveyMismatch,
            "EXTENT_MISMATCH" => Self::ExtentMismatch,
            "DOC_NUMBER_MISMATCH" | "DOCUMENT_NUMBER_MISMATCH" => Self::DocNumberMismatch,
            "DEED_TYPE_MISMATCH" => Self::DeedTypeMismatch,
            "DATE_MISMATCH" => Self::DateMismatch,
            "VALUE_MISMATCH" => Self::ValueMismatch,
            "SRO_MISMATCH" => Self::SroMismatch,
            "MORTGAGE_MISMATCH" => Self::MortgageMismatch,
            "MUTATION_PENDING" => Self::MutationPending,
            "MISSING_DOCUMENT" => Self::MissingDocument,
            _ => Self::Other,
        }
    }
}

/// The eight sections of a title report. Issue ids are numbered per section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSection {
    PropertyDetails,
    ScheduleOfProperty,
    DocumentsScrutinized,
    EncumbranceCertificate,
    FlowOfTitle,
    MutationAndTax,
    ConclusionAndRemarks,
    LayoutAndFlowchart,
}

impl ReportSection {
    pub const ALL: [ReportSection; 8] = [
        Self::PropertyDetails,
        Self::ScheduleOfProperty,
        Self::DocumentsScrutinized,
        Self::EncumbranceCertificate,
        Self::FlowOfTitle,
        Self::MutationAndTax,
        Self::ConclusionAndRemarks,
        Self::LayoutAndFlowchart,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PropertyDetails => "property_details",
            Self::ScheduleOfProperty => "schedule_of_property",
            Self::DocumentsScrutinized => "documents_scrutinized",
            Self::EncumbranceCertificate => "encumbrance_certificate",
            Self::FlowOfTitle => "flow_of_title",
            Self::MutationAndTax => "mutation_and_tax",
            Self::ConclusionAndRemarks => "conclusion_and_remarks",
            Self::LayoutAndFlowchart => "layout_and_flowchart",
        }
    }

    /// Two-letter id prefix (`PD`, `SP`, ...).
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::PropertyDetails => "PD",
            Self::ScheduleOfProperty => "SP",
            Self::DocumentsScrutinized => "DS",
            Self::EncumbranceCertificate => "EC",
            Self::FlowOfTitle => "FT",
            Self::MutationAndTax => "MT",
            Self::ConclusionAndRemarks => "CR",
            Self::LayoutAndFlowchart => "LF",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let key = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|section| section.as_str() == key || section.prefix().eq_ignore_ascii_case(&key))
    }
}

impl fmt::Display for ReportSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Literal excerpts supporting an issue: one from the source documents
/// (deed OCR or EC), one from the drafted report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default)]
    pub source_doc: String,
    #[serde(default)]
    pub report: String,
}

/// A single review finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub section: ReportSection,
    pub category: IssueCategory,
    pub severity: Severity,
    pub description: String,
    pub evidence: Evidence,
    /// Checklist rule the issue falls under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    /// `<case_id>: <note>` of the precedent exception that downgraded this issue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precedent_reference: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_and_parses_aliases() {
        assert!(Severity::Low < Severity::Medium && Severity::Medium < Severity::High);
        let parsed: Vec<Severity> = serde_json::from_str(r#"["high", "Major", "minor", "CRITICAL"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![Severity::High, Severity::Medium, Severity::Low, Severity::High]
        );
        assert!(serde_json::from_str::<Severity>(r#""urgent""#).is_err());
        assert_eq!(serde_json::to_string(&Severity::Medium).unwrap(), r#""MEDIUM""#);
    }

    #[test]
    fn category_parsing_is_lenient() {
        let parsed: Vec<IssueCategory> =
            serde_json::from_str(r#"["BOUNDARY_MISMATCH", "boundary mismatch", "Document-Number mismatch", "WEIRD"]"#)
                .unwrap();
        assert_eq!(
            parsed,
            vec![
                IssueCategory::BoundaryMismatch,
                IssueCategory::BoundaryMismatch,
                IssueCategory::DocNumberMismatch,
                IssueCategory::Other,
            ]
        );
        assert_eq!(
            serde_json::to_string(&IssueCategory::DocNumberMismatch).unwrap(),
            r#""DOC_NUMBER_MISMATCH""#
        );
    }

    #[test]
    fn category_inference() {
        assert_eq!(
            IssueCategory::infer("East boundary described as road in deed but survey number in EC"),
            IssueCategory::BoundaryMismatch
        );
        assert_eq!(
            IssueCategory::infer("Minor spelling variations in owner name are acceptable"),
            IssueCategory::OwnerMismatch
        );
        assert_eq!(IssueCategory::infer("Old mortgage already discharged"), IssueCategory::MortgageMismatch);
        assert_eq!(IssueCategory::infer("nothing relevant"), IssueCategory::Other);
    }

    #[test]
    fn severity_floors() {
        assert_eq!(IssueCategory::MortgageMismatch.severity_floor(), Severity::High);
        assert_eq!(IssueCategory::BoundaryMismatch.severity_floor(), Severity::Medium);
        assert_eq!(IssueCategory::DateMismatch.severity_floor(), Severity::Low);
    }

    #[test]
    fn sections_have_prefixes() {
        let prefixes: Vec<&str> = ReportSection::ALL.iter().map(ReportSection::prefix).collect();
        assert_eq!(prefixes, vec!["PD", "SP", "DS", "EC", "FT", "MT", "CR", "LF"]);
        assert_eq!(ReportSection::parse("Schedule of Property"), Some(ReportSection::ScheduleOfProperty));
        assert_eq!(ReportSection::parse("EC"), Some(ReportSection::EncumbranceCertificate));
        assert_eq!(ReportSection::parse("appendix"), None);
    }
}
