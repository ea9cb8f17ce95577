//! The normalized case extract: fingerprint, key fields, and EC summary.
//!
//! A [`CaseExtract`] is derived once per review by [`crate::normalize`] and is
//! immutable afterwards. It is the only view of the case that reaches the
//! retrieval query and the Generator prompt.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::doc_number::DocNumber;

/// Render the location line shared by case fingerprints and precedent chunks.
///
/// Every precedent chunk is prefixed with this line, so a case's fingerprint
/// query lands near all of that precedent's chunks.
pub fn location_line(
    state: Option<&str>,
    district: Option<&str>,
    sro: Option<&str>,
    survey_numbers: &[String],
) -> String {
    let mut parts = Vec::with_capacity(4);
    if let Some(state) = state {
        parts.push(format!("State: {state}"));
    }
    if let Some(district) = district {
        parts.push(format!("District: {district}"));
    }
    if let Some(sro) = sro {
        parts.push(format!("SRO: {sro}"));
    }
    if !survey_numbers.is_empty() {
        parts.push(format!("Survey: {}", survey_numbers.join(", ")));
    }
    parts.join(" | ")
}

/// The identifying fields used to find similar precedents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub state: Option<String>,
    pub district: Option<String>,
    pub sro: Option<String>,
    pub survey_numbers: Vec<String>,
    /// Normalized party names, deduplicated, in source precedence order.
    pub party_names: Vec<String>,
}

impl Fingerprint {
    pub fn is_empty(&self) -> bool {
        self.state.is_none()
            && self.district.is_none()
            && self.sro.is_none()
            && self.survey_numbers.is_empty()
            && self.party_names.is_empty()
    }

    pub fn location_line(&self) -> String {
        location_line(
            self.state.as_deref(),
            self.district.as_deref(),
            self.sro.as_deref(),
            &self.survey_numbers,
        )
    }

    /// Single-line rendering used as the retrieval query.
    pub fn render(&self) -> String {
        let mut out = self.location_line();
        if !self.party_names.is_empty() {
            if !out.is_empty() {
                out.push_str(" | ");
            }
            let _ = write!(out, "Parties: {}", self.party_names.join(", "));
        }
        out
    }
}

/// One flattened encumbrance transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcTransaction {
    /// Normalized `number/year`, or the compacted raw value when unparseable.
    pub doc_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<DocNumber>,
    pub deed_type: Option<String>,
    pub registration_date: Option<String>,
    pub execution_date: Option<String>,
    pub executant: Option<String>,
    pub claimant: Option<String>,
    pub market_value: Option<String>,
    pub consideration_value: Option<String>,
    pub description: Option<String>,
}

impl EcTransaction {
    pub fn is_mortgage(&self) -> bool {
        self.deed_type
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains("mortgage"))
    }

    /// `1101/2026 Gift Deed (R) 06-01-2026 A -> B`
    pub fn render(&self) -> String {
        let mut out = self.doc_no.clone().unwrap_or_else(|| "(no doc no)".into());
        if let Some(deed_type) = &self.deed_type {
            let _ = write!(out, " {deed_type}");
        }
        if let Some(date) = &self.registration_date {
            let _ = write!(out, " (R) {date}");
        }
        match (&self.executant, &self.claimant) {
            (Some(from), Some(to)) => {
                let _ = write!(out, " {from} -> {to}");
            }
            (Some(from), None) => {
                let _ = write!(out, " by {from}");
            }
            (None, Some(to)) => {
                let _ = write!(out, " to {to}");
            }
            (None, None) => {}
        }
        out
    }
}

/// Normalized view of a merged case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseExtract {
    /// Report code when the report carries one.
    pub case_code: Option<String>,
    pub fingerprint: Fingerprint,
    /// Canonical state used as the retrieval filter.
    pub detected_state: Option<String>,
    /// `<field>.<source>` → value, sources being `report`, `deed`, `ec`.
    pub key_fields: BTreeMap<String, String>,
    /// Chronological, deduplicated EC transactions.
    pub ec_summary: Vec<EcTransaction>,
    pub mortgage_flag: bool,
}

impl CaseExtract {
    /// Text embedded for retrieval.
    pub fn query_text(&self, include_key_fields: bool) -> String {
        let mut out = self.fingerprint.render();
        if include_key_fields && !self.key_fields.is_empty() {
            out.push('\n');
            out.push_str(&self.render_key_fields());
        }
        out
    }

    pub fn render_key_fields(&self) -> String {
        self.key_fields
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Multi-section rendering for language-model prompts.
    pub fn render_for_prompt(&self) -> String {
        let mut out = String::new();
        if let Some(code) = &self.case_code {
            let _ = writeln!(out, "Case: {code}");
        }
        let _ = writeln!(out, "Fingerprint: {}", self.fingerprint.render());
        out.push_str("\nKey fields (field.source: value):\n");
        if self.key_fields.is_empty() {
            out.push_str("(none extracted)\n");
        } else {
            out.push_str(&self.render_key_fields());
            out.push('\n');
        }
        out.push_str("\nEncumbrance summary (chronological):\n");
        if self.ec_summary.is_empty() {
            out.push_str("(no transactions)\n");
        }
        for (i, txn) in self.ec_summary.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, txn.render());
        }
        if self.mortgage_flag {
            out.push_str("Mortgage: Active\n");
        }
        out
    }
}
