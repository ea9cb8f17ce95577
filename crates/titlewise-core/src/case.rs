//! Boundary schema for merged-case input files.
//!
//! A merged case bundles three independently produced sources for one property:
//! OCR'd deed attachments, encumbrance-certificate (EC) entries, and the maker's
//! drafted report. Every source is optional, but [`crate::normalize`] rejects a
//! case where all three are empty.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::InputError;

/// Raw merged-case document as produced by the intake tooling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedCase {
    /// OCR'd text, one string per attachment.
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub encumbrance_details: EncumbranceDetails,
    #[serde(default)]
    pub report_json: Option<ReportJson>,
}

impl MergedCase {
    /// Parse and validate a merged-case JSON document.
    pub fn from_json(json: &str) -> Result<Self, InputError> {
        serde_json::from_str(json).map_err(|source| InputError::Json {
            what: "merged case",
            source,
        })
    }

    pub fn has_attachments(&self) -> bool {
        self.attachments.iter().any(|a| !a.trim().is_empty())
    }

    pub fn has_encumbrance(&self) -> bool {
        !self.encumbrance_details.entries().is_empty()
    }

    pub fn has_report(&self) -> bool {
        self.report_json.as_ref().is_some_and(|r| !r.is_empty())
    }

    /// All attachment text joined with newlines.
    pub fn attachment_text(&self) -> String {
        self.attachments.join("\n")
    }
}

/// EC entries arrive either as a bare list or wrapped in `{"transactions": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EncumbranceDetails {
    Entries(Vec<EcEntry>),
    Wrapped {
        #[serde(default)]
        transactions: Vec<EcEntry>,
    },
}

impl Default for EncumbranceDetails {
    fn default() -> Self {
        Self::Entries(Vec::new())
    }
}

impl EncumbranceDetails {
    pub fn entries(&self) -> &[EcEntry] {
        match self {
            Self::Entries(entries) => entries,
            Self::Wrapped { transactions } => transactions,
        }
    }
}

/// One encumbrance-certificate row.
///
/// Registry exports carry semi-structured text blobs (`identifiers`,
/// `deedValue`, `dates`, `parties`); hand-prepared inputs may supply the
/// structured fields directly. Structured fields win when both are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub identifiers: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub deed_value: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub dates: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub parties: Option<String>,

    #[serde(default, alias = "doc_no", deserialize_with = "lenient_string")]
    pub doc_no: Option<String>,
    #[serde(default, alias = "deed_type", deserialize_with = "lenient_string")]
    pub deed_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub district: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sro: Option<String>,
    #[serde(default, alias = "survey_no", deserialize_with = "lenient_string")]
    pub survey_no: Option<String>,
}

impl EcEntry {
    /// Every free-text field of the entry, for evidence matching.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        [
            &self.description,
            &self.identifiers,
            &self.deed_value,
            &self.dates,
            &self.parties,
            &self.doc_no,
            &self.deed_type,
            &self.sro,
            &self.survey_no,
        ]
        .into_iter()
        .filter_map(|f| f.as_deref())
    }
}

/// The maker's drafted report, as exported by the report editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportJson {
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub applicant: Option<String>,
    #[serde(default, rename = "ownerName1", deserialize_with = "lenient_string")]
    pub owner_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub registration_no: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub nature_of_deed: Option<String>,
    #[serde(default, rename = "registeredSRO", deserialize_with = "lenient_string")]
    pub registered_sro: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub survey_no_deed: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub house_no_old: Option<String>,
    #[serde(default, rename = "houseNoGP", deserialize_with = "lenient_string")]
    pub house_no_gp: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub flat_no: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub plot_no: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub assessment_no: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub property_extent: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub alias_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub taluk: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub district: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mutation: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub accessibility: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub loan_amount: Option<String>,
    #[serde(default)]
    pub boundaries: Vec<ReportBoundary>,
    #[serde(default)]
    pub sections: Vec<ReportSectionText>,
    /// Fields the normalizer does not interpret; kept for evidence matching.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportBoundary {
    #[serde(default, rename = "boundaryN", deserialize_with = "lenient_string")]
    pub north: Option<String>,
    #[serde(default, rename = "boundaryS", deserialize_with = "lenient_string")]
    pub south: Option<String>,
    #[serde(default, rename = "boundaryE", deserialize_with = "lenient_string")]
    pub east: Option<String>,
    #[serde(default, rename = "boundaryW", deserialize_with = "lenient_string")]
    pub west: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSectionText {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default)]
    pub content: String,
}

impl ReportJson {
    fn scalar_fields(&self) -> [&Option<String>; 20] {
        [
            &self.code,
            &self.applicant,
            &self.owner_name,
            &self.registration_no,
            &self.nature_of_deed,
            &self.registered_sro,
            &self.survey_no_deed,
            &self.house_no_old,
            &self.house_no_gp,
            &self.flat_no,
            &self.plot_no,
            &self.assessment_no,
            &self.property_extent,
            &self.alias_name,
            &self.taluk,
            &self.district,
            &self.state,
            &self.mutation,
            &self.accessibility,
            &self.loan_amount,
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.scalar_fields()
            .iter()
            .all(|f| f.as_deref().is_none_or(|s| s.trim().is_empty()))
            && self.boundaries.is_empty()
            && self.sections.iter().all(|s| s.content.trim().is_empty())
            && self.extra.is_empty()
    }

    /// Every string the report carries: section content, scalar fields,
    /// boundaries, and any uninterpreted extra values.
    pub fn texts(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .sections
            .iter()
            .filter(|s| !s.content.is_empty())
            .map(|s| s.content.clone())
            .collect();
        out.extend(self.scalar_fields().into_iter().flatten().cloned());
        for b in &self.boundaries {
            out.extend(
                [&b.north, &b.south, &b.east, &b.west]
                    .into_iter()
                    .flatten()
                    .cloned(),
            );
        }
        for value in self.extra.values() {
            collect_strings(value, &mut out);
        }
        out
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        Value::Number(n) => out.push(n.to_string()),
        Value::Bool(_) | Value::Null => {}
    }
}

/// Accept strings, numbers, and booleans for free-text fields; report exports
/// are inconsistent about quoting numeric identifiers.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected a string, found {other}"
            )));
        }
    })
}
