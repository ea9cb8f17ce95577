//! Precedent records: past reviewed cases with reviewer notes and accepted
//! exceptions.
//!
//! Precedent files are hand-curated and loosely shaped, so most text fields
//! accept either a single string or a list, and an exception may be a bare
//! note or a structured `{category, state, note}` object.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::extract::location_line;
use crate::fields::{canonical_deed_type, canonical_state, split_survey_numbers};
use crate::issue::IssueCategory;
use crate::InputError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecedentMeta {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub sro: Option<String>,
    #[serde(default, alias = "survey_no", deserialize_with = "text_items")]
    pub survey_numbers: Vec<String>,
    #[serde(default, deserialize_with = "text_items")]
    pub deed_types: Vec<String>,
}

/// A reviewer-accepted variation: an issue of `category` that should not
/// block approval, optionally only in `state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawException")]
pub struct PrecedentException {
    pub category: IssueCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub note: String,
}

impl PrecedentException {
    pub fn render(&self) -> String {
        match &self.state {
            Some(state) => format!("{} [{state}]: {}", self.category, self.note),
            None => format!("{}: {}", self.category, self.note),
        }
    }

    /// Whether this exception covers an issue of `category` in `case_state`.
    /// An exception without a state applies everywhere.
    pub fn applies_to(&self, category: IssueCategory, case_state: Option<&str>) -> bool {
        self.category == category
            && match (&self.state, case_state) {
                (None, _) => true,
                (Some(mine), Some(theirs)) => mine.eq_ignore_ascii_case(theirs),
                (Some(_), None) => false,
            }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawException {
    Note(String),
    Structured {
        #[serde(default)]
        category: Option<IssueCategory>,
        #[serde(default)]
        state: Option<String>,
        #[serde(default, alias = "description")]
        note: String,
    },
}

impl From<RawException> for PrecedentException {
    fn from(raw: RawException) -> Self {
        let (category, state, note) = match raw {
            RawException::Note(note) => (None, None, note),
            RawException::Structured {
                category,
                state,
                note,
            } => (category, state, note),
        };
        Self {
            category: category
                .filter(|c| *c != IssueCategory::Other)
                .unwrap_or_else(|| IssueCategory::infer(&note)),
            state: state.as_deref().and_then(canonical_state),
            note: note.trim().to_string(),
        }
    }
}

/// A reviewed historical case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrecedentRecord {
    #[serde(default)]
    pub case_id: String,
    #[serde(default)]
    pub meta: PrecedentMeta,
    #[serde(default)]
    pub key_fields: BTreeMap<String, Value>,
    #[serde(default, alias = "ec_summary", deserialize_with = "text_items")]
    pub ec_transactions: Vec<String>,
    #[serde(default, deserialize_with = "text_items")]
    pub review_notes: Vec<String>,
    #[serde(default, deserialize_with = "exception_items")]
    pub exceptions: Vec<PrecedentException>,
    #[serde(default, alias = "flow_summary", deserialize_with = "text_items")]
    pub flow_of_title: Vec<String>,
}

impl PrecedentRecord {
    /// Parse and validate a precedent JSON document.
    pub fn from_json(json: &str) -> Result<Self, InputError> {
        let record: Self = serde_json::from_str(json).map_err(|source| InputError::Json {
            what: "precedent",
            source,
        })?;
        record.validated()
    }

    /// Check `case_id` and canonicalize metadata.
    ///
    /// Survey numbers and deed types fall back to `key_fields.survey_no` and
    /// `key_fields.deed_types` when the meta block omits them.
    pub fn validated(mut self) -> Result<Self, InputError> {
        self.case_id = self.case_id.trim().to_string();
        if self.case_id.is_empty() {
            return Err(InputError::MissingCaseId);
        }
        let meta = &mut self.meta;
        meta.state = meta.state.as_deref().and_then(canonical_state);
        if meta.survey_numbers.is_empty() {
            if let Some(survey) = self.key_fields.get("survey_no").and_then(Value::as_str) {
                meta.survey_numbers = split_survey_numbers(survey);
            }
        } else {
            meta.survey_numbers = meta
                .survey_numbers
                .iter()
                .flat_map(|s| split_survey_numbers(s))
                .collect();
        }
        if meta.deed_types.is_empty() {
            meta.deed_types = value_texts(self.key_fields.get("deed_types"));
        }
        meta.deed_types = meta
            .deed_types
            .iter()
            .map(|t| canonical_deed_type(t))
            .collect();
        meta.deed_types.dedup();
        Ok(self)
    }

    pub fn location_line(&self) -> String {
        location_line(
            self.meta.state.as_deref(),
            self.meta.district.as_deref(),
            self.meta.sro.as_deref(),
            &self.meta.survey_numbers,
        )
    }

    /// `key: value` lines for the key-field chunk.
    pub fn key_field_items(&self) -> Vec<String> {
        self.key_fields
            .iter()
            .filter_map(|(k, v)| {
                let rendered = value_texts(Some(v)).join(", ");
                (!rendered.is_empty()).then(|| format!("{k}: {rendered}"))
            })
            .collect()
    }
}

/// Flatten a JSON value into display strings. Objects render as
/// `k: v, k: v`; nulls and empty strings are dropped.
fn value_texts(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().flat_map(|v| value_texts(Some(v))).collect(),
        Some(other) => {
            let text = render_value(other);
            if text.is_empty() { Vec::new() } else { vec![text] }
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k, render_value(v)))
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn text_items<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value_texts(value.as_ref()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

fn exception_items<'de, D>(deserializer: D) -> Result<Vec<PrecedentException>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        match Option::<OneOrMany<PrecedentException>>::deserialize(deserializer)? {
            None => Vec::new(),
            Some(OneOrMany::Many(items)) => items,
            Some(OneOrMany::One(item)) => vec![item],
        }
        .into_iter()
        .filter(|e| !e.note.is_empty())
        .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "case_id": " TS-2024-017 ",
        "meta": {"state": "TS", "district": "Medchal", "sro": "Kapra", "survey_no": "123/4, 125"},
        "key_fields": {"house_no": "5-87", "extent": 145, "deed_types": ["Conveyance", "Gift Settlement"], "mortgage_flag": false},
        "ec_summary": "4960/2011 Sale Deed; 1101/2026 Gift Deed",
        "review_notes": ["Boundaries verified against link document"],
        "exceptions": [
            "East boundary described as road in deed vs survey number in EC is acceptable",
            {"category": "OWNER_MISMATCH", "state": "Telangana", "note": "Initials vs full name"}
        ],
        "flow_summary": "Ravi -> Lakshmi by gift"
    }"#;

    #[test]
    fn parses_loose_precedent() {
        let p = PrecedentRecord::from_json(SAMPLE).unwrap();
        assert_eq!(p.case_id, "TS-2024-017");
        assert_eq!(p.meta.state.as_deref(), Some("Telangana"));
        assert_eq!(p.meta.survey_numbers, vec!["123/4", "125"]);
        assert_eq!(p.meta.deed_types, vec!["Sale Deed", "Gift Deed"]);
        assert_eq!(p.ec_transactions, vec!["4960/2011 Sale Deed; 1101/2026 Gift Deed"]);
        assert_eq!(p.flow_of_title, vec!["Ravi -> Lakshmi by gift"]);
        assert_eq!(
            p.location_line(),
            "State: Telangana | District: Medchal | SRO: Kapra | Survey: 123/4, 125"
        );
    }

    #[test]
    fn exceptions_infer_category() {
        let p = PrecedentRecord::from_json(SAMPLE).unwrap();
        assert_eq!(p.exceptions.len(), 2);
        assert_eq!(p.exceptions[0].category, IssueCategory::BoundaryMismatch);
        assert_eq!(p.exceptions[0].state, None);
        assert_eq!(p.exceptions[1].category, IssueCategory::OwnerMismatch);
        assert_eq!(p.exceptions[1].state.as_deref(), Some("Telangana"));
        assert_eq!(
            p.exceptions[1].render(),
            "OWNER_MISMATCH [Telangana]: Initials vs full name"
        );
    }

    #[test]
    fn exception_applicability() {
        let scoped = PrecedentException {
            category: IssueCategory::BoundaryMismatch,
            state: Some("Andhra Pradesh".into()),
            note: "road vs survey".into(),
        };
        assert!(scoped.applies_to(IssueCategory::BoundaryMismatch, Some("Andhra Pradesh")));
        assert!(!scoped.applies_to(IssueCategory::BoundaryMismatch, Some("Telangana")));
        assert!(!scoped.applies_to(IssueCategory::BoundaryMismatch, None));
        assert!(!scoped.applies_to(IssueCategory::ExtentMismatch, Some("Andhra Pradesh")));

        let global = PrecedentException { state: None, ..scoped };
        assert!(global.applies_to(IssueCategory::BoundaryMismatch, None));
    }

    #[test]
    fn single_string_exception_accepted() {
        let p = PrecedentRecord::from_json(
            r#"{"case_id": "P1", "exceptions": "Mortgage discharged in 2019"}"#,
        )
        .unwrap();
        assert_eq!(p.exceptions.len(), 1);
        assert_eq!(p.exceptions[0].category, IssueCategory::MortgageMismatch);
    }

    #[test]
    fn key_field_items_render_values() {
        let p = PrecedentRecord::from_json(SAMPLE).unwrap();
        let items = p.key_field_items();
        assert!(items.contains(&"extent: 145".to_string()));
        assert!(items.contains(&"deed_types: Conveyance, Gift Settlement".to_string()));
        assert!(items.contains(&"mortgage_flag: false".to_string()));
    }

    #[test]
    fn missing_case_id_rejected() {
        assert!(matches!(
            PrecedentRecord::from_json(r#"{"case_id": "  "}"#),
            Err(InputError::MissingCaseId)
        ));
        assert!(matches!(
            PrecedentRecord::from_json(r#"{"meta": {}}"#),
            Err(InputError::MissingCaseId)
        ));
        assert!(matches!(
            PrecedentRecord::from_json("[1, 2]"),
            Err(InputError::Json { .. })
        ));
    }
}
