//! Precedent Chunker: one precedent → six semantic chunks.
//!
//! Chunk texts are prefixed with the precedent's location line so that every
//! chunk of a case embeds close to that case's fingerprint. Each chunk also
//! carries the raw items it was rendered from, which lets the store rebuild a
//! precedent summary from index rows alone.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::precedent::PrecedentRecord;
use crate::InputError;

/// Rendered in place of a field the precedent left empty.
pub const EMPTY_MARKER: &str = "(none recorded)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Fingerprint,
    KeyFields,
    EcSummary,
    ReviewNotes,
    Exceptions,
    FlowOfTitle,
}

impl ChunkType {
    /// All chunk types in emission order.
    pub const ALL: [ChunkType; 6] = [
        Self::Fingerprint,
        Self::KeyFields,
        Self::EcSummary,
        Self::ReviewNotes,
        Self::Exceptions,
        Self::FlowOfTitle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fingerprint => "fingerprint",
            Self::KeyFields => "key_fields",
            Self::EcSummary => "ec_summary",
            Self::ReviewNotes => "review_notes",
            Self::Exceptions => "exceptions",
            Self::FlowOfTitle => "flow_of_title",
        }
    }

    /// Human-readable label used in chunk texts and prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fingerprint => "Fingerprint",
            Self::KeyFields => "Key Fields",
            Self::EcSummary => "EC Summary",
            Self::ReviewNotes => "Review Notes",
            Self::Exceptions => "Exceptions (accepted variations, do not flag)",
            Self::FlowOfTitle => "Flow of Title",
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown chunk type {s:?}"))
    }
}

/// Location metadata copied onto every chunk of a precedent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub state: Option<String>,
    pub district: Option<String>,
    pub sro: Option<String>,
    pub survey_numbers: Vec<String>,
    pub deed_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// `<case_id>:<chunk_type>`
    pub chunk_id: String,
    pub case_id: String,
    pub chunk_type: ChunkType,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Source items the text was rendered from. Exceptions are stored as JSON.
    pub items: Vec<String>,
}

pub fn chunk_id(case_id: &str, chunk_type: ChunkType) -> String {
    format!("{case_id}:{chunk_type}")
}

/// Split a precedent into exactly six chunks in [`ChunkType::ALL`] order.
pub fn chunk(precedent: &PrecedentRecord) -> Result<[Chunk; 6], InputError> {
    let case_id = precedent.case_id.trim();
    if case_id.is_empty() {
        return Err(InputError::MissingCaseId);
    }

    let metadata = ChunkMetadata {
        state: precedent.meta.state.clone(),
        district: precedent.meta.district.clone(),
        sro: precedent.meta.sro.clone(),
        survey_numbers: precedent.meta.survey_numbers.clone(),
        deed_types: precedent.meta.deed_types.clone(),
    };
    let location = precedent.location_line();

    Ok(ChunkType::ALL.map(|chunk_type| {
        let (items, rendered) = items_for(precedent, chunk_type);
        let body = if rendered.is_empty() {
            EMPTY_MARKER.to_string()
        } else {
            rendered.join("; ")
        };
        let text = if location.is_empty() {
            format!("[{}] {body}", chunk_type.label())
        } else {
            format!("{location}\n[{}] {body}", chunk_type.label())
        };
        Chunk {
            chunk_id: chunk_id(case_id, chunk_type),
            case_id: case_id.to_string(),
            chunk_type,
            text,
            metadata: metadata.clone(),
            items,
        }
    }))
}

/// Stored items and their display renderings for one chunk type.
fn items_for(precedent: &PrecedentRecord, chunk_type: ChunkType) -> (Vec<String>, Vec<String>) {
    match chunk_type {
        ChunkType::Fingerprint => {
            let deed_types = &precedent.meta.deed_types;
            let rendered = if deed_types.is_empty() {
                vec![]
            } else {
                vec![format!("Deed types: {}", deed_types.join(", "))]
            };
            (deed_types.clone(), rendered)
        }
        ChunkType::KeyFields => {
            let items = precedent.key_field_items();
            (items.clone(), items)
        }
        ChunkType::EcSummary => (precedent.ec_transactions.clone(), precedent.ec_transactions.clone()),
        ChunkType::ReviewNotes => (precedent.review_notes.clone(), precedent.review_notes.clone()),
        ChunkType::Exceptions => {
            let items = precedent
                .exceptions
                .iter()
                .filter_map(|e| serde_json::to_string(e).ok())
                .collect();
            let rendered = precedent.exceptions.iter().map(|e| e.render()).collect();
            (items, rendered)
        }
        ChunkType::FlowOfTitle => (precedent.flow_of_title.clone(), precedent.flow_of_title.clone()),
    }
}
