//! Language-model seam used by the review pipeline.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("model call timed out after {0} ms")]
    Timeout(u64),

    #[error("model returned an empty response")]
    Empty,

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether the same call may succeed if repeated.
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "http")]
            Self::Http(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Timeout(_) | Self::Empty | Self::Other(_) => true,
            Self::Json(_) => false,
        }
    }
}

/// The shape a response is expected to take. Implementations may use it to
/// request structured output; the pipeline validates the text either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSchema {
    /// Generator output: every candidate issue, grouped by report section.
    CandidateReview,
    /// Critic output: the pruned and calibrated issue set.
    FinalReview,
}

impl ResponseSchema {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CandidateReview => "CANDIDATE_REVIEW",
            Self::FinalReview => "REVIEW_OBJECT",
        }
    }

    /// JSON shape shown to the model.
    pub fn shape(&self) -> &'static str {
        REVIEW_SHAPE
    }
}

const REVIEW_SHAPE: &str = r#"{
  "overall_summary": "one-paragraph summary",
  "sections": {
    "property_details": [ISSUE],
    "schedule_of_property": [ISSUE],
    "documents_scrutinized": [ISSUE],
    "encumbrance_certificate": [ISSUE],
    "flow_of_title": [ISSUE],
    "mutation_and_tax": [ISSUE],
    "conclusion_and_remarks": [ISSUE],
    "layout_and_flowchart": [ISSUE]
  }
}

ISSUE = {
  "id": "PD-01",
  "category": "BOUNDARY_MISMATCH | OWNER_MISMATCH | SURVEY_MISMATCH | EXTENT_MISMATCH | DOC_NUMBER_MISMATCH | DEED_TYPE_MISMATCH | DATE_MISMATCH | VALUE_MISMATCH | SRO_MISMATCH | MORTGAGE_MISMATCH | MUTATION_PENDING | MISSING_DOCUMENT | OTHER",
  "severity": "HIGH | MEDIUM | LOW",
  "rule": "checklist rule reference",
  "description": "what is wrong",
  "suggested_fix": "how to fix it",
  "evidence": {
    "report": "EXACT excerpt from the report",
    "source_doc": "EXACT excerpt from the deed or EC"
  }
}"#;

/// Text generation. Calls may fail transiently; callers own retries.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str, schema: ResponseSchema) -> Result<String, LlmError>;

    /// Identifier recorded in logs.
    fn model_name(&self) -> &str {
        "unknown"
    }
}
