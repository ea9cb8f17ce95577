//! Core types for Titlewise: merged-case schema, case normalization,
//! precedent records and chunking, and review issues.

pub mod case;
pub mod chunk;
pub mod doc_number;
pub mod embed;
mod error;
pub mod evidence;
pub mod extract;
pub mod fields;
pub mod issue;
pub mod normalize;
pub mod precedent;
pub mod review;

pub use case::MergedCase;
pub use chunk::{Chunk, ChunkMetadata, ChunkType, chunk};
pub use doc_number::DocNumber;
pub use embed::Embed;
pub use error::InputError;
pub use evidence::{EvidenceCorpus, EvidenceVerificationError};
pub use extract::{CaseExtract, EcTransaction, Fingerprint};
pub use issue::{Evidence, Issue, IssueCategory, ReportSection, Severity};
pub use normalize::normalize;
pub use precedent::{PrecedentException, PrecedentMeta, PrecedentRecord};
pub use review::{Recommendation, ReviewMetrics, ReviewObject, ReviewState, StageRecord};
