//! Precedent storage: in-memory and LanceDB vector indexes, and the
//! [`PrecedentStore`] that chunks, embeds and retrieves precedents.

mod error;
pub use error::StoreError;

pub mod index;
pub use index::{IndexMatch, IndexRow, MemoryIndex, MetadataFilter, VectorIndex};

pub mod retry;
pub use retry::RetryPolicy;

mod store;
pub use store::{
    IngestReport, PrecedentStore, PrecedentSummary, RetrievalConfig, StoreStats,
    format_precedents_for_prompt,
};

#[cfg(feature = "lancedb")]
mod lance;
#[cfg(feature = "lancedb")]
pub use lance::LanceIndex;
