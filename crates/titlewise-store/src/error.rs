use thiserror::Error;

use titlewise_core::InputError;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid store configuration or call arguments. Never retried.
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("embedding has {actual} dimensions, index expects {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// A retried operation kept failing.
    #[error("retrieval error: {operation} failed after {attempts} attempts: {last}")]
    Retrieval {
        operation: &'static str,
        attempts: u32,
        #[source]
        last: Box<StoreError>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "lancedb")]
    #[error("lancedb error: {0}")]
    Lance(#[from] lancedb::Error),

    #[cfg(feature = "lancedb")]
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Config(_) | Self::Input(_) | Self::Dimension { .. } | Self::Retrieval { .. } => false,
            Self::Embedding(_) | Self::Timeout { .. } | Self::Io(_) | Self::Other(_) => true,
            #[cfg(feature = "lancedb")]
            Self::Lance(_) => true,
            #[cfg(feature = "lancedb")]
            Self::Arrow(_) => false,
        }
    }
}
