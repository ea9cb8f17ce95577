use thiserror::Error;

use titlewise_core::{CaseExtract, InputError, ReviewState, StageRecord};
use titlewise_store::StoreError;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("invalid input: {0}")]
    Input(#[from] InputError),

    #[error("config error: {0}")]
    Config(String),

    #[error("retrieval failed: {0}")]
    Retrieval(#[source] StoreError),

    #[error("generation failed after {attempts} attempts: {message}")]
    Generation { attempts: u32, message: String },

    #[error("critique failed after {attempts} attempts: {message}")]
    Critique { attempts: u32, message: String },

    #[error("review cancelled")]
    Cancelled,
}

impl From<StoreError> for ReviewError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Config(message) => Self::Config(message),
            StoreError::Input(err) => Self::Input(err),
            other => Self::Retrieval(other),
        }
    }
}

/// A review that ended in `FAILED`. Carries everything produced before the
/// failure so the caller can inspect it or retry.
#[derive(Debug, Error)]
#[error("review failed during {state}: {error}")]
pub struct ReviewFailure {
    /// The state the pipeline was in when it failed.
    pub state: ReviewState,
    #[source]
    pub error: ReviewError,
    pub extract: Option<CaseExtract>,
    pub trail: Vec<StageRecord>,
}
