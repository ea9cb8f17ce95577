//! Two-stage title review: a Generator proposes candidate issues, a Critic
//! prunes them, and deterministic rules enforce evidence, severity, and the
//! final recommendation.

mod config;
pub use config::ReviewConfig;

pub mod draft;
pub use draft::{DraftReview, ParseError, parse_response};

pub mod enforce;

mod error;
pub use error::{ReviewError, ReviewFailure};

mod pipeline;
pub use pipeline::ReviewPipeline;
