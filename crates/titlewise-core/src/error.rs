use thiserror::Error;

/// Malformed or empty case/precedent input. Never retried.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("merged case has no attachments, encumbrance details, or report")]
    EmptyCase,

    #[error("no identifying fields (state, district, SRO, survey numbers, parties) could be extracted")]
    NoIdentifyingFields,

    #[error("precedent is missing a case_id")]
    MissingCaseId,

    #[error("invalid {what} JSON: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
