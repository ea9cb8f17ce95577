use serde::{Deserialize, Serialize};

use titlewise_core::{IssueCategory, Severity};
use titlewise_store::RetrievalConfig;

use crate::ReviewError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub retrieval: RetrievalConfig,
    /// Categories that reject the case unless a precedent exception resolves them.
    pub hard_fail_categories: Vec<IssueCategory>,
    /// Lowest severity that puts the case on hold.
    pub hold_threshold: Severity,
    /// Token-overlap ratio at which two same-category issues are merged.
    pub merge_overlap: f32,
    /// Per-call timeout for language-model requests.
    pub llm_timeout_ms: u64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            retrieval: RetrievalConfig::default(),
            hard_fail_categories: vec![IssueCategory::MortgageMismatch],
            hold_threshold: Severity::Medium,
            merge_overlap: 0.7,
            llm_timeout_ms: 180_000,
        }
    }
}

impl ReviewConfig {
    pub fn validate(&self) -> Result<(), ReviewError> {
        self.retrieval.validate()?;
        if !(0.0..=1.0).contains(&self.merge_overlap) {
            return Err(ReviewError::Config(format!(
                "merge_overlap must be within 0..=1, got {}",
                self.merge_overlap
            )));
        }
        if self.llm_timeout_ms == 0 {
            return Err(ReviewError::Config("llm_timeout_ms must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ReviewConfig::default();
        assert_eq!(config.retrieval.k, 8);
        assert_eq!(config.retrieval.n, 5);
        assert_eq!(config.hard_fail_categories, vec![IssueCategory::MortgageMismatch]);
        assert_eq!(config.hold_threshold, Severity::Medium);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ReviewConfig =
            serde_json::from_str(r#"{"hold_threshold": "HIGH", "retrieval": {"n": 3}}"#).unwrap();
        assert_eq!(config.hold_threshold, Severity::High);
        assert_eq!(config.retrieval.n, 3);
        assert_eq!(config.retrieval.k, 8);
    }

    #[test]
    fn invalid_values_rejected() {
        let mut config = ReviewConfig::default();
        config.retrieval.k = 0;
        assert!(matches!(config.validate(), Err(ReviewError::Config(_))));

        let config = ReviewConfig {
            merge_overlap: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ReviewError::Config(_))));
    }
}
