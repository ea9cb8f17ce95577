//! Review Pipeline: EXTRACTING → RETRIEVING → GENERATING → CRITIQUING → DONE.
//!
//! One call to [`ReviewPipeline::review`] runs one case to completion or to
//! `FAILED`. The pipeline keeps no state between calls, so a single instance
//! may serve concurrent reviews.

use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use titlewise_ai::{LanguageModel, LlmError, ResponseSchema, prompts};
use titlewise_core::{
    CaseExtract, EvidenceCorpus, Issue, MergedCase, ReviewObject, ReviewState, Severity,
    StageRecord, normalize,
};
use titlewise_store::{PrecedentStore, PrecedentSummary, format_precedents_for_prompt};

use crate::draft::{DraftReview, parse_response};
use crate::enforce;
use crate::{ReviewConfig, ReviewError, ReviewFailure};

/// Model calls per stage: the first attempt plus one corrective retry.
const STAGE_ATTEMPTS: u32 = 2;

pub struct ReviewPipeline {
    store: Arc<PrecedentStore>,
    llm: Arc<dyn LanguageModel>,
    config: ReviewConfig,
}

/// Mutable per-review progress, turned into the output or the failure.
struct Run {
    state: ReviewState,
    trail: Vec<StageRecord>,
    extract: Option<CaseExtract>,
}

impl Run {
    fn enter(&mut self, state: ReviewState) {
        self.state = state;
    }

    fn record(&mut self, detail: impl Into<String>) {
        self.trail.push(StageRecord::now(self.state, detail));
    }

    fn fail(mut self, error: ReviewError) -> ReviewFailure {
        warn!(state = %self.state, error = %error, "review failed");
        let failed_in = self.state;
        self.trail
            .push(StageRecord::now(ReviewState::Failed, format!("{failed_in}: {error}")));
        ReviewFailure {
            state: failed_in,
            error,
            extract: self.extract,
            trail: self.trail,
        }
    }
}

impl ReviewPipeline {
    pub fn new(
        store: Arc<PrecedentStore>,
        llm: Arc<dyn LanguageModel>,
        config: ReviewConfig,
    ) -> Result<Self, ReviewError> {
        config.validate()?;
        Ok(Self { store, llm, config })
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    /// Review one merged case.
    pub async fn review(
        &self,
        case_id: &str,
        case: &MergedCase,
        cancel: &CancellationToken,
    ) -> Result<ReviewObject, ReviewFailure> {
        let mut run = Run {
            state: ReviewState::Extracting,
            trail: Vec::new(),
            extract: None,
        };
        match self.run_stages(case_id, case, cancel, &mut run).await {
            Ok(review) => Ok(review),
            Err(error) => Err(run.fail(error)),
        }
    }

    async fn run_stages(
        &self,
        case_id: &str,
        case: &MergedCase,
        cancel: &CancellationToken,
        run: &mut Run,
    ) -> Result<ReviewObject, ReviewError> {
        // EXTRACTING
        run.enter(ReviewState::Extracting);
        check_cancelled(cancel)?;
        let extract = normalize(case)?;
        let corpus = EvidenceCorpus::from_case(case);
        let sources = render_sources(case);
        run.record(format!(
            "state={}, {} key fields, {} EC transactions",
            extract.detected_state.as_deref().unwrap_or("unknown"),
            extract.key_fields.len(),
            extract.ec_summary.len()
        ));
        info!(case_id, state = ?extract.detected_state, "extracted case");
        let extract_text = extract.render_for_prompt();
        run.extract = Some(extract.clone());

        // RETRIEVING
        run.enter(ReviewState::Retrieving);
        check_cancelled(cancel)?;
        let filter_state = extract.fingerprint.state.as_deref();
        let precedents = cancellable(
            cancel,
            self.store
                .retrieve(&extract, &self.config.retrieval, filter_state),
        )
        .await??;
        run.record(if precedents.is_empty() {
            "no precedents found (cold start)".to_string()
        } else {
            format!(
                "{} precedents: {}",
                precedents.len(),
                precedent_ids(&precedents).join(", ")
            )
        });
        info!(case_id, precedents = precedents.len(), "retrieved precedents");
        let precedent_text = format_precedents_for_prompt(&precedents);

        // GENERATING
        run.enter(ReviewState::Generating);
        check_cancelled(cancel)?;
        let prompt = prompts::generator_prompt(&extract_text, &precedent_text, &sources);
        let (candidates, attempts) = self
            .call_with_retry(ResponseSchema::CandidateReview, &prompt, cancel)
            .await
            .map_err(|failure| match failure {
                StageFailure::Cancelled => ReviewError::Cancelled,
                StageFailure::Exhausted(message) => ReviewError::Generation {
                    attempts: STAGE_ATTEMPTS,
                    message,
                },
            })?;
        run.record(format!(
            "{} candidate issues (attempt {attempts})",
            candidates.issues.len()
        ));
        info!(case_id, candidates = candidates.issues.len(), "generated candidate issues");

        // CRITIQUING
        run.enter(ReviewState::Critiquing);
        check_cancelled(cancel)?;
        let prompt = prompts::critic_prompt(
            &extract_text,
            &precedent_text,
            &sources,
            &candidates.to_prompt_json(),
        );
        let (critique, attempts) = self
            .call_with_retry(ResponseSchema::FinalReview, &prompt, cancel)
            .await
            .map_err(|failure| match failure {
                StageFailure::Cancelled => ReviewError::Cancelled,
                StageFailure::Exhausted(message) => ReviewError::Critique {
                    attempts: STAGE_ATTEMPTS,
                    message,
                },
            })?;

        let proposed = critique.issues.len();
        let (issues, dropped) = enforce::verify_evidence(critique.issues, &corpus);
        let mut issues = enforce::merge_overlapping(issues, self.config.merge_overlap);
        let merged = proposed - dropped - issues.len();
        enforce::apply_severity_floors(&mut issues);
        let resolved = enforce::apply_precedent_exceptions(
            &mut issues,
            &precedents,
            extract.detected_state.as_deref(),
        );
        let recommendation = enforce::recommend(
            &issues,
            &self.config.hard_fail_categories,
            self.config.hold_threshold,
        );
        run.record(format!(
            "{proposed} proposed (attempt {attempts}), {dropped} dropped for evidence, \
             {merged} merged, {resolved} resolved by precedent"
        ));

        // DONE
        check_cancelled(cancel)?;
        run.enter(ReviewState::Done);
        let issues = enforce::finalize(issues);
        let summary = if critique.summary.is_empty() {
            default_summary(&issues)
        } else {
            critique.summary
        };
        run.record(format!("{} issues, {recommendation}", issues.len()));
        info!(case_id, issues = issues.len(), %recommendation, "review complete");

        Ok(ReviewObject {
            case_id: case_id.to_string(),
            timestamp: Utc::now(),
            issues,
            summary,
            recommendation,
            precedents: precedent_ids(&precedents),
            trail: std::mem::take(&mut run.trail),
        })
    }

    /// One model call plus one corrective retry. Call failures, timeouts and
    /// unparseable responses all consume an attempt.
    async fn call_with_retry(
        &self,
        schema: ResponseSchema,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<(DraftReview, u32), StageFailure> {
        let mut prompt = prompt.to_string();
        let mut last_error = String::new();
        for attempt in 1..=STAGE_ATTEMPTS {
            if cancel.is_cancelled() {
                return Err(StageFailure::Cancelled);
            }
            let outcome = cancellable(cancel, self.call_once(schema, &prompt))
                .await
                .map_err(|_| StageFailure::Cancelled)?;
            match outcome {
                Ok(review) => return Ok((review, attempt)),
                Err(error) => {
                    warn!(
                        schema = schema.name(),
                        model = self.llm.model_name(),
                        attempt,
                        error = %error,
                        "model response rejected"
                    );
                    prompt.push_str(&prompts::corrective_suffix(&error));
                    last_error = error;
                }
            }
        }
        Err(StageFailure::Exhausted(last_error))
    }

    async fn call_once(&self, schema: ResponseSchema, prompt: &str) -> Result<DraftReview, String> {
        let timeout = Duration::from_millis(self.config.llm_timeout_ms);
        let text = match tokio::time::timeout(timeout, self.llm.generate(prompt, schema)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(describe_llm_error(&e)),
            Err(_) => return Err(LlmError::Timeout(self.config.llm_timeout_ms).to_string()),
        };
        parse_response(&text).map_err(|e| e.to_string())
    }
}

enum StageFailure {
    Cancelled,
    Exhausted(String),
}

fn describe_llm_error(error: &LlmError) -> String {
    if error.is_transient() {
        error.to_string()
    } else {
        format!("{error} (not transient)")
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), ReviewError> {
    if cancel.is_cancelled() {
        Err(ReviewError::Cancelled)
    } else {
        Ok(())
    }
}

/// Run `fut` unless `cancel` fires first.
async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, ReviewError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReviewError::Cancelled),
        output = fut => Ok(output),
    }
}

fn precedent_ids(precedents: &[PrecedentSummary]) -> Vec<String> {
    precedents.iter().map(|p| p.case_id.clone()).collect()
}

/// Raw texts the models must quote evidence from.
fn render_sources(case: &MergedCase) -> String {
    let mut out = String::new();
    out.push_str("### Deed text (OCR)\n");
    if case.has_attachments() {
        for (i, text) in case.attachments.iter().enumerate() {
            let _ = writeln!(out, "[Attachment {}]\n{}", i + 1, text.trim());
        }
    } else {
        out.push_str("(none)\n");
    }

    out.push_str("\n### Encumbrance certificate entries\n");
    let entries = case.encumbrance_details.entries();
    if entries.is_empty() {
        out.push_str("(none)\n");
    }
    for (i, entry) in entries.iter().enumerate() {
        let _ = writeln!(out, "[Entry {}] {}", i + 1, entry.texts().collect::<Vec<_>>().join(" | "));
    }

    out.push_str("\n### Report\n");
    match &case.report_json {
        Some(report) if !report.is_empty() => {
            for section in &report.sections {
                if let Some(title) = &section.title {
                    let _ = writeln!(out, "## {title}");
                }
                let _ = writeln!(out, "{}", section.content.trim());
            }
            // texts() lists section content first; the rest are field values.
            let section_count = report.sections.iter().filter(|s| !s.content.is_empty()).count();
            for text in report.texts().into_iter().skip(section_count) {
                let _ = writeln!(out, "- {text}");
            }
        }
        _ => out.push_str("(none)\n"),
    }
    out
}

fn default_summary(issues: &[Issue]) -> String {
    if issues.is_empty() {
        return "No issues found.".to_string();
    }
    let count = |s| issues.iter().filter(|i| i.severity == s).count();
    format!(
        "{} issues ({} HIGH, {} MEDIUM, {} LOW).",
        issues.len(),
        count(Severity::High),
        count(Severity::Medium),
        count(Severity::Low)
    )
}
