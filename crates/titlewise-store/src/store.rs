//! Precedent Store: chunked ingestion and grouped similarity retrieval.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use titlewise_core::chunk::EMPTY_MARKER;
use titlewise_core::extract::location_line;
use titlewise_core::fields::canonical_state;
use titlewise_core::{
    CaseExtract, Chunk, ChunkType, Embed, PrecedentException, PrecedentMeta, PrecedentRecord, chunk,
};

use crate::StoreError;
use crate::index::{IndexRow, MetadataFilter, VectorIndex};
use crate::retry::RetryPolicy;

/// Retrieval parameters: `k` chunks are fetched, grouped by case, and the top
/// `n` cases returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: usize,
    pub n: usize,
    /// Append the extract's key fields to the fingerprint query.
    pub include_key_fields: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 8,
            n: 5,
            include_key_fields: false,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.k < 1 {
            return Err(StoreError::Config(format!("k must be >= 1, got {}", self.k)));
        }
        if self.n < 1 {
            return Err(StoreError::Config(format!("n must be >= 1, got {}", self.n)));
        }
        Ok(())
    }
}

/// A retrieved precedent, rebuilt from its stored chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecedentSummary {
    pub case_id: String,
    pub meta: PrecedentMeta,
    pub key_fields: Vec<String>,
    pub ec_transactions: Vec<String>,
    pub review_notes: Vec<String>,
    pub exceptions: Vec<PrecedentException>,
    pub flow_of_title: Vec<String>,
    /// Chunk types of this case that were among the top-k hits.
    pub matched_chunks: Vec<ChunkType>,
    pub best_score: f32,
}

impl PrecedentSummary {
    fn from_rows(
        case_id: &str,
        rows: Vec<Chunk>,
        matched_chunks: Vec<ChunkType>,
        best_score: f32,
    ) -> Self {
        let meta = rows
            .first()
            .map(|c| PrecedentMeta {
                state: c.metadata.state.clone(),
                district: c.metadata.district.clone(),
                sro: c.metadata.sro.clone(),
                survey_numbers: c.metadata.survey_numbers.clone(),
                deed_types: c.metadata.deed_types.clone(),
            })
            .unwrap_or_default();
        let mut by_type: BTreeMap<ChunkType, Vec<String>> =
            rows.into_iter().map(|c| (c.chunk_type, c.items)).collect();
        let mut take = |t: ChunkType| by_type.remove(&t).unwrap_or_default();

        let exceptions = take(ChunkType::Exceptions)
            .iter()
            .filter_map(|item| match serde_json::from_str(item) {
                Ok(exception) => Some(exception),
                Err(e) => {
                    warn!(case_id, error = %e, "skipping unreadable stored exception");
                    None
                }
            })
            .collect();

        Self {
            case_id: case_id.to_string(),
            meta,
            key_fields: take(ChunkType::KeyFields),
            ec_transactions: take(ChunkType::EcSummary),
            review_notes: take(ChunkType::ReviewNotes),
            exceptions,
            flow_of_title: take(ChunkType::FlowOfTitle),
            matched_chunks,
            best_score,
        }
    }

    pub fn location_line(&self) -> String {
        location_line(
            self.meta.state.as_deref(),
            self.meta.district.as_deref(),
            self.meta.sro.as_deref(),
            &self.meta.survey_numbers,
        )
    }
}

/// Outcome of [`PrecedentStore::ingest_directory`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub files_processed: usize,
    pub total_chunks: usize,
    /// `(file, error)` for every file that could not be ingested.
    pub errors: Vec<(PathBuf, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub chunks: usize,
    pub cases: usize,
}

/// Precedent ingestion and retrieval over a [`VectorIndex`].
///
/// Ingestions of the same case are serialized; everything else runs
/// concurrently.
pub struct PrecedentStore {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embed>,
    retry: RetryPolicy,
    case_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PrecedentStore {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embed>) -> Self {
        Self {
            index,
            embedder,
            retry: RetryPolicy::default(),
            case_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn case_lock(&self, case_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.case_locks.lock().await;
        locks.entry(case_id.to_string()).or_default().clone()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let vector = self
            .retry
            .run("embed", || async {
                self.embedder.embed(text).await.map_err(StoreError::Embedding)
            })
            .await?;
        let expected = self.embedder.dim();
        if vector.len() != expected {
            return Err(StoreError::Dimension {
                expected,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    /// Drop the lock entry for `case_id` once no ingestion holds or awaits it.
    async fn release_case_lock(&self, case_id: &str) {
        let mut locks = self.case_locks.lock().await;
        if locks.get(case_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(case_id);
        }
    }

    /// Chunk, embed and store one precedent, replacing any earlier version.
    /// Returns the number of chunks written.
    pub async fn ingest(&self, precedent: &PrecedentRecord) -> Result<usize, StoreError> {
        let chunks = chunk(precedent)?;
        let case_id = chunks[0].case_id.clone();

        let lock = self.case_lock(&case_id).await;
        let written = {
            let _guard = lock.lock().await;
            self.write_case(&case_id, chunks).await
        };
        drop(lock);
        self.release_case_lock(&case_id).await;

        let n = written?;
        info!(case_id = %case_id, chunks = n, "ingested precedent");
        Ok(n)
    }

    async fn write_case(&self, case_id: &str, chunks: [Chunk; 6]) -> Result<usize, StoreError> {
        let vectors = try_join_all(chunks.iter().map(|c| self.embed(&c.text))).await?;
        let rows: Vec<IndexRow> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexRow { chunk, vector })
            .collect();
        let n = rows.len();
        self.retry
            .run("replace_case", || self.index.replace_case(case_id, rows.clone()))
            .await?;
        Ok(n)
    }

    /// Ingest every `*.json` file in `dir`, in file-name order. Files that
    /// fail are recorded in the report and skipped.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestReport, StoreError> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut report = IngestReport::default();
        for path in paths {
            match self.ingest_file(&path).await {
                Ok(n) => {
                    report.files_processed += 1;
                    report.total_chunks += n;
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "failed to ingest precedent");
                    report.errors.push((path, e.to_string()));
                }
            }
        }
        info!(
            files = report.files_processed,
            chunks = report.total_chunks,
            errors = report.errors.len(),
            "directory ingestion complete"
        );
        Ok(report)
    }

    async fn ingest_file(&self, path: &Path) -> Result<usize, StoreError> {
        let json = tokio::fs::read_to_string(path).await?;
        let precedent = PrecedentRecord::from_json(&json)?;
        self.ingest(&precedent).await
    }

    /// Find the precedents most similar to `extract`.
    ///
    /// The top `k` chunks are grouped by case and ranked by matching chunk
    /// count, then best score, then case id. When `filter_state` is set only
    /// precedents of that state are considered; short codes such as `AP` are
    /// accepted.
    pub async fn retrieve(
        &self,
        extract: &CaseExtract,
        config: &RetrievalConfig,
        filter_state: Option<&str>,
    ) -> Result<Vec<PrecedentSummary>, StoreError> {
        config.validate()?;
        let query = extract.query_text(config.include_key_fields);
        let vector = self.embed(&query).await?;
        let filter = MetadataFilter {
            state: filter_state.and_then(canonical_state),
        };
        let matches = self
            .retry
            .run("query", || self.index.query(&vector, config.k, &filter))
            .await?;

        struct Group {
            count: usize,
            best: f32,
            types: Vec<ChunkType>,
        }
        let mut groups: BTreeMap<String, Group> = BTreeMap::new();
        for m in matches {
            let group = groups.entry(m.chunk.case_id).or_insert(Group {
                count: 0,
                best: f32::NEG_INFINITY,
                types: Vec::new(),
            });
            group.count += 1;
            group.best = group.best.max(m.score);
            group.types.push(m.chunk.chunk_type);
        }
        let mut ranked: Vec<(String, Group)> = groups.into_iter().collect();
        ranked.sort_by(|(a_id, a), (b_id, b)| {
            b.count
                .cmp(&a.count)
                .then_with(|| b.best.total_cmp(&a.best))
                .then_with(|| a_id.cmp(b_id))
        });
        ranked.truncate(config.n);

        let mut summaries = Vec::with_capacity(ranked.len());
        for (case_id, mut group) in ranked {
            let rows = self
                .retry
                .run("case_rows", || self.index.case_rows(&case_id))
                .await?;
            group.types.sort();
            summaries.push(PrecedentSummary::from_rows(&case_id, rows, group.types, group.best));
        }
        debug!(
            state = filter_state.unwrap_or("*"),
            found = summaries.len(),
            "retrieved precedents"
        );
        Ok(summaries)
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(StoreStats {
            chunks: self.index.count().await?,
            cases: self.index.case_count().await?,
        })
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.index.clear().await?;
        info!("cleared precedent store");
        Ok(())
    }
}

fn bullet_list(out: &mut String, heading: &str, items: &[String]) {
    let _ = writeln!(out, "{heading}:");
    if items.is_empty() {
        let _ = writeln!(out, "  {EMPTY_MARKER}");
    }
    for item in items {
        let _ = writeln!(out, "  - {item}");
    }
}

/// Render retrieved precedents as prompt context.
pub fn format_precedents_for_prompt(precedents: &[PrecedentSummary]) -> String {
    if precedents.is_empty() {
        return "No similar precedents found.".to_string();
    }
    let mut out = String::new();
    for (i, p) in precedents.iter().enumerate() {
        let _ = writeln!(out, "--- Precedent {}: {} ---", i + 1, p.case_id);
        let location = p.location_line();
        if !location.is_empty() {
            let _ = writeln!(out, "{location}");
        }
        if !p.meta.deed_types.is_empty() {
            let _ = writeln!(out, "Deed types: {}", p.meta.deed_types.join(", "));
        }
        let _ = writeln!(out, "Similarity: {:.3}", p.best_score);
        bullet_list(&mut out, "Key fields", &p.key_fields);
        bullet_list(&mut out, "EC summary", &p.ec_transactions);
        bullet_list(&mut out, "Review notes", &p.review_notes);
        let exceptions: Vec<String> = p.exceptions.iter().map(PrecedentException::render).collect();
        bullet_list(&mut out, "Exceptions (accepted variations, do not flag)", &exceptions);
        bullet_list(&mut out, "Flow of title", &p.flow_of_title);
        out.push('\n');
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;
    use titlewise_core::{Fingerprint, IssueCategory};

    use crate::index::MemoryIndex;

    /// Bag-of-words feature hashing; enough for lexical similarity in tests.
    struct WordEmbedder {
        calls: AtomicUsize,
    }

    impl WordEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embed for WordEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut v = vec![0.0; 64];
            for token in text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
            {
                let mut h = DefaultHasher::new();
                token.to_lowercase().hash(&mut h);
                v[(h.finish() % 64) as usize] += 1.0;
            }
            Ok(v)
        }

        fn dim(&self) -> usize {
            64
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embed for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("model unavailable")
        }

        fn dim(&self) -> usize {
            64
        }
    }

    const GUNTUR: &str = r#"{
        "case_id": "AP-001",
        "meta": {"state": "AP", "district": "Guntur", "sro": "Tenali", "survey_numbers": ["225/2"], "deed_types": ["sale"]},
        "key_fields": {"house_no": "5-87", "extent": "145 sq.yds"},
        "review_notes": ["Boundaries checked against link deed"],
        "exceptions": [{"category": "BOUNDARY_MISMATCH", "state": "AP", "note": "Road vs survey number on east side"}],
        "flow_of_title": ["Ravi to Lakshmi by sale 2011"]
    }"#;

    const KAPRA: &str = r#"{
        "case_id": "TS-002",
        "meta": {"state": "TS", "district": "Medchal", "sro": "Kapra", "survey_numbers": ["123/4"]},
        "review_notes": ["Mutation pending with GHMC"]
    }"#;

    fn store() -> PrecedentStore {
        PrecedentStore::new(Arc::new(MemoryIndex::new()), Arc::new(WordEmbedder::new()))
            .with_retry(RetryPolicy::immediate())
    }

    fn guntur_extract() -> CaseExtract {
        CaseExtract {
            fingerprint: Fingerprint {
                state: Some("Andhra Pradesh".into()),
                district: Some("Guntur".into()),
                sro: Some("Tenali".into()),
                survey_numbers: vec!["225/2".into()],
                party_names: vec!["k. ramesh".into()],
            },
            detected_state: Some("Andhra Pradesh".into()),
            ..Default::default()
        }
    }

    fn kapra_extract() -> CaseExtract {
        CaseExtract {
            fingerprint: Fingerprint {
                state: Some("Telangana".into()),
                district: Some("Medchal".into()),
                sro: Some("Kapra".into()),
                survey_numbers: vec!["123/4".into()],
                party_names: Vec::new(),
            },
            detected_state: Some("Telangana".into()),
            ..Default::default()
        }
    }

    async fn seeded() -> PrecedentStore {
        let store = store();
        store.ingest(&PrecedentRecord::from_json(GUNTUR).unwrap()).await.unwrap();
        store.ingest(&PrecedentRecord::from_json(KAPRA).unwrap()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn self_retrieval_ranks_precedent_first() {
        let store = seeded().await;
        let found = store
            .retrieve(&guntur_extract(), &RetrievalConfig::default(), None)
            .await
            .unwrap();
        assert_eq!(found[0].case_id, "AP-001");
        assert!(found[0].matched_chunks.contains(&ChunkType::Fingerprint));
        assert_eq!(found[0].review_notes, vec!["Boundaries checked against link deed"]);
        assert_eq!(found[0].exceptions[0].category, IssueCategory::BoundaryMismatch);
        assert_eq!(found[0].meta.deed_types, vec!["Sale Deed"]);
        assert!(found[0].key_fields.contains(&"house_no: 5-87".to_string()));
    }

    #[tokio::test]
    async fn state_filter_is_exclusive() {
        let store = seeded().await;
        let found = store
            .retrieve(&guntur_extract(), &RetrievalConfig::default(), Some("Telangana"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].case_id, "TS-002");

        // Registry codes match the canonical state stored at ingest.
        let by_code = store
            .retrieve(&guntur_extract(), &RetrievalConfig::default(), Some("AP"))
            .await
            .unwrap();
        assert_eq!(by_code.len(), 1);
        assert_eq!(by_code[0].case_id, "AP-001");

        let none = store
            .retrieve(&guntur_extract(), &RetrievalConfig::default(), Some("Kerala"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn n_limits_cases_returned() {
        let store = seeded().await;
        let config = RetrievalConfig {
            k: 12,
            n: 1,
            ..Default::default()
        };
        let found = store.retrieve(&guntur_extract(), &config, None).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn reingest_is_idempotent() {
        let store = seeded().await;
        let ranking = |found: Vec<PrecedentSummary>| -> Vec<(String, f32)> {
            found.into_iter().map(|p| (p.case_id, p.best_score)).collect()
        };
        let before_stats = store.stats().await.unwrap();
        let before = ranking(
            store
                .retrieve(&kapra_extract(), &RetrievalConfig::default(), None)
                .await
                .unwrap(),
        );
        assert_eq!(before.len(), 2);
        assert_eq!(before[0].0, "TS-002");

        for _ in 0..2 {
            store.ingest(&PrecedentRecord::from_json(GUNTUR).unwrap()).await.unwrap();
        }
        let after = ranking(
            store
                .retrieve(&kapra_extract(), &RetrievalConfig::default(), None)
                .await
                .unwrap(),
        );
        assert_eq!(before, after);
        assert_eq!(store.stats().await.unwrap(), before_stats);
        assert_eq!(before_stats, StoreStats { chunks: 12, cases: 2 });

        store.clear().await.unwrap();
        assert_eq!(store.stats().await.unwrap(), StoreStats { chunks: 0, cases: 0 });
    }

    #[tokio::test]
    async fn concurrent_ingest_of_same_case_leaves_one_copy() {
        let store = store();
        let precedent = PrecedentRecord::from_json(GUNTUR).unwrap();
        let results = futures::future::join_all((0..4).map(|_| store.ingest(&precedent))).await;
        assert!(results.iter().all(|r| matches!(r, Ok(6))));
        assert_eq!(store.stats().await.unwrap(), StoreStats { chunks: 6, cases: 1 });
        // No lock entries outlive the ingestions.
        assert!(store.case_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn zero_k_or_n_is_config_error() {
        let store = seeded().await;
        for config in [
            RetrievalConfig { k: 0, ..Default::default() },
            RetrievalConfig { n: 0, ..Default::default() },
        ] {
            let err = store.retrieve(&guntur_extract(), &config, None).await.unwrap_err();
            assert!(matches!(err, StoreError::Config(_)), "{err}");
        }
    }

    #[tokio::test]
    async fn embedding_failures_surface_as_retrieval_error() {
        let store = PrecedentStore::new(Arc::new(MemoryIndex::new()), Arc::new(BrokenEmbedder))
            .with_retry(RetryPolicy {
                max_attempts: 2,
                initial_backoff_ms: 1,
                ..RetryPolicy::default()
            });
        let err = store
            .retrieve(&guntur_extract(), &RetrievalConfig::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Retrieval { operation: "embed", attempts: 2, .. }));
    }

    #[tokio::test]
    async fn directory_ingestion_reports_bad_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.json"), GUNTUR).unwrap();
        std::fs::write(tmp.path().join("b.json"), KAPRA).unwrap();
        std::fs::write(tmp.path().join("c.json"), r#"{"meta": {}}"#).unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let store = store();
        let report = store.ingest_directory(tmp.path()).await.unwrap();
        assert_eq!(report.files_processed, 2);
        assert_eq!(report.total_chunks, 12);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].0.ends_with("c.json"));
    }

    #[tokio::test]
    async fn prompt_formatting() {
        assert_eq!(format_precedents_for_prompt(&[]), "No similar precedents found.");

        let store = seeded().await;
        let found = store
            .retrieve(&guntur_extract(), &RetrievalConfig::default(), Some("Andhra Pradesh"))
            .await
            .unwrap();
        let text = format_precedents_for_prompt(&found);
        assert!(text.starts_with("--- Precedent 1: AP-001 ---\nState: Andhra Pradesh | District: Guntur"));
        assert!(text.contains("Deed types: Sale Deed"));
        assert!(text.contains("  - BOUNDARY_MISMATCH [Andhra Pradesh]: Road vs survey number on east side"));
        assert!(text.contains("EC summary:\n  (none recorded)"));
    }
}
