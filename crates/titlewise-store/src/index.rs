//! Vector index seam and the in-memory backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use titlewise_core::{Chunk, ChunkMetadata};

use crate::StoreError;

/// A chunk with its embedding, as written to an index.
#[derive(Debug, Clone)]
pub struct IndexRow {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A chunk returned by a similarity query. `score` is cosine similarity.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub chunk: Chunk,
    pub score: f32,
}

/// Metadata restriction applied before ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    pub state: Option<String>,
}

impl MetadataFilter {
    pub fn state(state: impl Into<String>) -> Self {
        Self {
            state: Some(state.into()),
        }
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        match &self.state {
            None => true,
            Some(wanted) => metadata.state.as_deref() == Some(wanted.as_str()),
        }
    }
}

/// Storage for precedent chunk embeddings.
///
/// `replace_case` must be atomic: readers see either all of a case's old rows
/// or all of its new ones.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn replace_case(&self, case_id: &str, rows: Vec<IndexRow>) -> Result<(), StoreError>;

    /// Top `k` chunks by similarity, highest first; ties broken by chunk id.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<IndexMatch>, StoreError>;

    /// All stored chunks of one case, in chunk-type order.
    async fn case_rows(&self, case_id: &str) -> Result<Vec<Chunk>, StoreError>;

    /// Number of stored chunks.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Number of distinct cases.
    async fn case_count(&self) -> Result<usize, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Process-local index. Rows are grouped by case so replacement is a single
/// map insert under the write lock.
#[derive(Default)]
pub struct MemoryIndex {
    cases: RwLock<BTreeMap<String, Vec<IndexRow>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn replace_case(&self, case_id: &str, mut rows: Vec<IndexRow>) -> Result<(), StoreError> {
        if let Some(row) = rows.iter().find(|r| r.chunk.case_id != case_id) {
            return Err(StoreError::Config(format!(
                "row {} does not belong to case {case_id}",
                row.chunk.chunk_id
            )));
        }
        rows.sort_by_key(|r| r.chunk.chunk_type);
        let mut cases = self.cases.write().await;
        if rows.is_empty() {
            cases.remove(case_id);
        } else {
            cases.insert(case_id.to_string(), rows);
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<IndexMatch>, StoreError> {
        let cases = self.cases.read().await;
        let mut matches = Vec::new();
        for row in cases.values().flatten() {
            if !filter.matches(&row.chunk.metadata) {
                continue;
            }
            if row.vector.len() != vector.len() {
                return Err(StoreError::Dimension {
                    expected: row.vector.len(),
                    actual: vector.len(),
                });
            }
            matches.push(IndexMatch {
                chunk: row.chunk.clone(),
                score: cosine_similarity(vector, &row.vector),
            });
        }
        matches.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
        matches.truncate(k);
        Ok(matches)
    }

    async fn case_rows(&self, case_id: &str) -> Result<Vec<Chunk>, StoreError> {
        let cases = self.cases.read().await;
        Ok(cases
            .get(case_id)
            .map(|rows| rows.iter().map(|r| r.chunk.clone()).collect())
            .unwrap_or_default())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.cases.read().await.values().map(Vec::len).sum())
    }

    async fn case_count(&self) -> Result<usize, StoreError> {
        Ok(self.cases.read().await.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.cases.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use titlewise_core::ChunkType;

    fn row(case_id: &str, chunk_type: ChunkType, state: &str, vector: Vec<f32>) -> IndexRow {
        IndexRow {
            chunk: Chunk {
                chunk_id: titlewise_core::chunk::chunk_id(case_id, chunk_type),
                case_id: case_id.into(),
                chunk_type,
                text: format!("{case_id} {chunk_type}"),
                metadata: ChunkMetadata {
                    state: Some(state.into()),
                    ..Default::default()
                },
                items: vec![],
            },
            vector,
        }
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn query_ranks_and_filters() {
        let index = MemoryIndex::new();
        index
            .replace_case("A", vec![row("A", ChunkType::Fingerprint, "Telangana", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .replace_case(
                "B",
                vec![
                    row("B", ChunkType::Fingerprint, "Andhra Pradesh", vec![0.6, 0.8]),
                    row("B", ChunkType::KeyFields, "Andhra Pradesh", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let all = index.query(&[1.0, 0.0], 10, &MetadataFilter::default()).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|m| m.chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["A:fingerprint", "B:fingerprint", "B:key_fields"]);

        let ap = index
            .query(&[1.0, 0.0], 10, &MetadataFilter::state("Andhra Pradesh"))
            .await
            .unwrap();
        assert!(ap.iter().all(|m| m.chunk.case_id == "B"));
        assert_eq!(ap.len(), 2);

        let top1 = index.query(&[1.0, 0.0], 1, &MetadataFilter::default()).await.unwrap();
        assert_eq!(top1.len(), 1);
    }

    #[tokio::test]
    async fn ties_break_by_chunk_id() {
        let index = MemoryIndex::new();
        index
            .replace_case("Z", vec![row("Z", ChunkType::Fingerprint, "Kerala", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .replace_case("M", vec![row("M", ChunkType::Fingerprint, "Kerala", vec![2.0, 0.0])])
            .await
            .unwrap();
        let matches = index.query(&[1.0, 0.0], 2, &MetadataFilter::default()).await.unwrap();
        assert_eq!(matches[0].chunk.case_id, "M");
        assert_eq!(matches[1].chunk.case_id, "Z");
    }

    #[tokio::test]
    async fn replace_is_idempotent() {
        let index = MemoryIndex::new();
        let rows = vec![
            row("A", ChunkType::KeyFields, "Kerala", vec![0.0, 1.0]),
            row("A", ChunkType::Fingerprint, "Kerala", vec![1.0, 0.0]),
        ];
        index.replace_case("A", rows.clone()).await.unwrap();
        index.replace_case("A", rows).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 2);
        assert_eq!(index.case_count().await.unwrap(), 1);
        let stored = index.case_rows("A").await.unwrap();
        assert_eq!(stored[0].chunk_type, ChunkType::Fingerprint);

        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn foreign_rows_and_bad_dimensions_rejected() {
        let index = MemoryIndex::new();
        let err = index
            .replace_case("A", vec![row("B", ChunkType::Fingerprint, "Kerala", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));

        index
            .replace_case("A", vec![row("A", ChunkType::Fingerprint, "Kerala", vec![1.0, 0.0])])
            .await
            .unwrap();
        let err = index
            .query(&[1.0, 0.0, 0.0], 1, &MetadataFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Dimension { expected: 2, actual: 3 }));
    }
}
