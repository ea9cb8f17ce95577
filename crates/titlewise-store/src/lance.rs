//! LanceDB backend for precedent chunks.
//!
//! One table, `precedent_chunks`, keyed by chunk id. Replacing a case is a
//! single merge-insert commit: matching ids are updated, new ids inserted, and
//! any other rows of the same case deleted.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Float32Type, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::DistanceType;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use tracing::info;

use titlewise_core::{Chunk, ChunkMetadata, ChunkType};

use crate::StoreError;
use crate::index::{IndexMatch, IndexRow, MetadataFilter, VectorIndex};

const CHUNKS_TABLE: &str = "precedent_chunks";

/// LanceDB-backed [`VectorIndex`].
pub struct LanceIndex {
    db: lancedb::Connection,
    dim: usize,
}

impl LanceIndex {
    /// Connect to a LanceDB database at `path`, creating the chunk table if
    /// it does not exist.
    pub async fn open(path: &Path, dim: usize) -> Result<Self, StoreError> {
        let uri = path
            .to_str()
            .ok_or_else(|| StoreError::Config("non-UTF8 database path".into()))?;
        let db = lancedb::connect(uri).execute().await?;
        let index = Self { db, dim };
        index.ensure_table().await?;
        Ok(index)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn schema(&self) -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("case_id", DataType::Utf8, false),
            Field::new("chunk_type", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("state", DataType::Utf8, true),
            Field::new("district", DataType::Utf8, true),
            Field::new("sro", DataType::Utf8, true),
            // JSON-encoded string lists.
            Field::new("survey_numbers", DataType::Utf8, false),
            Field::new("deed_types", DataType::Utf8, false),
            Field::new("items", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dim as i32,
                ),
                false,
            ),
        ]))
    }

    async fn ensure_table(&self) -> Result<(), StoreError> {
        let existing = self.db.table_names().execute().await?;
        if !existing.iter().any(|name| name == CHUNKS_TABLE) {
            self.db
                .create_empty_table(CHUNKS_TABLE, self.schema())
                .execute()
                .await?;
            info!(table = CHUNKS_TABLE, dim = self.dim, "created LanceDB table");
            return Ok(());
        }
        let schema = self.table().await?.schema().await?;
        let stored = schema
            .field_with_name("vector")
            .ok()
            .and_then(|f| match f.data_type() {
                DataType::FixedSizeList(_, size) => Some(*size as usize),
                _ => None,
            });
        match stored {
            Some(actual) if actual != self.dim => Err(StoreError::Dimension {
                expected: self.dim,
                actual,
            }),
            _ => Ok(()),
        }
    }

    async fn table(&self) -> Result<lancedb::Table, StoreError> {
        let table = self.db.open_table(CHUNKS_TABLE).execute().await?;
        Ok(table)
    }

    fn to_batch(&self, rows: &[IndexRow]) -> Result<RecordBatch, StoreError> {
        for row in rows {
            if row.vector.len() != self.dim {
                return Err(StoreError::Dimension {
                    expected: self.dim,
                    actual: row.vector.len(),
                });
            }
        }
        let strings = |f: &dyn Fn(&Chunk) -> String| -> StringArray {
            rows.iter().map(|r| Some(f(&r.chunk))).collect()
        };
        let optional = |f: &dyn Fn(&ChunkMetadata) -> Option<String>| -> StringArray {
            rows.iter().map(|r| f(&r.chunk.metadata)).collect()
        };
        let json = |v: &Vec<String>| serde_json::to_string(v).unwrap_or_else(|_| "[]".into());

        let vectors = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            rows.iter()
                .map(|r| Some(r.vector.iter().copied().map(Some).collect::<Vec<_>>())),
            self.dim as i32,
        );

        let batch = RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(strings(&|c| c.chunk_id.clone())),
                Arc::new(strings(&|c| c.case_id.clone())),
                Arc::new(strings(&|c| c.chunk_type.to_string())),
                Arc::new(strings(&|c| c.text.clone())),
                Arc::new(optional(&|m| m.state.clone())),
                Arc::new(optional(&|m| m.district.clone())),
                Arc::new(optional(&|m| m.sro.clone())),
                Arc::new(strings(&|c| json(&c.metadata.survey_numbers))),
                Arc::new(strings(&|c| json(&c.metadata.deed_types))),
                Arc::new(strings(&|c| json(&c.items))),
                Arc::new(vectors),
            ],
        )?;
        Ok(batch)
    }
}

/// Quote a string literal for a Lance SQL filter.
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn filter_sql(filter: &MetadataFilter) -> Option<String> {
    filter
        .state
        .as_deref()
        .map(|state| format!("state = {}", sql_literal(state)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::Other(format!("missing or non-string column {name}")))
}

fn optional_value(column: &StringArray, i: usize) -> Option<String> {
    (!column.is_null(i)).then(|| column.value(i).to_string())
}

fn json_list(column: &StringArray, i: usize) -> Vec<String> {
    serde_json::from_str(column.value(i)).unwrap_or_default()
}

/// Decode chunk rows from a result batch. Extra columns are ignored.
fn chunks_from_batch(batch: &RecordBatch) -> Result<Vec<Chunk>, StoreError> {
    let id = string_column(batch, "id")?;
    let case_id = string_column(batch, "case_id")?;
    let chunk_type = string_column(batch, "chunk_type")?;
    let text = string_column(batch, "text")?;
    let state = string_column(batch, "state")?;
    let district = string_column(batch, "district")?;
    let sro = string_column(batch, "sro")?;
    let survey_numbers = string_column(batch, "survey_numbers")?;
    let deed_types = string_column(batch, "deed_types")?;
    let items = string_column(batch, "items")?;

    (0..batch.num_rows())
        .map(|i| {
            let chunk_type: ChunkType = chunk_type.value(i).parse().map_err(StoreError::Other)?;
            Ok(Chunk {
                chunk_id: id.value(i).to_string(),
                case_id: case_id.value(i).to_string(),
                chunk_type,
                text: text.value(i).to_string(),
                metadata: ChunkMetadata {
                    state: optional_value(state, i),
                    district: optional_value(district, i),
                    sro: optional_value(sro, i),
                    survey_numbers: json_list(survey_numbers, i),
                    deed_types: json_list(deed_types, i),
                },
                items: json_list(items, i),
            })
        })
        .collect()
}

#[async_trait]
impl VectorIndex for LanceIndex {
    async fn replace_case(&self, case_id: &str, rows: Vec<IndexRow>) -> Result<(), StoreError> {
        if let Some(row) = rows.iter().find(|r| r.chunk.case_id != case_id) {
            return Err(StoreError::Config(format!(
                "row {} does not belong to case {case_id}",
                row.chunk.chunk_id
            )));
        }
        let table = self.table().await?;
        let case_filter = format!("case_id = {}", sql_literal(case_id));
        if rows.is_empty() {
            table.delete(&case_filter).await?;
            return Ok(());
        }

        let n = rows.len();
        let batch = self.to_batch(&rows)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all()
            .when_not_matched_by_source_delete(Some(case_filter));
        merge.execute(Box::new(reader)).await?;

        info!(case_id, rows = n, "replaced case rows");
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<IndexMatch>, StoreError> {
        if vector.len() != self.dim {
            return Err(StoreError::Dimension {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        let table = self.table().await?;
        let mut query = table
            .vector_search(vector)?
            .distance_type(DistanceType::Cosine)
            .limit(k);
        if let Some(sql) = filter_sql(filter) {
            query = query.only_if(sql);
        }
        let batches: Vec<RecordBatch> = query.execute().await?.try_collect().await?;

        let mut matches = Vec::new();
        for batch in &batches {
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| StoreError::Other("missing _distance column".into()))?;
            for (i, chunk) in chunks_from_batch(batch)?.into_iter().enumerate() {
                matches.push(IndexMatch {
                    chunk,
                    score: 1.0 - distances.value(i),
                });
            }
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
        let table = self.table().await?;
        let batches: Vec<RecordBatch> = table
            .query()
            .only_if(format!("case_id = {}", sql_literal(case_id)))
            .execute()
            .await?
            .try_collect()
            .await?;
        let mut chunks = Vec::new();
        for batch in &batches {
            chunks.extend(chunks_from_batch(batch)?);
        }
        chunks.sort_by_key(|c| c.chunk_type);
        Ok(chunks)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let table = self.table().await?;
        let count = table.count_rows(None).await?;
        Ok(count)
    }

    async fn case_count(&self) -> Result<usize, StoreError> {
        let table = self.table().await?;
        let batches: Vec<RecordBatch> = table
            .query()
            .select(Select::columns(&["case_id"]))
            .execute()
            .await?
            .try_collect()
            .await?;
        let mut ids = BTreeSet::new();
        for batch in &batches {
            let column = string_column(batch, "case_id")?;
            ids.extend((0..column.len()).map(|i| column.value(i).to_string()));
        }
        Ok(ids.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let existing = self.db.table_names().execute().await?;
        if existing.iter().any(|name| name == CHUNKS_TABLE) {
            self.db.drop_table(CHUNKS_TABLE, &[]).await?;
        }
        self.ensure_table().await?;
        info!(table = CHUNKS_TABLE, "cleared LanceDB table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(case_id: &str, chunk_type: ChunkType, state: &str, vector: Vec<f32>) -> IndexRow {
        IndexRow {
            chunk: Chunk {
                chunk_id: titlewise_core::chunk::chunk_id(case_id, chunk_type),
                case_id: case_id.into(),
                chunk_type,
                text: format!("{case_id} {chunk_type}"),
                metadata: ChunkMetadata {
                    state: Some(state.into()),
                    survey_numbers: vec!["123/4".into()],
                    ..Default::default()
                },
                items: vec!["note it's fine".into()],
            },
            vector,
        }
    }

    #[tokio::test]
    async fn open_creates_table() {
        let tmp = TempDir::new().unwrap();
        let index = LanceIndex::open(&tmp.path().join("lancedb"), 2).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert_eq!(index.dim(), 2);
    }

    #[tokio::test]
    async fn reopen_with_other_dimension_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lancedb");
        LanceIndex::open(&path, 2).await.unwrap();
        assert!(LanceIndex::open(&path, 2).await.is_ok());
        let err = LanceIndex::open(&path, 3).await.err().unwrap();
        assert!(matches!(err, StoreError::Dimension { expected: 3, actual: 2 }));
    }

    #[tokio::test]
    async fn replace_is_atomic_and_idempotent() {
        let tmp = TempDir::new().unwrap();
        let index = LanceIndex::open(&tmp.path().join("lancedb"), 2).await.unwrap();
        let rows = vec![
            row("O'Neil-1", ChunkType::Fingerprint, "Kerala", vec![1.0, 0.0]),
            row("O'Neil-1", ChunkType::KeyFields, "Kerala", vec![0.0, 1.0]),
        ];
        index.replace_case("O'Neil-1", rows.clone()).await.unwrap();
        index.replace_case("O'Neil-1", rows).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 2);

        let stored = index.case_rows("O'Neil-1").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].chunk_type, ChunkType::Fingerprint);
        assert_eq!(stored[0].metadata.survey_numbers, vec!["123/4"]);
        assert_eq!(stored[0].items, vec!["note it's fine"]);

        // Fewer rows on re-ingest removes the stale one.
        index
            .replace_case(
                "O'Neil-1",
                vec![row("O'Neil-1", ChunkType::Fingerprint, "Kerala", vec![1.0, 0.0])],
            )
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn state_filter_excludes_other_states() {
        let tmp = TempDir::new().unwrap();
        let index = LanceIndex::open(&tmp.path().join("lancedb"), 2).await.unwrap();
        index
            .replace_case("A", vec![row("A", ChunkType::Fingerprint, "Telangana", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .replace_case("B", vec![row("B", ChunkType::Fingerprint, "Andhra Pradesh", vec![0.5, 0.5])])
            .await
            .unwrap();

        let matches = index
            .query(&[1.0, 0.0], 5, &MetadataFilter::state("Andhra Pradesh"))
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].chunk.case_id, "B");
        assert_eq!(index.case_count().await.unwrap(), 2);

        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }
}
