//! Persistent vector storage for index entries.
//!
//! [`VectorIndex`] is the seam between the embedding index and whatever keeps
//! vectors on disk. [`LanceDbIndex`] stores one row per dashboard in a LanceDB
//! table, with the entry text next to its embedding, so a table can be
//! reopened and searched without the context store.

use crate::embedding_index::{IndexEntry, IndexedChart};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use dashlens_core::{AppError, AppResult};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Table;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// An entry and the vector it was embedded to.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRow {
    pub entry: IndexEntry,
    pub vector: Vec<f32>,
}

/// Storage and nearest-neighbour search for embedded entries.
#[async_trait]
pub trait VectorIndex: Send + Sync + fmt::Debug {
    /// Append rows in one write: either all of them are stored or none.
    async fn append(&self, rows: &[VectorRow]) -> AppResult<()>;

    /// Up to `top_k` `(entry, score)` pairs by descending cosine similarity.
    async fn search(&self, query: &[f32], top_k: usize) -> AppResult<Vec<(IndexEntry, f32)>>;

    /// Every stored entry.
    async fn entries(&self) -> AppResult<Vec<IndexEntry>>;

    async fn count(&self) -> AppResult<usize>;

    /// Remove every row.
    async fn reset(&self) -> AppResult<()>;
}

fn lance_error(action: &'static str) -> impl FnOnce(lancedb::Error) -> AppError {
    move |e| AppError::Index(format!("Failed to {}: {}", action, e))
}

fn arrow_error(action: &'static str) -> impl FnOnce(arrow_schema::ArrowError) -> AppError {
    move |e| AppError::Index(format!("Failed to {}: {}", action, e))
}

/// LanceDB table of index entries.
pub struct LanceDbIndex {
    table: Table,
    table_name: String,
    dimension: usize,
}

impl fmt::Debug for LanceDbIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanceDbIndex")
            .field("table", &self.table_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl LanceDbIndex {
    /// Open `table_name` in the database at `dir`, creating an empty table
    /// when it does not exist yet.
    pub async fn open_or_create(dir: &Path, table_name: &str, dimension: usize) -> AppResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            AppError::Index(format!("Failed to create index directory {:?}: {}", dir, e))
        })?;

        let conn = Self::connect(dir).await?;
        let names = conn
            .table_names()
            .execute()
            .await
            .map_err(lance_error("list tables"))?;

        if names.iter().any(|name| name == table_name) {
            return Self::open_table(&conn, table_name, dimension).await;
        }

        let schema = Self::schema(dimension);
        let empty = RecordBatch::new_empty(schema.clone());
        let table = conn
            .create_table(table_name, RecordBatchIterator::new(vec![Ok(empty)], schema))
            .execute()
            .await
            .map_err(lance_error("create table"))?;

        tracing::debug!(table = table_name, dir = %dir.display(), "Created vector table");
        Ok(Self {
            table,
            table_name: table_name.to_string(),
            dimension,
        })
    }

    /// Open a table that must already exist with vectors of `dimension`.
    pub async fn open(dir: &Path, table_name: &str, dimension: usize) -> AppResult<Self> {
        let conn = Self::connect(dir).await?;
        Self::open_table(&conn, table_name, dimension).await
    }

    async fn connect(dir: &Path) -> AppResult<lancedb::Connection> {
        let uri = dir.to_string_lossy().to_string();
        lancedb::connect(&uri)
            .execute()
            .await
            .map_err(lance_error("connect to LanceDB"))
    }

    async fn open_table(
        conn: &lancedb::Connection,
        table_name: &str,
        dimension: usize,
    ) -> AppResult<Self> {
        let table = conn
            .open_table(table_name)
            .execute()
            .await
            .map_err(lance_error("open table"))?;

        let schema = table.schema().await.map_err(lance_error("read table schema"))?;
        let stored = schema
            .field_with_name("embedding")
            .ok()
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => Some(*size as usize),
                _ => None,
            });
        if stored != Some(dimension) {
            return Err(AppError::Index(format!(
                "Table '{}' stores {:?}-dimension vectors, expected {}",
                table_name, stored, dimension
            )));
        }

        Ok(Self {
            table,
            table_name: table_name.to_string(),
            dimension,
        })
    }

    fn schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("dashboard_id", DataType::Utf8, false),
            Field::new("dashboard_name", DataType::Utf8, false),
            Field::new("summary", DataType::Utf8, false),
            // JSON array of charts
            Field::new("charts", DataType::Utf8, false),
            Field::new("last_update_time", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
        ]))
    }

    fn rows_to_batch(&self, rows: &[VectorRow]) -> AppResult<RecordBatch> {
        let mut values = Vec::with_capacity(rows.len() * self.dimension);
        let mut charts = Vec::with_capacity(rows.len());

        for row in rows {
            if row.vector.len() != self.dimension {
                return Err(AppError::Index(format!(
                    "Vector dimension mismatch for '{}': table is {}, vector is {}",
                    row.entry.dashboard_id,
                    self.dimension,
                    row.vector.len()
                )));
            }
            if row.vector.iter().any(|v| !v.is_finite()) {
                return Err(AppError::Index(format!(
                    "Vector for '{}' contains non-finite values",
                    row.entry.dashboard_id
                )));
            }
            values.extend_from_slice(&row.vector);
            charts.push(serde_json::to_string(&row.entry.charts)?);
        }

        let embedding = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.dimension as i32,
            Arc::new(Float32Array::from(values)),
            None,
        )
        .map_err(arrow_error("build embedding column"))?;

        RecordBatch::try_new(
            Self::schema(self.dimension),
            vec![
                Arc::new(string_array(rows, |e| e.dashboard_id.as_str())),
                Arc::new(string_array(rows, |e| e.dashboard_name.as_str())),
                Arc::new(string_array(rows, |e| e.summary.as_str())),
                Arc::new(StringArray::from(charts)),
                Arc::new(string_array(rows, |e| e.last_update_time.as_str())),
                Arc::new(embedding),
            ],
        )
        .map_err(arrow_error("build record batch"))
    }

    fn row_entry(batch: &RecordBatch, row: usize) -> AppResult<IndexEntry> {
        let charts: Vec<IndexedChart> =
            serde_json::from_str(string_column(batch, "charts")?.value(row))?;

        Ok(IndexEntry {
            dashboard_id: string_column(batch, "dashboard_id")?.value(row).to_string(),
            dashboard_name: string_column(batch, "dashboard_name")?.value(row).to_string(),
            summary: string_column(batch, "summary")?.value(row).to_string(),
            charts,
            last_update_time: string_column(batch, "last_update_time")?.value(row).to_string(),
        })
    }

    fn row_vector(batch: &RecordBatch, row: usize) -> AppResult<Vec<f32>> {
        let list = batch
            .column_by_name("embedding")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| AppError::Index("Invalid embedding column".to_string()))?;

        let values = list.value(row);
        let values = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| AppError::Index("Invalid embedding values".to_string()))?;
        Ok(values.values().to_vec())
    }
}

fn string_array(rows: &[VectorRow], field: fn(&IndexEntry) -> &str) -> StringArray {
    StringArray::from(rows.iter().map(|row| field(&row.entry)).collect::<Vec<_>>())
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| AppError::Index(format!("Invalid {} column", name)))
}

#[async_trait]
impl VectorIndex for LanceDbIndex {
    async fn append(&self, rows: &[VectorRow]) -> AppResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let batch = self.rows_to_batch(rows)?;
        let schema = batch.schema();
        self.table
            .add(RecordBatchIterator::new(vec![Ok(batch)], schema))
            .execute()
            .await
            .map_err(lance_error("add rows"))?;

        tracing::debug!(table = %self.table_name, rows = rows.len(), "Appended vectors");
        Ok(())
    }

    async fn search(&self, query: &[f32], top_k: usize) -> AppResult<Vec<(IndexEntry, f32)>> {
        if query.len() != self.dimension {
            return Err(AppError::Index(format!(
                "Query dimension mismatch: table is {}, query is {}",
                self.dimension,
                query.len()
            )));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let stream = self
            .table
            .query()
            .nearest_to(query.to_vec())
            .map_err(lance_error("create vector query"))?
            .limit(top_k)
            .execute()
            .await
            .map_err(lance_error("run vector query"))?;
        let batches = stream
            .try_collect::<Vec<RecordBatch>>()
            .await
            .map_err(|e| AppError::Index(format!("Failed to read results: {}", e)))?;

        let mut scored = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                let entry = Self::row_entry(batch, row)?;
                let vector = Self::row_vector(batch, row)?;
                scored.push((entry, cosine_similarity(query, &vector)));
            }
        }

        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| a.0.dashboard_id.cmp(&b.0.dashboard_id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn entries(&self) -> AppResult<Vec<IndexEntry>> {
        let count = self.count().await?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let stream = self
            .table
            .query()
            .limit(count)
            .execute()
            .await
            .map_err(lance_error("scan table"))?;
        let batches = stream
            .try_collect::<Vec<RecordBatch>>()
            .await
            .map_err(|e| AppError::Index(format!("Failed to read results: {}", e)))?;

        let mut entries = Vec::with_capacity(count);
        for batch in &batches {
            for row in 0..batch.num_rows() {
                entries.push(Self::row_entry(batch, row)?);
            }
        }
        Ok(entries)
    }

    async fn count(&self) -> AppResult<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(lance_error("count rows"))
    }

    async fn reset(&self) -> AppResult<()> {
        if self.count().await? > 0 {
            self.table
                .delete("dashboard_id IS NOT NULL")
                .await
                .map_err(lance_error("clear table"))?;
        }
        tracing::debug!(table = %self.table_name, "Cleared vector table");
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
