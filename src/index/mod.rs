// Embedding index module
// Persistent LanceDB collection mapping document records to vectors


use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::{
    Connection,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::embeddings::EmbeddingClient;
use crate::loader::{DocumentRecord, load_documents};
use crate::{PortfolioError, Result, config::Config};

const TABLE_NAME: &str = "portfolio";

/// One stored entry: a document record plus its embedding vector
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: DocumentMetadata,
}

/// Document metadata stored alongside each vector
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentMetadata {
    pub doc_id: String,
    pub source_label: String,
    pub category: String,
    pub content: String,
    pub created_at: String,
}

/// Nearest-neighbor search hit, ordered by ascending distance
#[derive(Debug, Clone)]
pub struct DocumentMatch {
    pub metadata: DocumentMetadata,
    pub distance: f32,
}

/// Persistent vector collection over the portfolio documents.
///
/// The collection is either empty or fully populated: ingestion stores
/// all entries in a single batch, and `reload` drops everything before
/// re-ingesting. There is no incremental upsert.
pub struct EmbeddingIndex {
    connection: Connection,
    dimension: usize,
}

impl EmbeddingIndex {
    /// Connect to the vector store directory, creating it and the
    /// backing table if they do not exist yet
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        let db_path = config.vector_db_path();
        debug!("Opening vector store at {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PortfolioError::Database(format!("Failed to create vector store directory: {e}"))
            })?;
        }

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| PortfolioError::Database(format!("Failed to connect: {e}")))?;

        let index = Self {
            connection,
            dimension: config.embedding.dimension as usize,
        };
        index.ensure_table().await?;

        info!("Vector store ready at {:?}", db_path);
        Ok(index)
    }

    /// Populate the index from the data folder if it is empty.
    ///
    /// A non-empty store is treated as current and left untouched; use
    /// `reload` to pick up changed documents.
    #[inline]
    pub async fn ensure_populated(
        &self,
        data_dir: &Path,
        embedder: &EmbeddingClient,
    ) -> Result<u64> {
        let count = self.count().await?;
        if count > 0 {
            info!("Index already holds {} documents", count);
            return Ok(count);
        }

        info!("Index is empty, ingesting portfolio data");
        self.ingest(data_dir, embedder).await
    }

    /// Drop all entries and re-ingest from the data folder. This is the
    /// only update path.
    #[inline]
    pub async fn reload(&self, data_dir: &Path, embedder: &EmbeddingClient) -> Result<u64> {
        info!("Reloading index from {}", data_dir.display());
        self.clear().await?;
        self.ingest(data_dir, embedder).await
    }

    /// Number of stored entries
    #[inline]
    pub async fn count(&self) -> Result<u64> {
        let table = self.open_table().await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| PortfolioError::Database(format!("Failed to count rows: {e}")))?;
        Ok(count as u64)
    }

    /// Store a batch of entries in a single insert
    #[inline]
    pub async fn store_batch(&self, entries: Vec<IndexEntry>) -> Result<()> {
        if entries.is_empty() {
            debug!("No entries to store");
            return Ok(());
        }

        for entry in &entries {
            if entry.vector.len() != self.dimension {
                return Err(PortfolioError::Database(format!(
                    "Vector dimension mismatch for {}: expected {}, got {}",
                    entry.metadata.source_label,
                    self.dimension,
                    entry.vector.len()
                )));
            }
        }

        let record_batch = self.create_record_batch(&entries)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| PortfolioError::Database(format!("Failed to insert entries: {e}")))?;

        info!("Stored {} entries", entries.len());
        Ok(())
    }

    /// Nearest-neighbor search, returning up to `limit` matches ordered
    /// by ascending distance
    #[inline]
    pub async fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<DocumentMatch>> {
        debug!("Searching for {} nearest documents", limit);

        let table = self.open_table().await?;
        let results = table
            .vector_search(query_vector)
            .map_err(|e| PortfolioError::Database(format!("Failed to build search: {e}")))?
            .column("vector")
            .limit(limit)
            .execute()
            .await
            .map_err(|e| PortfolioError::Database(format!("Failed to execute search: {e}")))?;

        self.collect_matches(results).await
    }

    /// Drop all entries, leaving an empty table
    #[inline]
    pub async fn clear(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| PortfolioError::Database(format!("Failed to list tables: {e}")))?;

        if table_names.contains(&TABLE_NAME.to_string()) {
            self.connection
                .drop_table(TABLE_NAME)
                .await
                .map_err(|e| PortfolioError::Database(format!("Failed to drop table: {e}")))?;
        }

        self.connection
            .create_empty_table(TABLE_NAME, self.schema())
            .execute()
            .await
            .map_err(|e| PortfolioError::Database(format!("Failed to recreate table: {e}")))?;

        info!("Cleared vector store");
        Ok(())
    }

    /// Load, embed, and store every document under `data_dir`.
    ///
    /// A document whose embedding call fails is logged and skipped so
    /// one bad file cannot block the rest; there are no retries at this
    /// level. All surviving entries are stored in one batch.
    async fn ingest(&self, data_dir: &Path, embedder: &EmbeddingClient) -> Result<u64> {
        let records = load_documents(data_dir)?;
        if records.is_empty() {
            info!("No documents found in {}", data_dir.display());
            return Ok(0);
        }

        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let vectors: Vec<Option<Vec<f32>>> = match embedder.embed_batch(&texts) {
            Ok(vectors) => vectors.into_iter().map(Some).collect(),
            Err(e) => {
                // Batch call failed; fall back to one request per
                // document so a single bad input only loses itself
                warn!("Batch embedding failed ({}), embedding one at a time", e);
                texts
                    .iter()
                    .map(|text| match embedder.embed(text) {
                        Ok(vector) => Some(vector),
                        Err(e) => {
                            warn!("Skipping document: {}", e);
                            None
                        }
                    })
                    .collect()
            }
        };

        let created_at = Utc::now().to_rfc3339();
        let mut entries = Vec::with_capacity(records.len());
        for (record, vector) in records.iter().zip(vectors) {
            let Some(vector) = vector else { continue };
            if vector.len() != self.dimension {
                warn!(
                    "Skipping {}: embedding has {} dimensions, expected {}",
                    record.source_label,
                    vector.len(),
                    self.dimension
                );
                continue;
            }
            entries.push(entry_for(record, vector, &created_at));
        }

        let stored = entries.len() as u64;
        self.store_batch(entries).await?;

        info!("Ingested {} of {} documents", stored, records.len());
        Ok(stored)
    }

    async fn ensure_table(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| PortfolioError::Database(format!("Failed to list tables: {e}")))?;

        if table_names.contains(&TABLE_NAME.to_string()) {
            return Ok(());
        }

        self.connection
            .create_empty_table(TABLE_NAME, self.schema())
            .execute()
            .await
            .map_err(|e| PortfolioError::Database(format!("Failed to create table: {e}")))?;

        debug!("Created table with {} dimensions", self.dimension);
        Ok(())
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        self.connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| PortfolioError::Database(format!("Failed to open table: {e}")))
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("doc_id", DataType::Utf8, false),
            Field::new("source_label", DataType::Utf8, false),
            Field::new("category", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    fn create_record_batch(&self, entries: &[IndexEntry]) -> Result<RecordBatch> {
        let len = entries.len();

        let mut ids = Vec::with_capacity(len);
        let mut doc_ids = Vec::with_capacity(len);
        let mut source_labels = Vec::with_capacity(len);
        let mut categories = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);

        for entry in entries {
            ids.push(entry.id.as_str());
            doc_ids.push(entry.metadata.doc_id.as_str());
            source_labels.push(entry.metadata.source_label.as_str());
            categories.push(entry.metadata.category.as_str());
            contents.push(entry.metadata.content.as_str());
            created_ats.push(entry.metadata.created_at.as_str());
            flat_values.extend_from_slice(&entry.vector);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| PortfolioError::Database(format!("Failed to build vector array: {e}")))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(doc_ids)),
            Arc::new(StringArray::from(source_labels)),
            Arc::new(StringArray::from(categories)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(self.schema(), arrays)
            .map_err(|e| PortfolioError::Database(format!("Failed to build record batch: {e}")))
    }

    async fn collect_matches(
        &self,
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<DocumentMatch>> {
        let mut matches = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| PortfolioError::Database(format!("Failed to read result stream: {e}")))?
        {
            matches.extend(parse_match_batch(&batch)?);
        }

        debug!("Search returned {} matches", matches.len());
        Ok(matches)
    }
}

fn entry_for(record: &DocumentRecord, vector: Vec<f32>, created_at: &str) -> IndexEntry {
    IndexEntry {
        id: uuid::Uuid::new_v4().to_string(),
        vector,
        metadata: DocumentMetadata {
            doc_id: record.id.clone(),
            source_label: record.source_label.clone(),
            category: record.category.to_string(),
            content: record.text.clone(),
            created_at: created_at.to_string(),
        },
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| PortfolioError::Database(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PortfolioError::Database(format!("Invalid {name} column type")))
}

fn parse_match_batch(batch: &RecordBatch) -> Result<Vec<DocumentMatch>> {
    let doc_ids = string_column(batch, "doc_id")?;
    let source_labels = string_column(batch, "source_label")?;
    let categories = string_column(batch, "category")?;
    let contents = string_column(batch, "content")?;
    let created_ats = string_column(batch, "created_at")?;

    let distances = batch
        .column_by_name("_distance")
        .map(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut matches = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let distance = distances
            .flatten()
            .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        matches.push(DocumentMatch {
            metadata: DocumentMetadata {
                doc_id: doc_ids.value(row).to_string(),
                source_label: source_labels.value(row).to_string(),
                category: categories.value(row).to_string(),
                content: contents.value(row).to_string(),
                created_at: created_ats.value(row).to_string(),
            },
            distance,
        });
    }

    Ok(matches)
}
