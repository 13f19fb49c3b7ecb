
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{EmbeddedDocument, vector_dimension};
use crate::embeddings::Embedder;
use crate::retrieval::{Document, DocumentMetadata, ScoredDocument, SearchIndex, SimilarityBackend};
use crate::{RagError, Result};

const MEMORY_URI: &str = "memory://";
const TABLE_PREFIX: &str = "documents";

/// Builds a fresh [`LanceIndex`] per call; nothing is shared between builds
pub struct LanceBackend {
    embedder: Arc<dyn Embedder>,
}

impl LanceBackend {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl SimilarityBackend for LanceBackend {
    async fn build_index(&self, documents: Vec<Document>) -> Result<Arc<dyn SearchIndex>> {
        if documents.is_empty() {
            return Err(RagError::BackendUnavailable(
                "Cannot build an index from zero documents".to_string(),
            ));
        }

        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = embed(Arc::clone(&self.embedder), texts).await?;

        if vectors.len() != documents.len() {
            return Err(RagError::BackendUnavailable(format!(
                "Embedding count mismatch: {} documents, {} vectors",
                documents.len(),
                vectors.len()
            )));
        }

        let rows: Vec<EmbeddedDocument> = documents
            .into_iter()
            .zip(vectors)
            .map(|(document, vector)| EmbeddedDocument { document, vector })
            .collect();

        let index = LanceIndex::create(rows, Arc::clone(&self.embedder)).await?;
        Ok(Arc::new(index))
    }
}

/// Immutable similarity index over one embedded document set
pub struct LanceIndex {
    // Keeps the in-memory database alive for the table
    _connection: Connection,
    table: Table,
    embedder: Arc<dyn Embedder>,
    dimension: usize,
    document_count: usize,
}

impl LanceIndex {
    /// Write `rows` into a new in-memory table
    #[inline]
    pub async fn create(rows: Vec<EmbeddedDocument>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let dimension = vector_dimension(&rows)?;
        debug!(
            "Creating in-memory LanceDB table for {} documents ({} dimensions)",
            rows.len(),
            dimension
        );

        let connection = lancedb::connect(MEMORY_URI)
            .execute()
            .await
            .map_err(|e| backend_error("Failed to connect to LanceDB", &e))?;

        // In-memory stores may be shared between connections, so every
        // build writes to its own table
        let table_name = format!("{}_{}", TABLE_PREFIX, Uuid::new_v4().simple());
        let schema = create_schema(dimension)?;
        let table = connection
            .create_empty_table(&table_name, Arc::clone(&schema))
            .execute()
            .await
            .map_err(|e| backend_error("Failed to create table", &e))?;

        let batch = create_record_batch(&rows, dimension, Arc::clone(&schema))?;
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| backend_error("Failed to insert documents", &e))?;

        info!("Indexed {} documents in LanceDB", rows.len());

        Ok(Self {
            _connection: connection,
            table,
            embedder,
            dimension,
            document_count: rows.len(),
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Nearest documents to `query_vector`, closest first
    #[inline]
    pub async fn search_vector(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredDocument>> {
        if query_vector.len() != self.dimension {
            return Err(RagError::BackendUnavailable(format!(
                "Query vector has {} dimensions, index has {}",
                query_vector.len(),
                self.dimension
            )));
        }

        let mut results = self
            .table
            .vector_search(query_vector)
            .map_err(|e| backend_error("Failed to create vector search", &e))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| backend_error("Failed to execute search", &e))?;

        let mut scored = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| backend_error("Failed to read result stream", &e))?
        {
            scored.extend(parse_search_batch(&batch)?);
        }

        debug!("Vector search returned {} documents", scored.len());
        Ok(scored)
    }
}

#[async_trait]
impl SearchIndex for LanceIndex {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        let mut vectors = embed(Arc::clone(&self.embedder), vec![text.to_string()]).await?;
        let query_vector = vectors.pop().ok_or_else(|| {
            RagError::BackendUnavailable("Embedding model returned no query vector".to_string())
        })?;

        self.search_vector(&query_vector, k).await
    }

    fn document_count(&self) -> usize {
        self.document_count
    }
}

async fn embed(embedder: Arc<dyn Embedder>, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
    tokio::task::spawn_blocking(move || embedder.embed(&texts))
        .await
        .map_err(|e| RagError::BackendUnavailable(format!("Embedding task failed: {}", e)))?
        .map_err(|e| RagError::BackendUnavailable(format!("Embedding failed: {:#}", e)))
}

fn backend_error(action: &str, error: &lancedb::Error) -> RagError {
    RagError::BackendUnavailable(format!("{}: {}", action, error))
}

fn list_size(dimension: usize) -> Result<i32> {
    i32::try_from(dimension).map_err(|_| {
        RagError::BackendUnavailable(format!("Vector dimension {} is too large", dimension))
    })
}

fn create_schema(dimension: usize) -> Result<Arc<Schema>> {
    Ok(Arc::new(Schema::new(vec![
        Field::new("source_id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                list_size(dimension)?,
            ),
            false,
        ),
        Field::new("role", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
    ])))
}

fn create_record_batch(
    rows: &[EmbeddedDocument],
    dimension: usize,
    schema: Arc<Schema>,
) -> Result<RecordBatch> {
    let mut source_ids = Vec::with_capacity(rows.len());
    let mut roles = Vec::with_capacity(rows.len());
    let mut contents = Vec::with_capacity(rows.len());
    let mut flat_values = Vec::with_capacity(rows.len() * dimension);

    for row in rows {
        source_ids.push(row.document.metadata.source_id.as_str());
        roles.push(row.document.metadata.role.as_str());
        contents.push(row.document.content.as_str());
        flat_values.extend_from_slice(&row.vector);
    }

    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        list_size(dimension)?,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| RagError::BackendUnavailable(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(source_ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(roles)),
        Arc::new(StringArray::from(contents)),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| RagError::BackendUnavailable(format!("Failed to create record batch: {}", e)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::BackendUnavailable(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::BackendUnavailable(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<ScoredDocument>> {
    let source_ids = string_column(batch, "source_id")?;
    let roles = string_column(batch, "role")?;
    let contents = string_column(batch, "content")?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let scored = (0..batch.num_rows())
        .map(|row| {
            let distance = distances
                .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            ScoredDocument {
                document: Document {
                    content: contents.value(row).to_string(),
                    metadata: DocumentMetadata {
                        source_id: source_ids.value(row).to_string(),
                        role: roles.value(row).to_string(),
                    },
                },
                // Higher is better
                score: 1.0 - distance,
            }
        })
        .collect();

    Ok(scored)
}
