// LanceDB similarity index
// Each rebuild embeds every document into a private in-memory table


pub mod vector_store;

pub use vector_store::{LanceBackend, LanceIndex};

use crate::retrieval::Document;
use crate::{RagError, Result};

/// A document paired with its embedding, ready to be written as one row
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedDocument {
    pub document: Document,
    pub vector: Vec<f32>,
}

/// Shared dimension of `rows`; rejects empty sets and ragged vectors
#[inline]
pub fn vector_dimension(rows: &[EmbeddedDocument]) -> Result<usize> {
    let first = rows
        .first()
        .ok_or_else(|| RagError::BackendUnavailable("No documents to index".to_string()))?;

    let dimension = first.vector.len();
    if dimension == 0 {
        return Err(RagError::BackendUnavailable(
            "Embedding model returned empty vectors".to_string(),
        ));
    }

    if let Some(row) = rows.iter().find(|row| row.vector.len() != dimension) {
        return Err(RagError::BackendUnavailable(format!(
            "Inconsistent vector dimensions: expected {}, got {} for record {}",
            dimension,
            row.vector.len(),
            row.document.metadata.source_id
        )));
    }

    Ok(dimension)
}
