//! Semantic retrieval over the user records.
//!
//! The [`IndexManager`] owns the current similarity index and rebuilds it
//! in the background; the [`QueryRouter`] turns a question into a context
//! block, using the index when one is installed and a linear scan of the
//! record store otherwise.


pub mod lifecycle;
pub mod router;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::Result;
use crate::database::sqlite::User;

pub use lifecycle::{IndexManager, IndexState, RebuildOutcome};
pub use router::{NO_DATA_SENTINEL, QueryRouter, SEARCH_ERROR_SENTINEL};

/// Source of truth for the records that get indexed
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every record, in store order, bounded by the store's record cap
    async fn fetch_all_records(&self) -> Result<Vec<User>>;
}

/// Builds similarity indexes from a set of documents
#[async_trait]
pub trait SimilarityBackend: Send + Sync {
    async fn build_index(&self, documents: Vec<Document>) -> Result<Arc<dyn SearchIndex>>;
}

/// Immutable, queryable index over one document set
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Up to `k` documents, best match first
    async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredDocument>>;

    fn document_count(&self) -> usize;
}

/// Index-only projection of a [`User`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Identifier of the record this document was rendered from
    pub source_id: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

impl Document {
    #[inline]
    pub fn from_user(user: &User) -> Self {
        Self {
            content: render_user(user),
            metadata: DocumentMetadata {
                source_id: user.id.clone(),
                role: user.role.clone(),
            },
        }
    }
}

/// Text rendering shared by indexed documents and the linear-scan fallback
#[inline]
pub fn render_user(user: &User) -> String {
    format!(
        "User Name: {}\nEmail: {}\nRole: {}\nBio: {}",
        user.name,
        user.email,
        user.role,
        user.bio_or_placeholder()
    )
}

#[inline]
pub fn documents_from_users(users: &[User]) -> Vec<Document> {
    users.iter().map(Document::from_user).collect()
}

/// Fetch every record, giving up after `timeout`
pub(crate) async fn fetch_records(
    store: &dyn RecordStore,
    timeout: std::time::Duration,
) -> Result<Vec<User>> {
    tokio::time::timeout(timeout, store.fetch_all_records())
        .await
        .map_err(|_| {
            crate::RagError::StoreUnavailable(format!(
                "Timed out after {:?} fetching records",
                timeout
            ))
        })?
}
