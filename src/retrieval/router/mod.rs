
use futures::FutureExt as _;
use std::fmt::Write as _;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, warn};

use super::{IndexManager, ScoredDocument, fetch_records, render_user};
use crate::database::sqlite::User;

/// Returned when the store holds no records or cannot be read
pub const NO_DATA_SENTINEL: &str = "No user data available.";

/// Returned when routing a query panics
pub const SEARCH_ERROR_SENTINEL: &str = "Error searching user data.";

pub const DEFAULT_TOP_K: usize = 5;

/// Turns a question into a context block for the answer composer
pub struct QueryRouter {
    manager: Arc<IndexManager>,
    top_k: usize,
    background_rebuild: AtomicBool,
}

impl QueryRouter {
    #[inline]
    pub fn new(manager: Arc<IndexManager>, top_k: usize) -> Self {
        Self {
            manager,
            top_k: top_k.max(1),
            background_rebuild: AtomicBool::new(true),
        }
    }

    /// Whether a query against a missing index starts a rebuild. One-shot
    /// callers that exit right after answering turn this off.
    #[inline]
    pub fn set_background_rebuild(&self, enabled: bool) {
        self.background_rebuild.store(enabled, Ordering::Release);
    }

    #[inline]
    pub fn manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }

    /// Context for `query`. Never fails and never waits on a rebuild.
    ///
    /// A missing index kicks off a background rebuild and the answer is
    /// served from a linear scan of the store in the meantime.
    #[inline]
    pub async fn retrieve(&self, query: &str) -> String {
        match AssertUnwindSafe(self.route(query)).catch_unwind().await {
            Ok(context) => context,
            Err(_) => {
                error!("Query routing panicked");
                SEARCH_ERROR_SENTINEL.to_string()
            }
        }
    }

    async fn route(&self, query: &str) -> String {
        let index = self.manager.current_index();

        if index.is_none()
            && self.background_rebuild.load(Ordering::Acquire)
            && !self.manager.is_building()
        {
            debug!("No similarity index installed; starting background rebuild");
            drop(self.manager.spawn_rebuild());
        }

        if let Some(index) = index {
            match index.query(query, self.top_k).await {
                Ok(results) if !results.is_empty() => {
                    debug!("Similarity search returned {} results", results.len());
                    return render_ranked(&results);
                }
                Ok(_) => {
                    debug!("Similarity search found nothing; scanning the store");
                }
                Err(e) => {
                    warn!("Similarity search failed, falling back to linear scan: {}", e);
                }
            }
        }

        self.linear_scan().await
    }

    async fn linear_scan(&self) -> String {
        let store = self.manager.record_store();
        match fetch_records(store.as_ref(), self.manager.fetch_timeout()).await {
            Ok(users) if users.is_empty() => NO_DATA_SENTINEL.to_string(),
            Ok(users) => render_records(&users),
            Err(e) => {
                warn!("Record store unavailable for linear scan: {}", e);
                NO_DATA_SENTINEL.to_string()
            }
        }
    }
}

fn render_ranked(results: &[ScoredDocument]) -> String {
    let mut context = String::from("Found relevant Users:\n\n");
    for (rank, result) in results.iter().enumerate() {
        let _ = write!(
            context,
            "--- Result {} ---\n{}\n\n",
            rank + 1,
            result.document.content
        );
    }
    context
}

fn render_records(users: &[User]) -> String {
    let mut context = String::from("User records:\n\n");
    for (position, user) in users.iter().enumerate() {
        let _ = write!(
            context,
            "--- Record {} ---\n{}\n\n",
            position + 1,
            render_user(user)
        );
    }
    context
}
