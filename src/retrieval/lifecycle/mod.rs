
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{RecordStore, SearchIndex, SimilarityBackend, documents_from_users, fetch_records};
use crate::Result;

pub type IndexHandle = Option<Arc<dyn SearchIndex>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Absent,
    Building,
    Ready,
}

impl std::fmt::Display for IndexState {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Absent => "absent",
            Self::Building => "building",
            Self::Ready => "ready",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// Another rebuild held the flag; nothing was done
    AlreadyRunning,
    Ready { documents: usize },
    /// The store had no records, so no index was installed
    Empty,
    Failed { error: String },
}

/// Holds the building flag; clearing it on drop covers early returns,
/// panics, and aborted tasks alike
struct BuildingGuard {
    flag: Arc<AtomicBool>,
}

impl BuildingGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for BuildingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Owns the similarity index and the single-flight rebuild around it.
///
/// Readers take a snapshot of the installed handle and never wait on a
/// rebuild. A rebuild always produces a complete new index before
/// swapping it in, so a reader sees the previous index, no index, or the
/// new one.
pub struct IndexManager {
    store: Arc<dyn RecordStore>,
    backend: Arc<dyn SimilarityBackend>,
    current: watch::Sender<IndexHandle>,
    building: Arc<AtomicBool>,
    fetch_timeout: Duration,
    attempts: AtomicU64,
}

impl IndexManager {
    #[inline]
    pub fn new(
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn SimilarityBackend>,
        fetch_timeout: Duration,
    ) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            store,
            backend,
            current,
            building: Arc::new(AtomicBool::new(false)),
            fetch_timeout,
            attempts: AtomicU64::new(0),
        }
    }

    /// Snapshot of the installed index; never starts a build
    #[inline]
    pub fn current_index(&self) -> IndexHandle {
        self.current.borrow().clone()
    }

    #[inline]
    pub fn is_building(&self) -> bool {
        self.building.load(Ordering::Acquire)
    }

    #[inline]
    pub fn state(&self) -> IndexState {
        if self.is_building() {
            IndexState::Building
        } else if self.current.borrow().is_some() {
            IndexState::Ready
        } else {
            IndexState::Absent
        }
    }

    /// Number of rebuilds that actually ran
    #[inline]
    pub fn rebuild_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Receiver that observes every install or clear of the index
    #[inline]
    pub fn subscribe(&self) -> watch::Receiver<IndexHandle> {
        self.current.subscribe()
    }

    #[inline]
    pub fn record_store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.store)
    }

    #[inline]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Rebuild in the caller's task. Returns immediately with
    /// [`RebuildOutcome::AlreadyRunning`] if a rebuild is in flight.
    #[inline]
    pub async fn rebuild(&self) -> RebuildOutcome {
        let Some(guard) = BuildingGuard::acquire(&self.building) else {
            debug!("Rebuild requested while another is in flight; skipping");
            return RebuildOutcome::AlreadyRunning;
        };
        self.run_rebuild(guard).await
    }

    /// Start a rebuild on the runtime without waiting for it.
    ///
    /// The flag is taken before spawning, so two overlapping calls never
    /// both get a handle back.
    #[inline]
    pub fn spawn_rebuild(self: &Arc<Self>) -> Option<JoinHandle<RebuildOutcome>> {
        let Some(guard) = BuildingGuard::acquire(&self.building) else {
            debug!("Background rebuild already in flight");
            return None;
        };

        let manager = Arc::clone(self);
        Some(tokio::spawn(
            async move { manager.run_rebuild(guard).await },
        ))
    }

    async fn run_rebuild(&self, _guard: BuildingGuard) -> RebuildOutcome {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        info!("Rebuilding similarity index");

        let result = AssertUnwindSafe(self.build()).catch_unwind().await;

        match result {
            Ok(Ok(Some(index))) => {
                let documents = index.document_count();
                self.current.send_replace(Some(index));
                info!("Similarity index ready with {} documents", documents);
                RebuildOutcome::Ready { documents }
            }
            Ok(Ok(None)) => {
                self.current.send_replace(None);
                warn!("No records to index; similarity index left absent");
                RebuildOutcome::Empty
            }
            Ok(Err(e)) => {
                self.current.send_replace(None);
                error!("Failed to rebuild similarity index: {}", e);
                RebuildOutcome::Failed {
                    error: e.to_string(),
                }
            }
            Err(_) => {
                self.current.send_replace(None);
                error!("Similarity index rebuild panicked");
                RebuildOutcome::Failed {
                    error: "rebuild panicked".to_string(),
                }
            }
        }
    }

    async fn build(&self) -> Result<IndexHandle> {
        let users = fetch_records(self.store.as_ref(), self.fetch_timeout).await?;
        let documents = documents_from_users(&users);
        if documents.is_empty() {
            return Ok(None);
        }

        debug!("Embedding {} documents", documents.len());
        let index = self.backend.build_index(documents).await?;
        Ok(Some(index))
    }
}
