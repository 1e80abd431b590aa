//! The live generation, shared between the rebuild job and request paths.
//!
//! Readers take an `Arc` to the current snapshot and keep using it for
//! the whole request; a rebuild swaps in a new `Arc` without waiting for
//! them. The query path takes no locks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use cadence_core::model::GenerationId;

use crate::artifact::{ArtifactStore, IndexSnapshot};
use crate::error::{SearchError, SearchResult};

/// Lifecycle of the served generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    /// Nothing has been published yet.
    Absent,
    /// A build is running. `live` is what readers get meanwhile.
    Building { live: Option<GenerationId> },
    Ready(GenerationId),
}

#[derive(Debug, Default)]
pub struct ArtifactHandle {
    current: ArcSwapOption<IndexSnapshot>,
    building: AtomicBool,
}

/// Clears the building flag when dropped.
#[derive(Debug)]
pub struct BuildGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl ArtifactHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle serving `snapshot` from the start.
    #[must_use]
    pub fn with_snapshot(snapshot: IndexSnapshot) -> Self {
        let handle = Self::new();
        handle.publish(snapshot);
        handle
    }

    /// The snapshot new requests should use.
    #[must_use]
    pub fn current(&self) -> Option<Arc<IndexSnapshot>> {
        self.current.load_full()
    }

    /// Like [`current`](Self::current), but absence is an error.
    pub fn require(&self) -> SearchResult<Arc<IndexSnapshot>> {
        self.current().ok_or_else(|| {
            SearchError::Unavailable("no index generation has been built yet".to_string())
        })
    }

    /// Swap in a new generation. In-flight readers keep the old one.
    pub fn publish(&self, snapshot: IndexSnapshot) -> Arc<IndexSnapshot> {
        let snapshot = Arc::new(snapshot);
        let previous = self.current.swap(Some(Arc::clone(&snapshot)));
        match previous {
            Some(old) => log::info!(
                "Serving generation {} (was {})",
                snapshot.generation_id(),
                old.generation_id()
            ),
            None => log::info!("Serving generation {}", snapshot.generation_id()),
        }
        snapshot
    }

    /// Mark a build as running. `None` if one already is.
    pub fn begin_build(&self) -> Option<BuildGuard<'_>> {
        self.building
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BuildGuard {
                flag: &self.building,
            })
    }

    #[must_use]
    pub fn state(&self) -> GenerationState {
        let live = self.current().map(|s| s.generation_id());
        if self.building.load(Ordering::Acquire) {
            return GenerationState::Building { live };
        }
        match live {
            Some(id) => GenerationState::Ready(id),
            None => GenerationState::Absent,
        }
    }

    /// Pick up a generation another process published to `store`.
    ///
    /// Returns `true` when a new snapshot was swapped in.
    pub fn reload_from(&self, store: &ArtifactStore) -> SearchResult<bool> {
        let known = self.current().map(|s| s.manifest().dir_name());
        match store.load_if_changed(known.as_deref())? {
            Some(snapshot) => {
                self.publish(snapshot);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuildOutcome, IndexBuilder};
    use cadence_core::FeatureVector;

    fn snapshot(ids: &[&str]) -> IndexSnapshot {
        let vectors = ids
            .iter()
            .enumerate()
            .map(|(i, id)| FeatureVector::new(*id, vec![1.0, i as f32 + 1.0]))
            .collect();
        match IndexBuilder::default()
            .with_dimension(2)
            .build_from(vectors)
            .unwrap()
        {
            BuildOutcome::Built { snapshot, .. } => snapshot,
            BuildOutcome::Skipped(_) => panic!("expected a build"),
        }
    }

    #[test]
    fn test_absent_until_published() {
        let handle = ArtifactHandle::new();
        assert_eq!(handle.state(), GenerationState::Absent);
        assert!(handle.current().is_none());
        assert!(handle.require().unwrap_err().is_unavailable());
    }

    #[test]
    fn test_readers_keep_their_generation() {
        let handle = ArtifactHandle::with_snapshot(snapshot(&["a", "b"]));
        let held = handle.require().unwrap();

        let fresh = handle.publish(snapshot(&["a", "b", "c"]));
        assert_eq!(held.lookup().len(), 2);
        assert_eq!(handle.require().unwrap().lookup().len(), 3);
        assert_eq!(handle.state(), GenerationState::Ready(fresh.generation_id()));
    }

    #[test]
    fn test_build_guard() {
        let handle = ArtifactHandle::new();
        {
            let guard = handle.begin_build();
            assert!(guard.is_some());
            assert!(handle.begin_build().is_none());
            assert_eq!(handle.state(), GenerationState::Building { live: None });
        }
        assert_eq!(handle.state(), GenerationState::Absent);
        assert!(handle.begin_build().is_some());
    }

    #[test]
    fn test_reload_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let handle = ArtifactHandle::new();
        assert!(!handle.reload_from(&store).unwrap());

        store.publish(&snapshot(&["a"])).unwrap();
        assert!(handle.reload_from(&store).unwrap());
        assert!(!handle.reload_from(&store).unwrap());
        assert!(matches!(handle.state(), GenerationState::Ready(_)));
    }

    #[test]
    fn test_concurrent_readers() {
        let handle = Arc::new(ArtifactHandle::with_snapshot(snapshot(&["a", "b", "c"])));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = Arc::clone(&handle);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let snap = handle.require().unwrap();
                        assert!(snap.lookup().len() >= 3);
                    }
                })
            })
            .collect();
        for _ in 0..5 {
            handle.publish(snapshot(&["a", "b", "c", "d"]));
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
