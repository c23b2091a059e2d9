//! Registry of capture workers.
//!
//! Ordered collection of `SourceWorker`s keyed by source identifier.
//! Insertion order is preserved — default names (`Source N`) and grid layout
//! both depend on deterministic iteration — and identifiers are unique:
//! discovery and manual adds must never produce two workers for the same
//! physical source.
//!
//! The worker list sits behind an `RwLock` because additions from
//! reconciliation race with iteration by a concurrently polling consumer.
//! Readers take snapshots; the write lock is held across `add`'s open so the
//! uniqueness check and the insert are one atomic step.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backend::CaptureBackend;
use crate::error::{FatalError, OpenError};
use crate::source::SourceId;
use crate::worker::SourceWorker;

pub struct SourceRegistry {
    backend: Arc<dyn CaptureBackend>,
    workers: RwLock<Vec<Arc<SourceWorker>>>,
}

impl SourceRegistry {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            workers: RwLock::new(Vec::new()),
        }
    }

    /// Construct a registry pre-populated with workers for `ids`, named
    /// `Source 0..N` in order. Workers are not started.
    pub fn with_sources(
        backend: Arc<dyn CaptureBackend>,
        ids: impl IntoIterator<Item = SourceId>,
    ) -> Self {
        let registry = Self::new(backend);
        {
            let mut workers = registry.write_workers();
            for id in ids {
                if workers.iter().any(|worker| worker.id() == &id) {
                    log::warn!("duplicate source {} in initial set, skipping", id);
                    continue;
                }
                let name = format!("Source {}", workers.len());
                workers.push(Arc::new(SourceWorker::new(
                    id,
                    name,
                    Arc::clone(&registry.backend),
                )));
            }
        }
        registry
    }

    /// Start every worker, collecting failures instead of aborting: an error
    /// opening source #2 must not prevent source #3 from starting. Failed
    /// workers stay tracked (non-Running) so reconciliation can retry them.
    ///
    /// Fails with `FatalError` only when zero workers started — including
    /// the empty-registry case.
    pub fn start_all(&self) -> Result<usize, FatalError> {
        let workers = self.snapshot();
        let mut started = 0usize;
        for worker in &workers {
            match worker.start() {
                Ok(()) => started += 1,
                Err(err) => log::warn!("[{}] failed to start: {}", worker.name(), err),
            }
        }
        if started == 0 {
            return Err(FatalError {
                attempted: workers.len(),
            });
        }
        Ok(started)
    }

    /// Workers whose capture loop is currently producing frames, in
    /// insertion order. Recomputed on every call — liveness changes
    /// concurrently, so the result is a snapshot, not a cache.
    pub fn active_sources(&self) -> Vec<Arc<SourceWorker>> {
        self.read_workers()
            .iter()
            .filter(|worker| worker.is_active())
            .cloned()
            .collect()
    }

    /// Snapshot of every tracked worker, in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<SourceWorker>> {
        self.read_workers().to_vec()
    }

    pub fn contains(&self, id: &SourceId) -> bool {
        self.read_workers().iter().any(|worker| worker.id() == id)
    }

    pub fn len(&self) -> usize {
        self.read_workers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_workers().is_empty()
    }

    /// Construct and start a worker for a source not yet tracked.
    ///
    /// `name` defaults to `Source N` where N is the registry size at
    /// insertion — names are stable across later removals, not contiguous.
    /// On open failure the worker is logged and discarded; the registry is
    /// not polluted by failed manual adds (dead sources kept for retry all
    /// entered through `start_all`/reconciliation instead).
    ///
    /// An identifier that is already tracked — active or dead — is left
    /// alone and reported via `Ok(None)`.
    pub fn add(
        &self,
        id: SourceId,
        name: Option<String>,
    ) -> Result<Option<Arc<SourceWorker>>, OpenError> {
        // Hold the write lock across the open: the uniqueness check and the
        // insert must not interleave with a concurrent add of the same id.
        let mut workers = self.write_workers();
        if workers.iter().any(|worker| worker.id() == &id) {
            log::debug!("source {} already tracked, not adding a duplicate", id);
            return Ok(None);
        }
        let name = name.unwrap_or_else(|| format!("Source {}", workers.len()));
        let worker = Arc::new(SourceWorker::new(
            id,
            name,
            Arc::clone(&self.backend),
        ));
        worker.start().map_err(|err| {
            log::warn!("[{}] discarding failed add: {}", worker.name(), err);
            err
        })?;
        workers.push(Arc::clone(&worker));
        Ok(Some(worker))
    }

    /// Remove a worker, stopping it first. Names of remaining workers are
    /// not renumbered.
    pub fn remove(&self, id: &SourceId) -> bool {
        let removed = {
            let mut workers = self.write_workers();
            match workers.iter().position(|worker| worker.id() == id) {
                Some(index) => Some(workers.remove(index)),
                None => None,
            }
        };
        match removed {
            Some(worker) => {
                worker.stop();
                true
            }
            None => false,
        }
    }

    /// Stop every worker. Always terminates: `stop` itself cannot fail, and
    /// a panicked capture thread is logged by the worker rather than
    /// propagated, so teardown never hangs on one bad source.
    pub fn stop_all(&self) {
        for worker in self.snapshot() {
            worker.stop();
        }
    }

    fn read_workers(&self) -> RwLockReadGuard<'_, Vec<Arc<SourceWorker>>> {
        self.workers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_workers(&self) -> RwLockWriteGuard<'_, Vec<Arc<SourceWorker>>> {
        self.workers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::stub::{StubBackend, StubPlan};

    #[test]
    fn workers_are_named_by_insertion_order() {
        let backend = StubBackend::new()
            .with_source(0u32, StubPlan::endless(500.0))
            .with_source(1u32, StubPlan::endless(500.0));
        let registry = SourceRegistry::with_sources(
            Arc::new(backend),
            [SourceId::Device(0), SourceId::Device(1)],
        );

        let names: Vec<_> = registry
            .snapshot()
            .iter()
            .map(|worker| worker.name().to_string())
            .collect();
        assert_eq!(names, vec!["Source 0", "Source 1"]);
    }

    #[test]
    fn duplicate_initial_ids_are_skipped() {
        let backend = StubBackend::new().with_source(0u32, StubPlan::endless(500.0));
        let registry = SourceRegistry::with_sources(
            Arc::new(backend),
            [SourceId::Device(0), SourceId::Device(0)],
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn add_rejects_tracked_identifier() {
        let backend = StubBackend::new().with_source(0u32, StubPlan::endless(500.0));
        let registry = SourceRegistry::new(Arc::new(backend));

        assert!(registry.add(SourceId::Device(0), None).unwrap().is_some());
        assert!(registry.add(SourceId::Device(0), None).unwrap().is_none());
        assert_eq!(registry.len(), 1);
        registry.stop_all();
    }

    #[test]
    fn failed_add_is_discarded() {
        let backend = StubBackend::new().with_source(0u32, StubPlan::failing());
        let registry = SourceRegistry::new(Arc::new(backend));

        assert!(registry.add(SourceId::Device(0), None).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_stops_and_forgets_the_worker() {
        let backend = StubBackend::new().with_source(0u32, StubPlan::endless(500.0));
        let registry = SourceRegistry::new(Arc::new(backend));
        registry.add(SourceId::Device(0), None).unwrap();

        assert!(registry.remove(&SourceId::Device(0)));
        assert!(registry.is_empty());
        assert!(!registry.remove(&SourceId::Device(0)));
    }

    #[test]
    fn start_all_on_empty_registry_is_fatal() {
        let registry = SourceRegistry::new(Arc::new(StubBackend::new()));
        let err = registry.start_all().unwrap_err();
        assert_eq!(err.attempted, 0);
    }
}
