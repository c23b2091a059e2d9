//! Capture manager.
//!
//! `CaptureManager` composes the registry with a discovery adapter and
//! implements restart-and-reconcile: dead sources are revived, newly
//! reachable ones are added, and nothing already tracked is ever duplicated.
//! The manager keeps no state of its own beyond the registry and the
//! adapter; reconciliation is an operation, not persisted state, and it runs
//! on demand (an operator command), not on an internal timer.

use std::sync::Arc;

use crate::discovery::DiscoveryAdapter;
use crate::error::FatalError;
use crate::registry::SourceRegistry;
use crate::worker::{SourceWorker, WorkerState};

/// Outcome summary of one `reconcile` pass, for the operator log line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Identifiers reported by discovery.
    pub discovered: usize,
    /// New workers added (and started) this pass.
    pub added: usize,
    /// Previously inactive workers brought back to Running.
    pub revived: usize,
    /// Workers that failed to restart; retried on the next pass.
    pub still_dead: usize,
}

pub struct CaptureManager {
    registry: SourceRegistry,
    discovery: Box<dyn DiscoveryAdapter>,
}

impl CaptureManager {
    pub fn new(registry: SourceRegistry, discovery: Box<dyn DiscoveryAdapter>) -> Self {
        Self {
            registry,
            discovery,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Start every tracked worker. `FatalError` only when none started.
    pub fn start_all(&self) -> Result<usize, FatalError> {
        self.registry.start_all()
    }

    /// Workers currently producing frames, in insertion order.
    pub fn active_sources(&self) -> Vec<Arc<SourceWorker>> {
        self.registry.active_sources()
    }

    /// Stop every tracked worker. Never fails.
    pub fn stop_all(&self) {
        self.registry.stop_all()
    }

    /// Re-sync tracked sources against live discovery:
    ///
    /// 1. Ask the adapter for the full current set of reachable sources.
    /// 2. Filter out identifiers already tracked — active or dead — so one
    ///    physical source never gets two workers.
    /// 3. Add (and start) a worker per new identifier; one that fails to
    ///    open is discarded and will be rediscovered next pass.
    /// 4. Restart every tracked worker that died or never managed to start.
    ///    Failures are logged, the worker stays Dead, and the next pass
    ///    retries it. Intentionally Stopped workers are left alone — only
    ///    `start_all` brings those back.
    ///
    /// Never escalates: reconciliation always completes, whatever individual
    /// sources do.
    pub fn reconcile(&self) -> ReconcileStats {
        let mut stats = ReconcileStats::default();

        let listed = self.discovery.list_sources();
        stats.discovered = listed.len();
        for id in listed {
            if self.registry.contains(&id) {
                continue;
            }
            match self.registry.add(id.clone(), None) {
                Ok(Some(worker)) => {
                    stats.added += 1;
                    log::info!("[{}] discovered and started {}", worker.name(), id);
                }
                // Raced with a concurrent add of the same id; nothing to do.
                Ok(None) => {}
                Err(err) => log::warn!("discovered {} but could not start it: {}", id, err),
            }
        }

        for worker in self.registry.snapshot() {
            if !matches!(worker.state(), WorkerState::Dead | WorkerState::Created) {
                continue;
            }
            match worker.restart() {
                Ok(()) => {
                    stats.revived += 1;
                    log::info!("[{}] revived", worker.name());
                }
                Err(err) => {
                    stats.still_dead += 1;
                    log::warn!(
                        "[{}] restart failed, will retry on next reconcile: {}",
                        worker.name(),
                        err
                    );
                }
            }
        }

        stats
    }
}
