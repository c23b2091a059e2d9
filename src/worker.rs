//! Per-source capture worker.
//!
//! A `SourceWorker` owns one source's capture loop: a dedicated thread that
//! reads frames at the source's native rate and publishes each one into a
//! mutex-guarded single slot. The slot is last-write-wins — no queue, no
//! backlog, at most one frame per source in memory. A consumer that polls
//! slower than the source sees only the newest frame; one that polls faster
//! sees the previous frame again until the next write.
//!
//! Lifecycle: Created -> Running on a successful open; Running -> Dead when
//! a read fails (expected for finite files and unplugged devices); Running
//! -> Stopped only through the intentional `stop()` path. Dead workers are
//! eligible for unattended restart by reconciliation; Stopped ones are not.
//!
//! Concurrency: the frame slot has one writer (the worker's own loop) and
//! any number of copy-out readers. The lifecycle mutex serializes
//! start/stop/restart, which upholds the at-most-one-loop invariant. Reads
//! never take the lifecycle mutex, so consumers are never blocked behind a
//! restart.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::backend::{CaptureBackend, CaptureHandle};
use crate::error::{OpenError, ReadError};
use crate::frame::Frame;
use crate::source::SourceId;

/// Fallback frame rate when the backend reports a non-positive value.
pub const DEFAULT_NOMINAL_FPS: f64 = 30.0;

/// Worker lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Constructed, never started.
    Created = 0,
    /// Capture loop is producing frames.
    Running = 1,
    /// Intentionally shut down; not eligible for unattended restart.
    Stopped = 2,
    /// Capture loop exited on a read failure; reconciliation may revive it.
    Dead = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Running,
            2 => WorkerState::Stopped,
            3 => WorkerState::Dead,
            _ => WorkerState::Created,
        }
    }
}

/// State shared between the worker facade and its capture loop.
struct Slot {
    latest: Mutex<Option<Frame>>,
    state: AtomicU8,
    frames_captured: AtomicU64,
}

impl Slot {
    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Compare-and-swap transition; returns true when this call moved the
    /// state. Loses gracefully against a concurrent transition.
    fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// The slot only ever holds a fully written `Option<Frame>`; a poisoned lock
/// still guards coherent data, so recover instead of propagating.
fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Snapshot of one worker's counters for health logging.
#[derive(Clone, Debug)]
pub struct WorkerStats {
    pub name: String,
    pub id: SourceId,
    pub state: WorkerState,
    pub frames_captured: u64,
    pub nominal_fps: f64,
}

/// One capture source and its lifecycle.
pub struct SourceWorker {
    id: SourceId,
    name: String,
    backend: Arc<dyn CaptureBackend>,
    slot: Arc<Slot>,
    nominal_fps: Mutex<f64>,
    /// Join handle of the capture loop. Guarded by a mutex so start/stop/
    /// restart serialize; holding it across the open keeps a second loop
    /// from spawning in between.
    lifecycle: Mutex<Option<JoinHandle<()>>>,
}

impl SourceWorker {
    pub fn new(id: SourceId, name: impl Into<String>, backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            id,
            name: name.into(),
            backend,
            slot: Arc::new(Slot {
                latest: Mutex::new(None),
                state: AtomicU8::new(WorkerState::Created as u8),
                frames_captured: AtomicU64::new(0),
            }),
            nominal_fps: Mutex::new(DEFAULT_NOMINAL_FPS),
            lifecycle: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &SourceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        self.slot.state()
    }

    /// True iff the capture loop is producing frames.
    pub fn is_active(&self) -> bool {
        self.slot.state() == WorkerState::Running
    }

    /// Nominal frame rate of the last successful open.
    pub fn nominal_fps(&self) -> f64 {
        *lock_recover(&self.nominal_fps)
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            name: self.name.clone(),
            id: self.id.clone(),
            state: self.slot.state(),
            frames_captured: self.slot.frames_captured.load(Ordering::Relaxed),
            nominal_fps: self.nominal_fps(),
        }
    }

    /// Open the source and spawn the capture loop.
    ///
    /// Transitions Created/Stopped/Dead -> Running. A worker that is already
    /// Running is left alone. On failure the state is unchanged (still
    /// non-Running) and no thread was spawned.
    ///
    /// The open is followed by a probe read: a source that opens but cannot
    /// produce a frame fails here as `OpenError::NoInitialFrame` instead of
    /// dying one instant after start. The probe frame becomes the initial
    /// slot content, so `read()` has data as soon as `start()` returns.
    pub fn start(&self) -> Result<(), OpenError> {
        let mut lifecycle = lock_recover(&self.lifecycle);
        if self.slot.state() == WorkerState::Running {
            return Ok(());
        }
        // Reap the previous loop, if any, before opening a new handle.
        if let Some(join) = lifecycle.take() {
            if join.join().is_err() {
                log::warn!("[{}] previous capture thread panicked", self.name);
            }
        }

        let mut handle = self.backend.open(&self.id)?;

        let reported = handle.nominal_fps();
        let fps = if reported > 0.0 {
            reported
        } else {
            DEFAULT_NOMINAL_FPS
        };
        *lock_recover(&self.nominal_fps) = fps;

        let probe = handle.read_frame().map_err(|err| OpenError::NoInitialFrame {
            id: self.id.clone(),
            reason: err.to_string(),
        })?;
        *lock_recover(&self.slot.latest) = Some(probe);
        self.slot.frames_captured.fetch_add(1, Ordering::Relaxed);

        self.slot.set_state(WorkerState::Running);
        let slot = Arc::clone(&self.slot);
        let name = self.name.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("capture-{}", self.name))
            .spawn(move || capture_loop(handle, slot, fps, name));
        match spawned {
            Ok(join) => {
                *lifecycle = Some(join);
                log::info!("[{}] started ({} @ {:.1} fps)", self.name, self.id, fps);
                Ok(())
            }
            Err(err) => {
                // Could not spawn: roll back so the worker is visibly not
                // running. The handle is released on drop.
                self.slot.set_state(WorkerState::Dead);
                Err(OpenError::unreachable(
                    &self.id,
                    format!("failed to spawn capture thread: {}", err),
                ))
            }
        }
    }

    /// Copy out the latest frame.
    ///
    /// Returns `None` unless the worker is Running — a Dead source stops
    /// serving its stale last frame immediately rather than indefinitely.
    /// The returned frame is an independent copy; mutating it cannot touch
    /// the slot the loop keeps overwriting.
    pub fn read(&self) -> Option<Frame> {
        if self.slot.state() != WorkerState::Running {
            return None;
        }
        lock_recover(&self.slot.latest).clone()
    }

    /// Signal the capture loop to exit and wait until it has.
    ///
    /// Only the Running -> Stopped edge is taken here; a Dead worker stays
    /// Dead so reconciliation still sees it as revivable. Idempotent: a
    /// second call finds no thread to join and no state to change. When this
    /// returns, the loop has exited and the capture handle is released.
    pub fn stop(&self) {
        let mut lifecycle = lock_recover(&self.lifecycle);
        if self.slot.transition(WorkerState::Running, WorkerState::Stopped) {
            log::info!("[{}] stopping", self.name);
        }
        if let Some(join) = lifecycle.take() {
            if join.join().is_err() {
                log::warn!("[{}] capture thread panicked", self.name);
            }
        }
    }

    /// `stop()` followed by a fresh open and start.
    ///
    /// On reopen failure the worker is left Dead — not Stopped — so the
    /// failure is visible to the caller and the worker remains eligible for
    /// the next reconciliation pass.
    pub fn restart(&self) -> Result<(), OpenError> {
        self.stop();
        self.start().map_err(|err| {
            self.slot.set_state(WorkerState::Dead);
            err
        })
    }
}

/// The capture loop. Runs on the worker's dedicated thread; the only writer
/// of the frame slot and the only code that takes the Running -> Dead edge.
fn capture_loop(mut handle: Box<dyn CaptureHandle>, slot: Arc<Slot>, fps: f64, name: String) {
    let delay = Duration::from_secs_f64(1.0 / fps);
    loop {
        // Cooperative stop: re-check every iteration, exit at the boundary.
        if slot.state() != WorkerState::Running {
            break;
        }
        match handle.read_frame() {
            Ok(frame) => {
                *lock_recover(&slot.latest) = Some(frame);
                slot.frames_captured.fetch_add(1, Ordering::Relaxed);
                std::thread::sleep(delay);
            }
            Err(err) => {
                // A concurrent stop() wins the race: if the state is no
                // longer Running this transition fails and Stopped stands.
                if slot.transition(WorkerState::Running, WorkerState::Dead) {
                    match err {
                        ReadError::EndOfStream => {
                            log::info!("[{}] stream ended, marking dead", name)
                        }
                        ReadError::Disconnected(_) => {
                            log::warn!("[{}] {}, marking dead", name, err)
                        }
                    }
                }
                break;
            }
        }
    }
    // Dropping the handle here releases the underlying device/file on both
    // the stop path and the death path.
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::stub::{StubBackend, StubPlan};
    use std::time::Instant;

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    fn worker_for(backend: StubBackend, id: impl Into<SourceId>) -> SourceWorker {
        let id = id.into();
        let name = id.default_label();
        SourceWorker::new(id, name, Arc::new(backend))
    }

    #[test]
    fn start_produces_frames_and_stop_goes_quiet() {
        let backend = StubBackend::new().with_source(0u32, StubPlan::endless(500.0));
        let worker = worker_for(backend, 0u32);

        assert_eq!(worker.state(), WorkerState::Created);
        worker.start().unwrap();
        assert!(worker.is_active());
        // The probe read guarantees a frame right away.
        assert!(worker.read().is_some());

        worker.stop();
        assert!(!worker.is_active());
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert!(worker.read().is_none());
    }

    #[test]
    fn stop_is_idempotent() {
        let backend = StubBackend::new().with_source(0u32, StubPlan::endless(500.0));
        let worker = worker_for(backend, 0u32);
        worker.start().unwrap();

        worker.stop();
        worker.stop();
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[test]
    fn read_returns_an_independent_copy() {
        let backend = StubBackend::new().with_source(0u32, StubPlan::endless(500.0));
        let worker = worker_for(backend, 0u32);
        worker.start().unwrap();

        let mut copied = worker.read().unwrap();
        for byte in copied.data.iter_mut() {
            *byte = 0xFF;
        }
        let fresh = worker.read().unwrap();
        // Either the same frame or a newer one; never the mutated buffer.
        assert_ne!(fresh.data, copied.data);

        worker.stop();
    }

    #[test]
    fn open_failure_leaves_worker_non_running() {
        let backend = StubBackend::new().with_source(0u32, StubPlan::failing());
        let worker = worker_for(backend, 0u32);

        assert!(worker.start().is_err());
        assert!(!worker.is_active());
        assert_eq!(worker.state(), WorkerState::Created);
        assert!(worker.read().is_none());
    }

    #[test]
    fn end_of_stream_marks_worker_dead() {
        let backend = StubBackend::new().with_source(0u32, StubPlan::finite(5, 500.0));
        let worker = worker_for(backend, 0u32);
        worker.start().unwrap();

        assert!(wait_until(Duration::from_secs(2), || !worker.is_active()));
        assert_eq!(worker.state(), WorkerState::Dead);
        assert!(worker.read().is_none());
    }

    #[test]
    fn restart_reopens_from_the_beginning() {
        let backend = StubBackend::new().with_source(0u32, StubPlan::finite(3, 500.0));
        let worker = worker_for(backend.clone(), 0u32);
        worker.start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            worker.state() == WorkerState::Dead
        }));

        // The source has recovered (e.g. the file keeps growing).
        backend.set_plan(0u32, StubPlan::endless(500.0));
        worker.restart().unwrap();
        assert!(worker.is_active());
        assert!(worker.read().is_some());
        assert_eq!(backend.open_count(&SourceId::Device(0)), 2);

        worker.stop();
    }

    #[test]
    fn failed_restart_leaves_worker_dead() {
        let backend = StubBackend::new().with_source(0u32, StubPlan::finite(2, 500.0));
        let worker = worker_for(backend.clone(), 0u32);
        worker.start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            worker.state() == WorkerState::Dead
        }));

        backend.set_fail_open(&SourceId::Device(0), true);
        assert!(worker.restart().is_err());
        assert_eq!(worker.state(), WorkerState::Dead);
    }

    #[test]
    fn non_positive_reported_fps_falls_back_to_default() {
        let backend = StubBackend::new().with_source(0u32, StubPlan::endless(0.0));
        let worker = worker_for(backend, 0u32);
        worker.start().unwrap();

        assert_eq!(worker.nominal_fps(), DEFAULT_NOMINAL_FPS);
        worker.stop();
    }

    #[test]
    fn no_writes_happen_after_stop_returns() {
        let backend = StubBackend::new().with_source(0u32, StubPlan::endless(500.0));
        let worker = worker_for(backend, 0u32);
        worker.start().unwrap();
        worker.stop();

        let count = worker.stats().frames_captured;
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(worker.stats().frames_captured, count);
    }
}
