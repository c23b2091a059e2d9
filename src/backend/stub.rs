//! Synthetic capture backend.
//!
//! `StubBackend` serves generated frames from memory with scripted behavior
//! per source: open failures, end-of-stream after a fixed number of frames,
//! arbitrary reported frame rates. It backs the test suite and `feedhubd
//! --stub` runs on machines with no cameras or media files.
//!
//! Behavior can be rescripted while workers are running (e.g. flip a source
//! from failing to openable to simulate a replugged camera); handles that
//! are already open keep the plan they were opened with.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::{CaptureBackend, CaptureHandle};
use crate::error::{OpenError, ReadError};
use crate::frame::Frame;
use crate::source::SourceId;

/// Scripted behavior for one stub source.
#[derive(Clone, Debug)]
pub struct StubPlan {
    /// Frame rate the handle reports. Zero exercises the caller's default.
    pub fps: f64,
    /// Reads served before `EndOfStream`; `None` streams forever. The
    /// countdown restarts on every open, like rewinding a file.
    pub frames_until_eof: Option<u64>,
    /// When true, `open` fails.
    pub fail_open: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for StubPlan {
    fn default() -> Self {
        Self {
            fps: 240.0,
            frames_until_eof: None,
            fail_open: false,
            width: 64,
            height: 48,
        }
    }
}

impl StubPlan {
    pub fn endless(fps: f64) -> Self {
        Self {
            fps,
            ..Self::default()
        }
    }

    pub fn finite(frames: u64, fps: f64) -> Self {
        Self {
            fps,
            frames_until_eof: Some(frames),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct StubState {
    plans: HashMap<SourceId, StubPlan>,
    opens: HashMap<SourceId, u64>,
}

/// In-memory backend with per-source scripted plans.
///
/// Cloning shares the script, so a test can hold one end and hand the other
/// to a registry.
#[derive(Clone, Default)]
pub struct StubBackend {
    state: Arc<Mutex<StubState>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source plan. Builder-style for test setup.
    pub fn with_source(self, id: impl Into<SourceId>, plan: StubPlan) -> Self {
        self.set_plan(id, plan);
        self
    }

    /// Register or replace a source plan.
    pub fn set_plan(&self, id: impl Into<SourceId>, plan: StubPlan) {
        self.lock_state().plans.insert(id.into(), plan);
    }

    /// Flip open behavior for an already-registered source.
    pub fn set_fail_open(&self, id: &SourceId, fail: bool) {
        if let Some(plan) = self.lock_state().plans.get_mut(id) {
            plan.fail_open = fail;
        }
    }

    /// How many times `open` succeeded for this source.
    pub fn open_count(&self, id: &SourceId) -> u64 {
        self.lock_state().opens.get(id).copied().unwrap_or(0)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, StubState> {
        // Plans are plain data; a poisoned lock still guards a coherent map.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CaptureBackend for StubBackend {
    fn open(&self, id: &SourceId) -> Result<Box<dyn CaptureHandle>, OpenError> {
        let mut state = self.lock_state();
        let plan = match state.plans.get(id) {
            Some(plan) => plan.clone(),
            None => {
                return Err(OpenError::unreachable(id, "no such stub source"));
            }
        };
        if plan.fail_open {
            return Err(OpenError::unreachable(id, "stub scripted open failure"));
        }
        *state.opens.entry(id.clone()).or_insert(0) += 1;
        Ok(Box::new(StubHandle {
            plan,
            remaining: None,
            seq: 0,
        }))
    }
}

struct StubHandle {
    plan: StubPlan,
    /// Reads left before EOF; initialized lazily from the plan.
    remaining: Option<u64>,
    seq: u64,
}

impl CaptureHandle for StubHandle {
    fn read_frame(&mut self) -> Result<Frame, ReadError> {
        if let Some(total) = self.plan.frames_until_eof {
            let left = self.remaining.get_or_insert(total);
            if *left == 0 {
                return Err(ReadError::EndOfStream);
            }
            *left -= 1;
        }
        self.seq += 1;
        Ok(Frame::new(
            synthetic_pixels(self.plan.width, self.plan.height, self.seq),
            self.plan.width,
            self.plan.height,
            self.seq,
        ))
    }

    fn nominal_fps(&self) -> f64 {
        self.plan.fps
    }
}

/// Deterministic pattern that varies per frame so staleness is observable.
fn synthetic_pixels(width: u32, height: u32, seq: u64) -> Vec<u8> {
    let pixel_count = (width * height * 3) as usize;
    let mut pixels = vec![0u8; pixel_count];
    for (i, pixel) in pixels.iter_mut().enumerate() {
        *pixel = ((i as u64 + seq) % 256) as u8;
    }
    pixels
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_plan_ends_after_scripted_reads() {
        let backend = StubBackend::new().with_source(0u32, StubPlan::finite(2, 100.0));
        let mut handle = backend.open(&SourceId::Device(0)).unwrap();

        assert!(handle.read_frame().is_ok());
        assert!(handle.read_frame().is_ok());
        assert!(matches!(handle.read_frame(), Err(ReadError::EndOfStream)));
    }

    #[test]
    fn reopen_rewinds_the_countdown() {
        let backend = StubBackend::new().with_source(0u32, StubPlan::finite(1, 100.0));
        let id = SourceId::Device(0);

        let mut first = backend.open(&id).unwrap();
        assert!(first.read_frame().is_ok());
        assert!(first.read_frame().is_err());

        let mut second = backend.open(&id).unwrap();
        assert!(second.read_frame().is_ok());
        assert_eq!(backend.open_count(&id), 2);
    }

    #[test]
    fn unknown_and_failing_sources_do_not_open() {
        let backend = StubBackend::new().with_source(1u32, StubPlan::failing());
        assert!(backend.open(&SourceId::Device(0)).is_err());
        assert!(backend.open(&SourceId::Device(1)).is_err());
        assert_eq!(backend.open_count(&SourceId::Device(1)), 0);
    }

    #[test]
    fn frames_vary_by_sequence() {
        let backend = StubBackend::new().with_source(0u32, StubPlan::endless(100.0));
        let mut handle = backend.open(&SourceId::Device(0)).unwrap();
        let a = handle.read_frame().unwrap();
        let b = handle.read_frame().unwrap();
        assert_ne!(a.data, b.data);
        assert_eq!(a.seq + 1, b.seq);
    }
}
