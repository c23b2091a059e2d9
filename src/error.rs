//! Error taxonomy for the capture core.
//!
//! Three conditions matter, and they are kept apart on purpose:
//!
//! - `OpenError`: the backend could not acquire a source. Surfaced to the
//!   caller of `start()`/`restart()`; the worker stays non-Running.
//! - `ReadError`: a capture loop could not read the next frame. This is the
//!   normal terminal condition of a finite file or an unplugged device, not
//!   a bug; the worker transitions to Dead and waits for reconciliation.
//! - `FatalError`: zero sources could be started across the whole registry.
//!   The only condition that escalates past the registry boundary.
//!
//! Per-worker failures never cross into the consumer as errors; they surface
//! as a state change visible through `is_active()`.

use thiserror::Error;

use crate::source::SourceId;

/// The backend could not acquire a source.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The device or file could not be opened.
    #[error("failed to open {id}: {reason}")]
    Unreachable { id: SourceId, reason: String },

    /// The source opened but could not produce a probe frame. Treated the
    /// same as an open failure so a half-working source never reaches
    /// Running.
    #[error("{id} opened but produced no frame: {reason}")]
    NoInitialFrame { id: SourceId, reason: String },

    /// No compiled-in backend handles this kind of identifier.
    #[error("no capture backend available for {id}")]
    Unsupported { id: SourceId },
}

impl OpenError {
    pub fn unreachable(id: &SourceId, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            id: id.clone(),
            reason: reason.into(),
        }
    }
}

/// A capture loop could not read the next frame.
///
/// Both variants are terminal for the current handle; retrying the same
/// handle is pointless. Recovery is a reopen via `restart()`.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The stream is exhausted (end of file).
    #[error("end of stream")]
    EndOfStream,

    /// The device disconnected or the decoder gave up mid-stream.
    #[error("source disconnected: {0}")]
    Disconnected(String),
}

/// Zero sources could be started across the whole registry.
#[derive(Debug, Error)]
#[error("no capture source could be started ({attempted} attempted)")]
pub struct FatalError {
    pub attempted: usize,
}
