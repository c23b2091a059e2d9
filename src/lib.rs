//! feedhub - multi-source video capture hub.
//!
//! This crate keeps the most recent frame from each of a changing set of
//! video sources (capture devices and video files) available to consumers,
//! without letting any one source's I/O latency stall the rest.
//!
//! # Architecture
//!
//! - One capture loop per source, on its own thread, reading at the source's
//!   native rate. Loops never share locks with each other.
//! - A mutex-guarded single-slot handoff per source: the loop overwrites,
//!   consumers copy out. Last-write-wins — bounded staleness, bounded
//!   memory, no queues.
//! - A registry of workers with set-wide start/stop that degrades per
//!   source: one dead camera means one missing feed, never a crash.
//! - Restart-and-reconcile: on demand, the manager re-syncs the registry
//!   against live discovery, adding new sources and reviving dead ones.
//!
//! # Module Structure
//!
//! - `frame`: decoded frames and grid composition
//! - `source`: source identifiers (device index or file path)
//! - `backend`: capture backend seam (stub, V4L2, FFmpeg)
//! - `worker`: per-source capture loop and lifecycle
//! - `registry` / `manager`: worker set, reconciliation
//! - `discovery`: device probing and media folder scanning
//! - `annotate` / `accel`: presentation-layer seams
//! - `config`: daemon configuration layering

pub mod accel;
pub mod annotate;
pub mod backend;
pub mod config;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod manager;
pub mod registry;
pub mod source;
pub mod worker;

pub use annotate::{Annotator, PassthroughAnnotator};
pub use backend::stub::{StubBackend, StubPlan};
pub use backend::{CaptureBackend, CaptureHandle, CaptureSettings, SystemBackend};
pub use config::FeedhubConfig;
pub use discovery::{DiscoveryAdapter, FsDiscovery, StaticDiscovery};
pub use error::{FatalError, OpenError, ReadError};
pub use frame::{compose_grid, Frame};
pub use manager::{CaptureManager, ReconcileStats};
pub use registry::SourceRegistry;
pub use source::SourceId;
pub use worker::{SourceWorker, WorkerState, WorkerStats, DEFAULT_NOMINAL_FPS};
