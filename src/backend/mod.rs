//! Capture backends.
//!
//! This module is the seam between the lifecycle core and whatever actually
//! decodes pixels:
//! - `CaptureBackend` opens a source identifier into a `CaptureHandle`.
//! - `CaptureHandle` reads one frame at a time and reports the source's
//!   nominal frame rate. Releasing the underlying device happens in `Drop`,
//!   so a handle owned by a capture loop is released when the loop exits.
//!
//! Implementations:
//! - `stub`: synthetic in-memory sources with scripted failures (tests and
//!   stub deployments)
//! - `v4l2`: local capture devices (feature: capture-v4l2)
//! - `ffmpeg`: local video files (feature: capture-ffmpeg)
//!
//! Backends decode; they do not retry, queue, or track lifecycle. A read
//! failure is terminal for the handle and the worker decides what happens
//! next.

pub mod stub;

#[cfg(feature = "capture-ffmpeg")]
pub mod ffmpeg;
#[cfg(feature = "capture-v4l2")]
pub mod v4l2;

use crate::error::{OpenError, ReadError};
use crate::frame::Frame;
use crate::source::SourceId;

/// One open capture source. Owned by exactly one capture loop at a time.
pub trait CaptureHandle: Send {
    /// Read and decode the next frame.
    ///
    /// An `Err` is terminal for this handle: end of file, device unplugged,
    /// decoder wedged. Transient decode hiccups that the backend can skip
    /// over are handled internally and never surface here.
    fn read_frame(&mut self) -> Result<Frame, ReadError>;

    /// Nominal frame rate of the underlying source. May be zero or negative
    /// when the backend cannot tell; callers substitute a default.
    fn nominal_fps(&self) -> f64;
}

/// Opens source identifiers into capture handles.
///
/// Shared by every worker and by device-probing discovery, hence
/// `Send + Sync`. Opening must not leak the device on failure.
pub trait CaptureBackend: Send + Sync {
    fn open(&self, id: &SourceId) -> Result<Box<dyn CaptureHandle>, OpenError>;
}

/// Decode settings shared by the real backends.
#[derive(Clone, Copy, Debug)]
pub struct CaptureSettings {
    /// Requested device frame rate. Files ignore this; their container
    /// reports the rate.
    pub target_fps: u32,
    /// Preferred capture width (devices only; best effort).
    pub width: u32,
    /// Preferred capture height (devices only; best effort).
    pub height: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

/// Routes identifiers to the compiled-in real backends: devices to V4L2,
/// files to FFmpeg. Identifier kinds without a compiled backend fail with
/// `OpenError::Unsupported` rather than panicking, so a deployment with only
/// one feature enabled degrades per source.
pub struct SystemBackend {
    settings: CaptureSettings,
}

impl SystemBackend {
    pub fn new(settings: CaptureSettings) -> Self {
        Self { settings }
    }
}

impl CaptureBackend for SystemBackend {
    fn open(&self, id: &SourceId) -> Result<Box<dyn CaptureHandle>, OpenError> {
        match id {
            SourceId::Device(_) => {
                #[cfg(feature = "capture-v4l2")]
                {
                    v4l2::open_device(id, &self.settings)
                }
                #[cfg(not(feature = "capture-v4l2"))]
                {
                    let _ = &self.settings;
                    Err(OpenError::Unsupported { id: id.clone() })
                }
            }
            SourceId::File(_) => {
                #[cfg(feature = "capture-ffmpeg")]
                {
                    ffmpeg::open_file(id, &self.settings)
                }
                #[cfg(not(feature = "capture-ffmpeg"))]
                {
                    Err(OpenError::Unsupported { id: id.clone() })
                }
            }
        }
    }
}
