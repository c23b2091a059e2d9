//! V4L2 device backend.
//!
//! Opens local capture devices (`/dev/videoN`) through libv4l with a
//! memory-mapped buffer stream. Format negotiation is best effort: the
//! device keeps whatever format it refuses to change, and the negotiated
//! dimensions are what frames report. Enabled by the `capture-v4l2` feature.

use ouroboros::self_referencing;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;

use crate::backend::{CaptureHandle, CaptureSettings};
use crate::error::{OpenError, ReadError};
use crate::frame::Frame;
use crate::source::SourceId;

pub(crate) fn open_device(
    id: &SourceId,
    settings: &CaptureSettings,
) -> Result<Box<dyn CaptureHandle>, OpenError> {
    let SourceId::Device(index) = id else {
        return Err(OpenError::Unsupported { id: id.clone() });
    };

    let mut device = v4l::Device::new(*index as usize)
        .map_err(|err| OpenError::unreachable(id, format!("open v4l2 device: {}", err)))?;

    let mut format = device
        .format()
        .map_err(|err| OpenError::unreachable(id, format!("read v4l2 format: {}", err)))?;
    format.width = settings.width;
    format.height = settings.height;
    format.fourcc = v4l::FourCC::new(b"RGB3");
    let format = match device.set_format(&format) {
        Ok(format) => format,
        Err(err) => {
            log::warn!("[{}] failed to set format: {}", id, err);
            device.format().map_err(|err| {
                OpenError::unreachable(id, format!("read v4l2 format after set failure: {}", err))
            })?
        }
    };

    let nominal_fps = negotiate_fps(&mut device, id, settings.target_fps);

    let stream = V4l2StreamTryBuilder {
        device,
        stream_builder: |device| {
            MmapStream::with_buffers(device, Type::VideoCapture, 4)
                .map_err(|err| OpenError::unreachable(id, format!("create buffer stream: {}", err)))
        },
    }
    .try_build()?;

    log::info!(
        "[{}] v4l2 open ({}x{} @ {:.1} fps)",
        id,
        format.width,
        format.height,
        nominal_fps
    );

    Ok(Box::new(V4l2Handle {
        stream,
        width: format.width,
        height: format.height,
        nominal_fps,
        seq: 0,
    }))
}

/// Ask for the configured rate and report what the driver actually granted.
/// Zero when the driver will not say; the worker substitutes its default.
fn negotiate_fps(device: &mut v4l::Device, id: &SourceId, target_fps: u32) -> f64 {
    if target_fps > 0 {
        let params = v4l::video::capture::Parameters::with_fps(target_fps);
        if let Err(err) = device.set_params(&params) {
            log::warn!("[{}] failed to set fps: {}", id, err);
        }
    }
    match device.params() {
        Ok(params) => {
            let interval = params.interval;
            if interval.numerator == 0 {
                0.0
            } else {
                interval.denominator as f64 / interval.numerator as f64
            }
        }
        Err(_) => target_fps as f64,
    }
}

// The stream borrows the device it reads from; ouroboros lets the handle own
// both without a second allocation of the device.
#[self_referencing]
struct V4l2Stream {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: MmapStream<'this, v4l::Device>,
}

struct V4l2Handle {
    stream: V4l2Stream,
    width: u32,
    height: u32,
    nominal_fps: f64,
    seq: u64,
}

impl CaptureHandle for V4l2Handle {
    fn read_frame(&mut self) -> Result<Frame, ReadError> {
        let data = self.stream.with_stream_mut(|stream| match stream.next() {
            Ok((buf, _meta)) => Ok(buf.to_vec()),
            Err(err) => Err(ReadError::Disconnected(err.to_string())),
        })?;
        self.seq += 1;
        Ok(Frame::new(data, self.width, self.height, self.seq))
    }

    fn nominal_fps(&self) -> f64 {
        self.nominal_fps
    }
}
