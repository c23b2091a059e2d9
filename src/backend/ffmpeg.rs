//! Video file backend.
//!
//! Decodes local video files through FFmpeg, scaling every frame to tightly
//! packed RGB24. Exhausting the container is reported as
//! `ReadError::EndOfStream` — the expected end of a finite file, which the
//! worker answers by going Dead until a restart rewinds it with a fresh
//! handle. Enabled by the `capture-ffmpeg` feature.

use ffmpeg_next as ffmpeg;

use crate::backend::{CaptureHandle, CaptureSettings};
use crate::error::{OpenError, ReadError};
use crate::frame::Frame;
use crate::source::SourceId;

pub(crate) fn open_file(
    id: &SourceId,
    _settings: &CaptureSettings,
) -> Result<Box<dyn CaptureHandle>, OpenError> {
    let SourceId::File(path) = id else {
        return Err(OpenError::Unsupported { id: id.clone() });
    };

    ffmpeg::init().map_err(|err| OpenError::unreachable(id, format!("initialize ffmpeg: {}", err)))?;

    let input = ffmpeg::format::input(path)
        .map_err(|err| OpenError::unreachable(id, format!("open input: {}", err)))?;
    let input_stream = input
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or_else(|| OpenError::unreachable(id, "file has no video track"))?;
    let stream_index = input_stream.index();
    let nominal_fps = rate_to_fps(input_stream.avg_frame_rate());

    let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
        .map_err(|err| OpenError::unreachable(id, format!("load decoder parameters: {}", err)))?;
    let decoder = context
        .decoder()
        .video()
        .map_err(|err| OpenError::unreachable(id, format!("open video decoder: {}", err)))?;

    let scaler = ffmpeg::software::scaling::context::Context::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        ffmpeg::util::format::pixel::Pixel::RGB24,
        decoder.width(),
        decoder.height(),
        ffmpeg::software::scaling::flag::Flags::BILINEAR,
    )
    .map_err(|err| OpenError::unreachable(id, format!("create scaler: {}", err)))?;

    log::info!("[{}] ffmpeg open (@ {:.1} fps)", id, nominal_fps);

    Ok(Box::new(FfmpegFileHandle {
        input,
        stream_index,
        decoder,
        scaler,
        nominal_fps,
        draining: false,
        seq: 0,
    }))
}

fn rate_to_fps(rate: ffmpeg::Rational) -> f64 {
    if rate.denominator() == 0 {
        0.0
    } else {
        rate.numerator() as f64 / rate.denominator() as f64
    }
}

struct FfmpegFileHandle {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    nominal_fps: f64,
    /// Set once the demuxer is exhausted; the decoder is then flushed for
    /// its buffered tail before EndOfStream is reported.
    draining: bool,
    seq: u64,
}

impl FfmpegFileHandle {
    fn receive_frame(&mut self) -> Result<Option<Frame>, ReadError> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .map_err(|err| ReadError::Disconnected(format!("scale frame to RGB: {}", err)))?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        self.seq += 1;
        Ok(Some(Frame::new(pixels, width, height, self.seq)))
    }
}

impl CaptureHandle for FfmpegFileHandle {
    fn read_frame(&mut self) -> Result<Frame, ReadError> {
        if let Some(frame) = self.receive_frame()? {
            return Ok(frame);
        }

        while !self.draining {
            let Some((stream, packet)) = self.input.packets().next() else {
                self.draining = true;
                // Flush the decoder so buffered frames drain before EOF.
                let _ = self.decoder.send_eof();
                break;
            };
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .map_err(|err| ReadError::Disconnected(format!("send packet: {}", err)))?;
            if let Some(frame) = self.receive_frame()? {
                return Ok(frame);
            }
        }

        match self.receive_frame()? {
            Some(frame) => Ok(frame),
            None => Err(ReadError::EndOfStream),
        }
    }

    fn nominal_fps(&self) -> f64 {
        self.nominal_fps
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32), ReadError> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    // Scaler output can be stride-padded; repack rows tightly.
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        let slice = data
            .get(start..end)
            .ok_or_else(|| ReadError::Disconnected("frame row out of bounds".to_string()))?;
        pixels.extend_from_slice(slice);
    }

    Ok((pixels, width, height))
}
