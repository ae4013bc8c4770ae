//! H.264 encoder context wrapper
//!
//! Shared FFmpeg plumbing for both encoding-path variants: the software
//! path drives this synchronously, the hardware path drives it from a codec
//! worker thread. Raw RGBA/BGRA frames are converted to the encoder's input
//! format through a lazily created scaler, and submitted presentation
//! timestamps are paired with emitted packets so access units carry the
//! clock-derived stamps.

use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::{self, encoder};
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{self, Flags};
use ffmpeg_next::util::frame::video::Video;
use ffmpeg_next::{Dictionary, Rational};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::VideoParameters;
use crate::error::{BeamcastError, Result};
use crate::types::{AccessUnit, MediaKind, PixelLayout, VideoFrame};

/// One H.264 encoder context for a single session's video lane
pub struct H264Encoder {
    encoder: encoder::Video,
    scaler: Option<scaling::Context>,
    frame: Video,
    packet: ffmpeg::Packet,
    input_format: Pixel,
    frame_index: i64,
    pending_pts: VecDeque<Duration>,
    last_pts: Duration,
}

impl H264Encoder {
    /// Open an encoder context by name
    ///
    /// `input_format` is what the codec consumes (NV12 for the accelerated
    /// encoders, YUV420P for libx264); `opts` carries the variant-specific
    /// encoder options.
    pub fn open(
        name: &str,
        input_format: Pixel,
        params: &VideoParameters,
        opts: Dictionary,
    ) -> Result<Self> {
        let codec = encoder::find_by_name(name)
            .ok_or_else(|| BeamcastError::encoder(format!("Encoder {} not found", name)))?;

        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| {
                BeamcastError::encoder(format!("Failed to create encoder context: {}", e))
            })?;

        let bitrate = params.bitrate_kbps as usize * 1000;
        encoder.set_width(params.width);
        encoder.set_height(params.height);
        encoder.set_format(input_format);
        encoder.set_time_base(Rational::new(1, params.frame_rate as i32));
        encoder.set_frame_rate(Some(Rational::new(params.frame_rate as i32, 1)));
        encoder.set_bit_rate(bitrate);
        encoder.set_max_bit_rate(bitrate * 2);

        let encoder = encoder
            .open_with(opts)
            .map_err(|e| BeamcastError::encoder(format!("Failed to open {}: {}", name, e)))?;

        info!(
            "H.264 encoder opened: {} {}x{} @ {}fps, {}kbps",
            name, params.width, params.height, params.frame_rate, params.bitrate_kbps
        );

        let frame = Video::new(input_format, params.width, params.height);

        Ok(Self {
            encoder,
            scaler: None,
            frame,
            packet: ffmpeg::Packet::empty(),
            input_format,
            frame_index: 0,
            pending_pts: VecDeque::new(),
            last_pts: Duration::ZERO,
        })
    }

    /// Encode one raw frame; returns the access units that became ready
    pub fn encode(&mut self, input: &VideoFrame, pts: Duration) -> Result<Vec<AccessUnit>> {
        self.ensure_scaler(input)?;

        let src_format = pixel_from_layout(input.format.pixel);
        let mut src_frame = Video::new(src_format, input.format.width, input.format.height);

        // Assumes tightly packed input
        let plane = src_frame.data_mut(0);
        let copy_len = plane.len().min(input.data.len());
        plane[..copy_len].copy_from_slice(&input.data[..copy_len]);

        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| BeamcastError::encoder("No scaler configured"))?;
        scaler
            .run(&src_frame, &mut self.frame)
            .map_err(|e| BeamcastError::encoder(format!("Scaling failed: {}", e)))?;

        self.frame.set_pts(Some(self.frame_index));
        self.frame_index += 1;
        self.pending_pts.push_back(pts);

        self.encoder
            .send_frame(&self.frame)
            .map_err(|e| BeamcastError::encoder(format!("Failed to send frame: {}", e)))?;

        self.receive_packets()
    }

    /// Drain the encoder; no frames may be submitted afterwards
    pub fn flush(&mut self) -> Result<Vec<AccessUnit>> {
        debug!("Flushing H.264 encoder ({} frames submitted)", self.frame_index);
        self.encoder
            .send_eof()
            .map_err(|e| BeamcastError::encoder(format!("Failed to send EOF: {}", e)))?;
        self.receive_packets()
    }

    fn ensure_scaler(&mut self, input: &VideoFrame) -> Result<()> {
        let src_format = pixel_from_layout(input.format.pixel);

        if self.scaler.is_none()
            || self.scaler.as_ref().map(|s| s.input().format) != Some(src_format)
        {
            debug!(
                "Creating scaler: {:?} {}x{} -> {:?} {}x{}",
                src_format,
                input.format.width,
                input.format.height,
                self.input_format,
                self.encoder.width(),
                self.encoder.height()
            );

            let scaler = scaling::Context::get(
                src_format,
                input.format.width,
                input.format.height,
                self.input_format,
                self.encoder.width(),
                self.encoder.height(),
                Flags::BILINEAR,
            )
            .map_err(|e| BeamcastError::encoder(format!("Failed to create scaler: {}", e)))?;

            self.scaler = Some(scaler);
        }

        Ok(())
    }

    fn receive_packets(&mut self) -> Result<Vec<AccessUnit>> {
        let mut units = Vec::new();
        loop {
            match self.encoder.receive_packet(&mut self.packet) {
                Ok(()) => {
                    let pts = self.pending_pts.pop_front().unwrap_or(self.last_pts);
                    self.last_pts = pts;

                    let unit = AccessUnit {
                        kind: MediaKind::Video,
                        data: Bytes::copy_from_slice(self.packet.data().unwrap_or_default()),
                        pts,
                        keyframe: self.packet.is_key(),
                    };
                    trace!(
                        "Encoded video unit: pts={}ms, size={}, keyframe={}",
                        unit.pts.as_millis(),
                        unit.data.len(),
                        unit.keyframe
                    );
                    units.push(unit);
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                    // Need more input
                    break;
                }
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    return Err(BeamcastError::encoder(format!(
                        "Failed to receive packet: {}",
                        e
                    )));
                }
            }
        }
        Ok(units)
    }
}

/// Map a raw pixel layout to the FFmpeg pixel format
fn pixel_from_layout(layout: PixelLayout) -> Pixel {
    match layout {
        PixelLayout::Rgba => Pixel::RGBA,
        PixelLayout::Bgra => Pixel::BGRA,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_layout_mapping() {
        assert_eq!(pixel_from_layout(PixelLayout::Rgba), Pixel::RGBA);
        assert_eq!(pixel_from_layout(PixelLayout::Bgra), Pixel::BGRA);
    }
}
