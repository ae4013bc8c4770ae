//! AAC encoder context wrapper
//!
//! Shared by both encoding-path variants. Raw interleaved PCM is widened to
//! packed f32 and accumulated until the codec frame size is reached; access
//! units carry timestamps derived from the submitting call's clock stamp,
//! advanced by the codec frame duration when one call completes several
//! frames.

use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::{self, encoder};
use ffmpeg_next::format::Sample;
use ffmpeg_next::util::frame::audio::Audio;
use ffmpeg_next::{ChannelLayout, Dictionary, Rational};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::AudioParameters;
use crate::error::{BeamcastError, Result};
use crate::types::{AccessUnit, AudioBuffer, MediaKind};

/// One AAC encoder context for a single session's audio lane
pub struct AacEncoder {
    encoder: encoder::Audio,
    input_frame: Audio,
    packet: ffmpeg::Packet,
    params: AudioParameters,
    frame_size: usize,
    sample_buffer: Vec<f32>,
    submitted_frames: u64,
    pending_pts: VecDeque<Duration>,
    last_pts: Duration,
}

impl AacEncoder {
    /// Open an encoder context by name
    pub fn open(name: &str, params: &AudioParameters) -> Result<Self> {
        let codec = encoder::find_by_name(name)
            .ok_or_else(|| BeamcastError::encoder(format!("Audio encoder {} not found", name)))?;

        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(|e| {
                BeamcastError::encoder(format!("Failed to create audio encoder: {}", e))
            })?;

        encoder.set_rate(params.sample_rate as i32);
        encoder.set_bit_rate(params.bitrate_kbps as usize * 1000);
        encoder.set_format(Sample::F32(ffmpeg::format::sample::Type::Packed));
        encoder.set_time_base(Rational::new(1, params.sample_rate as i32));

        let channel_layout = match params.channel_count {
            1 => ChannelLayout::MONO,
            2 => ChannelLayout::STEREO,
            _ => {
                warn!(
                    "Unusual channel count {}, defaulting to stereo",
                    params.channel_count
                );
                ChannelLayout::STEREO
            }
        };
        encoder.set_channel_layout(channel_layout);

        let mut opts = Dictionary::new();
        opts.set("aac_coder", "twoloop");

        let encoder = encoder
            .open_with(opts)
            .map_err(|e| BeamcastError::encoder(format!("Failed to open {}: {}", name, e)))?;

        let frame_size = encoder.frame_size() as usize;
        let frame_size = if frame_size == 0 { 1024 } else { frame_size };

        info!(
            "AAC encoder opened: {} {}ch @ {}Hz, {}kbps, frame_size={}",
            name, params.channel_count, params.sample_rate, params.bitrate_kbps, frame_size
        );

        let input_frame = Audio::new(
            Sample::F32(ffmpeg::format::sample::Type::Packed),
            frame_size,
            channel_layout,
        );

        Ok(Self {
            encoder,
            input_frame,
            packet: ffmpeg::Packet::empty(),
            params: *params,
            frame_size,
            sample_buffer: Vec::with_capacity(frame_size * params.channel_count as usize * 2),
            submitted_frames: 0,
            pending_pts: VecDeque::new(),
            last_pts: Duration::ZERO,
        })
    }

    /// Encode one raw buffer; returns the access units that became ready
    pub fn encode(&mut self, buffer: &AudioBuffer, pts: Duration) -> Result<Vec<AccessUnit>> {
        if buffer.format.sample_rate != self.params.sample_rate {
            return Err(BeamcastError::encoder(format!(
                "Sample rate mismatch: expected {}, got {}",
                self.params.sample_rate, buffer.format.sample_rate
            )));
        }
        if buffer.format.channels != self.params.channel_count {
            return Err(BeamcastError::encoder(format!(
                "Channel count mismatch: expected {}, got {}",
                self.params.channel_count, buffer.format.channels
            )));
        }

        self.sample_buffer
            .extend(buffer.samples.iter().map(|&s| s as f32 / 32768.0));

        let samples_per_frame = self.frame_size * self.params.channel_count as usize;
        let frame_duration = Duration::from_nanos(
            self.frame_size as u64 * 1_000_000_000 / self.params.sample_rate.max(1) as u64,
        );

        let mut units = Vec::new();
        let mut completed = 0u32;
        while self.sample_buffer.len() >= samples_per_frame {
            let chunk: Vec<f32> = self.sample_buffer[..samples_per_frame].to_vec();
            self.sample_buffer.drain(..samples_per_frame);
            // Several codec frames can complete in one call; space their
            // stamps by the frame duration so the lane stays non-decreasing
            self.pending_pts.push_back(pts + frame_duration * completed);
            completed += 1;
            self.encode_frame(&chunk, &mut units)?;
        }

        Ok(units)
    }

    /// Drain the encoder; no buffers may be submitted afterwards
    pub fn flush(&mut self) -> Result<Vec<AccessUnit>> {
        let mut units = Vec::new();

        if !self.sample_buffer.is_empty() {
            let samples_per_frame = self.frame_size * self.params.channel_count as usize;
            let mut padded = std::mem::take(&mut self.sample_buffer);
            padded.resize(samples_per_frame, 0.0);
            self.pending_pts.push_back(self.last_pts);
            self.encode_frame(&padded, &mut units)?;
        }

        debug!(
            "Flushing AAC encoder ({} frames submitted)",
            self.submitted_frames
        );
        self.encoder
            .send_eof()
            .map_err(|e| BeamcastError::encoder(format!("Failed to send audio EOF: {}", e)))?;
        self.receive_packets(&mut units)?;
        Ok(units)
    }

    fn encode_frame(&mut self, samples: &[f32], units: &mut Vec<AccessUnit>) -> Result<()> {
        let data = self.input_frame.data_mut(0);
        let bytes: &[u8] = bytemuck::cast_slice(samples);
        let copy_len = data.len().min(bytes.len());
        data[..copy_len].copy_from_slice(&bytes[..copy_len]);

        let pts = (self.submitted_frames * self.frame_size as u64) as i64;
        self.input_frame.set_pts(Some(pts));
        self.submitted_frames += 1;

        self.encoder
            .send_frame(&self.input_frame)
            .map_err(|e| BeamcastError::encoder(format!("Failed to send audio frame: {}", e)))?;

        self.receive_packets(units)
    }

    fn receive_packets(&mut self, units: &mut Vec<AccessUnit>) -> Result<()> {
        loop {
            match self.encoder.receive_packet(&mut self.packet) {
                Ok(()) => {
                    let pts = self.pending_pts.pop_front().unwrap_or(self.last_pts);
                    self.last_pts = pts;

                    let unit = AccessUnit {
                        kind: MediaKind::Audio,
                        data: Bytes::copy_from_slice(self.packet.data().unwrap_or_default()),
                        pts,
                        keyframe: false,
                    };
                    trace!(
                        "Encoded audio unit: pts={}ms, size={}",
                        unit.pts.as_millis(),
                        unit.data.len()
                    );
                    units.push(unit);
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                    break;
                }
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    return Err(BeamcastError::encoder(format!(
                        "Failed to receive audio packet: {}",
                        e
                    )));
                }
            }
        }
        Ok(())
    }
}
