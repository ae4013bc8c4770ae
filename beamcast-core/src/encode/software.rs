//! Software encoding paths
//!
//! One software codec instance per lane, driven synchronously: the capture
//! thread pushes raw frames in and ready access units come back out on the
//! same call, delivered to the sink before `encode` returns. Used when a
//! consistent cross-device path matters more than offloading.

use ffmpeg_next::format::Pixel;
use ffmpeg_next::Dictionary;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{
    codec_runtime_init, AacEncoder, AccessUnitSink, AudioParameters, EncodingPath, H264Encoder,
    VideoParameters, SOFTWARE_AUDIO_ENCODER, SOFTWARE_VIDEO_ENCODER,
};
use crate::error::{BeamcastError, Result};
use crate::types::{AudioBuffer, VideoFrame};

/// Synchronous H.264 lane backed by libx264
pub struct SoftwareVideoPath {
    sink: Arc<dyn AccessUnitSink>,
    params: Option<VideoParameters>,
    encoder: Option<H264Encoder>,
}

impl SoftwareVideoPath {
    /// Create an unconfigured path delivering into `sink`
    pub fn new(sink: Arc<dyn AccessUnitSink>) -> Self {
        Self {
            sink,
            params: None,
            encoder: None,
        }
    }
}

impl EncodingPath for SoftwareVideoPath {
    type Frame = VideoFrame;
    type Params = VideoParameters;

    fn configure(&mut self, params: &VideoParameters) -> Result<()> {
        codec_runtime_init()?;
        if !super::encoder_available(SOFTWARE_VIDEO_ENCODER) {
            return Err(BeamcastError::encoder(format!(
                "Software encoder {} not available",
                SOFTWARE_VIDEO_ENCODER
            )));
        }
        self.params = Some(*params);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let params = self
            .params
            .ok_or_else(|| BeamcastError::state("Video path started before configure"))?;

        let mut opts = Dictionary::new();
        opts.set("preset", "veryfast");
        opts.set("tune", "zerolatency");

        self.encoder = Some(H264Encoder::open(
            SOFTWARE_VIDEO_ENCODER,
            Pixel::YUV420P,
            &params,
            opts,
        )?);
        Ok(())
    }

    fn encode(&mut self, frame: &VideoFrame, pts: Duration) -> Result<()> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| BeamcastError::state("Video path not started"))?;
        for unit in encoder.encode(frame, pts)? {
            self.sink.deliver(unit);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(encoder) = self.encoder.as_mut() {
            // Flushed units still go through the sink; the publishing gate
            // decides whether they are forwarded
            for unit in encoder.flush()? {
                self.sink.deliver(unit);
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        self.encoder = None;
    }
}

/// Synchronous AAC lane driven from the audio capture thread
pub struct SoftwareAudioPath {
    sink: Arc<dyn AccessUnitSink>,
    params: Option<AudioParameters>,
    encoder: Option<AacEncoder>,
}

impl SoftwareAudioPath {
    /// Create an unconfigured path delivering into `sink`
    pub fn new(sink: Arc<dyn AccessUnitSink>) -> Self {
        Self {
            sink,
            params: None,
            encoder: None,
        }
    }
}

impl EncodingPath for SoftwareAudioPath {
    type Frame = AudioBuffer;
    type Params = AudioParameters;

    fn configure(&mut self, params: &AudioParameters) -> Result<()> {
        codec_runtime_init()?;
        if !super::encoder_available(SOFTWARE_AUDIO_ENCODER) {
            return Err(BeamcastError::encoder(format!(
                "Software encoder {} not available",
                SOFTWARE_AUDIO_ENCODER
            )));
        }
        self.params = Some(*params);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let params = self
            .params
            .ok_or_else(|| BeamcastError::state("Audio path started before configure"))?;
        self.encoder = Some(AacEncoder::open(SOFTWARE_AUDIO_ENCODER, &params)?);
        Ok(())
    }

    fn encode(&mut self, buffer: &AudioBuffer, pts: Duration) -> Result<()> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| BeamcastError::state("Audio path not started"))?;
        for unit in encoder.encode(buffer, pts)? {
            self.sink.deliver(unit);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(encoder) = self.encoder.as_mut() {
            match encoder.flush() {
                Ok(units) => {
                    for unit in units {
                        self.sink.deliver(unit);
                    }
                }
                Err(e) => warn!("Audio encoder flush failed: {}", e),
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        self.encoder = None;
    }
}
