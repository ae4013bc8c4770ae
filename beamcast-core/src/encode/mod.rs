//! Encoding paths
//!
//! The `EncodingPath` trait is the single polymorphic boundary between the
//! session and its codecs: one instance per lane, one variant per session.
//! Two variants exist:
//! - software: codec contexts driven synchronously on the capture threads
//! - hardware: platform-accelerated contexts on their own worker threads
//!
//! The FFmpeg wrappers the variants share live in `h264`/`aac`.

mod aac;
mod h264;
pub mod hardware;
pub mod software;

pub use aac::AacEncoder;
pub use h264::H264Encoder;
pub use hardware::{HardwareAudioPath, HardwareVideoPath};
pub use software::{SoftwareAudioPath, SoftwareVideoPath};

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::encoder;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::EncoderPath;
use crate::error::{BeamcastError, Result};
use crate::session::SessionEvent;
use crate::types::{AccessUnit, AudioBuffer, VideoFrame};

/// Hardware H.264 encoder candidates, probed in order
pub const HARDWARE_VIDEO_ENCODERS: &[&str] =
    &["h264_nvenc", "h264_qsv", "h264_vaapi", "h264_videotoolbox"];

/// Platform AAC encoder candidates, probed in order
pub const HARDWARE_AUDIO_ENCODERS: &[&str] = &["aac_at", "aac_mf", "aac"];

/// Software H.264 encoder
pub const SOFTWARE_VIDEO_ENCODER: &str = "libx264";

/// Software AAC encoder
pub const SOFTWARE_AUDIO_ENCODER: &str = "aac";

static CODEC_RUNTIME: OnceCell<()> = OnceCell::new();

/// Initialize the process-wide codec runtime.
///
/// Must run before any codec context is opened. Init-once: subsequent calls
/// are no-ops, and the runtime is never torn down mid-session.
pub fn codec_runtime_init() -> Result<()> {
    CODEC_RUNTIME
        .get_or_try_init(|| {
            ffmpeg::init()
                .map_err(|e| BeamcastError::encoder(format!("Codec runtime init failed: {}", e)))
        })
        .map(|_| ())
}

/// Check whether a named encoder is present in the codec runtime
pub fn encoder_available(name: &str) -> bool {
    if codec_runtime_init().is_err() {
        return false;
    }
    encoder::find_by_name(name).is_some()
}

/// First available hardware H.264 encoder, if any
pub fn hardware_video_encoder() -> Option<&'static str> {
    HARDWARE_VIDEO_ENCODERS
        .iter()
        .copied()
        .find(|name| encoder_available(name))
}

/// First available platform AAC encoder, if any
pub fn hardware_audio_encoder() -> Option<&'static str> {
    HARDWARE_AUDIO_ENCODERS
        .iter()
        .copied()
        .find(|name| encoder_available(name))
}

/// Video lane media parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoParameters {
    /// Encoded width in pixels (codec-aligned)
    pub width: u32,
    /// Encoded height in pixels (codec-aligned)
    pub height: u32,
    /// Source frame width in pixels
    pub frame_width: u32,
    /// Source frame height in pixels
    pub frame_height: u32,
    /// Frame rate
    pub frame_rate: u32,
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
}

/// Audio lane media parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParameters {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channel_count: u32,
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
}

/// Receiver for encoded access units
///
/// `deliver` is invoked from whichever thread completed the encode: the
/// calling capture thread for the software variant, the codec worker thread
/// for the hardware variant. Implementations must be safe to call from at
/// most one audio-lane and one video-lane thread concurrently.
pub trait AccessUnitSink: Send + Sync {
    /// An encoded unit is ready; ownership transfers to the sink
    fn deliver(&self, unit: AccessUnit);
}

/// One lane's encoding strategy
///
/// Lifecycle: `configure` once, `start` once, `encode` repeatedly, `stop`,
/// then `close`. Instances are never reused across sessions and never shared
/// between variants. `stop` only issues the stop signal for asynchronous
/// variants; `close` releases codec resources and joins any worker.
pub trait EncodingPath: Send {
    /// Raw input unit for this lane
    type Frame;
    /// Media parameters for this lane
    type Params;

    /// Bind media parameters and verify the codec is usable
    fn configure(&mut self, params: &Self::Params) -> Result<()>;

    /// Open codec resources; failure is fatal to the start transition
    fn start(&mut self) -> Result<()>;

    /// Encode one raw unit stamped with its presentation timestamp
    fn encode(&mut self, frame: &Self::Frame, pts: Duration) -> Result<()>;

    /// Issue the stop signal; must not block on in-flight codec callbacks
    fn stop(&mut self) -> Result<()>;

    /// Release codec resources
    fn close(&mut self);
}

/// Boxed video lane
pub type VideoLane = Box<dyn EncodingPath<Frame = VideoFrame, Params = VideoParameters>>;

/// Boxed audio lane
pub type AudioLane = Box<dyn EncodingPath<Frame = AudioBuffer, Params = AudioParameters>>;

/// Builds both lanes for the variant selected at stream start
///
/// The session goes through this seam so tests can substitute codec-free
/// lanes; the default factory is codec-backed.
pub trait LaneFactory: Send + Sync {
    /// Build the video lane for the given variant
    fn video_lane(
        &self,
        path: EncoderPath,
        sink: Arc<dyn AccessUnitSink>,
        events: UnboundedSender<SessionEvent>,
    ) -> Result<VideoLane>;

    /// Build the audio lane for the given variant
    fn audio_lane(
        &self,
        path: EncoderPath,
        sink: Arc<dyn AccessUnitSink>,
        events: UnboundedSender<SessionEvent>,
    ) -> Result<AudioLane>;
}

/// Default factory producing FFmpeg-backed lanes
#[derive(Debug, Default)]
pub struct CodecLaneFactory;

impl LaneFactory for CodecLaneFactory {
    fn video_lane(
        &self,
        path: EncoderPath,
        sink: Arc<dyn AccessUnitSink>,
        events: UnboundedSender<SessionEvent>,
    ) -> Result<VideoLane> {
        Ok(match path {
            EncoderPath::Hardware => Box::new(HardwareVideoPath::new(sink, events)),
            EncoderPath::Software => Box::new(SoftwareVideoPath::new(sink)),
        })
    }

    fn audio_lane(
        &self,
        path: EncoderPath,
        sink: Arc<dyn AccessUnitSink>,
        events: UnboundedSender<SessionEvent>,
    ) -> Result<AudioLane> {
        Ok(match path {
            EncoderPath::Hardware => Box::new(HardwareAudioPath::new(sink, events)),
            EncoderPath::Software => Box::new(SoftwareAudioPath::new(sink)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_candidate_lists_are_ordered() {
        // NVENC is preferred when present; the portable fallback comes last
        assert_eq!(HARDWARE_VIDEO_ENCODERS.first(), Some(&"h264_nvenc"));
        assert_eq!(HARDWARE_AUDIO_ENCODERS.last(), Some(&"aac"));
    }
}
