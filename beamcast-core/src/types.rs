//! Core types for Beamcast
//!
//! These types represent the fundamental data structures flowing through
//! the capture, encode, and publish pipeline.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Global handle counter for unique session IDs
static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Create a new unique handle
    pub fn new() -> Self {
        Self(HANDLE_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw handle value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session({})", self.0)
    }
}

/// Media kind of a lane or an encoded unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Video lane
    Video,
    /// Audio lane
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Which camera the capture source should face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    /// User-facing camera
    #[default]
    Front,
    /// World-facing camera
    Back,
}

impl CameraFacing {
    /// The opposite facing
    pub fn toggled(self) -> Self {
        match self {
            Self::Front => Self::Back,
            Self::Back => Self::Front,
        }
    }
}

impl std::fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Front => write!(f, "front"),
            Self::Back => write!(f, "back"),
        }
    }
}

/// Camera lifecycle event, delivered on the camera's event channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraEvent {
    /// The camera opened and negotiated a preview size
    Opened {
        /// Preview width in pixels
        width: u32,
        /// Preview height in pixels
        height: u32,
    },
    /// The camera closed
    Closed,
}

/// Pixel layout of a raw video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelLayout {
    /// 8-bit RGBA, interleaved
    #[default]
    Rgba,
    /// 8-bit BGRA, interleaved
    Bgra,
}

impl PixelLayout {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelLayout::Rgba | PixelLayout::Bgra => 4,
        }
    }
}

/// Raw video frame format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout
    pub pixel: PixelLayout,
    /// Stride in bytes
    pub stride: u32,
}

impl VideoFormat {
    /// Tightly packed format for the given dimensions and layout
    pub fn packed(width: u32, height: u32, pixel: PixelLayout) -> Self {
        Self {
            width,
            height,
            pixel,
            stride: width * pixel.bytes_per_pixel(),
        }
    }
}

/// Raw video frame as produced by the capture source
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame format
    pub format: VideoFormat,
    /// Pixel data
    pub data: Bytes,
}

/// Raw audio format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz (e.g. 44100)
    pub sample_rate: u32,
    /// Number of channels (1=mono, 2=stereo)
    pub channels: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
        }
    }
}

/// Raw audio buffer as produced by the capture source
///
/// Samples are interleaved signed 16-bit PCM.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Audio format
    pub format: AudioFormat,
    /// Interleaved PCM samples
    pub samples: Vec<i16>,
}

impl AudioBuffer {
    /// Number of samples per channel
    pub fn sample_count(&self) -> u32 {
        (self.samples.len() / self.format.channels.max(1) as usize) as u32
    }

    /// Duration covered by this buffer
    pub fn duration(&self) -> Duration {
        let rate = self.format.sample_rate.max(1) as u64;
        Duration::from_nanos(self.sample_count() as u64 * 1_000_000_000 / rate)
    }
}

/// One encoded, timestamped output unit of audio or video
///
/// Ownership transfers to the Publisher on emission; immutable after
/// creation.
#[derive(Debug, Clone)]
pub struct AccessUnit {
    /// Which lane produced this unit
    pub kind: MediaKind,
    /// Encoded payload
    pub data: Bytes,
    /// Presentation timestamp relative to the session clock origin
    pub pts: Duration,
    /// Whether this unit is a sync point (video keyframe)
    pub keyframe: bool,
}
