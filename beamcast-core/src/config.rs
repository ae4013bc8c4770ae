//! Session configuration
//!
//! Capture, stream, and audio settings plus the encoder path selection.
//! A `SessionConfig` is validated and normalized by `prepare` and is
//! immutable for the rest of the session.

use serde::{Deserialize, Serialize};

use crate::error::{BeamcastError, Result};
use crate::output::StreamScheme;
use crate::types::CameraFacing;

/// Codec block alignment for encoded video dimensions
pub const DIMENSION_ALIGNMENT: u32 = 16;

/// Which encoding strategy drives both lanes of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncoderPath {
    /// Platform-accelerated codecs running on their own callback threads
    #[default]
    Hardware,
    /// Software codecs driven synchronously from the capture threads
    Software,
}

impl std::fmt::Display for EncoderPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hardware => write!(f, "hardware"),
            Self::Software => write!(f, "software"),
        }
    }
}

impl std::str::FromStr for EncoderPath {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hardware" | "hw" => Ok(Self::Hardware),
            "software" | "sw" | "soft" => Ok(Self::Software),
            _ => Err(format!("Unknown encoder path: {}", s)),
        }
    }
}

/// Camera capture settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Which camera to open
    pub facing: CameraFacing,
    /// Preview width in pixels
    pub preview_width: u32,
    /// Preview height in pixels
    pub preview_height: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            facing: CameraFacing::Front,
            preview_width: 720,
            preview_height: 1280,
        }
    }
}

impl CameraSettings {
    /// Set the camera facing
    pub fn with_facing(mut self, facing: CameraFacing) -> Self {
        self.facing = facing;
        self
    }

    /// Set the preview size
    pub fn with_preview(mut self, width: u32, height: u32) -> Self {
        self.preview_width = width;
        self.preview_height = height;
        self
    }

    /// Encoder input frame dimensions derived from the preview size.
    ///
    /// Portrait-only: width is the smaller preview dimension, height the
    /// larger one.
    pub fn frame_dimensions(&self) -> (u32, u32) {
        let width = self.preview_width.min(self.preview_height);
        let height = self.preview_width.max(self.preview_height);
        (width, height)
    }
}

/// Streaming destination and target video settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Publishing destination (rtmp:// or rtmps://)
    pub url: String,
    /// Target video width in pixels
    pub video_width: u32,
    /// Target video height in pixels
    pub video_height: u32,
    /// Target video bitrate in kbps
    pub video_bitrate_kbps: u32,
    /// Target frame rate
    pub frame_rate: u32,
    /// Which encoding strategy to use, fixed for the whole session
    pub encoder_path: EncoderPath,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            video_width: 720,
            video_height: 1280,
            video_bitrate_kbps: 512,
            frame_rate: 25,
            encoder_path: EncoderPath::Hardware,
        }
    }
}

impl StreamSettings {
    /// Set the publishing destination
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the target video size
    pub fn with_video_size(mut self, width: u32, height: u32) -> Self {
        self.video_width = width;
        self.video_height = height;
        self
    }

    /// Set the target video bitrate in kbps
    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.video_bitrate_kbps = kbps;
        self
    }

    /// Set the target frame rate
    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = fps;
        self
    }

    /// Select the encoding strategy
    pub fn with_encoder_path(mut self, path: EncoderPath) -> Self {
        self.encoder_path = path;
        self
    }
}

/// Microphone capture and audio encode settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channel_count: u32,
    /// Target audio bitrate in kbps
    pub bitrate_kbps: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channel_count: 2,
            bitrate_kbps: 64,
        }
    }
}

impl AudioSettings {
    /// Set the sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Set the channel count
    pub fn with_channels(mut self, channels: u32) -> Self {
        self.channel_count = channels;
        self
    }

    /// Set the target bitrate in kbps
    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = kbps;
        self
    }
}

/// Complete session configuration, immutable once a session is prepared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Camera settings
    pub camera: CameraSettings,
    /// Stream destination and video settings
    pub stream: StreamSettings,
    /// Audio settings
    pub audio: AudioSettings,
}

impl SessionConfig {
    /// Build a config from its parts
    pub fn new(camera: CameraSettings, stream: StreamSettings, audio: AudioSettings) -> Self {
        Self {
            camera,
            stream,
            audio,
        }
    }

    /// Round video dimensions to codec-supported sizes
    pub fn normalized(mut self) -> Self {
        self.stream.video_width = align_dimension(self.stream.video_width);
        self.stream.video_height = align_dimension(self.stream.video_height);
        self
    }

    /// Validate settings that must hold before a session can be prepared
    pub fn validate(&self) -> Result<()> {
        if self.stream.video_width == 0 || self.stream.video_height == 0 {
            return Err(BeamcastError::config(format!(
                "Video dimensions must be positive, got {}x{}",
                self.stream.video_width, self.stream.video_height
            )));
        }
        if self.stream.frame_rate == 0 {
            return Err(BeamcastError::config("Frame rate must be positive"));
        }
        if self.audio.sample_rate == 0 || self.audio.channel_count == 0 {
            return Err(BeamcastError::config(format!(
                "Audio format must be positive, got {}ch @ {}Hz",
                self.audio.channel_count, self.audio.sample_rate
            )));
        }
        self.validate_destination()
    }

    /// Validate the publishing destination URL scheme.
    ///
    /// A missing or non-streaming scheme is a configuration error, not a
    /// network error.
    pub fn validate_destination(&self) -> Result<()> {
        if self.stream.url.is_empty() {
            return Err(BeamcastError::config("Publishing destination is empty"));
        }
        if StreamScheme::from_url(&self.stream.url).is_none() {
            return Err(BeamcastError::config(format!(
                "Publishing destination '{}' must use rtmp:// or rtmps://",
                self.stream.url
            )));
        }
        Ok(())
    }
}

/// Round a dimension to the nearest codec-aligned value, minimum one block
pub fn align_dimension(value: u32) -> u32 {
    let aligned = (value + DIMENSION_ALIGNMENT / 2) / DIMENSION_ALIGNMENT * DIMENSION_ALIGNMENT;
    aligned.max(DIMENSION_ALIGNMENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_dimension_rounds_to_nearest_block() {
        assert_eq!(align_dimension(640), 640);
        assert_eq!(align_dimension(638), 640);
        assert_eq!(align_dimension(647), 640);
        assert_eq!(align_dimension(649), 656);
        assert_eq!(align_dimension(1), 16);
        assert_eq!(align_dimension(0), 16);
    }

    #[test]
    fn test_normalized_aligns_video_dimensions() {
        let config = SessionConfig::new(
            CameraSettings::default(),
            StreamSettings::default()
                .with_video_size(642, 361)
                .with_encoder_path(EncoderPath::Software),
            AudioSettings::default(),
        )
        .normalized();
        assert_eq!(config.stream.video_width, 640);
        assert_eq!(config.stream.video_height, 368);
    }

    #[test]
    fn test_validate_rejects_missing_scheme() {
        let config = SessionConfig::new(
            CameraSettings::default(),
            StreamSettings::default().with_url("http://example.com/live"),
            AudioSettings::default(),
        );
        assert!(matches!(
            config.validate(),
            Err(BeamcastError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_destination() {
        let config = SessionConfig::new(
            CameraSettings::default(),
            StreamSettings::default(),
            AudioSettings::default(),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_rtmp_destination() {
        let config = SessionConfig::new(
            CameraSettings::default(),
            StreamSettings::default().with_url("rtmp://live.example.com/app/key"),
            AudioSettings::default(),
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frame_dimensions_are_portrait() {
        let landscape = CameraSettings::default().with_preview(1280, 720);
        let portrait = CameraSettings::default().with_preview(720, 1280);
        assert_eq!(landscape.frame_dimensions(), (720, 1280));
        assert_eq!(portrait.frame_dimensions(), (720, 1280));
    }

    #[test]
    fn test_encoder_path_parsing() {
        assert_eq!("hardware".parse::<EncoderPath>(), Ok(EncoderPath::Hardware));
        assert_eq!("soft".parse::<EncoderPath>(), Ok(EncoderPath::Software));
        assert!("gpu".parse::<EncoderPath>().is_err());
    }
}
