//! RTMP publishing over an FLV output context
//!
//! Owns one outbound connection per publishing cycle. A single mutex
//! serializes all muxer access, so the video-lane and audio-lane threads can
//! write concurrently without interleaving partial writes.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::Id;
use ffmpeg_next::format::{context::Output, output_as};
use ffmpeg_next::Rational;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::{safe_url, Publisher, StreamScheme};
use crate::config::SessionConfig;
use crate::encode::codec_runtime_init;
use crate::error::{BeamcastError, Result};
use crate::types::{AccessUnit, MediaKind};

/// Access-unit timestamps are milliseconds relative to the clock origin
const UNIT_TIME_BASE: (i32, i32) = (1, 1000);

/// Stream parameters the muxer needs before the first packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherSettings {
    /// Video width in pixels
    pub video_width: u32,
    /// Video height in pixels
    pub video_height: u32,
    /// Video frame rate
    pub frame_rate: u32,
    /// Video bitrate in kbps
    pub video_bitrate_kbps: u32,
    /// Audio sample rate in Hz
    pub audio_sample_rate: u32,
    /// Audio channel count
    pub audio_channels: u32,
    /// Audio bitrate in kbps
    pub audio_bitrate_kbps: u32,
}

impl PublisherSettings {
    /// Derive publisher settings from a session config
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            video_width: config.stream.video_width,
            video_height: config.stream.video_height,
            frame_rate: config.stream.frame_rate,
            video_bitrate_kbps: config.stream.video_bitrate_kbps,
            audio_sample_rate: config.audio.sample_rate,
            audio_channels: config.audio.channel_count,
            audio_bitrate_kbps: config.audio.bitrate_kbps,
        }
    }
}

struct Connection {
    url: String,
    scheme: StreamScheme,
    output: Output,
    video_stream_index: usize,
    audio_stream_index: usize,
    header_written: bool,
}

/// RTMP publishing endpoint
pub struct RtmpPublisher {
    settings: PublisherSettings,
    conn: Mutex<Option<Connection>>,
    video_written: AtomicU64,
    audio_written: AtomicU64,
    bytes_sent: AtomicU64,
}

impl RtmpPublisher {
    /// Create a publisher for the given stream parameters
    pub fn new(settings: PublisherSettings) -> Self {
        Self {
            settings,
            conn: Mutex::new(None),
            video_written: AtomicU64::new(0),
            audio_written: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    /// Video units transmitted
    pub fn video_written(&self) -> u64 {
        self.video_written.load(Ordering::Relaxed)
    }

    /// Audio units transmitted
    pub fn audio_written(&self) -> u64 {
        self.audio_written.load(Ordering::Relaxed)
    }

    /// Total payload bytes transmitted
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    fn write_unit(&self, unit: &AccessUnit, kind: MediaKind) -> Result<()> {
        let mut guard = self.conn.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| BeamcastError::state("Publisher is not connected"))?;
        if !conn.header_written {
            return Err(BeamcastError::state("Publisher has not started"));
        }

        let stream_index = match kind {
            MediaKind::Video => conn.video_stream_index,
            MediaKind::Audio => conn.audio_stream_index,
        };

        let mut packet = ffmpeg::Packet::copy(&unit.data);
        packet.set_stream(stream_index);
        let pts = unit.pts.as_millis() as i64;
        packet.set_pts(Some(pts));
        packet.set_dts(Some(pts));
        if unit.keyframe {
            packet.set_flags(ffmpeg::packet::Flags::KEY);
        }

        let input_time_base = Rational::new(UNIT_TIME_BASE.0, UNIT_TIME_BASE.1);
        let output_time_base = conn
            .output
            .stream(stream_index)
            .map(|s| s.time_base())
            .unwrap_or(input_time_base);
        packet.rescale_ts(input_time_base, output_time_base);

        let size = unit.data.len() as u64;
        packet.write_interleaved(&mut conn.output).map_err(|e| {
            BeamcastError::encode(kind, format!("Failed to transmit unit: {}", e))
        })?;

        self.bytes_sent.fetch_add(size, Ordering::Relaxed);
        match kind {
            MediaKind::Video => {
                let count = self.video_written.fetch_add(1, Ordering::Relaxed) + 1;
                if count % 1000 == 0 {
                    let bytes = self.bytes_sent.load(Ordering::Relaxed);
                    debug!(
                        "Published {} video units ({:.2} MB total)",
                        count,
                        bytes as f64 / 1_000_000.0
                    );
                }
            }
            MediaKind::Audio => {
                self.audio_written.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(())
    }
}

impl Publisher for RtmpPublisher {
    fn connect(&self, url: &str) -> Result<()> {
        let scheme = StreamScheme::from_url(url).ok_or_else(|| {
            BeamcastError::config(format!(
                "Destination '{}' must use rtmp:// or rtmps://",
                url
            ))
        })?;

        let mut guard = self.conn.lock();
        if guard.is_some() {
            return Ok(());
        }

        codec_runtime_init()?;
        info!("Connecting {} output to {}", scheme, safe_url(url));

        let mut output = output_as(&url, "flv")
            .map_err(|e| BeamcastError::connect(format!("Failed to reach {}: {}", safe_url(url), e)))?;

        let video_time_base = Rational::new(1, self.settings.frame_rate.max(1) as i32);
        {
            let mut stream = output
                .add_stream(Id::H264)
                .map_err(|e| BeamcastError::connect(format!("Failed to add video stream: {}", e)))?;

            let codec_par = stream.parameters();
            // SAFETY: rust-ffmpeg exposes no safe setters for muxer codec
            // parameters. The pointer comes from the stream we just added and
            // stays valid for its lifetime; only standard parameter fields
            // are written.
            unsafe {
                let ptr = codec_par.as_ptr() as *mut ffmpeg::ffi::AVCodecParameters;
                (*ptr).codec_type = ffmpeg::ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
                (*ptr).codec_id = Id::H264.into();
                (*ptr).width = self.settings.video_width as i32;
                (*ptr).height = self.settings.video_height as i32;
                (*ptr).bit_rate = (self.settings.video_bitrate_kbps * 1000) as i64;
                (*ptr).format = ffmpeg::ffi::AVPixelFormat::AV_PIX_FMT_YUV420P as i32;
            }
            stream.set_time_base(video_time_base);
        }
        let video_stream_index = output.nb_streams() as usize - 1;

        let audio_time_base = Rational::new(1, self.settings.audio_sample_rate.max(1) as i32);
        {
            let mut stream = output
                .add_stream(Id::AAC)
                .map_err(|e| BeamcastError::connect(format!("Failed to add audio stream: {}", e)))?;

            let codec_par = stream.parameters();
            // SAFETY: same rationale as the video parameters above.
            unsafe {
                let ptr = codec_par.as_ptr() as *mut ffmpeg::ffi::AVCodecParameters;
                (*ptr).codec_type = ffmpeg::ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
                (*ptr).codec_id = Id::AAC.into();
                (*ptr).sample_rate = self.settings.audio_sample_rate as i32;
                (*ptr).bit_rate = (self.settings.audio_bitrate_kbps * 1000) as i64;
                (*ptr).ch_layout.nb_channels = self.settings.audio_channels as i32;
                (*ptr).format = ffmpeg::ffi::AVSampleFormat::AV_SAMPLE_FMT_FLTP as i32;
            }
            stream.set_time_base(audio_time_base);
        }
        let audio_stream_index = output.nb_streams() as usize - 1;

        info!(
            "{} output configured: {}x{} @ {}fps, {}kbps + audio {}ch @ {}Hz",
            scheme,
            self.settings.video_width,
            self.settings.video_height,
            self.settings.frame_rate,
            self.settings.video_bitrate_kbps,
            self.settings.audio_channels,
            self.settings.audio_sample_rate
        );

        *guard = Some(Connection {
            url: url.to_string(),
            scheme,
            output,
            video_stream_index,
            audio_stream_index,
            header_written: false,
        });
        Ok(())
    }

    fn start_publish(&self) -> Result<()> {
        let mut guard = self.conn.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| BeamcastError::state("Publisher is not connected"))?;
        if conn.header_written {
            return Ok(());
        }

        conn.output
            .write_header()
            .map_err(|e| BeamcastError::connect(format!("Failed to start publishing: {}", e)))?;
        conn.header_written = true;

        info!("{} publishing started to {}", conn.scheme, safe_url(&conn.url));
        Ok(())
    }

    fn write_video(&self, unit: &AccessUnit) -> Result<()> {
        self.write_unit(unit, MediaKind::Video)
    }

    fn write_audio(&self, unit: &AccessUnit, sample_rate: u32, channels: u32) -> Result<()> {
        if sample_rate != self.settings.audio_sample_rate || channels != self.settings.audio_channels
        {
            warn!(
                "Audio unit format {}ch @ {}Hz differs from stream setup {}ch @ {}Hz",
                channels, sample_rate, self.settings.audio_channels, self.settings.audio_sample_rate
            );
        }
        self.write_unit(unit, MediaKind::Audio)
    }

    fn destroy(&self) {
        let mut guard = self.conn.lock();
        if let Some(mut conn) = guard.take() {
            if conn.header_written {
                if let Err(e) = conn.output.write_trailer() {
                    warn!("Failed to close {} output cleanly: {}", conn.scheme, e);
                }
            }
            info!(
                "{} output closed: {} video + {} audio units ({:.2} MB total)",
                conn.scheme,
                self.video_written.load(Ordering::Relaxed),
                self.audio_written.load(Ordering::Relaxed),
                self.bytes_sent.load(Ordering::Relaxed) as f64 / 1_000_000.0
            );
        }
    }
}

impl Drop for RtmpPublisher {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AudioSettings, CameraSettings, EncoderPath, SessionConfig, StreamSettings};

    #[test]
    fn test_settings_from_config() {
        let config = SessionConfig::new(
            CameraSettings::default(),
            StreamSettings::default()
                .with_url("rtmp://example.com/live/key")
                .with_video_size(640, 368)
                .with_frame_rate(30),
            AudioSettings::default().with_sample_rate(48000),
            EncoderPath::Software,
        );
        let settings = PublisherSettings::from_config(&config);
        assert_eq!(settings.video_width, 640);
        assert_eq!(settings.video_height, 368);
        assert_eq!(settings.frame_rate, 30);
        assert_eq!(settings.audio_sample_rate, 48000);
    }
}
