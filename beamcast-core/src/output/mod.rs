//! Publishing outputs
//!
//! The `Publisher` trait is the session's outbound boundary: it owns the
//! network connection lifecycle and accepts encoded access units in emission
//! order. `RtmpPublisher` implements it over an FLV output context.

pub mod rtmp;

pub use rtmp::{PublisherSettings, RtmpPublisher};

use crate::error::Result;
use crate::types::AccessUnit;

/// Streaming URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamScheme {
    /// rtmp://
    Rtmp,
    /// rtmps://
    Rtmps,
}

impl StreamScheme {
    /// Detect the scheme from a destination URL
    pub fn from_url(url: &str) -> Option<Self> {
        let lower = url.to_lowercase();
        if lower.starts_with("rtmps://") {
            Some(Self::Rtmps)
        } else if lower.starts_with("rtmp://") {
            Some(Self::Rtmp)
        } else {
            None
        }
    }
}

impl std::fmt::Display for StreamScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rtmp => write!(f, "RTMP"),
            Self::Rtmps => write!(f, "RTMPS"),
        }
    }
}

/// Mask the stream key in a destination URL for safe logging
pub fn safe_url(url: &str) -> String {
    if let Some(idx) = url.rfind('/') {
        let (base, key) = url.split_at(idx + 1);
        if !key.is_empty() && !key.contains(':') {
            return format!("{}****", base);
        }
    }
    url.to_string()
}

/// Publishing endpoint collaborator
///
/// All methods take `&self`: the session calls `write_video`/`write_audio`
/// from whichever thread produced the unit (at most one audio-lane and one
/// video-lane thread concurrently), so implementations serialize network
/// writes internally. Concurrent calls never interleave partial writes.
pub trait Publisher: Send + Sync {
    /// Open the network connection to the destination
    fn connect(&self, url: &str) -> Result<()>;

    /// Signal the endpoint to begin accepting data
    fn start_publish(&self) -> Result<()>;

    /// Transmit one encoded video unit
    fn write_video(&self, unit: &AccessUnit) -> Result<()>;

    /// Transmit one encoded audio unit
    fn write_audio(&self, unit: &AccessUnit, sample_rate: u32, channels: u32) -> Result<()>;

    /// Close the connection and release it
    fn destroy(&self);
}
