//! Hardware encoding paths
//!
//! Each lane hands raw frames to a platform-accelerated codec running on
//! its own worker thread through a bounded feed channel; encoded units come
//! back from that thread (the codec callback thread). The orchestrator
//! never touches the codec context after start. `stop` only closes the feed
//! (the stop signal); `close` joins the worker and releases the context.

use ffmpeg_next::format::Pixel;
use ffmpeg_next::Dictionary;
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, warn};

use super::{
    codec_runtime_init, hardware_audio_encoder, hardware_video_encoder, AacEncoder,
    AccessUnitSink, AudioParameters, EncodingPath, H264Encoder, VideoParameters,
};
use crate::error::{BeamcastError, Result};
use crate::session::SessionEvent;
use crate::types::{AudioBuffer, MediaKind, VideoFrame};

/// Raw frames buffered ahead of the video codec before new ones are dropped
const VIDEO_FEED_DEPTH: usize = 4;

/// Raw buffers queued ahead of the audio codec
const AUDIO_FEED_DEPTH: usize = 32;

/// Accelerated H.264 lane on its own codec worker thread
pub struct HardwareVideoPath {
    sink: Arc<dyn AccessUnitSink>,
    events: UnboundedSender<SessionEvent>,
    params: Option<VideoParameters>,
    encoder_name: Option<&'static str>,
    feed: Option<SyncSender<(VideoFrame, Duration)>>,
    worker: Option<JoinHandle<()>>,
    frames_dropped: u64,
}

impl HardwareVideoPath {
    /// Create an unconfigured path delivering into `sink`
    pub fn new(sink: Arc<dyn AccessUnitSink>, events: UnboundedSender<SessionEvent>) -> Self {
        Self {
            sink,
            events,
            params: None,
            encoder_name: None,
            feed: None,
            worker: None,
            frames_dropped: 0,
        }
    }

    /// Frames dropped because the codec feed was full
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }
}

impl EncodingPath for HardwareVideoPath {
    type Frame = VideoFrame;
    type Params = VideoParameters;

    fn configure(&mut self, params: &VideoParameters) -> Result<()> {
        codec_runtime_init()?;
        let name = hardware_video_encoder()
            .ok_or_else(|| BeamcastError::encoder("No hardware H.264 encoder available"))?;
        self.encoder_name = Some(name);
        self.params = Some(*params);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let params = self
            .params
            .ok_or_else(|| BeamcastError::state("Video path started before configure"))?;
        let name = self
            .encoder_name
            .ok_or_else(|| BeamcastError::state("Video path started before configure"))?;

        let (feed_tx, feed_rx) = sync_channel::<(VideoFrame, Duration)>(VIDEO_FEED_DEPTH);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();
        let sink = self.sink.clone();
        let events = self.events.clone();

        let worker = std::thread::Builder::new()
            .name("beamcast-venc".to_string())
            .spawn(move || {
                let mut opts = Dictionary::new();
                if name == "h264_nvenc" {
                    opts.set("preset", "p4");
                    opts.set("tune", "ll");
                    opts.set("zerolatency", "1");
                    opts.set("rc", "cbr");
                }

                let mut encoder = match H264Encoder::open(name, Pixel::NV12, &params, opts) {
                    Ok(encoder) => {
                        let _ = ready_tx.send(Ok(()));
                        encoder
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                for (frame, pts) in feed_rx.iter() {
                    match encoder.encode(&frame, pts) {
                        Ok(units) => {
                            for unit in units {
                                sink.deliver(unit);
                            }
                        }
                        Err(e) => {
                            error!("Hardware video encode failed: {}", e);
                            let _ = events.send(SessionEvent::LaneFault {
                                kind: MediaKind::Video,
                                message: e.to_string(),
                            });
                            return;
                        }
                    }
                }

                // Feed closed: drain the codec before releasing it
                match encoder.flush() {
                    Ok(units) => {
                        for unit in units {
                            sink.deliver(unit);
                        }
                    }
                    Err(e) => warn!("Hardware video flush failed: {}", e),
                }
            })
            .map_err(|e| {
                BeamcastError::encoder(format!("Failed to spawn video codec thread: {}", e))
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.feed = Some(feed_tx);
                self.worker = Some(worker);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(BeamcastError::encoder("Video codec thread died during open"))
            }
        }
    }

    fn encode(&mut self, frame: &VideoFrame, pts: Duration) -> Result<()> {
        let feed = self
            .feed
            .as_ref()
            .ok_or_else(|| BeamcastError::state("Video path not started"))?;
        match feed.try_send((frame.clone(), pts)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                // Never block the capture thread; drop the frame instead
                self.frames_dropped += 1;
                debug!(
                    "Video codec feed full, dropped frame (total: {})",
                    self.frames_dropped
                );
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(BeamcastError::encode(
                MediaKind::Video,
                "Video codec worker terminated",
            )),
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.feed = None;
        Ok(())
    }

    fn close(&mut self) {
        self.feed = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for HardwareVideoPath {
    fn drop(&mut self) {
        self.close();
    }
}

/// Accelerated AAC lane on its own codec worker thread
pub struct HardwareAudioPath {
    sink: Arc<dyn AccessUnitSink>,
    events: UnboundedSender<SessionEvent>,
    params: Option<AudioParameters>,
    encoder_name: Option<&'static str>,
    feed: Option<SyncSender<(AudioBuffer, Duration)>>,
    worker: Option<JoinHandle<()>>,
}

impl HardwareAudioPath {
    /// Create an unconfigured path delivering into `sink`
    pub fn new(sink: Arc<dyn AccessUnitSink>, events: UnboundedSender<SessionEvent>) -> Self {
        Self {
            sink,
            events,
            params: None,
            encoder_name: None,
            feed: None,
            worker: None,
        }
    }
}

impl EncodingPath for HardwareAudioPath {
    type Frame = AudioBuffer;
    type Params = AudioParameters;

    fn configure(&mut self, params: &AudioParameters) -> Result<()> {
        codec_runtime_init()?;
        let name = hardware_audio_encoder()
            .ok_or_else(|| BeamcastError::encoder("No platform AAC encoder available"))?;
        self.encoder_name = Some(name);
        self.params = Some(*params);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let params = self
            .params
            .ok_or_else(|| BeamcastError::state("Audio path started before configure"))?;
        let name = self
            .encoder_name
            .ok_or_else(|| BeamcastError::state("Audio path started before configure"))?;

        let (feed_tx, feed_rx) = sync_channel::<(AudioBuffer, Duration)>(AUDIO_FEED_DEPTH);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();
        let sink = self.sink.clone();
        let events = self.events.clone();

        let worker = std::thread::Builder::new()
            .name("beamcast-aenc".to_string())
            .spawn(move || {
                let mut encoder = match AacEncoder::open(name, &params) {
                    Ok(encoder) => {
                        let _ = ready_tx.send(Ok(()));
                        encoder
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                for (buffer, pts) in feed_rx.iter() {
                    match encoder.encode(&buffer, pts) {
                        Ok(units) => {
                            for unit in units {
                                sink.deliver(unit);
                            }
                        }
                        Err(e) => {
                            error!("Hardware audio encode failed: {}", e);
                            let _ = events.send(SessionEvent::LaneFault {
                                kind: MediaKind::Audio,
                                message: e.to_string(),
                            });
                            return;
                        }
                    }
                }

                match encoder.flush() {
                    Ok(units) => {
                        for unit in units {
                            sink.deliver(unit);
                        }
                    }
                    Err(e) => warn!("Hardware audio flush failed: {}", e),
                }
            })
            .map_err(|e| {
                BeamcastError::encoder(format!("Failed to spawn audio codec thread: {}", e))
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.feed = Some(feed_tx);
                self.worker = Some(worker);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(BeamcastError::encoder("Audio codec thread died during open"))
            }
        }
    }

    fn encode(&mut self, buffer: &AudioBuffer, pts: Duration) -> Result<()> {
        let feed = self
            .feed
            .as_ref()
            .ok_or_else(|| BeamcastError::state("Audio path not started"))?;
        match feed.try_send((buffer.clone(), pts)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                debug!("Audio codec feed full, dropped buffer");
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(BeamcastError::encode(
                MediaKind::Audio,
                "Audio codec worker terminated",
            )),
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.feed = None;
        Ok(())
    }

    fn close(&mut self) {
        self.feed = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for HardwareAudioPath {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PixelLayout, VideoFormat};

    struct NullSink;

    impl AccessUnitSink for NullSink {
        fn deliver(&self, _unit: crate::types::AccessUnit) {}
    }

    #[test]
    fn test_encode_before_start_is_a_state_error() {
        let (events, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut path = HardwareVideoPath::new(Arc::new(NullSink), events);
        let frame = VideoFrame {
            format: VideoFormat::packed(16, 16, PixelLayout::Rgba),
            data: vec![0u8; 16 * 16 * 4].into(),
        };
        assert!(matches!(
            path.encode(&frame, Duration::ZERO),
            Err(BeamcastError::State(_))
        ));
    }
}
