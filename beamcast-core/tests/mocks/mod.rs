//! Mock collaborators for session integration tests
//!
//! Provides a recording publisher, scriptable camera and microphone
//! sources, and a codec-free lane factory so the full lifecycle can be
//! exercised without codecs or a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::sync::mpsc::UnboundedSender;

use beamcast_core::capture::audio::AudioInput;
use beamcast_core::capture::camera::CameraSource;
use beamcast_core::config::EncoderPath;
use beamcast_core::encode::{
    AccessUnitSink, AudioLane, AudioParameters, EncodingPath, LaneFactory, VideoLane,
    VideoParameters,
};
use beamcast_core::error::{BeamcastError, Result};
use beamcast_core::output::Publisher;
use beamcast_core::session::SessionEvent;
use beamcast_core::types::{
    AccessUnit, AudioBuffer, AudioFormat, CameraEvent, CameraFacing, MediaKind, PixelLayout,
    VideoFormat, VideoFrame,
};

/// Spin until `cond` holds or the timeout elapses
pub fn wait_until(cond: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Create a solid-color test frame
pub fn test_frame(width: u32, height: u32, color: [u8; 4]) -> VideoFrame {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..(width * height) {
        data.extend_from_slice(&color);
    }
    VideoFrame {
        format: VideoFormat::packed(width, height, PixelLayout::Rgba),
        data: data.into(),
    }
}

/// Publisher double recording every call it receives
#[derive(Default)]
pub struct MockPublisher {
    pub fail_connect: AtomicBool,
    pub fail_writes: AtomicBool,
    connects: AtomicU64,
    start_publishes: AtomicU64,
    destroys: AtomicU64,
    video: Mutex<Vec<AccessUnit>>,
    audio: Mutex<Vec<(AccessUnit, u32, u32)>>,
}

impl MockPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn start_publishes(&self) -> u64 {
        self.start_publishes.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> u64 {
        self.destroys.load(Ordering::SeqCst)
    }

    pub fn video_count(&self) -> usize {
        self.video.lock().unwrap().len()
    }

    pub fn audio_count(&self) -> usize {
        self.audio.lock().unwrap().len()
    }

    pub fn video_pts(&self) -> Vec<Duration> {
        self.video.lock().unwrap().iter().map(|u| u.pts).collect()
    }

    pub fn audio_pts(&self) -> Vec<Duration> {
        self.audio
            .lock()
            .unwrap()
            .iter()
            .map(|(u, _, _)| u.pts)
            .collect()
    }
}

impl Publisher for MockPublisher {
    fn connect(&self, _url: &str) -> Result<()> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(BeamcastError::connect("Destination unreachable"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn start_publish(&self) -> Result<()> {
        self.start_publishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write_video(&self, unit: &AccessUnit) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BeamcastError::encode(MediaKind::Video, "write refused"));
        }
        self.video.lock().unwrap().push(unit.clone());
        Ok(())
    }

    fn write_audio(&self, unit: &AccessUnit, sample_rate: u32, channels: u32) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BeamcastError::encode(MediaKind::Audio, "write refused"));
        }
        self.audio
            .lock()
            .unwrap()
            .push((unit.clone(), sample_rate, channels));
        Ok(())
    }

    fn destroy(&self) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handle for pushing frames into a `ScriptedCamera` after it has been
/// moved into a session
#[derive(Clone)]
pub struct CameraHandle {
    frame_tx: broadcast::Sender<Arc<VideoFrame>>,
    starts: Arc<AtomicU64>,
    stops: Arc<AtomicU64>,
    facing: Arc<Mutex<CameraFacing>>,
}

impl CameraHandle {
    pub fn push(&self, frame: VideoFrame) {
        // No receivers just means nobody is watching yet
        let _ = self.frame_tx.send(Arc::new(frame));
    }

    pub fn starts(&self) -> u64 {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> u64 {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn facing(&self) -> CameraFacing {
        *self.facing.lock().unwrap()
    }
}

/// Camera double whose frames are pushed manually by the test
pub struct ScriptedCamera {
    facing: Arc<Mutex<CameraFacing>>,
    frame_tx: broadcast::Sender<Arc<VideoFrame>>,
    event_tx: broadcast::Sender<CameraEvent>,
    starts: Arc<AtomicU64>,
    stops: Arc<AtomicU64>,
}

impl ScriptedCamera {
    pub fn new() -> Self {
        let (frame_tx, _) = broadcast::channel(32);
        let (event_tx, _) = broadcast::channel(8);
        Self {
            facing: Arc::new(Mutex::new(CameraFacing::Front)),
            frame_tx,
            event_tx,
            starts: Arc::new(AtomicU64::new(0)),
            stops: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn handle(&self) -> CameraHandle {
        CameraHandle {
            frame_tx: self.frame_tx.clone(),
            starts: self.starts.clone(),
            stops: self.stops.clone(),
            facing: self.facing.clone(),
        }
    }
}

impl CameraSource for ScriptedCamera {
    fn start(&mut self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let _ = self.event_tx.send(CameraEvent::Opened {
            width: 720,
            height: 1280,
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let _ = self.event_tx.send(CameraEvent::Closed);
    }

    fn facing(&self) -> CameraFacing {
        *self.facing.lock().unwrap()
    }

    fn set_facing(&mut self, facing: CameraFacing) {
        *self.facing.lock().unwrap() = facing;
    }

    fn frames(&self) -> broadcast::Receiver<Arc<VideoFrame>> {
        self.frame_tx.subscribe()
    }

    fn events(&self) -> broadcast::Receiver<CameraEvent> {
        self.event_tx.subscribe()
    }
}

/// Handle for feeding a `ScriptedInput` after it has been moved into a
/// session
#[derive(Clone)]
pub struct InputHandle {
    queue: Arc<Mutex<VecDeque<Vec<i16>>>>,
    closed: Arc<AtomicBool>,
}

impl InputHandle {
    pub fn push(&self, samples: Vec<i16>) {
        self.queue.lock().unwrap().push_back(samples);
    }

    /// Make subsequent reads report an exhausted source
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Microphone double fed manually by the test
pub struct ScriptedInput {
    format: AudioFormat,
    queue: Arc<Mutex<VecDeque<Vec<i16>>>>,
    closed: Arc<AtomicBool>,
}

impl ScriptedInput {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn handle(&self) -> InputHandle {
        InputHandle {
            queue: self.queue.clone(),
            closed: self.closed.clone(),
        }
    }
}

impl AudioInput for ScriptedInput {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        loop {
            if let Some(samples) = self.queue.lock().unwrap().pop_front() {
                let n = samples.len().min(buf.len());
                buf[..n].copy_from_slice(&samples[..n]);
                return Ok(n);
            }
            if self.closed.load(Ordering::SeqCst) {
                return Ok(0);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

/// Lane factory producing codec-free passthrough lanes
///
/// Each raw frame becomes one access unit carrying the raw payload, so the
/// full session wiring can be observed without opening codecs. Lane starts
/// are counted to verify resource acquisition per cycle.
#[derive(Default)]
pub struct PassthroughLaneFactory {
    video_starts: Arc<AtomicU64>,
    audio_starts: Arc<AtomicU64>,
    variants: Arc<Mutex<Vec<EncoderPath>>>,
}

impl PassthroughLaneFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn video_starts(&self) -> u64 {
        self.video_starts.load(Ordering::SeqCst)
    }

    pub fn audio_starts(&self) -> u64 {
        self.audio_starts.load(Ordering::SeqCst)
    }

    pub fn variants(&self) -> Vec<EncoderPath> {
        self.variants.lock().unwrap().clone()
    }
}

impl LaneFactory for PassthroughLaneFactory {
    fn video_lane(
        &self,
        path: EncoderPath,
        sink: Arc<dyn AccessUnitSink>,
        _events: UnboundedSender<SessionEvent>,
    ) -> Result<VideoLane> {
        self.variants.lock().unwrap().push(path);
        Ok(Box::new(PassthroughVideoLane {
            sink,
            starts: self.video_starts.clone(),
            last_pts: Duration::ZERO,
        }))
    }

    fn audio_lane(
        &self,
        path: EncoderPath,
        sink: Arc<dyn AccessUnitSink>,
        _events: UnboundedSender<SessionEvent>,
    ) -> Result<AudioLane> {
        self.variants.lock().unwrap().push(path);
        Ok(Box::new(PassthroughAudioLane {
            sink,
            starts: self.audio_starts.clone(),
        }))
    }
}

struct PassthroughVideoLane {
    sink: Arc<dyn AccessUnitSink>,
    starts: Arc<AtomicU64>,
    last_pts: Duration,
}

impl EncodingPath for PassthroughVideoLane {
    type Frame = VideoFrame;
    type Params = VideoParameters;

    fn configure(&mut self, _params: &VideoParameters) -> Result<()> {
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn encode(&mut self, frame: &VideoFrame, pts: Duration) -> Result<()> {
        self.last_pts = pts;
        self.sink.deliver(AccessUnit {
            kind: MediaKind::Video,
            data: frame.data.clone(),
            pts,
            keyframe: true,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        // Emit a trailing unit like a real codec flush would; the
        // publishing gate decides its fate
        self.sink.deliver(AccessUnit {
            kind: MediaKind::Video,
            data: bytes::Bytes::new(),
            pts: self.last_pts,
            keyframe: false,
        });
        Ok(())
    }

    fn close(&mut self) {}
}

struct PassthroughAudioLane {
    sink: Arc<dyn AccessUnitSink>,
    starts: Arc<AtomicU64>,
}

impl EncodingPath for PassthroughAudioLane {
    type Frame = AudioBuffer;
    type Params = AudioParameters;

    fn configure(&mut self, _params: &AudioParameters) -> Result<()> {
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn encode(&mut self, buffer: &AudioBuffer, pts: Duration) -> Result<()> {
        let bytes: Vec<u8> = buffer
            .samples
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        self.sink.deliver(AccessUnit {
            kind: MediaKind::Audio,
            data: bytes.into(),
            pts,
            keyframe: false,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {}
}
