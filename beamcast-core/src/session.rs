//! Streaming session orchestration
//!
//! `StreamingSession` wires capture sources through the selected encoding
//! path to the publisher and owns the lifecycle state machine:
//!
//! ```text
//! Idle --prepare--> Prepared --start_streaming--> Publishing
//!                      ^                              |
//!                      '------- stop_streaming -------'   (Stopped)
//! ```
//!
//! Stopped is observably equivalent to Prepared: a stopped session starts
//! again without re-preparing. The publishing gate (an atomic flag read at
//! every callback delivery point) is what keeps late producer callbacks from
//! racing released resources.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, trace, warn};

use crate::capture::audio::{AudioCaptureStream, AudioInput, AudioSink};
use crate::capture::camera::CameraSource;
use crate::clock::PresentationClock;
use crate::config::{AudioSettings, CameraSettings, SessionConfig, StreamSettings};
use crate::encode::{
    AccessUnitSink, AudioLane, AudioParameters, CodecLaneFactory, LaneFactory, VideoLane,
    VideoParameters,
};
use crate::error::{BeamcastError, Result};
use crate::output::Publisher;
use crate::types::{AccessUnit, AudioBuffer, Handle, MediaKind, VideoFrame};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet configured
    Idle,
    /// Configured; no network or codec resources held
    Prepared,
    /// Live: capture, encode, and publish pipelines running
    Publishing,
    /// Stopped after publishing; equivalent to Prepared
    Stopped,
}

/// Asynchronous session notification
///
/// Failures on producer threads are surfaced here instead of being thrown
/// on an unrelated thread.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A lane failed mid-stream and was stopped; the session keeps running
    LaneFault {
        /// Which lane failed
        kind: MediaKind,
        /// What went wrong
        message: String,
    },
}

/// Counters for one publishing cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    /// Access units forwarded to the publisher
    pub units_forwarded: u64,
    /// Stray units dropped by the publishing gate
    pub stray_units_dropped: u64,
}

/// Gate adapter between the encoding paths and the publisher
///
/// `deliver` runs on whichever thread completed the encode. The gate is read
/// here, at the delivery point, because producers may emit one final unit
/// after stop has been requested; those are expected racing, dropped
/// silently and counted.
struct PublishGate {
    publishing: Arc<AtomicBool>,
    publisher: Arc<dyn Publisher>,
    audio_sample_rate: u32,
    audio_channels: u32,
    events: UnboundedSender<SessionEvent>,
    forwarded: AtomicU64,
    stray_dropped: AtomicU64,
}

impl AccessUnitSink for PublishGate {
    fn deliver(&self, unit: AccessUnit) {
        if !self.publishing.load(Ordering::SeqCst) {
            self.stray_dropped.fetch_add(1, Ordering::Relaxed);
            trace!(
                "Dropped stray {} unit at {}ms (gate closed)",
                unit.kind,
                unit.pts.as_millis()
            );
            return;
        }

        let result = match unit.kind {
            MediaKind::Video => self.publisher.write_video(&unit),
            MediaKind::Audio => {
                self.publisher
                    .write_audio(&unit, self.audio_sample_rate, self.audio_channels)
            }
        };

        match result {
            Ok(()) => {
                self.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!("Publish write failed: {}", e);
                let _ = self.events.send(SessionEvent::LaneFault {
                    kind: unit.kind,
                    message: e.to_string(),
                });
            }
        }
    }
}

/// Audio-lane sink driven on the audio capture thread
struct AudioLaneSink {
    lane: AudioLane,
    clock: Arc<PresentationClock>,
    publishing: Arc<AtomicBool>,
    events: UnboundedSender<SessionEvent>,
    faulted: bool,
}

impl AudioSink for AudioLaneSink {
    fn on_buffer(&mut self, buffer: AudioBuffer) {
        // Publishing gate: buffers may keep arriving while stop is underway
        if self.faulted || !self.publishing.load(Ordering::SeqCst) {
            return;
        }
        let pts = self.clock.relative();
        if let Err(e) = self.lane.encode(&buffer, pts) {
            error!("Audio lane encode failed: {}", e);
            let _ = self.events.send(SessionEvent::LaneFault {
                kind: MediaKind::Audio,
                message: e.to_string(),
            });
            self.faulted = true;
        }
    }

    fn finished(&mut self) {
        if let Err(e) = self.lane.stop() {
            warn!("Audio path stop failed: {}", e);
        }
        self.lane.close();
    }
}

/// The streaming session orchestrator
pub struct StreamingSession {
    handle: Handle,
    state: SessionState,
    config: Option<SessionConfig>,
    camera: Box<dyn CameraSource>,
    audio: AudioCaptureStream,
    publisher: Arc<dyn Publisher>,
    lane_factory: Arc<dyn LaneFactory>,
    publishing: Arc<AtomicBool>,
    clock: Option<Arc<PresentationClock>>,
    gate: Option<Arc<PublishGate>>,
    video_worker: Option<JoinHandle<()>>,
    video_shutdown: Arc<AtomicBool>,
    events_tx: UnboundedSender<SessionEvent>,
    events_rx: Option<UnboundedReceiver<SessionEvent>>,
}

impl StreamingSession {
    /// Create a session around its collaborators
    pub fn new(
        camera: Box<dyn CameraSource>,
        audio_input: Box<dyn AudioInput>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        Self {
            handle: Handle::new(),
            state: SessionState::Idle,
            config: None,
            camera,
            audio: AudioCaptureStream::new(audio_input),
            publisher,
            lane_factory: Arc::new(CodecLaneFactory),
            publishing: Arc::new(AtomicBool::new(false)),
            clock: None,
            gate: None,
            video_worker: None,
            video_shutdown: Arc::new(AtomicBool::new(false)),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Replace the lane factory (used to substitute codec-free lanes)
    pub fn with_lane_factory(mut self, factory: Arc<dyn LaneFactory>) -> Self {
        self.lane_factory = factory;
        self
    }

    /// Session handle for log correlation
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session is currently publishing
    pub fn is_start_publish(&self) -> bool {
        self.publishing.load(Ordering::SeqCst)
    }

    /// Take the asynchronous event receiver; yields `None` after first call
    pub fn events(&mut self) -> Option<UnboundedReceiver<SessionEvent>> {
        self.events_rx.take()
    }

    /// Counters for the current (or most recent) publishing cycle
    pub fn stats(&self) -> SessionStats {
        match &self.gate {
            Some(gate) => SessionStats {
                units_forwarded: gate.forwarded.load(Ordering::Relaxed),
                stray_units_dropped: gate.stray_dropped.load(Ordering::Relaxed),
            },
            None => SessionStats::default(),
        }
    }

    /// The presentation clock of the active publishing cycle
    pub fn clock(&self) -> Result<Arc<PresentationClock>> {
        self.clock
            .clone()
            .ok_or_else(|| BeamcastError::state("No presentation clock outside Publishing"))
    }

    /// Validate and bind configuration: Idle -> Prepared
    ///
    /// Normalizes video dimensions to codec-aligned values and wires the
    /// capture side; opens neither network nor codec resources.
    pub fn prepare(
        &mut self,
        camera_settings: CameraSettings,
        stream_settings: StreamSettings,
        audio_settings: AudioSettings,
    ) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(BeamcastError::state("Session is already prepared"));
        }

        let config =
            SessionConfig::new(camera_settings, stream_settings, audio_settings).normalized();
        if config.stream.video_width == 0 || config.stream.video_height == 0 {
            return Err(BeamcastError::config("Video dimensions must be positive"));
        }
        if config.stream.frame_rate == 0 {
            return Err(BeamcastError::config("Frame rate must be positive"));
        }
        if config.audio.sample_rate == 0 || config.audio.channel_count == 0 {
            return Err(BeamcastError::config("Audio format must be positive"));
        }
        // A destination may still be unset here, but a present one must
        // already carry the streaming scheme
        if !config.stream.url.is_empty() {
            config.validate_destination()?;
        }

        self.camera.set_facing(config.camera.facing);

        info!(
            "{} prepared: {}x{} @ {}fps via {} path -> {}",
            self.handle,
            config.stream.video_width,
            config.stream.video_height,
            config.stream.frame_rate,
            config.stream.encoder_path,
            crate::output::safe_url(&config.stream.url)
        );

        self.config = Some(config);
        self.state = SessionState::Prepared;
        Ok(())
    }

    /// Go live: Prepared/Stopped -> Publishing
    ///
    /// Ordered steps, each gating the next; on failure everything acquired
    /// by this attempt is released and the session stays Prepared.
    /// Idempotent no-op while already Publishing.
    pub fn start_streaming(&mut self) -> Result<()> {
        if self.publishing.load(Ordering::SeqCst) {
            debug!("{} already publishing, ignoring start", self.handle);
            return Ok(());
        }
        let config = self
            .config
            .clone()
            .ok_or_else(|| BeamcastError::state("Session must be prepared before starting"))?;

        // (a) destination must carry the streaming scheme before any I/O
        config.validate_destination()?;

        // (b) open the network connection
        self.publisher.connect(&config.stream.url)?;

        // (c) begin accepting data
        if let Err(e) = self.publisher.start_publish() {
            self.publisher.destroy();
            return Err(e);
        }

        // (d) start the capture pipeline
        if let Err(e) = self.camera.start() {
            self.publisher.destroy();
            return Err(e);
        }

        // (e) single clock origin both lanes stamp against
        let clock = Arc::new(PresentationClock::start());

        // (f) select and bring up exactly one variant's lanes
        let gate = Arc::new(PublishGate {
            publishing: self.publishing.clone(),
            publisher: self.publisher.clone(),
            audio_sample_rate: config.audio.sample_rate,
            audio_channels: config.audio.channel_count,
            events: self.events_tx.clone(),
            forwarded: AtomicU64::new(0),
            stray_dropped: AtomicU64::new(0),
        });
        let (video_lane, audio_lane) = match self.build_lanes(&config, gate.clone()) {
            Ok(lanes) => lanes,
            Err(e) => {
                self.camera.stop();
                self.publisher.destroy();
                return Err(e);
            }
        };

        // (g) wire the producers: video-lane worker + audio capture thread
        self.video_shutdown.store(false, Ordering::SeqCst);
        let video_worker = spawn_video_worker(
            self.camera.frames(),
            video_lane,
            clock.clone(),
            self.publishing.clone(),
            self.video_shutdown.clone(),
            self.events_tx.clone(),
        )?;
        self.video_worker = Some(video_worker);

        if let Err(e) = self.audio.start(Box::new(AudioLaneSink {
            lane: audio_lane,
            clock: clock.clone(),
            publishing: self.publishing.clone(),
            events: self.events_tx.clone(),
            faulted: false,
        })) {
            self.video_shutdown.store(true, Ordering::SeqCst);
            if let Some(worker) = self.video_worker.take() {
                let _ = worker.join();
            }
            self.camera.stop();
            self.publisher.destroy();
            return Err(e);
        }

        self.clock = Some(clock);
        self.gate = Some(gate);

        // (h) open the gate last: units emitted before this point were
        // stray by definition
        self.publishing.store(true, Ordering::SeqCst);
        self.state = SessionState::Publishing;

        info!(
            "{} publishing via {} path to {}",
            self.handle,
            config.stream.encoder_path,
            crate::output::safe_url(&config.stream.url)
        );
        Ok(())
    }

    /// End the publishing cycle: Publishing -> Stopped
    ///
    /// Releases resources in reverse dependency order and guarantees the
    /// audio capture thread has terminated before returning. No-op when not
    /// Publishing.
    pub fn stop_streaming(&mut self) -> Result<()> {
        if !self.publishing.load(Ordering::SeqCst) {
            debug!("{} not publishing, ignoring stop", self.handle);
            return Ok(());
        }
        info!("Stopping {}", self.handle);

        // Close the gate first so in-flight callbacks become no-ops
        self.publishing.store(false, Ordering::SeqCst);

        // Video lane: the worker stops and closes the path on exit
        self.video_shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.video_worker.take() {
            let _ = worker.join();
        }

        // Audio: join the capture thread; its sink closes the audio path
        self.audio.stop();

        // Network connection
        self.publisher.destroy();

        // Capture pipeline
        self.camera.stop();

        self.clock = None;
        self.state = SessionState::Stopped;

        let stats = self.stats();
        info!(
            "{} stopped: {} units published, {} stray units dropped",
            self.handle, stats.units_forwarded, stats.stray_units_dropped
        );
        Ok(())
    }

    /// Toggle the camera facing; orthogonal to streaming state
    pub fn switch_camera(&mut self) {
        let facing = self.camera.facing().toggled();
        self.camera.set_facing(facing);
    }

    fn build_lanes(
        &self,
        config: &SessionConfig,
        gate: Arc<PublishGate>,
    ) -> Result<(VideoLane, AudioLane)> {
        let (frame_width, frame_height) = config.camera.frame_dimensions();
        let video_params = VideoParameters {
            width: config.stream.video_width,
            height: config.stream.video_height,
            frame_width,
            frame_height,
            frame_rate: config.stream.frame_rate,
            bitrate_kbps: config.stream.video_bitrate_kbps,
        };
        let audio_params = AudioParameters {
            sample_rate: config.audio.sample_rate,
            channel_count: config.audio.channel_count,
            bitrate_kbps: config.audio.bitrate_kbps,
        };

        let sink: Arc<dyn AccessUnitSink> = gate;
        let mut video = self.lane_factory.video_lane(
            config.stream.encoder_path,
            sink.clone(),
            self.events_tx.clone(),
        )?;
        video.configure(&video_params)?;
        let mut audio =
            self.lane_factory
                .audio_lane(config.stream.encoder_path, sink, self.events_tx.clone())?;
        audio.configure(&audio_params)?;

        video.start()?;
        if let Err(e) = audio.start() {
            if let Err(stop_err) = video.stop() {
                warn!("Video path stop during rollback failed: {}", stop_err);
            }
            video.close();
            return Err(e);
        }
        Ok((video, audio))
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        if self.publishing.load(Ordering::SeqCst) {
            let _ = self.stop_streaming();
        }
    }
}

/// Spawn the video-lane worker: drains camera frames and drives the path
fn spawn_video_worker(
    mut frames: broadcast::Receiver<Arc<VideoFrame>>,
    mut lane: VideoLane,
    clock: Arc<PresentationClock>,
    publishing: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    events: UnboundedSender<SessionEvent>,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("beamcast-video".to_string())
        .spawn(move || {
            loop {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                match frames.try_recv() {
                    Ok(frame) => {
                        // Publishing gate: frames may arrive before the gate
                        // opens or after stop flips it
                        if !publishing.load(Ordering::SeqCst) {
                            continue;
                        }
                        let pts = clock.relative();
                        if let Err(e) = lane.encode(&frame, pts) {
                            error!("Video lane encode failed: {}", e);
                            let _ = events.send(SessionEvent::LaneFault {
                                kind: MediaKind::Video,
                                message: e.to_string(),
                            });
                            break;
                        }
                    }
                    Err(broadcast::error::TryRecvError::Empty) => {
                        std::thread::sleep(Duration::from_millis(2));
                    }
                    Err(broadcast::error::TryRecvError::Lagged(n)) => {
                        warn!("Video lane dropped {} frames (channel lag)", n);
                    }
                    Err(broadcast::error::TryRecvError::Closed) => {
                        debug!("Camera frame channel closed");
                        break;
                    }
                }
            }

            if let Err(e) = lane.stop() {
                warn!("Video path stop failed: {}", e);
            }
            lane.close();
        })
        .map_err(|e| BeamcastError::state(format!("Failed to spawn video lane worker: {}", e)))
}
