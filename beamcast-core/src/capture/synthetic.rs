//! Synthetic capture sources
//!
//! Hardware-free implementations of the camera and microphone contracts:
//! a moving-gradient test pattern camera and a silence microphone. They let
//! the CLI and integration tests drive a full session on any machine.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::audio::AudioInput;
use super::camera::CameraSource;
use crate::error::{BeamcastError, Result};
use crate::types::{
    AudioFormat, CameraEvent, CameraFacing, PixelLayout, VideoFormat, VideoFrame,
};

/// Generate one RGBA test-pattern frame
///
/// Diagonal gradient with a phase offset so consecutive frames differ and
/// encoders see real motion.
pub fn gradient_frame(width: u32, height: u32, phase: u32) -> VideoFrame {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let r = (((x + phase) % width.max(1)) as f32 / width.max(1) as f32 * 255.0) as u8;
            let g = (y as f32 / height.max(1) as f32 * 255.0) as u8;
            let b = (((x + y) as f32 / (width + height).max(1) as f32) * 255.0) as u8;
            data.extend_from_slice(&[r, g, b, 255]);
        }
    }
    VideoFrame {
        format: VideoFormat::packed(width, height, PixelLayout::Rgba),
        data: data.into(),
    }
}

/// Camera source producing a moving test pattern at a fixed rate
pub struct TestPatternCamera {
    width: u32,
    height: u32,
    fps: u32,
    facing: CameraFacing,
    frame_tx: broadcast::Sender<Arc<VideoFrame>>,
    event_tx: broadcast::Sender<CameraEvent>,
    frames_produced: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl TestPatternCamera {
    /// Create a camera producing `width`x`height` frames at `fps`
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        let (frame_tx, _) = broadcast::channel(8);
        let (event_tx, _) = broadcast::channel(8);
        Self {
            width,
            height,
            fps: fps.max(1),
            facing: CameraFacing::Front,
            frame_tx,
            event_tx,
            frames_produced: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Total frames produced across all start/stop cycles
    pub fn frames_produced(&self) -> u64 {
        self.frames_produced.load(Ordering::Relaxed)
    }
}

impl CameraSource for TestPatternCamera {
    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        self.shutdown.store(false, Ordering::SeqCst);

        let (width, height, fps) = (self.width, self.height, self.fps);
        let frame_tx = self.frame_tx.clone();
        let event_tx = self.event_tx.clone();
        let frames_produced = self.frames_produced.clone();
        let shutdown = self.shutdown.clone();

        let worker = std::thread::Builder::new()
            .name("beamcast-camera".to_string())
            .spawn(move || {
                info!("Test pattern camera opened: {}x{} @ {}fps", width, height, fps);
                let _ = event_tx.send(CameraEvent::Opened { width, height });

                let interval = Duration::from_nanos(1_000_000_000 / fps as u64);
                let mut next = Instant::now();
                let mut phase = 0u32;

                while !shutdown.load(Ordering::SeqCst) {
                    let frame = gradient_frame(width, height, phase);
                    phase = phase.wrapping_add(4);
                    frames_produced.fetch_add(1, Ordering::Relaxed);
                    // No receivers is fine; the pattern keeps running
                    let _ = frame_tx.send(Arc::new(frame));

                    next += interval;
                    let now = Instant::now();
                    if next > now {
                        std::thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }

                let _ = event_tx.send(CameraEvent::Closed);
                debug!("Test pattern camera closed");
            })
            .map_err(|e| BeamcastError::state(format!("Failed to spawn camera thread: {}", e)))?;

        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn facing(&self) -> CameraFacing {
        self.facing
    }

    fn set_facing(&mut self, facing: CameraFacing) {
        if facing != self.facing {
            info!("Switching camera to {}", facing);
            self.facing = facing;
        }
    }

    fn frames(&self) -> broadcast::Receiver<Arc<VideoFrame>> {
        self.frame_tx.subscribe()
    }

    fn events(&self) -> broadcast::Receiver<CameraEvent> {
        self.event_tx.subscribe()
    }
}

impl Drop for TestPatternCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Microphone input yielding zeroed PCM, paced to real time
pub struct SilenceInput {
    format: AudioFormat,
}

impl SilenceInput {
    /// Create a silence source with the given capture format
    pub fn new(format: AudioFormat) -> Self {
        Self { format }
    }
}

impl AudioInput for SilenceInput {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
        let frames = buf.len() / self.format.channels.max(1) as usize;
        // Block for as long as a real device would take to fill the buffer
        let wait = Duration::from_nanos(
            frames as u64 * 1_000_000_000 / self.format.sample_rate.max(1) as u64,
        );
        std::thread::sleep(wait);
        buf.fill(0);
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_frame_size() {
        let frame = gradient_frame(64, 48, 0);
        assert_eq!(frame.format.width, 64);
        assert_eq!(frame.format.height, 48);
        assert_eq!(frame.data.len(), 64 * 48 * 4);
    }

    #[test]
    fn test_gradient_frames_move() {
        let first = gradient_frame(32, 32, 0);
        let second = gradient_frame(32, 32, 4);
        assert_ne!(first.data, second.data);
    }

    #[test]
    fn test_camera_produces_frames() {
        let mut camera = TestPatternCamera::new(32, 32, 60);
        let mut rx = camera.frames();
        let mut events = camera.events();
        camera.start().unwrap();

        let mut got_frame = false;
        for _ in 0..500 {
            if rx.try_recv().is_ok() {
                got_frame = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        camera.stop();

        assert!(got_frame);
        assert!(matches!(
            events.try_recv(),
            Ok(CameraEvent::Opened { width: 32, height: 32 })
        ));
    }

    #[test]
    fn test_silence_input_fills_zeroes() {
        let mut input = SilenceInput::new(AudioFormat {
            sample_rate: 48000,
            channels: 2,
        });
        let mut buf = vec![1i16; 256];
        let n = input.read(&mut buf).unwrap();
        assert_eq!(n, 256);
        assert!(buf.iter().all(|&s| s == 0));
    }
}
