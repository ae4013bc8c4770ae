//! Microphone capture
//!
//! The microphone itself is an external collaborator behind the blocking
//! `AudioInput` contract. `AudioCaptureStream` owns the thread that drives
//! it: a read loop that hands each buffer to the installed `AudioSink` on
//! the capture thread, the way the audio lane expects to be driven.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{BeamcastError, Result};
use crate::types::{AudioBuffer, AudioFormat};

/// Samples per channel handed to the sink per read
const CAPTURE_CHUNK_FRAMES: usize = 1024;

/// Blocking audio device contract
///
/// `read` blocks until samples are available, mirroring a hardware capture
/// API. Implementations are driven from exactly one thread at a time.
pub trait AudioInput: Send {
    /// Negotiated capture format
    fn format(&self) -> AudioFormat;

    /// Fill `buf` with interleaved PCM samples; returns the number of
    /// samples written. Returning 0 means the source is exhausted.
    fn read(&mut self, buf: &mut [i16]) -> Result<usize>;
}

/// Receiver for captured audio, invoked on the capture thread
pub trait AudioSink: Send {
    /// A buffer of raw samples is available
    fn on_buffer(&mut self, buffer: AudioBuffer);

    /// The capture loop has ended; release anything the sink owns
    fn finished(&mut self);
}

/// Owns the audio capture thread for one session
///
/// Created at `prepare`, started with a sink at `start_streaming`, stopped
/// and joined at `stop_streaming`. The input device is recovered after the
/// join so a stopped stream can be started again.
pub struct AudioCaptureStream {
    input: Option<Box<dyn AudioInput>>,
    worker: Option<JoinHandle<Box<dyn AudioInput>>>,
    shutdown: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl AudioCaptureStream {
    /// Wrap an audio input device
    pub fn new(input: Box<dyn AudioInput>) -> Self {
        Self {
            input: Some(input),
            worker: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Capture format of the underlying device
    pub fn format(&self) -> Option<AudioFormat> {
        self.input.as_ref().map(|input| input.format())
    }

    /// Spawn the capture thread, feeding `sink` until stopped
    pub fn start(&mut self, mut sink: Box<dyn AudioSink>) -> Result<()> {
        if self.worker.is_some() {
            return Err(BeamcastError::state("Audio capture already running"));
        }
        let mut input = self
            .input
            .take()
            .ok_or_else(|| BeamcastError::state("Audio input not available"))?;

        self.shutdown.store(false, Ordering::SeqCst);
        let shutdown = self.shutdown.clone();
        let running = self.running.clone();
        let format = input.format();
        let chunk = CAPTURE_CHUNK_FRAMES * format.channels.max(1) as usize;

        let worker = std::thread::Builder::new()
            .name("beamcast-audio".to_string())
            .spawn(move || {
                info!(
                    "Audio capture started: {}ch @ {}Hz",
                    format.channels, format.sample_rate
                );
                running.store(true, Ordering::SeqCst);
                let mut buf = vec![0i16; chunk];

                while !shutdown.load(Ordering::SeqCst) {
                    match input.read(&mut buf) {
                        Ok(0) => {
                            debug!("Audio input exhausted");
                            break;
                        }
                        Ok(n) => {
                            sink.on_buffer(AudioBuffer {
                                format,
                                samples: buf[..n].to_vec(),
                            });
                        }
                        Err(e) => {
                            error!("Audio read failed: {}", e);
                            break;
                        }
                    }
                }

                sink.finished();
                running.store(false, Ordering::SeqCst);
                info!("Audio capture stopped");
                input
            })
            .map_err(|e| BeamcastError::state(format!("Failed to spawn audio thread: {}", e)))?;

        self.worker = Some(worker);
        Ok(())
    }

    /// Whether the capture thread is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal the capture loop and join the thread
    ///
    /// Guarantees the capture thread has terminated before returning; the
    /// input device is recovered for a later restart.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(input) => self.input = Some(input),
                Err(_) => error!("Audio capture thread panicked"),
            }
        }
    }
}

impl Drop for AudioCaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CountingInput {
        format: AudioFormat,
        reads_left: usize,
    }

    impl AudioInput for CountingInput {
        fn format(&self) -> AudioFormat {
            self.format
        }

        fn read(&mut self, buf: &mut [i16]) -> Result<usize> {
            if self.reads_left == 0 {
                return Ok(0);
            }
            self.reads_left -= 1;
            Ok(buf.len())
        }
    }

    struct CountingSink {
        buffers: Arc<Mutex<Vec<u32>>>,
        finished: Arc<AtomicBool>,
    }

    impl AudioSink for CountingSink {
        fn on_buffer(&mut self, buffer: AudioBuffer) {
            self.buffers.lock().unwrap().push(buffer.sample_count());
        }

        fn finished(&mut self) {
            self.finished.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_capture_delivers_then_finishes() {
        let buffers = Arc::new(Mutex::new(Vec::new()));
        let finished = Arc::new(AtomicBool::new(false));

        let mut stream = AudioCaptureStream::new(Box::new(CountingInput {
            format: AudioFormat::default(),
            reads_left: 3,
        }));
        stream
            .start(Box::new(CountingSink {
                buffers: buffers.clone(),
                finished: finished.clone(),
            }))
            .unwrap();

        // The loop ends on its own once the input is exhausted
        for _ in 0..500 {
            if finished.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        stream.stop();

        assert!(finished.load(Ordering::SeqCst));
        let buffers = buffers.lock().unwrap();
        assert_eq!(buffers.len(), 3);
        assert!(buffers.iter().all(|&count| count == 1024));
    }

    #[test]
    fn test_input_recovered_after_stop() {
        let mut stream = AudioCaptureStream::new(Box::new(CountingInput {
            format: AudioFormat::default(),
            reads_left: 0,
        }));
        stream.start(Box::new(CountingSink {
            buffers: Arc::new(Mutex::new(Vec::new())),
            finished: Arc::new(AtomicBool::new(false)),
        })).unwrap();
        stream.stop();
        assert!(stream.format().is_some());

        // A second cycle reuses the recovered input
        assert!(stream
            .start(Box::new(CountingSink {
                buffers: Arc::new(Mutex::new(Vec::new())),
                finished: Arc::new(AtomicBool::new(false)),
            }))
            .is_ok());
        stream.stop();
    }
}
