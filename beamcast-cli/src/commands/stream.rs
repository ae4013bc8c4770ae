//! Stream command - run a live session against an RTMP endpoint

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use beamcast_core::capture::synthetic::{SilenceInput, TestPatternCamera};
use beamcast_core::config::{AudioSettings, CameraSettings, EncoderPath, StreamSettings};
use beamcast_core::output::rtmp::{PublisherSettings, RtmpPublisher};
use beamcast_core::session::{SessionEvent, StreamingSession};
use beamcast_core::types::AudioFormat;

/// Arguments for the stream command
#[derive(Args)]
pub struct StreamArgs {
    /// Publishing destination (rtmp:// or rtmps://)
    #[arg(long)]
    pub url: String,

    /// Target video width
    #[arg(long, default_value_t = 720)]
    pub width: u32,

    /// Target video height
    #[arg(long, default_value_t = 1280)]
    pub height: u32,

    /// Target frame rate
    #[arg(long, default_value_t = 25)]
    pub fps: u32,

    /// Video bitrate in kbps
    #[arg(long, default_value_t = 512)]
    pub bitrate: u32,

    /// Audio sample rate in Hz
    #[arg(long, default_value_t = 44100)]
    pub sample_rate: u32,

    /// Audio channel count
    #[arg(long, default_value_t = 2)]
    pub channels: u32,

    /// Encoder path: hardware or software
    #[arg(long, default_value = "software")]
    pub path: EncoderPath,

    /// Stop automatically after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,
}

/// Run a live session until Ctrl-C or the configured duration
pub async fn stream(args: StreamArgs) -> Result<()> {
    // Process-wide codec runtime comes up before any session exists
    beamcast_core::encode::codec_runtime_init().context("Codec runtime init failed")?;

    let camera_settings = CameraSettings::default().with_preview(args.width, args.height);
    let stream_settings = StreamSettings::default()
        .with_url(&args.url)
        .with_video_size(args.width, args.height)
        .with_frame_rate(args.fps)
        .with_bitrate(args.bitrate)
        .with_encoder_path(args.path);
    let audio_settings = AudioSettings::default()
        .with_sample_rate(args.sample_rate)
        .with_channels(args.channels);

    let camera = TestPatternCamera::new(args.width, args.height, args.fps);
    let microphone = SilenceInput::new(AudioFormat {
        sample_rate: args.sample_rate,
        channels: args.channels,
    });

    let mut session = StreamingSession::new(
        Box::new(camera),
        Box::new(microphone),
        Arc::new(RtmpPublisher::new(PublisherSettings {
            video_width: args.width,
            video_height: args.height,
            frame_rate: args.fps,
            video_bitrate_kbps: args.bitrate,
            audio_sample_rate: args.sample_rate,
            audio_channels: args.channels,
            audio_bitrate_kbps: audio_settings.bitrate_kbps,
        })),
    );

    session
        .prepare(camera_settings, stream_settings, audio_settings)
        .context("Failed to prepare session")?;
    let mut events = session.events().expect("fresh session has an event channel");

    session
        .start_streaming()
        .context("Failed to start streaming")?;
    println!("Streaming via {} path. Press Ctrl-C to stop.", args.path);

    let deadline = args.duration.map(Duration::from_secs);
    let run = async {
        match deadline {
            Some(limit) => {
                let _ = tokio::time::timeout(limit, tokio::signal::ctrl_c()).await;
            }
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    };

    tokio::select! {
        _ = run => {}
        event = events.recv() => {
            if let Some(SessionEvent::LaneFault { kind, message }) = event {
                eprintln!("{} lane fault: {}", kind, message);
            }
        }
    }

    info!("Shutting down");
    session.stop_streaming().context("Failed to stop streaming")?;

    let stats = session.stats();
    println!(
        "Session finished: {} units published, {} stray units dropped",
        stats.units_forwarded, stats.stray_units_dropped
    );
    Ok(())
}
