//! Info command - show encoder availability

use anyhow::Result;
use beamcast_core::encode;

/// Report which encoders the codec runtime exposes
pub fn info() -> Result<()> {
    println!("Beamcast - Encoder Availability\n");

    if let Err(e) = encode::codec_runtime_init() {
        println!("Codec runtime unavailable: {}", e);
        return Ok(());
    }

    println!("Hardware video (H.264):");
    for name in encode::HARDWARE_VIDEO_ENCODERS {
        println!(
            "  {:<22} {}",
            name,
            if encode::encoder_available(name) {
                "available"
            } else {
                "not found"
            }
        );
    }
    match encode::hardware_video_encoder() {
        Some(name) => println!("  -> hardware path would use {}", name),
        None => println!("  -> hardware path unavailable on this machine"),
    }

    println!("\nSoftware video (H.264):");
    println!(
        "  {:<22} {}",
        encode::SOFTWARE_VIDEO_ENCODER,
        if encode::encoder_available(encode::SOFTWARE_VIDEO_ENCODER) {
            "available"
        } else {
            "not found"
        }
    );

    println!("\nAudio (AAC):");
    for name in encode::HARDWARE_AUDIO_ENCODERS {
        println!(
            "  {:<22} {}",
            name,
            if encode::encoder_available(name) {
                "available"
            } else {
                "not found"
            }
        );
    }

    Ok(())
}
