// Example: Microphone level check
//
// Captures the default input device for a few seconds and prints a level
// meter per block, so you can confirm the microphone works before starting
// a real session. No network access required.
//
// Usage: cargo run --example mic_check -- --duration 10

use anyhow::Result;
use clap::Parser;
use colloquy::{CaptureBackendFactory, CaptureConfig, CaptureSource};
use std::time::Duration;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "mic_check")]
#[command(about = "Print microphone levels per captured block")]
struct Args {
    /// Duration to capture in seconds
    #[arg(short, long, default_value = "10")]
    duration: u64,

    /// Capture sample rate in Hz
    #[arg(short, long, default_value = "16000")]
    sample_rate: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let args = Args::parse();

    info!("Colloquy - Microphone Check");
    info!("Capturing for {} seconds at {}Hz", args.duration, args.sample_rate);

    let capture_config = CaptureConfig {
        sample_rate: args.sample_rate,
        channels: 1,
        ..CaptureConfig::default()
    };

    let mut backend =
        CaptureBackendFactory::create(CaptureSource::Microphone, capture_config)?;
    info!("Backend created: {}", backend.name());

    let mut rx = backend.start().await?;
    info!("Capture started, speak into the microphone...");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.duration);
    let mut block_count = 0usize;
    let mut peak_overall = 0.0f32;

    loop {
        if tokio::time::Instant::now() >= deadline {
            break;
        }

        match tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
            Ok(Some(frame)) => {
                block_count += 1;

                let rms = (frame.samples.iter().map(|s| s * s).sum::<f32>()
                    / frame.samples.len().max(1) as f32)
                    .sqrt();
                let peak = frame.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
                peak_overall = peak_overall.max(peak);

                // 40-column meter scaled to RMS
                let bar_len = ((rms * 40.0 * 4.0) as usize).min(40);
                let bar: String = "#".repeat(bar_len);

                info!(
                    "[{:6.1}ms] {:<40} rms {:.3} peak {:.3}",
                    frame.timestamp_ms as f64, bar, rms, peak
                );
            }
            Ok(None) => {
                info!("Capture channel closed");
                break;
            }
            Err(_) => {
                // Timeout, keep waiting until the deadline
            }
        }
    }

    backend.stop().await?;

    info!("Capture stopped");
    info!("Blocks received: {}", block_count);
    info!("Overall peak: {:.3}", peak_overall);

    if block_count == 0 {
        info!("No audio received. Check microphone permissions and the input device.");
    }

    Ok(())
}
