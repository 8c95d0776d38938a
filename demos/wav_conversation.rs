// Example: Drive a full conversation from a WAV file
//
// This example exercises the complete voice pipeline without a microphone:
// 1. FileBackend reads a WAV file and emits 16kHz mono blocks in real time
// 2. Blocks are PCM-encoded and streamed to the live speech service
// 3. Replies come back as 24kHz audio chunks plus transcript fragments
// 4. Chunks are scheduled gaplessly on the default output device
// 5. The reconciled transcript is printed at the end
//
// Prerequisites:
// - A live speech endpoint reachable at the configured URL
// - API key exported: export COLLOQUY_API_KEY=...
//
// Usage: cargo run --example wav_conversation -- --file question.wav

use anyhow::{Context, Result};
use clap::Parser;
use colloquy::{
    CaptureBackendFactory, CaptureConfig, CaptureSource, Config, DeviceSink, SessionConfig,
    SessionState, VoiceOverrides, VoiceSession, WsConnector,
};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "wav_conversation")]
#[command(about = "Stream a WAV file through a live voice session")]
struct Args {
    /// WAV file to play into the session (16kHz mono works best)
    #[arg(short, long)]
    file: String,

    /// Config file path (without extension)
    #[arg(short, long, default_value = "config/colloquy")]
    config: String,

    /// Seconds to keep the session open after the clip ends
    #[arg(short, long, default_value = "20")]
    linger: u64,

    /// Override the reply voice
    #[arg(long)]
    voice: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config).context("Failed to load configuration")?;

    // The clip length decides how long we stream before lingering for the reply
    let clip_secs = {
        let reader = hound::WavReader::open(&args.file).context("Failed to open WAV file")?;
        reader.duration() as f64 / reader.spec().sample_rate as f64
    };

    info!("🎙️  WAV conversation demo");
    info!("Clip: {} ({:.1}s)", args.file, clip_secs);
    info!("Endpoint: {}", cfg.live.url);

    // 1. Build the connector, picking up the API key from the environment
    let connector = match std::env::var(&cfg.live.api_key_env) {
        Ok(key) => WsConnector::new(&cfg.live.url).with_api_key(&key),
        Err(_) => {
            warn!("{} not set, connecting without an API key", cfg.live.api_key_env);
            WsConnector::new(&cfg.live.url)
        }
    };

    // 2. File capture backend in place of the microphone
    let capture_config = CaptureConfig {
        sample_rate: cfg.audio.capture_sample_rate,
        channels: 1,
        block_samples: cfg.audio.block_samples,
    };
    let capture = CaptureBackendFactory::create(
        CaptureSource::File(args.file.clone()),
        capture_config,
    )?;
    info!("✅ Capture backend ready: {}", capture.name());

    // 3. Assemble the session
    let session_config = SessionConfig {
        model: cfg.live.model.clone(),
        voice_name: cfg.live.voice_name.clone(),
        system_instruction: cfg.live.system_instruction.clone(),
        greeting: cfg.live.greeting.clone(),
        capture_sample_rate: cfg.audio.capture_sample_rate,
        block_samples: cfg.audio.block_samples,
        ..SessionConfig::default()
    };
    let session = VoiceSession::new(
        session_config,
        Box::new(connector),
        capture,
        Box::new(DeviceSink::new()),
    );

    let overrides = VoiceOverrides {
        voice_name: args.voice.clone(),
        system_instruction: None,
    };

    // 4. Start, stream the clip, then linger for the reply
    session.start(overrides).await?;
    info!("✅ Session started, streaming the clip...");

    let total = Duration::from_secs_f64(clip_secs) + Duration::from_secs(args.linger);
    let started = tokio::time::Instant::now();

    while started.elapsed() < total {
        sleep(Duration::from_secs(1)).await;
        let stats = session.stats().await;
        info!(
            "📊 {} | sent {} blocks, played {} chunks",
            stats.status_text(),
            stats.blocks_sent,
            stats.chunks_played
        );

        if stats.state == SessionState::Idle || stats.state == SessionState::Error {
            warn!("Session ended early");
            break;
        }
    }

    // 5. Tear down and print the conversation
    let stats = session.stop().await;

    info!("");
    info!("🏁 Conversation complete");
    info!("📊 Blocks sent: {}, chunks played: {}", stats.blocks_sent, stats.chunks_played);
    info!("");
    for turn in session.transcript().await {
        let who = match turn.speaker {
            colloquy::Speaker::User => "You",
            colloquy::Speaker::Model => "Model",
        };
        info!("{}: {}", who, turn.text);
    }

    Ok(())
}
