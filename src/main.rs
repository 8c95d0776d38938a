use anyhow::{Context, Result};
use clap::Parser;
use colloquy::audio::{CaptureBackendFactory, CaptureConfig, CaptureSource};
use colloquy::playback::DeviceSink;
use colloquy::{create_router, AppState, Config, SessionConfig, VoiceSession, WsConnector};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "colloquy", about = "Voice conversation client")]
struct Args {
    /// Path to the config file (without extension)
    #[arg(long, default_value = "config/colloquy")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Colloquy v0.1.0");
    info!("Loaded config: {}", cfg.service.name);

    let api_key = std::env::var(&cfg.live.api_key_env).ok();
    if api_key.is_none() {
        warn!(
            "{} not set, connecting without an API key",
            cfg.live.api_key_env
        );
    }

    let mut connector = WsConnector::new(cfg.live.url.clone());
    if let Some(key) = api_key {
        connector = connector.with_api_key(key);
    }

    let session_config = SessionConfig {
        model: cfg.live.model.clone(),
        voice_name: cfg.live.voice_name.clone(),
        system_instruction: cfg.live.system_instruction.clone(),
        greeting: cfg.live.greeting.clone(),
        capture_sample_rate: cfg.audio.capture_sample_rate,
        block_samples: cfg.audio.block_samples,
        ..SessionConfig::default()
    };

    let capture_config = CaptureConfig {
        sample_rate: cfg.audio.capture_sample_rate,
        channels: 1,
        block_samples: cfg.audio.block_samples,
    };
    let capture = CaptureBackendFactory::create(CaptureSource::Microphone, capture_config)
        .context("failed to create capture backend")?;

    let session = Arc::new(VoiceSession::new(
        session_config,
        Box::new(connector),
        capture,
        Box::new(DeviceSink::new()),
    ));

    let state = AppState::new(Arc::clone(&session));
    let router = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    session.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
    }
}
