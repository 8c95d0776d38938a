use super::config::{SessionConfig, VoiceOverrides};
use super::stats::SessionStats;
use crate::audio::{pcm, AudioFrame, CaptureBackend};
use crate::live::{LiveConnector, LiveSession, ServerMessage, SessionEvent};
use crate::playback::{PlaybackScheduler, PlaybackSink, SourceId, PLAYBACK_SAMPLE_RATE};
use crate::transcript::{ChatTurn, Speaker, TranscriptReconciler};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Lifecycle state of a voice session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session; resources released
    Idle,
    /// Opening the remote session
    Connecting,
    /// Streaming microphone audio and serving replies
    Listening,
    /// A failure tore the session down; `stop` returns to `Idle`
    Error,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Connecting,
            2 => SessionState::Listening,
            3 => SessionState::Error,
            _ => SessionState::Idle,
        }
    }
}

/// Everything the event loop shares with the controller
struct LoopShared {
    state: Arc<AtomicU8>,
    blocks_sent: Arc<AtomicUsize>,
    chunks_played: Arc<AtomicUsize>,
    live: Arc<Mutex<Option<Box<dyn LiveSession>>>>,
    capture: Arc<Mutex<Box<dyn CaptureBackend>>>,
    scheduler: Arc<Mutex<PlaybackScheduler>>,
    reconciler: Arc<Mutex<TranscriptReconciler>>,
    shutdown: Arc<Notify>,
}

struct LoopTask {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// A voice conversation session: microphone in, spoken replies out
///
/// Owns the capture backend, the playback scheduler, the transcript, and the
/// live session handle, and is the only component that starts or stops any
/// of them. All session state is mutated from one event-loop task fed by
/// tagged events; `start` and `stop` only flip the state machine and
/// acquire/release resources.
pub struct VoiceSession {
    config: SessionConfig,
    connector: Box<dyn LiveConnector>,

    /// Current lifecycle state
    state: Arc<AtomicU8>,

    /// Mirror of the scheduler's speaking flag
    speaking: Arc<AtomicBool>,

    /// When the current session started
    started_at: Arc<Mutex<Option<DateTime<Utc>>>>,

    /// Captured blocks sent to the live service
    blocks_sent: Arc<AtomicUsize>,

    /// Audio chunks played to completion
    chunks_played: Arc<AtomicUsize>,

    /// Live session handle, present only while a session is active
    live: Arc<Mutex<Option<Box<dyn LiveSession>>>>,

    /// Capture backend (microphone or file)
    capture: Arc<Mutex<Box<dyn CaptureBackend>>>,

    /// Gapless playback scheduler
    scheduler: Arc<Mutex<PlaybackScheduler>>,

    /// Accumulated conversation transcript
    reconciler: Arc<Mutex<TranscriptReconciler>>,

    /// Running event loop, present only while a session is active
    loop_task: Arc<Mutex<Option<LoopTask>>>,
}

impl VoiceSession {
    /// Create a session around the given collaborators
    pub fn new(
        config: SessionConfig,
        connector: Box<dyn LiveConnector>,
        capture: Box<dyn CaptureBackend>,
        sink: Box<dyn PlaybackSink>,
    ) -> Self {
        let scheduler = PlaybackScheduler::new(sink);
        let speaking = scheduler.speaking_flag();

        let mut reconciler = TranscriptReconciler::new();
        reconciler.seed_greeting(&config.greeting);

        Self {
            config,
            connector,
            state: Arc::new(AtomicU8::new(SessionState::Idle as u8)),
            speaking,
            started_at: Arc::new(Mutex::new(None)),
            blocks_sent: Arc::new(AtomicUsize::new(0)),
            chunks_played: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(Mutex::new(None)),
            capture: Arc::new(Mutex::new(capture)),
            scheduler: Arc::new(Mutex::new(scheduler)),
            reconciler: Arc::new(Mutex::new(reconciler)),
            loop_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Start a conversation
    ///
    /// Legal only from `Idle`. Opens the live session, then lets the event
    /// loop start capture once the session reports `Opened`.
    pub async fn start(&self, overrides: VoiceOverrides) -> Result<()> {
        if self
            .state
            .compare_exchange(
                SessionState::Idle as u8,
                SessionState::Connecting as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            bail!("session already active");
        }

        info!("Starting voice session: {}", self.config.session_id);

        self.blocks_sent.store(0, Ordering::SeqCst);
        self.chunks_played.store(0, Ordering::SeqCst);
        *self.started_at.lock().await = Some(Utc::now());

        let live_config = self.config.live_config(&overrides);
        let open = self.connector.open(&self.config.model, live_config).await;

        let (session, events) = match open {
            Ok(pair) => pair,
            Err(e) => {
                error!("Failed to open live session: {}", e);
                self.state.store(SessionState::Error as u8, Ordering::SeqCst);
                self.release_resources().await;
                return Err(e).context("failed to open live session");
            }
        };

        // stop() may have run while the connect was in flight
        if self.state.load(Ordering::SeqCst) != SessionState::Connecting as u8 {
            info!("Session stopped during connect, discarding live handle");
            let mut session = session;
            if let Err(e) = session.close().await {
                warn!("Error closing unused live session: {}", e);
            }
            return Ok(());
        }

        *self.live.lock().await = Some(session);

        let completions = {
            let mut scheduler = self.scheduler.lock().await;
            match scheduler.open().await {
                Ok(rx) => rx,
                Err(e) => {
                    error!("Failed to open playback device: {}", e);
                    self.state.store(SessionState::Error as u8, Ordering::SeqCst);
                    self.release_resources().await;
                    return Err(e).context("failed to open playback device");
                }
            }
        };

        let shutdown = Arc::new(Notify::new());
        let shared = LoopShared {
            state: Arc::clone(&self.state),
            blocks_sent: Arc::clone(&self.blocks_sent),
            chunks_played: Arc::clone(&self.chunks_played),
            live: Arc::clone(&self.live),
            capture: Arc::clone(&self.capture),
            scheduler: Arc::clone(&self.scheduler),
            reconciler: Arc::clone(&self.reconciler),
            shutdown: Arc::clone(&shutdown),
        };

        let handle = tokio::spawn(Self::run_event_loop(shared, events, completions));
        *self.loop_task.lock().await = Some(LoopTask { shutdown, handle });

        // A stop() that raced the steps above may have found empty slots;
        // if it did, unwind what was just set up
        let state = SessionState::from_u8(self.state.load(Ordering::SeqCst));
        if state == SessionState::Idle || state == SessionState::Error {
            info!("Session stopped during startup, unwinding");
            self.halt_loop().await;
            self.state.store(state as u8, Ordering::SeqCst);
        }

        Ok(())
    }

    /// Stop the conversation and release every resource
    ///
    /// Idempotent: safe from any state, including mid-`start` and when
    /// nothing is running. Always leaves the session `Idle`.
    pub async fn stop(&self) -> SessionStats {
        let previous = self.state.swap(SessionState::Idle as u8, Ordering::SeqCst);
        if previous != SessionState::Idle as u8 {
            info!("Stopping voice session: {}", self.config.session_id);
        }

        self.halt_loop().await;

        // The loop may have flipped the state while it was draining
        self.state.store(SessionState::Idle as u8, Ordering::SeqCst);
        self.stats().await
    }

    /// Stop the event loop if one is running, then release resources
    async fn halt_loop(&self) {
        let task = self.loop_task.lock().await.take();
        if let Some(task) = task {
            task.shutdown.notify_one();
            if let Err(e) = task.handle.await {
                error!("Session loop panicked: {}", e);
            }
        }

        self.release_resources().await;
    }

    /// Release every held resource, tolerating absent or already-closed ones
    async fn release_resources(&self) {
        release_resources(&self.live, &self.capture, &self.scheduler).await;
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether synthesized speech is queued or audible
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Snapshot of session statistics
    pub async fn stats(&self) -> SessionStats {
        let started_at = *self.started_at.lock().await;
        let duration_secs = started_at
            .map(|t| Utc::now().signed_duration_since(t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);
        let transcript_turns = self.reconciler.lock().await.len();

        SessionStats {
            state: self.state(),
            speaking: self.is_speaking(),
            started_at,
            duration_secs,
            blocks_sent: self.blocks_sent.load(Ordering::SeqCst),
            chunks_played: self.chunks_played.load(Ordering::SeqCst),
            transcript_turns,
        }
    }

    /// Snapshot of the conversation so far
    pub async fn transcript(&self) -> Vec<ChatTurn> {
        self.reconciler.lock().await.turns().to_vec()
    }

    /// One task serializes every mutation: live events, capture blocks, and
    /// playback completions are three channels into a single `select!` loop.
    async fn run_event_loop(
        shared: LoopShared,
        mut events: mpsc::Receiver<SessionEvent>,
        completions: mpsc::UnboundedReceiver<SourceId>,
    ) {
        info!("Session event loop started");

        let mut frames: Option<mpsc::Receiver<AudioFrame>> = None;
        let mut completions = Some(completions);

        loop {
            tokio::select! {
                _ = shared.shutdown.notified() => break,

                event = events.recv() => match event {
                    Some(SessionEvent::Opened) => {
                        if !Self::handle_opened(&shared, &mut frames).await {
                            break;
                        }
                    }
                    Some(SessionEvent::Message(message)) => {
                        if !Self::handle_message(&shared, message).await {
                            break;
                        }
                    }
                    Some(SessionEvent::Errored(reason)) => {
                        error!("Live session error: {}", reason);
                        shared.state.store(SessionState::Error as u8, Ordering::SeqCst);
                        break;
                    }
                    Some(SessionEvent::Closed) | None => {
                        info!("Live session closed");
                        shared.state.store(SessionState::Idle as u8, Ordering::SeqCst);
                        break;
                    }
                },

                frame = recv_or_pend(&mut frames) => match frame {
                    Some(frame) => Self::handle_frame(&shared, frame).await,
                    None => frames = None,
                },

                completion = recv_unbounded_or_pend(&mut completions) => match completion {
                    Some(id) => {
                        let mut scheduler = shared.scheduler.lock().await;
                        if scheduler.complete(id) {
                            shared.chunks_played.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    None => completions = None,
                },
            }
        }

        release_resources(&shared.live, &shared.capture, &shared.scheduler).await;
        info!("Session event loop stopped");
    }

    /// The remote session is ready: start streaming the microphone
    async fn handle_opened(
        shared: &LoopShared,
        frames: &mut Option<mpsc::Receiver<AudioFrame>>,
    ) -> bool {
        // Only a still-connecting session may move to Listening; a stop()
        // that raced the open wins and the loop drains instead
        if shared
            .state
            .compare_exchange(
                SessionState::Connecting as u8,
                SessionState::Listening as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            info!("Session no longer connecting, ignoring open");
            return false;
        }

        let mut capture = shared.capture.lock().await;
        info!("Live session opened, starting {} capture", capture.name());

        match capture.start().await {
            Ok(rx) => {
                *frames = Some(rx);
                info!("Listening");
                true
            }
            Err(e) => {
                error!("Failed to start capture: {}", e);
                shared.state.store(SessionState::Error as u8, Ordering::SeqCst);
                false
            }
        }
    }

    /// Encode one captured block and send it to the live service
    async fn handle_frame(shared: &LoopShared, frame: AudioFrame) {
        let pcm_bytes = pcm::encode_pcm16(&frame.samples);

        let mut live = shared.live.lock().await;
        if let Some(session) = live.as_mut() {
            if let Err(e) = session.send_audio(&pcm_bytes).await {
                error!("Failed to send audio block: {}", e);
            } else {
                shared.blocks_sent.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Route one server payload to the transcript and the scheduler
    ///
    /// Returns false when the output device is lost and the loop must stop
    async fn handle_message(shared: &LoopShared, message: ServerMessage) -> bool {
        if let Some(text) = &message.input_transcription_fragment {
            shared
                .reconciler
                .lock()
                .await
                .apply_fragment(Speaker::User, text);
        }

        if let Some(text) = &message.output_transcription_fragment {
            shared
                .reconciler
                .lock()
                .await
                .apply_fragment(Speaker::Model, text);
        }

        if message.is_turn_complete() {
            shared.reconciler.lock().await.complete_turns();
        }

        // A malformed chunk is a stream glitch; a lost output device is fatal
        if let Some(encoded) = &message.audio_chunk_base64 {
            match pcm::decode_base64(encoded)
                .and_then(|bytes| pcm::decode_pcm16(&bytes, PLAYBACK_SAMPLE_RATE, 1))
            {
                Ok(buffer) => {
                    let mut scheduler = shared.scheduler.lock().await;
                    if let Err(e) = scheduler.schedule(buffer) {
                        error!("Failed to schedule audio chunk: {}", e);
                        shared.state.store(SessionState::Error as u8, Ordering::SeqCst);
                        return false;
                    }
                }
                Err(e) => {
                    warn!("Dropping malformed audio chunk: {}", e);
                }
            }
        }

        if message.is_interrupted() {
            shared.scheduler.lock().await.interrupt();
        }

        true
    }
}

async fn recv_or_pend(frames: &mut Option<mpsc::Receiver<AudioFrame>>) -> Option<AudioFrame> {
    match frames {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_unbounded_or_pend(
    completions: &mut Option<mpsc::UnboundedReceiver<SourceId>>,
) -> Option<SourceId> {
    match completions {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Release live session, capture, and playback in teardown order
///
/// Every step checks for presence first, so repeated calls and calls after
/// partial startup are both safe.
async fn release_resources(
    live: &Mutex<Option<Box<dyn LiveSession>>>,
    capture: &Mutex<Box<dyn CaptureBackend>>,
    scheduler: &Mutex<PlaybackScheduler>,
) {
    {
        let mut live = live.lock().await;
        if let Some(mut session) = live.take() {
            if let Err(e) = session.close().await {
                warn!("Error closing live session: {}", e);
            }
        }
    }

    {
        let mut capture = capture.lock().await;
        if capture.is_capturing() {
            if let Err(e) = capture.stop().await {
                warn!("Error stopping capture: {}", e);
            }
        }
    }

    {
        let mut scheduler = scheduler.lock().await;
        scheduler.interrupt();
        if let Err(e) = scheduler.close().await {
            warn!("Error closing playback device: {}", e);
        }
    }
}
