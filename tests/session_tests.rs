// Integration tests for the voice session lifecycle
//
// These tests drive a full VoiceSession with mock collaborators standing in
// for the WebSocket transport, the microphone, and the output device, so the
// whole state machine runs without hardware or network.

use async_trait::async_trait;
use base64::Engine;
use colloquy::audio::{encode_pcm16, AudioFrame, CaptureBackend, CaptureError, PlayableBuffer};
use colloquy::live::{LiveConfig, LiveConnector, LiveError, LiveSession, ServerMessage, SessionEvent};
use colloquy::playback::{PlaybackError, PlaybackSink, SourceId};
use colloquy::session::{SessionConfig, SessionState, VoiceOverrides, VoiceSession};
use colloquy::transcript::Speaker;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Poll a condition until it holds or two seconds pass
macro_rules! eventually {
    ($what:expr, $cond:expr) => {{
        let mut ok = false;
        for _ in 0..400 {
            if $cond {
                ok = true;
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert!(ok, "timed out waiting for {}", $what);
    }};
}

// ==== Mock live connector ====

#[derive(Clone, Default)]
struct ConnectorHandles {
    opened_with: Arc<Mutex<Vec<(String, LiveConfig)>>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    closes: Arc<AtomicUsize>,
    events: Arc<Mutex<Option<mpsc::Sender<SessionEvent>>>>,
}

impl ConnectorHandles {
    /// Push a server event into the running session
    async fn send_event(&self, event: SessionEvent) {
        let tx = self
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("no open session to send events to");
        tx.send(event).await.expect("event channel closed");
    }

    fn sent_blocks(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }
}

struct MockConnector {
    handles: ConnectorHandles,
    fail: bool,
}

impl MockConnector {
    fn new() -> (Self, ConnectorHandles) {
        let handles = ConnectorHandles::default();
        (
            Self {
                handles: handles.clone(),
                fail: false,
            },
            handles,
        )
    }

    fn failing() -> Self {
        Self {
            handles: ConnectorHandles::default(),
            fail: true,
        }
    }
}

#[async_trait]
impl LiveConnector for MockConnector {
    async fn open(
        &self,
        model: &str,
        config: LiveConfig,
    ) -> Result<(Box<dyn LiveSession>, mpsc::Receiver<SessionEvent>), LiveError> {
        if self.fail {
            return Err(LiveError::Connect("connection refused".to_string()));
        }

        self.handles
            .opened_with
            .lock()
            .unwrap()
            .push((model.to_string(), config));

        let (tx, rx) = mpsc::channel(32);
        tx.send(SessionEvent::Opened).await.ok();
        *self.handles.events.lock().unwrap() = Some(tx);

        Ok((
            Box::new(MockLiveSession {
                handles: self.handles.clone(),
            }),
            rx,
        ))
    }
}

struct MockLiveSession {
    handles: ConnectorHandles,
}

#[async_trait]
impl LiveSession for MockLiveSession {
    async fn send_audio(&mut self, pcm: &[u8]) -> Result<(), LiveError> {
        self.handles.sent.lock().unwrap().push(pcm.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), LiveError> {
        self.handles.closes.fetch_add(1, Ordering::SeqCst);
        // Closing drops the server side of the event channel
        self.handles.events.lock().unwrap().take();
        Ok(())
    }
}

// ==== Mock capture backend ====

#[derive(Clone, Default)]
struct CaptureHandles {
    capturing: Arc<AtomicBool>,
    stops: Arc<AtomicUsize>,
    frames: Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>,
}

impl CaptureHandles {
    /// Inject one captured block into the running session
    async fn send_samples(&self, samples: Vec<f32>) {
        let tx = self
            .frames
            .lock()
            .unwrap()
            .clone()
            .expect("capture not started");
        let frame = AudioFrame {
            samples,
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        };
        tx.send(frame).await.expect("frame channel closed");
    }
}

struct MockCapture {
    handles: CaptureHandles,
    fail: bool,
}

impl MockCapture {
    fn new() -> (Self, CaptureHandles) {
        let handles = CaptureHandles::default();
        (
            Self {
                handles: handles.clone(),
                fail: false,
            },
            handles,
        )
    }

    fn failing() -> Self {
        Self {
            handles: CaptureHandles::default(),
            fail: true,
        }
    }
}

#[async_trait]
impl CaptureBackend for MockCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.fail {
            return Err(CaptureError::Unavailable("no input device".to_string()));
        }
        let (tx, rx) = mpsc::channel(32);
        *self.handles.frames.lock().unwrap() = Some(tx);
        self.handles.capturing.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.handles.capturing.store(false, Ordering::SeqCst);
        self.handles.stops.fetch_add(1, Ordering::SeqCst);
        self.handles.frames.lock().unwrap().take();
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.handles.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ==== Mock playback sink ====

#[derive(Clone, Default)]
struct SinkHandles {
    open: Arc<AtomicBool>,
    begun: Arc<Mutex<Vec<(SourceId, Duration)>>>,
    cancel_calls: Arc<AtomicUsize>,
    completions: Arc<Mutex<Option<mpsc::UnboundedSender<SourceId>>>>,
    fail_begin: Arc<AtomicBool>,
}

impl SinkHandles {
    fn begun(&self) -> Vec<(SourceId, Duration)> {
        self.begun.lock().unwrap().clone()
    }

    /// Report a source as played to completion
    fn complete(&self, id: SourceId) {
        let tx = self
            .completions
            .lock()
            .unwrap()
            .clone()
            .expect("sink not open");
        tx.send(id).expect("completion channel closed");
    }
}

#[derive(Default)]
struct MockSink {
    handles: SinkHandles,
}

impl MockSink {
    fn new() -> (Self, SinkHandles) {
        let sink = Self::default();
        let handles = sink.handles.clone();
        (sink, handles)
    }
}

#[async_trait]
impl PlaybackSink for MockSink {
    async fn open(&mut self) -> Result<mpsc::UnboundedReceiver<SourceId>, PlaybackError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.handles.completions.lock().unwrap() = Some(tx);
        self.handles.open.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn close(&mut self) -> Result<(), PlaybackError> {
        self.handles.open.store(false, Ordering::SeqCst);
        self.handles.completions.lock().unwrap().take();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.handles.open.load(Ordering::SeqCst)
    }

    fn position(&self) -> Duration {
        Duration::ZERO
    }

    fn begin(
        &self,
        id: SourceId,
        buffer: PlayableBuffer,
        _at: Duration,
    ) -> Result<(), PlaybackError> {
        if self.handles.fail_begin.load(Ordering::SeqCst) {
            return Err(PlaybackError::Unavailable("device lost".to_string()));
        }
        self.handles
            .begun
            .lock()
            .unwrap()
            .push((id, buffer.duration()));
        Ok(())
    }

    fn cancel_all(&self) {
        self.handles.cancel_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ==== Harness ====

struct Harness {
    session: VoiceSession,
    connector: ConnectorHandles,
    capture: CaptureHandles,
    sink: SinkHandles,
}

fn harness_with_config(config: SessionConfig) -> Harness {
    let (connector, connector_handles) = MockConnector::new();
    let (capture, capture_handles) = MockCapture::new();
    let (sink, sink_handles) = MockSink::new();

    let session = VoiceSession::new(
        config,
        Box::new(connector),
        Box::new(capture),
        Box::new(sink),
    );

    Harness {
        session,
        connector: connector_handles,
        capture: capture_handles,
        sink: sink_handles,
    }
}

fn harness() -> Harness {
    harness_with_config(SessionConfig {
        session_id: "test-session".to_string(),
        ..SessionConfig::default()
    })
}

fn audio_message(samples: &[f32]) -> ServerMessage {
    let encoded = base64::engine::general_purpose::STANDARD.encode(encode_pcm16(samples));
    ServerMessage {
        audio_chunk_base64: Some(encoded),
        ..ServerMessage::default()
    }
}

/// Start the session and wait until it is streaming
async fn start_listening(h: &Harness) {
    h.session.start(VoiceOverrides::default()).await.unwrap();
    eventually!("session to reach Listening", {
        h.session.state() == SessionState::Listening
    });
}

// ==== Tests ====

#[tokio::test]
async fn test_start_reaches_listening() {
    let h = harness();

    assert_eq!(h.session.state(), SessionState::Idle);
    start_listening(&h).await;

    assert!(h.capture.capturing.load(Ordering::SeqCst), "capture running");
    assert!(h.sink.open.load(Ordering::SeqCst), "playback device open");

    let stats = h.session.stats().await;
    assert_eq!(stats.state, SessionState::Listening);
    assert_eq!(stats.status_text(), "Listening");
    assert!(stats.started_at.is_some());

    let opened = h.connector.opened_with.lock().unwrap().clone();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].0, "native-audio-preview");
    assert_eq!(opened[0].1.voice_name, "Charon");

    h.session.stop().await;
}

#[tokio::test]
async fn test_start_twice_fails() {
    let h = harness();
    start_listening(&h).await;

    let second = h.session.start(VoiceOverrides::default()).await;
    let err = second.expect_err("second start must fail");
    assert!(err.to_string().contains("already active"));

    // The running session is untouched
    assert_eq!(h.session.state(), SessionState::Listening);

    h.session.stop().await;
}

#[tokio::test]
async fn test_voice_overrides_apply() {
    let h = harness();

    h.session
        .start(VoiceOverrides {
            voice_name: Some("Puck".to_string()),
            system_instruction: Some("Answer in one sentence.".to_string()),
        })
        .await
        .unwrap();

    let opened = h.connector.opened_with.lock().unwrap().clone();
    assert_eq!(opened[0].1.voice_name, "Puck");
    assert_eq!(opened[0].1.system_instruction, "Answer in one sentence.");

    h.session.stop().await;
}

#[tokio::test]
async fn test_capture_blocks_stream_as_pcm() {
    let h = harness();
    start_listening(&h).await;

    h.capture.send_samples(vec![0.5, 0.5, 0.5, 0.5]).await;
    eventually!("block to reach the live session", {
        !h.connector.sent_blocks().is_empty()
    });

    // 0.5 encodes to 16384 little-endian
    let sent = h.connector.sent_blocks();
    assert_eq!(sent[0], vec![0x00, 0x40, 0x00, 0x40, 0x00, 0x40, 0x00, 0x40]);

    eventually!("blocks_sent counter", {
        h.session.stats().await.blocks_sent == 1
    });

    h.session.stop().await;
}

#[tokio::test]
async fn test_server_fragments_build_transcript() {
    let h = harness();
    start_listening(&h).await;

    h.connector
        .send_event(SessionEvent::Message(ServerMessage {
            input_transcription_fragment: Some("What time ".to_string()),
            ..ServerMessage::default()
        }))
        .await;
    h.connector
        .send_event(SessionEvent::Message(ServerMessage {
            input_transcription_fragment: Some("is it?".to_string()),
            ..ServerMessage::default()
        }))
        .await;
    h.connector
        .send_event(SessionEvent::Message(ServerMessage {
            output_transcription_fragment: Some("It is noon.".to_string()),
            turn_complete: Some(true),
            ..ServerMessage::default()
        }))
        .await;

    eventually!("transcript to settle", {
        let turns = h.session.transcript().await;
        turns.len() == 2 && turns.iter().all(|t| t.complete)
    });

    let turns = h.session.transcript().await;
    assert_eq!(turns[0].speaker, Speaker::User);
    assert_eq!(turns[0].text, "What time is it?");
    assert_eq!(turns[1].speaker, Speaker::Model);
    assert_eq!(turns[1].text, "It is noon.");

    h.session.stop().await;
}

#[tokio::test]
async fn test_audio_chunks_play_and_count() {
    let h = harness();
    start_listening(&h).await;

    // 4800 frames at 24kHz = 200ms of reply audio
    h.connector
        .send_event(SessionEvent::Message(audio_message(&vec![0.1; 4800])))
        .await;

    eventually!("chunk to reach the sink", { !h.sink.begun().is_empty() });

    let begun = h.sink.begun();
    assert_eq!(begun.len(), 1);
    assert_eq!(begun[0].1, Duration::from_millis(200));
    assert!(h.session.is_speaking());
    assert_eq!(h.session.stats().await.status_text(), "Speaking");

    // The sink reports the source finished
    h.sink.complete(begun[0].0);
    eventually!("completion to be counted", {
        h.session.stats().await.chunks_played == 1
    });
    assert!(!h.session.is_speaking());

    h.session.stop().await;
}

#[tokio::test]
async fn test_malformed_chunk_is_dropped() {
    let h = harness();
    start_listening(&h).await;

    // Not base64 at all
    h.connector
        .send_event(SessionEvent::Message(ServerMessage {
            audio_chunk_base64: Some("!!not-base64!!".to_string()),
            ..ServerMessage::default()
        }))
        .await;

    // Valid base64, but an odd byte count underneath
    let odd = base64::engine::general_purpose::STANDARD.encode([0x01u8, 0x02, 0x03]);
    h.connector
        .send_event(SessionEvent::Message(ServerMessage {
            audio_chunk_base64: Some(odd),
            ..ServerMessage::default()
        }))
        .await;

    // A good chunk behind the bad ones still plays; events are processed in
    // order, so once it reaches the sink the bad ones are accounted for
    h.connector
        .send_event(SessionEvent::Message(audio_message(&vec![0.1; 4800])))
        .await;

    eventually!("good chunk to reach the sink", { h.sink.begun().len() == 1 });
    assert_eq!(h.session.state(), SessionState::Listening);
    assert_eq!(h.connector.closes.load(Ordering::SeqCst), 0, "no teardown");
    assert_eq!(h.session.stats().await.chunks_played, 0);

    h.session.stop().await;
}

#[tokio::test]
async fn test_playback_failure_tears_down() {
    let h = harness();
    start_listening(&h).await;

    // The output device dies underneath the scheduler
    h.sink.fail_begin.store(true, Ordering::SeqCst);
    h.connector
        .send_event(SessionEvent::Message(audio_message(&vec![0.1; 4800])))
        .await;

    eventually!("session to reach Error", {
        h.session.state() == SessionState::Error
    });
    eventually!("resources to be released", {
        !h.capture.capturing.load(Ordering::SeqCst)
            && !h.sink.open.load(Ordering::SeqCst)
            && h.connector.closes.load(Ordering::SeqCst) == 1
    });

    assert!(h.sink.begun().is_empty(), "nothing reached the device");
    assert_eq!(h.session.stats().await.chunks_played, 0);

    h.session.stop().await;
    assert_eq!(h.session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_interrupted_cancels_playback() {
    let h = harness();
    start_listening(&h).await;

    h.connector
        .send_event(SessionEvent::Message(audio_message(&vec![0.1; 4800])))
        .await;
    eventually!("chunk to reach the sink", { !h.sink.begun().is_empty() });
    assert!(h.session.is_speaking());

    h.connector
        .send_event(SessionEvent::Message(ServerMessage {
            interrupted: Some(true),
            ..ServerMessage::default()
        }))
        .await;

    eventually!("playback to be cancelled", {
        h.sink.cancel_calls.load(Ordering::SeqCst) >= 1
    });
    eventually!("speaking flag to clear", { !h.session.is_speaking() });

    // An interrupted chunk never reports completion
    assert_eq!(h.session.stats().await.chunks_played, 0);

    h.session.stop().await;
}

#[tokio::test]
async fn test_errored_event_tears_down() {
    let h = harness();
    start_listening(&h).await;

    h.connector
        .send_event(SessionEvent::Errored("transport failure".to_string()))
        .await;

    eventually!("session to reach Error", {
        h.session.state() == SessionState::Error
    });
    eventually!("resources to be released", {
        !h.capture.capturing.load(Ordering::SeqCst)
            && !h.sink.open.load(Ordering::SeqCst)
            && h.connector.closes.load(Ordering::SeqCst) == 1
    });

    assert_eq!(h.session.stats().await.status_text(), "Error");

    // stop() clears the error state
    let stats = h.session.stop().await;
    assert_eq!(stats.state, SessionState::Idle);
}

#[tokio::test]
async fn test_closed_event_returns_to_idle() {
    let h = harness();
    start_listening(&h).await;

    h.connector.send_event(SessionEvent::Closed).await;

    eventually!("session to return to Idle", {
        h.session.state() == SessionState::Idle
    });
    eventually!("resources to be released", {
        !h.capture.capturing.load(Ordering::SeqCst) && !h.sink.open.load(Ordering::SeqCst)
    });
}

#[tokio::test]
async fn test_stop_releases_everything_and_is_idempotent() {
    let h = harness();
    start_listening(&h).await;

    let stats = h.session.stop().await;
    assert_eq!(stats.state, SessionState::Idle);
    assert!(!h.capture.capturing.load(Ordering::SeqCst), "capture stopped");
    assert!(!h.sink.open.load(Ordering::SeqCst), "playback closed");
    assert_eq!(h.connector.closes.load(Ordering::SeqCst), 1, "live closed once");
    assert_eq!(h.capture.stops.load(Ordering::SeqCst), 1, "capture stopped once");

    // A second stop is a no-op
    let stats = h.session.stop().await;
    assert_eq!(stats.state, SessionState::Idle);
    assert_eq!(h.connector.closes.load(Ordering::SeqCst), 1);
    assert_eq!(h.capture.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_without_start_is_safe() {
    let h = harness();

    let stats = h.session.stop().await;
    assert_eq!(stats.state, SessionState::Idle);
    assert_eq!(stats.blocks_sent, 0);
    assert_eq!(h.connector.closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connect_failure_sets_error_state() {
    let (capture, capture_handles) = MockCapture::new();
    let (sink, _) = MockSink::new();
    let session = VoiceSession::new(
        SessionConfig::default(),
        Box::new(MockConnector::failing()),
        Box::new(capture),
        Box::new(sink),
    );

    let result = session.start(VoiceOverrides::default()).await;
    assert!(result.is_err());
    assert_eq!(session.state(), SessionState::Error);
    assert!(!capture_handles.capturing.load(Ordering::SeqCst), "capture never started");

    // Recoverable: stop returns to Idle, ready for another attempt
    session.stop().await;
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_capture_failure_tears_down() {
    let (connector, connector_handles) = MockConnector::new();
    let (sink, sink_handles) = MockSink::new();
    let session = VoiceSession::new(
        SessionConfig::default(),
        Box::new(connector),
        Box::new(MockCapture::failing()),
        Box::new(sink),
    );

    // The live session opens fine; the microphone refuses afterwards
    session.start(VoiceOverrides::default()).await.unwrap();

    eventually!("session to reach Error", {
        session.state() == SessionState::Error
    });
    eventually!("resources to be released", {
        connector_handles.closes.load(Ordering::SeqCst) == 1
            && !sink_handles.open.load(Ordering::SeqCst)
    });
    assert_eq!(connector_handles.closes.load(Ordering::SeqCst), 1, "live closed once");

    session.stop().await;
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_restart_after_stop() {
    let h = harness();

    start_listening(&h).await;
    h.capture.send_samples(vec![0.25; 8]).await;
    eventually!("first block to be sent", {
        h.session.stats().await.blocks_sent == 1
    });
    h.session.stop().await;

    // Second conversation on the same controller
    start_listening(&h).await;
    let stats = h.session.stats().await;
    assert_eq!(stats.blocks_sent, 0, "counters reset on start");
    assert_eq!(
        h.connector.opened_with.lock().unwrap().len(),
        2,
        "fresh live session opened"
    );

    h.capture.send_samples(vec![0.25; 8]).await;
    eventually!("second session to stream", {
        h.session.stats().await.blocks_sent == 1
    });

    h.session.stop().await;
}

#[tokio::test]
async fn test_greeting_seeds_transcript() {
    let h = harness_with_config(SessionConfig {
        greeting: "Hello! Ask me anything.".to_string(),
        ..SessionConfig::default()
    });

    let turns = h.session.transcript().await;
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].speaker, Speaker::Model);
    assert_eq!(turns[0].text, "Hello! Ask me anything.");
    assert!(turns[0].complete);
}
