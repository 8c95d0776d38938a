pub mod audio;
pub mod config;
pub mod http;
pub mod live;
pub mod playback;
pub mod session;
pub mod transcript;

pub use audio::{
    AudioFrame, CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureError, CaptureSource,
    CodecError, FileBackend, MicBackend, PlayableBuffer,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use live::{
    LiveConfig, LiveConnector, LiveError, LiveSession, ServerMessage, SessionEvent, WsConnector,
};
pub use playback::{DeviceSink, PlaybackError, PlaybackScheduler, PlaybackSink, SourceId};
pub use session::{SessionConfig, SessionState, SessionStats, VoiceOverrides, VoiceSession};
pub use transcript::{ChatTurn, Speaker, TranscriptReconciler};
