pub mod backend;
pub mod file;
pub mod mic;
pub mod pcm;

pub use backend::{
    AudioFrame, CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureError, CaptureSource,
    BLOCK_SAMPLES, CAPTURE_SAMPLE_RATE,
};
pub use file::FileBackend;
pub use mic::MicBackend;
pub use pcm::{decode_base64, decode_pcm16, encode_pcm16, CodecError, PlayableBuffer};
