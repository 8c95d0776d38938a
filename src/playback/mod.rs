pub mod device;
pub mod scheduler;
pub mod sink;

pub use device::DeviceSink;
pub use scheduler::PlaybackScheduler;
pub use sink::{PlaybackError, PlaybackSink, SourceId, PLAYBACK_SAMPLE_RATE};
