use super::sink::{PlaybackError, PlaybackSink, SourceId};
use crate::audio::PlayableBuffer;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Schedules decoded audio chunks for gapless playback
///
/// Keeps a virtual clock that always sits at the end of the last queued
/// chunk, so chunks arriving faster than real time line up back to back with
/// no gap and no overlap. The clock never runs backwards except through
/// `interrupt`, which rewinds it to zero.
pub struct PlaybackScheduler {
    sink: Box<dyn PlaybackSink>,
    active: HashSet<SourceId>,
    next_start: Duration,
    next_id: u64,
    speaking: Arc<AtomicBool>,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn PlaybackSink>) -> Self {
        Self {
            sink,
            active: HashSet::new(),
            next_start: Duration::ZERO,
            next_id: 0,
            speaking: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the underlying output device
    pub async fn open(&mut self) -> Result<mpsc::UnboundedReceiver<SourceId>, PlaybackError> {
        self.sink.open().await
    }

    /// Close the underlying output device
    pub async fn close(&mut self) -> Result<(), PlaybackError> {
        self.sink.close().await
    }

    /// Queue a chunk to play immediately after everything already queued
    pub fn schedule(&mut self, chunk: PlayableBuffer) -> Result<SourceId, PlaybackError> {
        if !self.sink.is_open() {
            return Err(PlaybackError::Unavailable(
                "no open output device".to_string(),
            ));
        }

        // Never schedule in the past: catch the clock up to the device first
        let start_at = self.next_start.max(self.sink.position());
        let duration = chunk.duration();

        let id = SourceId(self.next_id);
        self.next_id += 1;

        self.sink.begin(id, chunk, start_at)?;
        self.active.insert(id);
        self.speaking.store(true, Ordering::SeqCst);
        self.next_start = start_at + duration;

        debug!("scheduled source {} at {:?} for {:?}", id, start_at, duration);
        Ok(id)
    }

    /// Handle a completion event from the sink
    ///
    /// Returns true when the id belonged to an active source
    pub fn complete(&mut self, id: SourceId) -> bool {
        let removed = self.active.remove(&id);
        if removed && self.active.is_empty() {
            self.speaking.store(false, Ordering::SeqCst);
        }
        removed
    }

    /// Stop everything queued and playing, rewind the clock (barge-in)
    ///
    /// Safe to call at any time, including with nothing active.
    pub fn interrupt(&mut self) {
        let cancelled = self.active.len();
        self.sink.cancel_all();
        self.active.clear();
        self.next_start = Duration::ZERO;
        self.speaking.store(false, Ordering::SeqCst);

        if cancelled > 0 {
            info!("playback interrupted, cancelled {} sources", cancelled);
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Shared flag for status snapshots
    pub fn speaking_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.speaking)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Where the next chunk would start on the virtual clock
    pub fn next_start(&self) -> Duration {
        self.next_start
    }
}
