use super::sink::{PlaybackError, PlaybackSink, SourceId, PLAYBACK_SAMPLE_RATE};
use crate::audio::PlayableBuffer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

struct Entry {
    id: SourceId,
    samples: Vec<f32>,
    start_frame: u64,
}

struct Shared {
    entries: Mutex<Vec<Entry>>,
    /// Frames elapsed on the device clock since open
    clock_frames: AtomicU64,
}

/// Playback sink backed by the default cpal output device
///
/// The output callback advances a frame counter that serves as the device
/// clock; each source plays inside its `[start, start + len)` window on that
/// counter. As with capture, the cpal stream lives on its own thread.
pub struct DeviceSink {
    sample_rate: u32,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl DeviceSink {
    pub fn new() -> Self {
        Self::with_sample_rate(PLAYBACK_SAMPLE_RATE)
    }

    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            shared: Arc::new(Shared {
                entries: Mutex::new(Vec::new()),
                clock_frames: AtomicU64::new(0),
            }),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn build_stream(
        sample_rate: u32,
        shared: Arc<Shared>,
        completion_tx: mpsc::UnboundedSender<SourceId>,
    ) -> Result<cpal::Stream, PlaybackError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::Unavailable("no output device available".to_string()))?;

        let supported = device
            .supported_output_configs()
            .map_err(|e| PlaybackError::Unavailable(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(sample_rate)
                        && c.max_sample_rate() >= SampleRate(sample_rate)
                })
            })
            .ok_or_else(|| {
                PlaybackError::Unavailable("no suitable output config found".to_string())
            })?;

        let config = supported.with_sample_rate(SampleRate(sample_rate)).config();
        let channels = config.channels as usize;

        debug!(
            "playback initialized: {} at {}Hz, {} channels",
            device.name().unwrap_or_default(),
            sample_rate,
            config.channels
        );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let start_clock = shared.clock_frames.load(Ordering::SeqCst);
                    let frames = (data.len() / channels) as u64;

                    if let Ok(mut entries) = shared.entries.lock() {
                        for (i, frame) in data.chunks_mut(channels).enumerate() {
                            let clock_pos = start_clock + i as u64;
                            let mut sample = 0.0f32;

                            for entry in entries.iter() {
                                if clock_pos >= entry.start_frame {
                                    let offset = (clock_pos - entry.start_frame) as usize;
                                    if offset < entry.samples.len() {
                                        sample += entry.samples[offset];
                                    }
                                }
                            }

                            for out in frame.iter_mut() {
                                *out = sample;
                            }
                        }

                        entries.retain(|entry| {
                            let end = entry.start_frame + entry.samples.len() as u64;
                            if end <= start_clock + frames {
                                let _ = completion_tx.send(entry.id);
                                false
                            } else {
                                true
                            }
                        });
                    } else {
                        for out in data.iter_mut() {
                            *out = 0.0;
                        }
                    }

                    shared.clock_frames.fetch_add(frames, Ordering::SeqCst);
                },
                |err| {
                    error!("playback stream error: {}", err);
                },
                None,
            )
            .map_err(|e| PlaybackError::Unavailable(e.to_string()))?;

        Ok(stream)
    }

    fn duration_to_frames(&self, at: Duration) -> u64 {
        (at.as_secs_f64() * self.sample_rate as f64).round() as u64
    }
}

impl Default for DeviceSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PlaybackSink for DeviceSink {
    async fn open(&mut self) -> Result<mpsc::UnboundedReceiver<SourceId>, PlaybackError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(PlaybackError::Stream("already open".to_string()));
        }

        if let Ok(mut entries) = self.shared.entries.lock() {
            entries.clear();
        }
        self.shared.clock_frames.store(0, Ordering::SeqCst);

        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), PlaybackError>>();

        let sample_rate = self.sample_rate;
        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let handle = std::thread::spawn(move || {
            let stream = match Self::build_stream(sample_rate, shared, completion_tx) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(PlaybackError::Unavailable(e.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok(()));

            while running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }

            drop(stream);
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some(handle);
                debug!("playback device opened");
                Ok(completion_rx)
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                Err(PlaybackError::Unavailable(
                    "playback thread exited early".to_string(),
                ))
            }
        }
    }

    async fn close(&mut self) -> Result<(), PlaybackError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(handle) = self.worker.take() {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }

        if let Ok(mut entries) = self.shared.entries.lock() {
            entries.clear();
        }

        debug!("playback device closed");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn position(&self) -> Duration {
        let frames = self.shared.clock_frames.load(Ordering::SeqCst);
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    fn begin(
        &self,
        id: SourceId,
        buffer: PlayableBuffer,
        at: Duration,
    ) -> Result<(), PlaybackError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(PlaybackError::Unavailable(
                "output device not open".to_string(),
            ));
        }

        let samples = buffer.into_planes().into_iter().next().unwrap_or_default();
        let entry = Entry {
            id,
            samples,
            start_frame: self.duration_to_frames(at),
        };

        if let Ok(mut entries) = self.shared.entries.lock() {
            entries.push(entry);
        }

        Ok(())
    }

    fn cancel_all(&self) {
        if let Ok(mut entries) = self.shared.entries.lock() {
            entries.clear();
        }
    }

    fn name(&self) -> &str {
        "speaker"
    }
}

impl Drop for DeviceSink {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
