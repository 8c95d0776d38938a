use super::backend::{AudioFrame, CaptureBackend, CaptureConfig, CaptureError};
use hound::WavReader;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Capture backend that replays a WAV file as paced fixed-size blocks
///
/// Keeps the file's native sample rate; stereo input is averaged to mono.
pub struct FileBackend {
    path: String,
    config: CaptureConfig,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: String, config: CaptureConfig) -> Self {
        Self {
            path,
            config,
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    fn read_samples(path: &str) -> Result<(Vec<f32>, u32), CaptureError> {
        info!("Opening audio file: {}", path);

        let reader = WavReader::open(path).map_err(|e| CaptureError::Unavailable(e.to_string()))?;
        let spec = reader.spec();

        let raw: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => reader
                .into_samples::<i16>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| CaptureError::Unavailable(e.to_string()))?
                .iter()
                .map(|&s| s as f32 / 32768.0)
                .collect(),
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| CaptureError::Unavailable(e.to_string()))?,
        };

        let samples = match spec.channels {
            1 => raw,
            2 => raw
                .chunks_exact(2)
                .map(|pair| (pair[0] + pair[1]) / 2.0)
                .collect(),
            n => {
                return Err(CaptureError::Unavailable(format!(
                    "unsupported channel count: {}",
                    n
                )))
            }
        };

        let duration_seconds = samples.len() as f64 / spec.sample_rate as f64;
        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok((samples, spec.sample_rate))
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::Stream("already capturing".to_string()));
        }

        let (samples, sample_rate) = Self::read_samples(&self.path)?;

        let (tx, rx) = mpsc::channel(32);
        let block_samples = self.config.block_samples;
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let block_duration =
                Duration::from_secs_f64(block_samples as f64 / sample_rate as f64);
            let mut emitted: u64 = 0;

            for block in samples.chunks(block_samples) {
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let frame = AudioFrame {
                    samples: block.to_vec(),
                    sample_rate,
                    channels: 1,
                    timestamp_ms: emitted * 1000 / sample_rate as u64,
                };
                emitted += block.len() as u64;

                if tx.send(frame).await.is_err() {
                    break;
                }

                tokio::time::sleep(block_duration).await;
            }

            running.store(false, Ordering::SeqCst);
            debug!("file capture finished");
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);

        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "file"
    }
}
