use super::backend::{AudioFrame, CaptureBackend, CaptureConfig, CaptureError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// Microphone capture backend using the default cpal input device
///
/// The cpal stream is not Send, so it lives on a dedicated thread that holds
/// it until `stop` clears the running flag.
pub struct MicBackend {
    config: CaptureConfig,
    running: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl MicBackend {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn build_stream(
        config: &CaptureConfig,
        tx: mpsc::Sender<AudioFrame>,
    ) -> Result<cpal::Stream, CaptureError> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| CaptureError::Unavailable("no input device available".to_string()))?;

        let supported = device
            .supported_input_configs()
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?
            .find(|c| {
                c.channels() == config.channels
                    && c.min_sample_rate() <= SampleRate(config.sample_rate)
                    && c.max_sample_rate() >= SampleRate(config.sample_rate)
            })
            .ok_or_else(|| {
                CaptureError::Unavailable("no suitable input config found".to_string())
            })?;

        let stream_config = supported
            .with_sample_rate(SampleRate(config.sample_rate))
            .config();

        debug!(
            "microphone initialized: {} at {}Hz",
            device.name().unwrap_or_default(),
            config.sample_rate
        );

        let block_samples = config.block_samples;
        let sample_rate = config.sample_rate;
        let channels = config.channels;
        let mut pending: Vec<f32> = Vec::with_capacity(block_samples * 2);
        let mut emitted: u64 = 0;

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    pending.extend_from_slice(data);

                    while pending.len() >= block_samples {
                        let block: Vec<f32> = pending.drain(..block_samples).collect();
                        let timestamp_ms = emitted * 1000 / sample_rate as u64;
                        emitted += block_samples as u64;

                        let frame = AudioFrame {
                            samples: block,
                            sample_rate,
                            channels,
                            timestamp_ms,
                        };

                        // Never block the audio thread; a full channel drops the block
                        match tx.try_send(frame) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                warn!("capture channel full, dropping audio block");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {}
                        }
                    }
                },
                |err| {
                    error!("microphone stream error: {}", err);
                },
                None,
            )
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?;

        Ok(stream)
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::Stream("already capturing".to_string()));
        }

        let (tx, rx) = mpsc::channel(32);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), CaptureError>>();

        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let handle = std::thread::spawn(move || {
            let stream = match Self::build_stream(&config, tx) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(CaptureError::Unavailable(e.to_string())));
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
                debug!("microphone capture started");
                Ok(rx)
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                Err(CaptureError::Unavailable(
                    "capture thread exited early".to_string(),
                ))
            }
        }
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(handle) = self.worker.take() {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }

        debug!("microphone capture stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

impl Drop for MicBackend {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
