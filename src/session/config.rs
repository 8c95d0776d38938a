use crate::audio::{BLOCK_SAMPLES, CAPTURE_SAMPLE_RATE};
use crate::live::LiveConfig;
use serde::{Deserialize, Serialize};

/// Configuration for a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (for logs)
    pub session_id: String,

    /// Model the live service should run
    pub model: String,

    /// Prebuilt voice for spoken replies
    pub voice_name: String,

    /// Persona/system prompt, passed through opaque
    pub system_instruction: String,

    /// Completed model turn seeded into the transcript at startup
    /// (empty = no greeting)
    pub greeting: String,

    /// Microphone sample rate in Hz
    pub capture_sample_rate: u32,

    /// Samples per block sent to the live service
    pub block_samples: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            model: "native-audio-preview".to_string(),
            voice_name: "Charon".to_string(),
            system_instruction: String::new(),
            greeting: String::new(),
            capture_sample_rate: CAPTURE_SAMPLE_RATE,
            block_samples: BLOCK_SAMPLES,
        }
    }
}

impl SessionConfig {
    /// Build the live-session config, applying per-start overrides
    pub fn live_config(&self, overrides: &VoiceOverrides) -> LiveConfig {
        LiveConfig {
            response_modalities: vec!["AUDIO".to_string()],
            voice_name: overrides
                .voice_name
                .clone()
                .unwrap_or_else(|| self.voice_name.clone()),
            system_instruction: overrides
                .system_instruction
                .clone()
                .unwrap_or_else(|| self.system_instruction.clone()),
            input_transcription_enabled: true,
            output_transcription_enabled: true,
        }
    }
}

/// Per-start overrides from the control surface
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceOverrides {
    pub voice_name: Option<String>,
    pub system_instruction: Option<String>,
}
