use serde::{Deserialize, Serialize};

/// Voice and transcription settings sent when opening a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveConfig {
    /// Modalities the service should respond with (audio only here)
    pub response_modalities: Vec<String>,

    /// Prebuilt voice the service should speak with
    pub voice_name: String,

    /// Persona/system prompt, opaque to this crate
    pub system_instruction: String,

    /// Ask the service to transcribe the user's speech
    pub input_transcription_enabled: bool,

    /// Ask the service to transcribe its own speech
    pub output_transcription_enabled: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            response_modalities: vec!["AUDIO".to_string()],
            voice_name: "Charon".to_string(),
            system_instruction: String::new(),
            input_transcription_enabled: true,
            output_transcription_enabled: true,
        }
    }
}

/// One server-to-client message from the live session
///
/// Every field is optional; a single message may carry any combination of
/// transcript text, audio, and control flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    /// Transcript fragment of the user's speech
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_transcription_fragment: Option<String>,

    /// Transcript fragment of the model's speech
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_transcription_fragment: Option<String>,

    /// The current model turn is finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_complete: Option<bool>,

    /// Base64 little-endian 16-bit PCM audio at the playback rate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_chunk_base64: Option<String>,

    /// The user barged in; pending playback should be discarded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,
}

impl ServerMessage {
    pub fn is_turn_complete(&self) -> bool {
        self.turn_complete.unwrap_or(false)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.unwrap_or(false)
    }
}

/// Client-to-server messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// First message on every connection: model choice plus session config
    #[serde(rename_all = "camelCase")]
    Setup { model: String, config: LiveConfig },

    /// One captured audio block, base64 little-endian 16-bit PCM
    #[serde(rename_all = "camelCase")]
    Audio { audio_chunk_base64: String },
}
