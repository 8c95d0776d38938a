use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub live: LiveSection,
    pub audio: AudioSection,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct LiveSection {
    /// WebSocket endpoint of the speech service
    pub url: String,
    pub model: String,
    pub voice_name: String,
    #[serde(default)]
    pub system_instruction: String,
    #[serde(default)]
    pub greeting: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioSection {
    pub capture_sample_rate: u32,
    pub block_samples: usize,
}

fn default_api_key_env() -> String {
    "COLLOQUY_API_KEY".to_string()
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
