//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dispatch::DispatchSettings;
use crate::error::PodcastError;
use crate::plan::{MusicEngine, MusicRole, WireEnum};

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub dispatch: DispatchConfig,
    pub speech: SpeechConfig,
    pub music: MusicConfig,
    pub stitch: StitchConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

/// Where rendered artifacts live and where stitched episodes go.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub output: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("temp_audio"),
            output: PathBuf::from("output"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub concurrency: usize,
    pub segment_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            segment_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub url: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3001/api/tts".to_string(),
        }
    }
}

/// Music settings. Engines missing from `engines` are not wired.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MusicConfig {
    pub default_duration_secs: u32,
    /// Duration overrides keyed by role name (`intro_jingle`, ...).
    pub durations: HashMap<String, u32>,
    /// Backends keyed by engine name (`sora`, `udio`, `elevenlabs`).
    pub engines: HashMap<String, EngineConfig>,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            default_duration_secs: 30,
            durations: HashMap::new(),
            engines: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StitchConfig {
    /// Remote concatenation collaborator; the local WAV stitcher is used when unset.
    pub url: Option<String>,
    /// Silence between stitched files (local stitcher only).
    pub gap_seconds: f32,
}

/// How the model is asked to shape its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Structured output constrained by the plan's JSON schema.
    #[default]
    JsonSchema,
    /// Any JSON object, for servers without schema support.
    JsonObject,
    /// Free text; the plan is dug out of the reply.
    Text,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub system: String,
    pub response_format: OutputFormat,
    /// Prepend the current date and time (and weather, when wired) to the prompt.
    pub context: bool,
    /// JSON endpoint returning current weather observations.
    pub weather_url: Option<String>,
    pub weather_location: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            max_retries: 3,
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            response_format: OutputFormat::default(),
            context: true,
            weather_url: None,
            weather_location: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PodcastError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| PodcastError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, PodcastError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, PodcastError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| PodcastError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), PodcastError> {
        self.music_engines()?;
        self.dispatch_settings()?;
        Ok(())
    }

    /// Wired music engines and their collaborator URLs.
    pub fn music_engines(&self) -> Result<Vec<(MusicEngine, String)>, PodcastError> {
        let mut engines = self
            .music
            .engines
            .iter()
            .map(|(name, engine)| {
                let parsed = MusicEngine::parse(name).ok_or_else(|| {
                    PodcastError::ConfigError(format!(
                        "Unknown music engine '{}'. Expected one of {}",
                        name,
                        MusicEngine::expected()
                    ))
                })?;
                Ok((parsed, engine.url.clone()))
            })
            .collect::<Result<Vec<_>, PodcastError>>()?;
        engines.sort_by_key(|(engine, _)| engine.as_str());
        Ok(engines)
    }

    pub fn dispatch_settings(&self) -> Result<DispatchSettings, PodcastError> {
        let music_durations = self
            .music
            .durations
            .iter()
            .map(|(name, secs)| {
                let role = MusicRole::parse(name).ok_or_else(|| {
                    PodcastError::ConfigError(format!(
                        "Unknown music role '{}'. Expected one of {}",
                        name,
                        MusicRole::expected()
                    ))
                })?;
                Ok((role, *secs))
            })
            .collect::<Result<HashMap<_, _>, PodcastError>>()?;

        Ok(DispatchSettings {
            concurrency: self.dispatch.concurrency.max(1),
            segment_timeout: Duration::from_secs(self.dispatch.segment_timeout_secs),
            default_music_duration: self.music.default_duration_secs,
            music_durations,
        })
    }

    pub fn segment_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.segment_timeout_secs)
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a creative podcast producer. Write a complete Podcast Assembly Plan for one episode.

Reply with a single JSON object and nothing else, shaped like this:
{
  "episode_id": "YYYY-MM-DD or episode number",
  "title": "episode title",
  "description": "one or two sentence summary",
  "segments": [ ... in playback order ... ]
}

Each segment has a "type" and the fields for that type:
- dialogue: "speaker" (HOST, GUEST, ...), "text", "tts_voice"
- music: "role" (intro_jingle, background, outro_jingle, transition), "prompt", optional "engine" (sora, udio, elevenlabs)
- ad: "text", "tts_voice"
- weather: "text", "tts_voice" (at most one per episode; base it on the current conditions given in the prompt)

"tts_voice" is one of alloy, echo, fable, onyx, nova, shimmer. Keep one voice per speaker for the whole episode.
Segment "id" fields are optional; they are filled in automatically.
"#;
