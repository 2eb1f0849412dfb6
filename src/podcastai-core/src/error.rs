//! Error types for the podcast pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PodcastError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("Plan generation failed: {0}")]
    GenerationError(String),

    #[error("Model reply did not contain a JSON object")]
    NoPlanInReply,

    #[error("Invalid OpenAI API key: {0}")]
    InvalidApiKey(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Stitching failed: {0}")]
    StitchError(String),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Audio error: {0}")]
    AudioError(#[from] hound::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
