//! Rendering collaborator contracts.
//!
//! Speech, music and concatenation are external services. The pipeline only
//! sees these traits and the normalized [`RenderError`], whatever error
//! shape the service itself uses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::plan::{MusicEngine, MusicRole, SegmentKind, TtsVoice};

/// Why a collaborator call did not produce an artifact.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    /// The collaborator answered with its own structured error.
    #[error("{} ({status})", rejection_message(.payload))]
    Rejected { status: u16, payload: Value },
    /// The call could not complete (network fault, timeout, bad body).
    #[error("{0}")]
    Fault(String),
}

impl RenderError {
    pub fn fault(message: impl Into<String>) -> Self {
        RenderError::Fault(message.into())
    }

    /// Rejection carrying `{error, details?}`.
    pub fn rejected(status: u16, error: impl Into<String>, details: Option<String>) -> Self {
        let mut payload = Map::new();
        payload.insert("error".to_string(), Value::String(error.into()));
        if let Some(details) = details {
            payload.insert("details".to_string(), Value::String(details));
        }
        RenderError::Rejected {
            status,
            payload: Value::Object(payload),
        }
    }
}

fn rejection_message(payload: &Value) -> &str {
    payload
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("rejected")
}

/// A rendered audio file persisted by a collaborator, keyed by segment id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub filename: String,
    pub filepath: String,
    pub size: u64,
    pub format: String,
    /// Whatever else the collaborator reported (voice, model, prompt, ...).
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Body of a speech rendering call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: TtsVoice,
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    pub segment_id: String,
}

/// Body of a music rendering call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MusicRequest {
    pub prompt: String,
    pub duration: u32,
    pub segment_id: String,
    pub role: MusicRole,
    pub engine: MusicEngine,
}

/// Result of concatenating artifacts into one episode file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StitchOutcome {
    pub filename: String,
    pub filepath: String,
    pub size: u64,
    pub files_stitched: usize,
    pub source_files: Vec<String>,
}

#[async_trait]
pub trait SpeechRenderer: Send + Sync {
    async fn render(&self, request: &SpeechRequest) -> Result<Artifact, RenderError>;
}

#[async_trait]
pub trait MusicRenderer: Send + Sync {
    async fn render(&self, request: &MusicRequest) -> Result<Artifact, RenderError>;
}

#[async_trait]
pub trait Stitcher: Send + Sync {
    /// Merge the artifacts of `segment_ids`, in that order. `None` means
    /// every artifact in storage.
    async fn stitch(
        &self,
        episode_name: &str,
        segment_ids: Option<&[String]>,
    ) -> Result<StitchOutcome, RenderError>;
}

/// Music backends keyed by engine. Engines without an entry are unwired.
#[derive(Clone, Default)]
pub struct MusicBackends {
    engines: HashMap<MusicEngine, Arc<dyn MusicRenderer>>,
}

impl MusicBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, engine: MusicEngine, backend: Arc<dyn MusicRenderer>) -> Self {
        self.engines.insert(engine, backend);
        self
    }

    pub fn get(&self, engine: MusicEngine) -> Option<&Arc<dyn MusicRenderer>> {
        self.engines.get(&engine)
    }
}
