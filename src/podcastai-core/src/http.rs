//! HTTP clients for the rendering and concatenation collaborators.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::backend::{
    Artifact, MusicRenderer, MusicRequest, RenderError, SpeechRenderer, SpeechRequest,
    StitchOutcome, Stitcher,
};
use crate::error::PodcastError;

/// Build the shared HTTP client used for collaborator calls.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, PodcastError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(30))
        .build()?;
    Ok(client)
}

/// Speech rendering collaborator reached over HTTP.
#[derive(Clone)]
pub struct HttpSpeechBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpSpeechBackend {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SpeechRenderer for HttpSpeechBackend {
    async fn render(&self, request: &SpeechRequest) -> Result<Artifact, RenderError> {
        post_confirmed(&self.client, &self.url, request).await
    }
}

/// Music rendering collaborator for one engine, reached over HTTP.
#[derive(Clone)]
pub struct HttpMusicBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpMusicBackend {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl MusicRenderer for HttpMusicBackend {
    async fn render(&self, request: &MusicRequest) -> Result<Artifact, RenderError> {
        post_confirmed(&self.client, &self.url, request).await
    }
}

/// Concatenation collaborator reached over HTTP.
#[derive(Clone)]
pub struct HttpStitcher {
    client: reqwest::Client,
    url: String,
}

impl HttpStitcher {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[derive(Serialize)]
struct StitchRequest<'a> {
    episode_name: &'a str,
    segment_ids: Option<&'a [String]>,
}

#[async_trait]
impl Stitcher for HttpStitcher {
    async fn stitch(
        &self,
        episode_name: &str,
        segment_ids: Option<&[String]>,
    ) -> Result<StitchOutcome, RenderError> {
        let request = StitchRequest {
            episode_name,
            segment_ids,
        };
        post_confirmed(&self.client, &self.url, &request).await
    }
}

/// POST `body` and decode a `{success: true, ...}` reply.
///
/// A non-2xx status is a rejection carrying the collaborator's own payload.
/// A 2xx reply that does not confirm success is also a rejection, since the
/// artifact cannot be assumed persisted.
async fn post_confirmed<B, T>(client: &reqwest::Client, url: &str, body: &B) -> Result<T, RenderError>
where
    B: Serialize + ?Sized + Sync,
    T: DeserializeOwned,
{
    tracing::debug!(url, "calling collaborator");

    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| RenderError::fault(format!("Request to {} failed: {}", url, e)))?;

    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| RenderError::fault(format!("Failed to read response from {}: {}", url, e)))?;

    if !status.is_success() {
        return Err(RenderError::Rejected {
            status: status.as_u16(),
            payload: error_payload(&bytes),
        });
    }

    let mut reply: Value = serde_json::from_slice(&bytes)
        .map_err(|e| RenderError::fault(format!("Undecodable response from {}: {}", url, e)))?;

    let confirmed = reply.get("success").and_then(Value::as_bool) == Some(true);
    if !confirmed {
        return Err(RenderError::Rejected {
            status: status.as_u16(),
            payload: reply,
        });
    }

    if let Some(fields) = reply.as_object_mut() {
        fields.remove("success");
    }

    serde_json::from_value(reply)
        .map_err(|e| RenderError::fault(format!("Unexpected response shape from {}: {}", url, e)))
}

// Error bodies are usually `{error, details?}`; anything else is wrapped.
fn error_payload(bytes: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value @ Value::Object(_)) => value,
        _ => serde_json::json!({ "error": String::from_utf8_lossy(bytes).trim() }),
    }
}
