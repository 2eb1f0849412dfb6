//! Segment dispatch.
//!
//! Walks a validated plan, routes every segment to the backend implied by
//! its type and records exactly one outcome per segment. A failing segment
//! never stops the segments after it.

use futures_util::FutureExt;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{
    Artifact, MusicBackends, MusicRequest, RenderError, SpeechRenderer, SpeechRequest,
};
use crate::plan::{MusicRole, MusicSegment, Plan, Segment, SegmentKind, TtsVoice, WireEnum};

/// Terminal state of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    Success,
    Failed,
    Error,
    Skipped,
}

impl SegmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStatus::Success => "success",
            SegmentStatus::Failed => "failed",
            SegmentStatus::Error => "error",
            SegmentStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a segment, with the detail that goes with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SegmentOutcome {
    Success { result: Artifact },
    /// The backend returned its own structured error.
    Failed { error: Value },
    /// The call itself faulted; only a message exists.
    Error { error: String },
    Skipped { note: String },
}

impl SegmentOutcome {
    pub fn status(&self) -> SegmentStatus {
        match self {
            SegmentOutcome::Success { .. } => SegmentStatus::Success,
            SegmentOutcome::Failed { .. } => SegmentStatus::Failed,
            SegmentOutcome::Error { .. } => SegmentStatus::Error,
            SegmentOutcome::Skipped { .. } => SegmentStatus::Skipped,
        }
    }

    fn detail(&self) -> String {
        match self {
            SegmentOutcome::Success { result } => result.filename.clone(),
            SegmentOutcome::Failed { error } => error
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
            SegmentOutcome::Error { error } => error.clone(),
            SegmentOutcome::Skipped { note } => note.clone(),
        }
    }
}

/// Outcome record for one segment. Never changed once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentResult {
    /// Position in the plan, independent of completion order.
    pub segment_index: usize,
    pub segment_id: String,
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    #[serde(flatten)]
    pub outcome: SegmentOutcome,
}

impl SegmentResult {
    pub fn status(&self) -> SegmentStatus {
        self.outcome.status()
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match &self.outcome {
            SegmentOutcome::Success { result } => Some(result),
            _ => None,
        }
    }
}

/// Tuning for a dispatch run.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Segments in flight at once; 1 dispatches strictly in sequence.
    pub concurrency: usize,
    /// Upper bound on a single backend call.
    pub segment_timeout: Duration,
    pub default_music_duration: u32,
    pub music_durations: HashMap<MusicRole, u32>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            segment_timeout: Duration::from_secs(120),
            default_music_duration: 30,
            music_durations: HashMap::new(),
        }
    }
}

impl DispatchSettings {
    pub fn music_duration(&self, role: MusicRole) -> u32 {
        self.music_durations
            .get(&role)
            .copied()
            .unwrap_or(self.default_music_duration)
    }
}

/// Callback for dispatch events.
pub type DispatchCallback = Box<dyn Fn(DispatchEvent) + Send + Sync>;

/// Events emitted while a plan is dispatched.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// A segment is about to be sent to its backend.
    SegmentStart {
        index: usize,
        total: usize,
        segment_id: String,
        kind: SegmentKind,
        preview: String,
    },
    /// A segment reached its terminal state.
    SegmentFinished {
        index: usize,
        segment_id: String,
        status: SegmentStatus,
        detail: String,
    },
    /// Every segment has a result.
    RunEnd { total: usize, succeeded: usize },
}

/// Routes validated segments to rendering backends.
pub struct Dispatcher {
    speech: Arc<dyn SpeechRenderer>,
    music: MusicBackends,
    settings: DispatchSettings,
    callback: Option<DispatchCallback>,
}

impl Dispatcher {
    pub fn new(speech: Arc<dyn SpeechRenderer>, music: MusicBackends) -> Self {
        Self {
            speech,
            music,
            settings: DispatchSettings::default(),
            callback: None,
        }
    }

    pub fn with_settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set a callback for dispatch events.
    pub fn with_callback(mut self, callback: DispatchCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Dispatch every segment and return one result per segment, in plan order.
    pub async fn dispatch(&self, plan: &Plan) -> Vec<SegmentResult> {
        let total = plan.segments.len();
        let concurrency = self.settings.concurrency.max(1);

        let pending: Vec<_> = plan
            .segments
            .iter()
            .enumerate()
            .map(|(index, segment)| self.dispatch_segment(index, total, segment))
            .collect();

        // `buffered` yields in submission order, not completion order.
        let results: Vec<SegmentResult> = stream::iter(pending)
            .buffered(concurrency)
            .collect()
            .await;

        let succeeded = results
            .iter()
            .filter(|r| r.status() == SegmentStatus::Success)
            .count();
        self.emit_event(DispatchEvent::RunEnd { total, succeeded });

        results
    }

    async fn dispatch_segment(&self, index: usize, total: usize, segment: &Segment) -> SegmentResult {
        let kind = segment.kind();
        let segment_id = segment.id().to_string();

        tracing::info!(
            segment = index + 1,
            total,
            id = %segment_id,
            kind = %kind,
            "dispatching segment"
        );
        self.emit_event(DispatchEvent::SegmentStart {
            index,
            total,
            segment_id: segment_id.clone(),
            kind,
            preview: preview(segment),
        });

        let outcome = match segment {
            Segment::Dialogue(s) => self.speak(&s.id, &s.text, s.tts_voice, kind).await,
            Segment::Ad(s) | Segment::Weather(s) => {
                self.speak(&s.id, &s.text, s.tts_voice, kind).await
            }
            Segment::Music(s) => self.play(s).await,
        };

        let status = outcome.status();
        let detail = outcome.detail();
        match status {
            SegmentStatus::Success => {
                tracing::info!(id = %segment_id, artifact = %detail, "segment rendered")
            }
            SegmentStatus::Skipped => {
                tracing::info!(id = %segment_id, note = %detail, "segment skipped")
            }
            SegmentStatus::Failed | SegmentStatus::Error => {
                tracing::warn!(id = %segment_id, %status, error = %detail, "segment not rendered")
            }
        }
        self.emit_event(DispatchEvent::SegmentFinished {
            index,
            segment_id: segment_id.clone(),
            status,
            detail,
        });

        SegmentResult {
            segment_index: index,
            segment_id,
            kind,
            outcome,
        }
    }

    async fn speak(
        &self,
        id: &str,
        text: &str,
        voice: TtsVoice,
        kind: SegmentKind,
    ) -> SegmentOutcome {
        let request = SpeechRequest {
            text: text.to_string(),
            voice,
            kind,
            segment_id: id.to_string(),
        };
        self.guarded(self.speech.render(&request)).await
    }

    async fn play(&self, segment: &MusicSegment) -> SegmentOutcome {
        let Some(backend) = self.music.get(segment.engine) else {
            return SegmentOutcome::Skipped {
                note: format!(
                    "Music engine '{}' is not wired to a backend",
                    segment.engine.as_str()
                ),
            };
        };

        let request = MusicRequest {
            prompt: segment.prompt.clone(),
            duration: self.settings.music_duration(segment.role),
            segment_id: segment.id.clone(),
            role: segment.role,
            engine: segment.engine,
        };
        self.guarded(backend.render(&request)).await
    }

    /// Run one backend call, folding every way it can go wrong into an outcome.
    async fn guarded<F>(&self, call: F) -> SegmentOutcome
    where
        F: Future<Output = Result<Artifact, RenderError>>,
    {
        let timeout = self.settings.segment_timeout;
        let call = AssertUnwindSafe(call).catch_unwind();

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(Ok(artifact))) => SegmentOutcome::Success { result: artifact },
            Ok(Ok(Err(RenderError::Rejected { payload, .. }))) => {
                SegmentOutcome::Failed { error: payload }
            }
            Ok(Ok(Err(RenderError::Fault(message)))) => SegmentOutcome::Error { error: message },
            Ok(Err(panic)) => SegmentOutcome::Error {
                error: panic_message(panic.as_ref()),
            },
            Err(_) => SegmentOutcome::Error {
                error: format!("Backend call timed out after {}s", timeout.as_secs_f32()),
            },
        }
    }

    /// Emit an event if a callback is registered.
    fn emit_event(&self, event: DispatchEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

fn preview(segment: &Segment) -> String {
    let text = match segment {
        Segment::Dialogue(s) => format!("{}: {}", s.speaker, s.text),
        Segment::Music(s) => format!("[{}] {}", s.role.as_str(), s.prompt),
        Segment::Ad(s) | Segment::Weather(s) => s.text.clone(),
    };
    truncate(&text, 100)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("Backend panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("Backend panicked: {}", message)
    } else {
        "Backend panicked".to_string()
    }
}
