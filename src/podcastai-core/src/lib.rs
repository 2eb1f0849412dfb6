//! PodcastAI Core Library
//!
//! Validates Podcast Assembly Plans, dispatches their segments to speech
//! and music rendering collaborators, and summarizes the run for the final
//! concatenation step.

pub mod api;
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod generate;
pub mod http;
pub mod ids;
pub mod pipeline;
pub mod plan;
pub mod stitch;
pub mod summary;
pub mod validate;

pub use backend::{
    Artifact, MusicBackends, MusicRenderer, MusicRequest, RenderError, SpeechRenderer,
    SpeechRequest, StitchOutcome, Stitcher,
};
pub use config::Config;
pub use dispatch::{DispatchEvent, DispatchSettings, Dispatcher, SegmentOutcome, SegmentResult, SegmentStatus};
pub use error::PodcastError;
pub use generate::{GenerationRequest, PlanGenerator};
pub use ids::assign_ids;
pub use pipeline::{Orchestration, Pipeline};
pub use plan::{MusicEngine, MusicRole, Plan, Segment, SegmentKind, TtsVoice};
pub use summary::{SegmentBreakdown, Summary};
pub use validate::{FieldError, validate};
