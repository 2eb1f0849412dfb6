//! End-to-end orchestration of one candidate plan.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::backend::{MusicBackends, RenderError, StitchOutcome, Stitcher};
use crate::config::Config;
use crate::dispatch::{DispatchCallback, Dispatcher, SegmentResult};
use crate::error::PodcastError;
use crate::http::{HttpMusicBackend, HttpSpeechBackend, HttpStitcher, build_client};
use crate::ids::assign_ids;
use crate::plan::Plan;
use crate::stitch::LocalWavStitcher;
use crate::summary::{Summary, artifact_ids};
use crate::validate::{FieldError, messages, validate};

/// Everything one orchestration run produced.
#[derive(Debug, Clone, Serialize)]
pub struct Orchestration {
    #[serde(skip)]
    pub plan: Plan,
    pub summary: Summary,
    #[serde(rename = "processed_segments")]
    pub results: Vec<SegmentResult>,
}

impl Orchestration {
    /// Successful artifacts in plan order, ready for concatenation.
    pub fn artifact_ids(&self) -> Vec<String> {
        artifact_ids(&self.results)
    }
}

/// Assign ids, validate, dispatch and summarize.
pub struct Pipeline {
    dispatcher: Dispatcher,
    stitcher: Arc<dyn Stitcher>,
}

impl Pipeline {
    pub fn new(dispatcher: Dispatcher, stitcher: Arc<dyn Stitcher>) -> Self {
        Self {
            dispatcher,
            stitcher,
        }
    }

    /// Wire HTTP collaborators and the stitcher from configuration.
    pub fn from_config(config: &Config) -> Result<Self, PodcastError> {
        Ok(Self::new(dispatcher_from_config(config)?, stitcher_from_config(config)?))
    }

    /// Set a callback for dispatch events.
    pub fn with_callback(mut self, callback: DispatchCallback) -> Self {
        self.dispatcher = self.dispatcher.with_callback(callback);
        self
    }

    /// Validate a raw plan without dispatching it.
    pub fn prepare(mut raw: Value) -> Result<Plan, Vec<FieldError>> {
        assign_ids(&mut raw);
        validate(&raw).inspect_err(|errors| {
            tracing::error!(count = errors.len(), "podcast assembly plan failed validation");
            for message in messages(errors) {
                tracing::error!("  - {}", message);
            }
        })
    }

    pub async fn orchestrate(&self, raw: Value) -> Result<Orchestration, Vec<FieldError>> {
        let plan = Self::prepare(raw)?;

        tracing::info!(
            episode_id = %plan.episode_id,
            title = %plan.title,
            segments = plan.segments.len(),
            "orchestrating podcast assembly plan"
        );

        let results = self.dispatcher.dispatch(&plan).await;
        let summary = Summary::new(&plan, &results);

        tracing::info!(
            episode_id = %summary.episode_id,
            success = summary.outcomes.success,
            failed = summary.outcomes.failed,
            error = summary.outcomes.error,
            skipped = summary.outcomes.skipped,
            "orchestration complete"
        );

        Ok(Orchestration {
            plan,
            summary,
            results,
        })
    }

    /// Hand the successful artifacts, in order, to the stitcher.
    pub async fn stitch(&self, orchestration: &Orchestration) -> Result<StitchOutcome, RenderError> {
        let ids = orchestration.artifact_ids();
        if ids.is_empty() {
            return Err(RenderError::rejected(
                404,
                "No segments rendered successfully; nothing to stitch",
                None,
            ));
        }
        self.stitcher
            .stitch(&orchestration.plan.title, Some(ids.as_slice()))
            .await
    }
}

fn dispatcher_from_config(config: &Config) -> Result<Dispatcher, PodcastError> {
    let client = build_client(config.segment_timeout())?;

    let speech = Arc::new(HttpSpeechBackend::new(client.clone(), &config.speech.url));

    let music = config
        .music_engines()?
        .into_iter()
        .fold(MusicBackends::new(), |backends, (engine, url)| {
            backends.with_engine(engine, Arc::new(HttpMusicBackend::new(client.clone(), url)))
        });

    Ok(Dispatcher::new(speech, music).with_settings(config.dispatch_settings()?))
}

fn stitcher_from_config(config: &Config) -> Result<Arc<dyn Stitcher>, PodcastError> {
    let stitcher: Arc<dyn Stitcher> = match &config.stitch.url {
        Some(url) => Arc::new(HttpStitcher::new(build_client(config.segment_timeout())?, url)),
        None => Arc::new(
            LocalWavStitcher::new(&config.storage.root, &config.storage.output)
                .with_gap(config.stitch.gap_seconds),
        ),
    };
    Ok(stitcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Artifact, MusicRenderer, MusicRequest, SpeechRenderer, SpeechRequest};
    use crate::dispatch::SegmentStatus;
    use crate::summary::SegmentBreakdown;
    use async_trait::async_trait;
    use serde_json::{Map, json};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSpeech {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechRenderer for RecordingSpeech {
        async fn render(&self, request: &SpeechRequest) -> Result<Artifact, RenderError> {
            self.calls.lock().unwrap().push(request.segment_id.clone());
            Ok(Artifact {
                filename: format!("{}.mp3", request.segment_id),
                filepath: format!("/tmp/{}.mp3", request.segment_id),
                size: 1,
                format: "mp3".to_string(),
                metadata: Map::new(),
            })
        }
    }

    struct NeverMusic;

    #[async_trait]
    impl MusicRenderer for NeverMusic {
        async fn render(&self, _request: &MusicRequest) -> Result<Artifact, RenderError> {
            Err(RenderError::fault("unreachable"))
        }
    }

    #[derive(Default)]
    struct RecordingStitcher {
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl Stitcher for RecordingStitcher {
        async fn stitch(
            &self,
            episode_name: &str,
            segment_ids: Option<&[String]>,
        ) -> Result<StitchOutcome, RenderError> {
            let ids = segment_ids.map(<[String]>::to_vec).unwrap_or_default();
            self.calls
                .lock()
                .unwrap()
                .push((episode_name.to_string(), ids.clone()));
            Ok(StitchOutcome {
                filename: "out.mp3".to_string(),
                filepath: "/tmp/out.mp3".to_string(),
                size: 1,
                files_stitched: ids.len(),
                source_files: ids.iter().map(|id| format!("{}.mp3", id)).collect(),
            })
        }
    }

    fn pipeline(speech: Arc<RecordingSpeech>, stitcher: Arc<RecordingStitcher>) -> Pipeline {
        let music = MusicBackends::new().with_engine(crate::plan::MusicEngine::Udio, Arc::new(NeverMusic));
        Pipeline::new(Dispatcher::new(speech, music), stitcher)
    }

    #[tokio::test]
    async fn test_scenario_single_dialogue() {
        let speech = Arc::new(RecordingSpeech::default());
        let pipeline = pipeline(speech.clone(), Arc::new(RecordingStitcher::default()));

        let raw = json!({
            "episode_id": "e1",
            "title": "T",
            "description": "D",
            "segments": [
                {"type": "dialogue", "speaker": "HOST", "text": "Hi", "tts_voice": "alloy"}
            ]
        });
        let run = pipeline.orchestrate(raw).await.unwrap();

        assert_eq!(run.plan.segments[0].id(), "e1_dialogue_000");
        assert_eq!(*speech.calls.lock().unwrap(), vec!["e1_dialogue_000"]);
        assert_eq!(run.summary.total_segments, 1);
        assert_eq!(
            run.summary.segment_breakdown,
            SegmentBreakdown {
                dialogue: 1,
                music: 0,
                ads: 0,
                weather: 0,
            }
        );
        assert_eq!(run.artifact_ids(), vec!["e1_dialogue_000"]);
    }

    #[tokio::test]
    async fn test_scenario_unwired_music_is_skipped_but_counted() {
        let speech = Arc::new(RecordingSpeech::default());
        let pipeline = pipeline(speech.clone(), Arc::new(RecordingStitcher::default()));

        let raw = json!({
            "episode_id": "e1",
            "title": "T",
            "description": "D",
            "segments": [
                {"type": "music", "role": "intro_jingle", "prompt": "jazz", "engine": "elevenlabs"}
            ]
        });
        let run = pipeline.orchestrate(raw).await.unwrap();

        assert_eq!(run.results.len(), 1);
        assert_eq!(run.results[0].status(), SegmentStatus::Skipped);
        assert_eq!(run.summary.segment_breakdown.music, 1);
        assert!(speech.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_two_weather_segments_fail_validation() {
        let speech = Arc::new(RecordingSpeech::default());
        let pipeline = pipeline(speech.clone(), Arc::new(RecordingStitcher::default()));

        let raw = json!({
            "episode_id": "e1",
            "title": "T",
            "description": "D",
            "segments": [
                {"type": "weather", "text": "Sunny", "tts_voice": "nova"},
                {"type": "weather", "text": "Cloudy", "tts_voice": "nova"}
            ]
        });
        let errors = pipeline.orchestrate(raw).await.unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "segments[1].type");
        assert!(speech.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stitch_receives_successful_ids_in_order() {
        let stitcher = Arc::new(RecordingStitcher::default());
        let pipeline = pipeline(Arc::new(RecordingSpeech::default()), stitcher.clone());

        let raw = json!({
            "episode_id": "e2",
            "title": "Morning",
            "description": "D",
            "segments": [
                {"type": "dialogue", "speaker": "HOST", "text": "Hi", "tts_voice": "alloy"},
                {"type": "music", "role": "transition", "prompt": "swoosh", "engine": "udio"},
                {"type": "ad", "text": "Buy", "tts_voice": "onyx"}
            ]
        });
        let run = pipeline.orchestrate(raw).await.unwrap();
        let outcome = pipeline.stitch(&run).await.unwrap();

        assert_eq!(outcome.files_stitched, 2);
        assert_eq!(
            *stitcher.calls.lock().unwrap(),
            vec![(
                "Morning".to_string(),
                vec!["e2_dialogue_000".to_string(), "e2_ad_002".to_string()]
            )]
        );
    }

    #[test]
    fn test_orchestration_wire_shape_hides_plan() {
        let run = Orchestration {
            plan: Plan {
                episode_id: "e".to_string(),
                title: "T".to_string(),
                description: "D".to_string(),
                segments: vec![],
            },
            summary: Summary {
                episode_id: "e".to_string(),
                title: "T".to_string(),
                total_segments: 0,
                segment_breakdown: SegmentBreakdown::default(),
                outcomes: Default::default(),
            },
            results: vec![],
        };
        let value = serde_json::to_value(&run).unwrap();
        assert!(value.get("plan").is_none());
        assert!(value["processed_segments"].is_array());
    }

    #[test]
    fn test_from_config_defaults() {
        assert!(Pipeline::from_config(&Config::default()).is_ok());
    }
}
