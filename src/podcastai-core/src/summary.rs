//! Episode-level summary of a dispatched plan.

use serde::Serialize;

use crate::dispatch::{SegmentResult, SegmentStatus};
use crate::plan::{Plan, Segment};

/// Segments per declared type, regardless of how rendering went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SegmentBreakdown {
    pub dialogue: usize,
    pub music: usize,
    pub ads: usize,
    pub weather: usize,
}

impl SegmentBreakdown {
    pub fn of(plan: &Plan) -> Self {
        plan.segments
            .iter()
            .fold(Self::default(), |mut counts, segment| {
                match segment {
                    Segment::Dialogue(_) => counts.dialogue += 1,
                    Segment::Music(_) => counts.music += 1,
                    Segment::Ad(_) => counts.ads += 1,
                    Segment::Weather(_) => counts.weather += 1,
                }
                counts
            })
    }
}

/// Results per terminal status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeTally {
    pub success: usize,
    pub failed: usize,
    pub error: usize,
    pub skipped: usize,
}

impl OutcomeTally {
    pub fn of(results: &[SegmentResult]) -> Self {
        results.iter().fold(Self::default(), |mut tally, result| {
            match result.status() {
                SegmentStatus::Success => tally.success += 1,
                SegmentStatus::Failed => tally.failed += 1,
                SegmentStatus::Error => tally.error += 1,
                SegmentStatus::Skipped => tally.skipped += 1,
            }
            tally
        })
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.error == 0 && self.skipped == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub episode_id: String,
    pub title: String,
    pub total_segments: usize,
    pub segment_breakdown: SegmentBreakdown,
    pub outcomes: OutcomeTally,
}

impl Summary {
    pub fn new(plan: &Plan, results: &[SegmentResult]) -> Self {
        Self {
            episode_id: plan.episode_id.clone(),
            title: plan.title.clone(),
            total_segments: plan.segments.len(),
            segment_breakdown: SegmentBreakdown::of(plan),
            outcomes: OutcomeTally::of(results),
        }
    }
}

/// Segment ids of successful renders, in plan order. This is the list the
/// concatenation step expects.
pub fn artifact_ids(results: &[SegmentResult]) -> Vec<String> {
    let mut ordered: Vec<&SegmentResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.segment_index);
    ordered
        .into_iter()
        .filter(|r| r.status() == SegmentStatus::Success)
        .map(|r| r.segment_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Artifact;
    use crate::dispatch::SegmentOutcome;
    use crate::plan::{DialogueSegment, MusicEngine, MusicRole, MusicSegment, SegmentKind, SpokenSegment, TtsVoice};
    use serde_json::{Map, json};

    fn sample_plan() -> Plan {
        let spoken = SpokenSegment {
            id: "ad".to_string(),
            text: "Buy".to_string(),
            tts_voice: TtsVoice::Onyx,
        };
        Plan {
            episode_id: "e1".to_string(),
            title: "T".to_string(),
            description: "D".to_string(),
            segments: vec![
                Segment::Dialogue(DialogueSegment {
                    id: "d0".to_string(),
                    speaker: "HOST".to_string(),
                    text: "Hi".to_string(),
                    tts_voice: TtsVoice::Alloy,
                }),
                Segment::Music(MusicSegment {
                    id: "m1".to_string(),
                    role: MusicRole::Transition,
                    prompt: "swoosh".to_string(),
                    engine: MusicEngine::Sora,
                }),
                Segment::Ad(spoken),
            ],
        }
    }

    fn result(index: usize, id: &str, kind: SegmentKind, outcome: SegmentOutcome) -> SegmentResult {
        SegmentResult {
            segment_index: index,
            segment_id: id.to_string(),
            kind,
            outcome,
        }
    }

    fn success(id: &str) -> SegmentOutcome {
        SegmentOutcome::Success {
            result: Artifact {
                filename: format!("{}.mp3", id),
                filepath: format!("/tmp/{}.mp3", id),
                size: 1,
                format: "mp3".to_string(),
                metadata: Map::new(),
            },
        }
    }

    fn sample_results() -> Vec<SegmentResult> {
        vec![
            result(0, "d0", SegmentKind::Dialogue, success("d0")),
            result(
                1,
                "m1",
                SegmentKind::Music,
                SegmentOutcome::Skipped {
                    note: "unwired".to_string(),
                },
            ),
            result(2, "ad", SegmentKind::Ad, success("ad")),
        ]
    }

    #[test]
    fn test_breakdown_counts_plan_shape_not_success() {
        let summary = Summary::new(&sample_plan(), &sample_results());
        assert_eq!(summary.total_segments, 3);
        assert_eq!(
            summary.segment_breakdown,
            SegmentBreakdown {
                dialogue: 1,
                music: 1,
                ads: 1,
                weather: 0,
            }
        );
        assert_eq!(summary.outcomes.success, 2);
        assert_eq!(summary.outcomes.skipped, 1);
        assert!(!summary.outcomes.all_succeeded());
    }

    #[test]
    fn test_all_succeeded_only_without_gaps() {
        let results = vec![
            result(0, "d0", SegmentKind::Dialogue, success("d0")),
            result(2, "ad", SegmentKind::Ad, success("ad")),
        ];
        assert!(OutcomeTally::of(&results).all_succeeded());
        assert!(OutcomeTally::default().all_succeeded());
    }

    #[test]
    fn test_summary_is_idempotent() {
        let plan = sample_plan();
        let results = sample_results();
        assert_eq!(Summary::new(&plan, &results), Summary::new(&plan, &results));
    }

    #[test]
    fn test_artifact_ids_keep_order_and_drop_failures() {
        let mut results = sample_results();
        results.push(result(
            3,
            "w3",
            SegmentKind::Weather,
            SegmentOutcome::Error {
                error: "boom".to_string(),
            },
        ));
        // Order of the list does not matter, only the index.
        results.reverse();
        assert_eq!(artifact_ids(&results), vec!["d0", "ad"]);
    }

    #[test]
    fn test_summary_wire_shape() {
        let summary = Summary::new(&sample_plan(), &sample_results());
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            value["segment_breakdown"],
            json!({"dialogue": 1, "music": 1, "ads": 1, "weather": 0})
        );
        assert_eq!(value["episode_id"], "e1");
    }
}
