//! Podcast Assembly Plan types.
//!
//! A plan is the ordered description of one episode. Values of these types
//! only come out of [`crate::validate::validate`], so every field is already
//! checked and every default is already applied.

use serde::Serialize;
use std::fmt;

/// Voices accepted by the speech rendering collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsVoice {
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

/// Where a piece of music sits in the episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MusicRole {
    IntroJingle,
    Background,
    OutroJingle,
    Transition,
}

/// Music generation engines a plan may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MusicEngine {
    #[default]
    Sora,
    Udio,
    Elevenlabs,
}

/// Fixed set of string values with a wire name per member.
pub trait WireEnum: Sized + Copy + 'static {
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.as_str() == value)
    }

    /// `'a' | 'b' | 'c'`, as used in validation messages.
    fn expected() -> String {
        Self::ALL
            .iter()
            .map(|v| format!("'{}'", v.as_str()))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl WireEnum for TtsVoice {
    const ALL: &'static [Self] = &[
        TtsVoice::Alloy,
        TtsVoice::Echo,
        TtsVoice::Fable,
        TtsVoice::Onyx,
        TtsVoice::Nova,
        TtsVoice::Shimmer,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            TtsVoice::Alloy => "alloy",
            TtsVoice::Echo => "echo",
            TtsVoice::Fable => "fable",
            TtsVoice::Onyx => "onyx",
            TtsVoice::Nova => "nova",
            TtsVoice::Shimmer => "shimmer",
        }
    }
}

impl WireEnum for MusicRole {
    const ALL: &'static [Self] = &[
        MusicRole::IntroJingle,
        MusicRole::Background,
        MusicRole::OutroJingle,
        MusicRole::Transition,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            MusicRole::IntroJingle => "intro_jingle",
            MusicRole::Background => "background",
            MusicRole::OutroJingle => "outro_jingle",
            MusicRole::Transition => "transition",
        }
    }
}

impl WireEnum for MusicEngine {
    const ALL: &'static [Self] = &[MusicEngine::Sora, MusicEngine::Udio, MusicEngine::Elevenlabs];

    fn as_str(&self) -> &'static str {
        match self {
            MusicEngine::Sora => "sora",
            MusicEngine::Udio => "udio",
            MusicEngine::Elevenlabs => "elevenlabs",
        }
    }
}

/// Segment discriminator, as carried in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Dialogue,
    Music,
    Ad,
    Weather,
}

impl WireEnum for SegmentKind {
    const ALL: &'static [Self] = &[
        SegmentKind::Dialogue,
        SegmentKind::Music,
        SegmentKind::Ad,
        SegmentKind::Weather,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Dialogue => "dialogue",
            SegmentKind::Music => "music",
            SegmentKind::Ad => "ad",
            SegmentKind::Weather => "weather",
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One spoken line attributed to a named speaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DialogueSegment {
    pub id: String,
    pub speaker: String,
    pub text: String,
    pub tts_voice: TtsVoice,
}

/// Music to be generated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MusicSegment {
    pub id: String,
    pub role: MusicRole,
    pub prompt: String,
    pub engine: MusicEngine,
}

/// Spoken text without a speaker: advertisement slots and the weather report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpokenSegment {
    pub id: String,
    pub text: String,
    pub tts_voice: TtsVoice,
}

/// One atomic unit of the plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Dialogue(DialogueSegment),
    Music(MusicSegment),
    Ad(SpokenSegment),
    Weather(SpokenSegment),
}

impl Segment {
    pub fn id(&self) -> &str {
        match self {
            Segment::Dialogue(s) => &s.id,
            Segment::Music(s) => &s.id,
            Segment::Ad(s) | Segment::Weather(s) => &s.id,
        }
    }

    pub fn kind(&self) -> SegmentKind {
        match self {
            Segment::Dialogue(_) => SegmentKind::Dialogue,
            Segment::Music(_) => SegmentKind::Music,
            Segment::Ad(_) => SegmentKind::Ad,
            Segment::Weather(_) => SegmentKind::Weather,
        }
    }
}

/// A validated Podcast Assembly Plan. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub episode_id: String,
    pub title: String,
    pub description: String,
    /// Playback order.
    pub segments: Vec<Segment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_enum_parse() {
        assert_eq!(TtsVoice::parse("nova"), Some(TtsVoice::Nova));
        assert_eq!(TtsVoice::parse("Nova"), None);
        assert_eq!(MusicRole::parse("outro_jingle"), Some(MusicRole::OutroJingle));
        assert_eq!(MusicEngine::parse("elevenlabs"), Some(MusicEngine::Elevenlabs));
    }

    #[test]
    fn test_expected_lists_every_member() {
        assert_eq!(
            MusicEngine::expected(),
            "'sora' | 'udio' | 'elevenlabs'"
        );
    }

    #[test]
    fn test_default_engine_is_sora() {
        assert_eq!(MusicEngine::default(), MusicEngine::Sora);
    }

    #[test]
    fn test_segment_serializes_with_type_tag() {
        let segment = Segment::Weather(SpokenSegment {
            id: "w".to_string(),
            text: "Sunny".to_string(),
            tts_voice: TtsVoice::Echo,
        });
        let value = serde_json::to_value(&segment).unwrap();
        assert_eq!(value["type"], "weather");
        assert_eq!(value["tts_voice"], "echo");
        assert_eq!(segment.kind(), SegmentKind::Weather);
        assert_eq!(segment.id(), "w");
    }
}
