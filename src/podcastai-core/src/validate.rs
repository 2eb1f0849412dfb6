//! Plan schema validation.
//!
//! Validation walks the whole candidate plan in one pass and reports every
//! violation it finds, in the order it meets them. It is also the only place
//! defaults are applied.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

use crate::plan::{
    DialogueSegment, MusicEngine, MusicRole, MusicSegment, Plan, Segment, SegmentKind,
    SpokenSegment, TtsVoice, WireEnum,
};

/// A single violation at a nested location, e.g. `segments[2].tts_voice`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Human-readable `path: message` lines.
pub fn messages(errors: &[FieldError]) -> Vec<String> {
    errors.iter().map(ToString::to_string).collect()
}

/// Validate an untrusted candidate plan.
pub fn validate(raw: &Value) -> Result<Plan, Vec<FieldError>> {
    let mut validator = Validator::default();
    let plan = validator.plan(raw);

    match plan {
        Some(plan) if validator.errors.is_empty() => Ok(plan),
        _ => Err(validator.errors),
    }
}

#[derive(Default)]
struct Validator {
    errors: Vec<FieldError>,
    seen_ids: HashMap<String, usize>,
    weather_at: Option<usize>,
}

impl Validator {
    fn report(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(path, message));
    }

    fn plan(&mut self, raw: &Value) -> Option<Plan> {
        let Some(root) = raw.as_object() else {
            self.report("", format!("Expected object, received {}", type_name(raw)));
            return None;
        };

        let episode_id = self.string(root, "episode_id", "episode_id", true);
        let title = self.string(root, "title", "title", true);
        let description = self.string(root, "description", "description", true);
        let segments = self.segments(root.get("segments"));

        Some(Plan {
            episode_id: episode_id?,
            title: title?,
            description: description?,
            segments: segments?,
        })
    }

    fn segments(&mut self, value: Option<&Value>) -> Option<Vec<Segment>> {
        let items = match value {
            None => {
                self.report("segments", "Required");
                return None;
            }
            Some(Value::Array(items)) => items,
            Some(other) => {
                self.report(
                    "segments",
                    format!("Expected array, received {}", type_name(other)),
                );
                return None;
            }
        };

        if items.is_empty() {
            self.report("segments", "Array must contain at least 1 element(s)");
            return None;
        }

        let parsed: Vec<Option<Segment>> = items
            .iter()
            .enumerate()
            .map(|(index, item)| self.segment(index, item))
            .collect();

        parsed.into_iter().collect()
    }

    fn segment(&mut self, index: usize, value: &Value) -> Option<Segment> {
        let path = format!("segments[{}]", index);

        let Some(fields) = value.as_object() else {
            self.report(
                path,
                format!("Expected object, received {}", type_name(value)),
            );
            return None;
        };

        let kind = fields
            .get("type")
            .and_then(Value::as_str)
            .and_then(SegmentKind::parse);

        let Some(kind) = kind else {
            self.report(
                format!("{}.type", path),
                format!(
                    "Invalid discriminator value. Expected {}",
                    SegmentKind::expected()
                ),
            );
            return None;
        };

        let id = self.segment_id(index, fields, &path);

        match kind {
            SegmentKind::Dialogue => {
                let speaker = self.string(fields, "speaker", &format!("{}.speaker", path), false);
                let text = self.string(fields, "text", &format!("{}.text", path), true);
                let tts_voice = self.choice::<TtsVoice>(fields, "tts_voice", &path, None);
                Some(Segment::Dialogue(DialogueSegment {
                    id: id?,
                    speaker: speaker?,
                    text: text?,
                    tts_voice: tts_voice?,
                }))
            }
            SegmentKind::Music => {
                let role = self.choice::<MusicRole>(fields, "role", &path, None);
                let prompt = self.string(fields, "prompt", &format!("{}.prompt", path), true);
                let engine =
                    self.choice::<MusicEngine>(fields, "engine", &path, Some(MusicEngine::default()));
                Some(Segment::Music(MusicSegment {
                    id: id?,
                    role: role?,
                    prompt: prompt?,
                    engine: engine?,
                }))
            }
            SegmentKind::Ad => self.spoken(fields, &path, id).map(Segment::Ad),
            SegmentKind::Weather => {
                if let Some(first) = self.weather_at {
                    self.report(
                        format!("{}.type", path),
                        format!(
                            "At most one weather segment is allowed per episode (first at segments[{}])",
                            first
                        ),
                    );
                } else {
                    self.weather_at = Some(index);
                }
                self.spoken(fields, &path, id).map(Segment::Weather)
            }
        }
    }

    fn spoken(
        &mut self,
        fields: &Map<String, Value>,
        path: &str,
        id: Option<String>,
    ) -> Option<SpokenSegment> {
        let text = self.string(fields, "text", &format!("{}.text", path), true);
        let tts_voice = self.choice::<TtsVoice>(fields, "tts_voice", path, None);
        Some(SpokenSegment {
            id: id?,
            text: text?,
            tts_voice: tts_voice?,
        })
    }

    fn segment_id(
        &mut self,
        index: usize,
        fields: &Map<String, Value>,
        path: &str,
    ) -> Option<String> {
        let id_path = format!("{}.id", path);
        let id = self.string(fields, "id", &id_path, true)?;

        if let Some(first) = self.seen_ids.get(&id).copied() {
            self.report(
                id_path,
                format!(
                    "Duplicate segment id '{}' (first used by segments[{}])",
                    id, first
                ),
            );
            return None;
        }

        self.seen_ids.insert(id.clone(), index);
        Some(id)
    }

    fn string(
        &mut self,
        fields: &Map<String, Value>,
        name: &str,
        path: &str,
        non_empty: bool,
    ) -> Option<String> {
        match fields.get(name) {
            None => {
                self.report(path, "Required");
                None
            }
            Some(Value::String(s)) if non_empty && s.is_empty() => {
                self.report(path, "String must contain at least 1 character(s)");
                None
            }
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                self.report(
                    path,
                    format!("Expected string, received {}", type_name(other)),
                );
                None
            }
        }
    }

    /// Enum field; `default` is used only when the field is absent.
    fn choice<E: WireEnum>(
        &mut self,
        fields: &Map<String, Value>,
        name: &str,
        parent: &str,
        default: Option<E>,
    ) -> Option<E> {
        let path = format!("{}.{}", parent, name);

        match fields.get(name) {
            None => {
                if default.is_none() {
                    self.report(path, "Required");
                }
                default
            }
            Some(Value::String(s)) => {
                let parsed = E::parse(s);
                if parsed.is_none() {
                    self.report(
                        path,
                        format!(
                            "Invalid enum value. Expected {}, received '{}'",
                            E::expected(),
                            s
                        ),
                    );
                }
                parsed
            }
            Some(other) => {
                self.report(
                    path,
                    format!("Expected {}, received {}", E::expected(), type_name(other)),
                );
                None
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
