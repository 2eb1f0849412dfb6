//! Segment identifier assignment.
//!
//! Runs on the raw candidate plan, before validation, so the validator's
//! uniqueness check sees the final ids.

use serde_json::Value;

/// Fill in `id` on every segment that lacks one.
///
/// Synthesized ids are `{episode_id}_{type}_{index:03}`, falling back to
/// `episode` and `segment` when those fields are missing. The index is the
/// segment's position in the raw array, so two synthesized ids never collide
/// and running this twice on the same input gives the same ids. Segments
/// that already carry an id are left alone.
pub fn assign_ids(raw: &mut Value) {
    let episode_prefix = raw
        .get("episode_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("episode")
        .to_string();

    let Some(segments) = raw.get_mut("segments").and_then(Value::as_array_mut) else {
        return;
    };

    for (index, segment) in segments.iter_mut().enumerate() {
        let Some(fields) = segment.as_object_mut() else {
            continue;
        };

        if has_id(fields.get("id")) {
            continue;
        }

        let type_prefix = fields
            .get("type")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("segment");

        let id = format!("{}_{}_{:03}", episode_prefix, type_prefix, index);
        fields.insert("id".to_string(), Value::String(id));
    }
}

// Falsy ids (missing, null, empty string) count as absent.
fn has_id(id: Option<&Value>) -> bool {
    match id {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assigns_prefixed_zero_padded_ids() {
        let mut raw = json!({
            "episode_id": "e1",
            "segments": [
                {"type": "dialogue"},
                {"type": "music"},
            ]
        });
        assign_ids(&mut raw);
        assert_eq!(raw["segments"][0]["id"], "e1_dialogue_000");
        assert_eq!(raw["segments"][1]["id"], "e1_music_001");
    }

    #[test]
    fn test_keeps_existing_ids() {
        let mut raw = json!({
            "episode_id": "e1",
            "segments": [
                {"id": "intro", "type": "music"},
                {"type": "ad"},
            ]
        });
        assign_ids(&mut raw);
        assert_eq!(raw["segments"][0]["id"], "intro");
        assert_eq!(raw["segments"][1]["id"], "e1_ad_001");
    }

    #[test]
    fn test_fallback_prefixes() {
        let mut raw = json!({
            "segments": [{}, {"type": ""}, {"id": ""}]
        });
        assign_ids(&mut raw);
        assert_eq!(raw["segments"][0]["id"], "episode_segment_000");
        assert_eq!(raw["segments"][1]["id"], "episode_segment_001");
        assert_eq!(raw["segments"][2]["id"], "episode_segment_002");
    }

    #[test]
    fn test_deterministic() {
        let raw = json!({
            "episode_id": "2024-05-01",
            "segments": [{"type": "dialogue"}, {"type": "weather"}, {"type": "dialogue"}]
        });
        let mut first = raw.clone();
        let mut second = raw.clone();
        assign_ids(&mut first);
        assign_ids(&mut second);
        assert_eq!(first, second);

        // A second pass changes nothing.
        let mut again = first.clone();
        assign_ids(&mut again);
        assert_eq!(again, first);
    }

    #[test]
    fn test_ignores_malformed_input() {
        let mut raw = json!({"segments": "nope"});
        assign_ids(&mut raw);
        assert_eq!(raw, json!({"segments": "nope"}));

        let mut raw = json!({"segments": [42, {"type": "ad"}]});
        assign_ids(&mut raw);
        assert_eq!(raw["segments"][0], 42);
        assert_eq!(raw["segments"][1]["id"], "episode_ad_001");
    }
}
