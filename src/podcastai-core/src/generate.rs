//! Plan generation through an OpenAI-compatible chat model.
//!
//! The model's reply is untrusted: this module only digs a JSON object out
//! of it. Id assignment and validation happen afterwards.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs, ResponseFormat,
    ResponseFormatJsonSchema,
};
use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

use crate::config::{GenerationConfig, OutputFormat};
use crate::error::PodcastError;
use crate::plan::{MusicEngine, MusicRole, SegmentKind, TtsVoice, WireEnum};

/// A request for a candidate plan.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationRequest {
    #[serde(default)]
    pub prompt: String,
    pub system: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

/// Produces raw candidate plans from a prompt.
pub struct PlanGenerator {
    config: GenerationConfig,
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
}

impl PlanGenerator {
    pub fn new(config: GenerationConfig) -> Result<Self, PodcastError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                PodcastError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key.clone().unwrap_or_default())
            .with_api_base(&config.api_base);

        let client = Client::with_config(openai_config).with_http_client(http_client.clone());

        Ok(Self {
            config,
            client,
            http: http_client,
        })
    }

    /// Ask the model for a plan and return the JSON object it produced.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Value, PodcastError> {
        if request.prompt.trim().is_empty() {
            return Err(PodcastError::GenerationError("Prompt is required".to_string()));
        }

        let model = request.model.as_deref().unwrap_or(&self.config.model);
        let system = request.system.as_deref().unwrap_or(&self.config.system);
        let temperature = request.temperature.unwrap_or(self.config.temperature);

        let prompt = if self.config.context {
            let weather = self.current_weather().await;
            format!(
                "{}\n\n{}",
                request.prompt,
                context_preamble(
                    Local::now(),
                    weather.as_ref(),
                    self.config.weather_location.as_deref()
                )
            )
        } else {
            request.prompt.clone()
        };

        tracing::info!(model, temperature, "generating podcast assembly plan");

        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: system.to_string().into(),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: prompt.into(),
                name: None,
            }),
        ];

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(model)
            .temperature(temperature)
            .max_completion_tokens(self.config.max_tokens)
            .messages(messages);
        if let Some(format) = response_format(self.config.response_format) {
            args.response_format(format);
        }
        let chat_request = args.build()?;

        let max_retries = self.config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.client.chat().create(chat_request.clone()).await {
                Ok(response) => {
                    let content = response
                        .choices
                        .first()
                        .and_then(|c| c.message.content.clone())
                        .unwrap_or_default();
                    tracing::debug!(chars = content.len(), "model replied");
                    return extract_plan_object(&content);
                }
                Err(e) => {
                    let error = classify_api_error(e);
                    if matches!(
                        error,
                        PodcastError::InvalidApiKey(_) | PodcastError::RateLimited(_)
                    ) {
                        return Err(error);
                    }
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries,
                        error = %error,
                        "plan generation request failed"
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            PodcastError::GenerationError("Unknown API error after retries".to_string())
        }))
    }

    /// Current observations from the configured weather endpoint, if any.
    /// A failed lookup only loses the weather context.
    async fn current_weather(&self) -> Option<Value> {
        let url = self.config.weather_url.as_deref()?;

        let reply: Result<Value, reqwest::Error> = async {
            self.http
                .get(url)
                .timeout(Duration::from_secs(10))
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await
        }
        .await;

        match reply {
            // Station APIs usually answer with a list of devices.
            Ok(Value::Array(mut devices)) if !devices.is_empty() => Some(devices.swap_remove(0)),
            Ok(Value::Array(_)) | Ok(Value::Null) => None,
            Ok(observation) => Some(observation),
            Err(e) => {
                tracing::warn!(url, error = %e, "weather lookup failed");
                None
            }
        }
    }
}

/// Date, time and (optionally) weather context appended to the user prompt.
pub fn context_preamble(
    now: DateTime<Local>,
    weather: Option<&Value>,
    location: Option<&str>,
) -> String {
    let mut preamble = format!(
        "Current date and time: {}",
        now.format("%A, %B %-d, %Y %-I:%M %p %Z")
    );
    if let Some(weather) = weather {
        let place = location.map(|l| format!(" for {}", l)).unwrap_or_default();
        preamble.push_str(&format!(
            "\nCurrent weather observations{} (report temperatures in Celsius): {}",
            place, weather
        ));
    }
    preamble
}

fn response_format(format: OutputFormat) -> Option<ResponseFormat> {
    match format {
        OutputFormat::JsonSchema => Some(ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("A Podcast Assembly Plan for one episode".to_string()),
                name: "podcast_assembly_plan".to_string(),
                schema: Some(plan_json_schema()),
                strict: Some(false),
            },
        }),
        OutputFormat::JsonObject => Some(ResponseFormat::JsonObject),
        OutputFormat::Text => None,
    }
}

fn wire_values<E: WireEnum>() -> Vec<&'static str> {
    E::ALL.iter().map(|v| v.as_str()).collect()
}

/// JSON schema mirroring what the validator accepts.
pub fn plan_json_schema() -> Value {
    let text = json!({"type": "string", "minLength": 1});
    let voice = json!({"type": "string", "enum": wire_values::<TtsVoice>()});
    let id = json!({"type": "string", "minLength": 1});
    let spoken = |kind: SegmentKind| {
        json!({
            "type": "object",
            "properties": {
                "id": id,
                "type": {"const": kind.as_str()},
                "text": text,
                "tts_voice": voice,
            },
            "required": ["type", "text", "tts_voice"],
        })
    };

    json!({
        "type": "object",
        "properties": {
            "episode_id": text,
            "title": text,
            "description": text,
            "segments": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "anyOf": [
                        {
                            "type": "object",
                            "properties": {
                                "id": id,
                                "type": {"const": SegmentKind::Dialogue.as_str()},
                                "speaker": {"type": "string"},
                                "text": text,
                                "tts_voice": voice,
                            },
                            "required": ["type", "speaker", "text", "tts_voice"],
                        },
                        {
                            "type": "object",
                            "properties": {
                                "id": id,
                                "type": {"const": SegmentKind::Music.as_str()},
                                "role": {"type": "string", "enum": wire_values::<MusicRole>()},
                                "prompt": text,
                                "engine": {"type": "string", "enum": wire_values::<MusicEngine>()},
                            },
                            "required": ["type", "role", "prompt"],
                        },
                        spoken(SegmentKind::Ad),
                        spoken(SegmentKind::Weather),
                    ],
                },
            },
        },
        "required": ["episode_id", "title", "description", "segments"],
    })
}

/// Credential and quota failures are not worth retrying.
fn classify_api_error(error: OpenAIError) -> PodcastError {
    if let OpenAIError::ApiError(api) = &error {
        let code = api.code.as_deref();
        let kind = api.r#type.as_deref();
        if code == Some("invalid_api_key") || api.message.contains("API key") {
            return PodcastError::InvalidApiKey(api.message.clone());
        }
        if code == Some("rate_limit_exceeded")
            || code == Some("insufficient_quota")
            || kind == Some("insufficient_quota")
        {
            return PodcastError::RateLimited(api.message.clone());
        }
    }
    PodcastError::from(error)
}

/// Pull the first JSON object out of a model reply.
///
/// Reasoning tags are dropped first, then a fenced ```json block is preferred
/// over the first balanced `{...}` in the text.
pub fn extract_plan_object(reply: &str) -> Result<Value, PodcastError> {
    let cleaned = strip_reasoning(reply);

    if let Some(fenced) = fenced_block(&cleaned) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(fenced.trim()) {
            return Ok(value);
        }
    }

    let mut search_from = 0;
    while let Some(offset) = cleaned[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(&cleaned[start..]) {
            if let Ok(value @ Value::Object(_)) =
                serde_json::from_str::<Value>(&cleaned[start..start + end])
            {
                return Ok(value);
            }
        }
        search_from = start + 1;
    }

    Err(PodcastError::NoPlanInReply)
}

/// Remove `<thinking>...</thinking>` style blocks some models emit.
fn strip_reasoning(reply: &str) -> String {
    let tags_to_strip = ["thinking", "think", "reflection", "reasoning", "scratchpad"];

    let mut result = reply.to_string();
    for tag in &tags_to_strip {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        if let Ok(re) = regex::Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }
    result
}

fn fenced_block(text: &str) -> Option<&str> {
    let re = regex::Regex::new(r"(?s)```(?:json)?\s*\n(.*?)```").ok()?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Byte length of the balanced `{...}` starting at `text[0]`, honouring strings.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[test]
    fn test_extract_bare_object() {
        let value = extract_plan_object(r#"{"episode_id": "e1", "segments": []}"#).unwrap();
        assert_eq!(value["episode_id"], "e1");
    }

    #[test]
    fn test_extract_fenced_object() {
        let reply = "Here is your plan:\n```json\n{\"title\": \"Morning\"}\n```\nEnjoy!";
        assert_eq!(extract_plan_object(reply).unwrap(), json!({"title": "Morning"}));
    }

    #[test]
    fn test_extract_skips_reasoning_and_braces_in_strings() {
        let reply = r#"<think>maybe {"title": "draft"}</think>Sure: {"title": "Final {cut}", "n": 1} done"#;
        assert_eq!(
            extract_plan_object(reply).unwrap(),
            json!({"title": "Final {cut}", "n": 1})
        );
    }

    #[test]
    fn test_extract_skips_unparseable_candidates() {
        let reply = r#"Use {curly} braces like {"episode_id": "e2"}"#;
        assert_eq!(extract_plan_object(reply).unwrap(), json!({"episode_id": "e2"}));
    }

    #[test]
    fn test_no_object_is_an_error() {
        assert!(matches!(
            extract_plan_object("I cannot help with that."),
            Err(PodcastError::NoPlanInReply)
        ));
        assert!(matches!(
            extract_plan_object("[1, 2, 3]"),
            Err(PodcastError::NoPlanInReply)
        ));
    }

    #[test]
    fn test_balanced_end_handles_escapes() {
        let text = r#"{"a": "quote \" and } brace"} trailing"#;
        let end = balanced_end(text).unwrap();
        assert_eq!(&text[end..], " trailing");
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected_without_network() {
        let generator = PlanGenerator::new(GenerationConfig::default()).unwrap();
        let err = generator
            .generate(&GenerationRequest::new("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, PodcastError::GenerationError(_)));
    }

    fn generation_config(base: String) -> GenerationConfig {
        GenerationConfig {
            api_base: base,
            api_key: Some("sk-test".to_string()),
            max_retries: 1,
            ..GenerationConfig::default()
        }
    }

    fn completion(content: &str) -> String {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop",
            }],
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_generate_requests_schema_output_with_context() {
        let mut server = Server::new_async().await;
        let weather = server
            .mock("GET", "/weather")
            .with_status(200)
            .with_body(json!([{"lastData": {"tempf": 51.2}}]).to_string())
            .create_async()
            .await;
        let chat = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({
                    "response_format": {
                        "type": "json_schema",
                        "json_schema": {"name": "podcast_assembly_plan"},
                    }
                })),
                Matcher::Regex("Current date and time".to_string()),
                Matcher::Regex("Glenelg".to_string()),
                Matcher::Regex("tempf".to_string()),
            ]))
            .with_status(200)
            .with_body(completion(r#"{"episode_id": "e1", "title": "T"}"#))
            .create_async()
            .await;

        let generator = PlanGenerator::new(GenerationConfig {
            weather_url: Some(format!("{}/weather", server.url())),
            weather_location: Some("Glenelg, Nova Scotia".to_string()),
            ..generation_config(server.url())
        })
        .unwrap();
        let plan = generator
            .generate(&GenerationRequest::new("A morning show"))
            .await
            .unwrap();

        weather.assert_async().await;
        chat.assert_async().await;
        assert_eq!(plan, json!({"episode_id": "e1", "title": "T"}));
    }

    #[tokio::test]
    async fn test_generate_without_context_or_schema() {
        let mut server = Server::new_async().await;
        let chat = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex(r#""content":"Just the prompt""#.to_string()))
            .with_status(200)
            .with_body(completion("```json\n{\"title\": \"T\"}\n```"))
            .create_async()
            .await;

        let generator = PlanGenerator::new(GenerationConfig {
            context: false,
            response_format: OutputFormat::Text,
            ..generation_config(server.url())
        })
        .unwrap();
        let plan = generator
            .generate(&GenerationRequest::new("Just the prompt"))
            .await
            .unwrap();

        chat.assert_async().await;
        assert_eq!(plan, json!({"title": "T"}));
    }

    #[tokio::test]
    async fn test_invalid_api_key_is_not_retried() {
        let mut server = Server::new_async().await;
        let chat = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(
                json!({"error": {
                    "message": "Incorrect API key provided: sk-test.",
                    "type": "invalid_request_error",
                    "param": null,
                    "code": "invalid_api_key",
                }})
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let generator = PlanGenerator::new(GenerationConfig {
            max_retries: 3,
            context: false,
            ..generation_config(server.url())
        })
        .unwrap();
        let err = generator
            .generate(&GenerationRequest::new("news"))
            .await
            .unwrap_err();

        chat.assert_async().await;
        assert!(matches!(err, PodcastError::InvalidApiKey(_)));
    }

    #[tokio::test]
    async fn test_exhausted_quota_is_rate_limited() {
        let mut server = Server::new_async().await;
        let _chat = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(
                json!({"error": {
                    "message": "You exceeded your current quota.",
                    "type": "insufficient_quota",
                    "param": null,
                    "code": "insufficient_quota",
                }})
                .to_string(),
            )
            .create_async()
            .await;

        let generator = PlanGenerator::new(GenerationConfig {
            context: false,
            ..generation_config(server.url())
        })
        .unwrap();
        let err = generator
            .generate(&GenerationRequest::new("news"))
            .await
            .unwrap_err();
        assert!(matches!(err, PodcastError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_failed_weather_lookup_keeps_date_context() {
        let mut server = Server::new_async().await;
        let _weather = server
            .mock("GET", "/weather")
            .with_status(503)
            .create_async()
            .await;

        let generator = PlanGenerator::new(GenerationConfig {
            weather_url: Some(format!("{}/weather", server.url())),
            ..generation_config(server.url())
        })
        .unwrap();
        assert!(generator.current_weather().await.is_none());
    }

    #[test]
    fn test_context_preamble() {
        let now = Local::now();
        let bare = context_preamble(now, None, None);
        assert!(bare.starts_with("Current date and time: "));
        assert!(!bare.contains("weather"));

        let with_weather = context_preamble(now, Some(&json!({"tempf": 40})), Some("Halifax"));
        assert!(with_weather.contains("Current weather observations for Halifax"));
        assert!(with_weather.contains(r#"{"tempf":40}"#));
    }

    #[test]
    fn test_plan_schema_lists_wire_values() {
        let schema = plan_json_schema();
        assert_eq!(schema["properties"]["segments"]["minItems"], 1);
        let variants = schema["properties"]["segments"]["items"]["anyOf"].as_array().unwrap();
        assert_eq!(variants.len(), 4);
        assert_eq!(
            variants[0]["properties"]["tts_voice"]["enum"],
            json!(["alloy", "echo", "fable", "onyx", "nova", "shimmer"])
        );
        assert_eq!(variants[3]["properties"]["type"]["const"], "weather");
        assert!(response_format(OutputFormat::Text).is_none());
    }
}
