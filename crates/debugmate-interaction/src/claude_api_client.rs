//! ClaudeApiClient - Direct REST API implementation of [`LlmClient`].
//!
//! Supports plain completions and server-sent-event streaming.

use std::time::Duration;

use async_trait::async_trait;
use debugmate_core::config::LlmConfig;
use debugmate_core::llm::{ImageAttachment, LlmClient, LlmError, LlmRequest, LlmRole, TextStream};
use futures::future::ready;
use futures::stream::{self, Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";
const BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the Claude Messages API.
#[derive(Clone)]
pub struct ClaudeApiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl ClaudeApiClient {
    /// Creates a client with the provided API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: BASE_URL.to_string(),
            max_tokens: 2048,
            temperature: 0.3,
            timeout: Duration::from_secs(60),
        }
    }

    /// Builds a client from configuration. The API key is required.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| LlmError::new("ANTHROPIC_API_KEY is not configured"))?;

        let model = if config.model.trim().is_empty() {
            DEFAULT_CLAUDE_MODEL.to_string()
        } else {
            config.model.clone()
        };

        Ok(Self::new(api_key, model)
            .with_base_url(config.base_url.clone())
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature)
            .with_timeout(Duration::from_secs(config.timeout_secs.max(1))))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Per-request timeout for non-streaming calls.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_body(&self, request: &LlmRequest, stream: bool) -> CreateMessageRequest {
        let mut messages: Vec<Message> = request
            .messages
            .iter()
            .map(|m| Message {
                role: match m.role {
                    LlmRole::User => "user",
                    LlmRole::Assistant => "assistant",
                },
                content: vec![ContentBlock::Text {
                    text: m.content.clone(),
                }],
            })
            .collect();

        messages.extend(request.images.iter().map(image_message));

        CreateMessageRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            temperature: request.temperature.unwrap_or(self.temperature),
            system: Some(request.system.clone()).filter(|s| !s.trim().is_empty()),
            stream,
        }
    }

    async fn send(&self, body: &CreateMessageRequest) -> Result<reqwest::Response, LlmError> {
        let mut builder = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body);
        if !body.stream {
            builder = builder.timeout(self.timeout);
        }

        let response = builder.send().await.map_err(|err| LlmError {
            message: format!("Claude API request failed: {err}"),
            status: None,
            retryable: err.is_connect() || err.is_timeout(),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Claude error body".to_string());
            return Err(map_http_error(status, body_text));
        }

        Ok(response)
    }
}

fn image_message(image: &ImageAttachment) -> Message {
    Message {
        role: "user",
        content: vec![ContentBlock::Image {
            source: ImageSource {
                r#type: "base64",
                media_type: image.media_type.clone(),
                data: image.data.clone(),
            },
        }],
    }
}

#[async_trait]
impl LlmClient for ClaudeApiClient {
    async fn complete(&self, request: LlmRequest) -> Result<String, LlmError> {
        let body = self.build_body(&request, false);
        debug!(
            "[ClaudeApiClient] complete: {} messages, {} images",
            body.messages.len(),
            request.images.len()
        );

        let parsed: CreateMessageResponse = self
            .send(&body)
            .await?
            .json()
            .await
            .map_err(|err| LlmError::new(format!("Failed to parse Claude response: {err}")))?;

        extract_text_response(parsed)
    }

    async fn stream(&self, request: LlmRequest) -> Result<TextStream, LlmError> {
        let body = self.build_body(&request, true);
        let response = self.send(&body).await?;
        Ok(decode_events(response.bytes_stream()))
    }
}

/// Turns a raw event-stream body into text deltas. A body that ends
/// before `message_stop` yields a trailing error.
fn decode_events<S, B, E>(body: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let chunks = body.map(Some).chain(stream::once(ready(None)));
    let deltas = chunks
        .scan(SseDecoder::default(), |decoder, chunk| {
            if decoder.finished {
                return ready(None);
            }
            let items = match chunk {
                Some(Ok(bytes)) => decoder.push(bytes.as_ref()),
                Some(Err(err)) => {
                    decoder.finished = true;
                    vec![Err(LlmError::new(format!("Claude stream interrupted: {err}")))]
                }
                None => {
                    decoder.finished = true;
                    vec![Err(LlmError::new("Claude stream ended before message_stop"))]
                }
            };
            ready(Some(stream::iter(items)))
        })
        .flatten();

    Box::pin(deltas)
}

// ============================================================================
// Server-sent events
// ============================================================================

/// One decoded `data:` line of the event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Delta(String),
    Done,
    Error(String),
}

#[derive(Deserialize)]
struct StreamPayload {
    r#type: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
}

/// Decodes one SSE line. Comments, `event:` lines and events without text
/// yield `None`.
pub fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let data = line.trim_end_matches('\r').strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }

    let payload: StreamPayload = match serde_json::from_str(data) {
        Ok(payload) => payload,
        Err(err) => return Some(SseEvent::Error(format!("malformed stream event: {err}"))),
    };

    match payload.r#type.as_str() {
        "content_block_delta" => payload
            .delta
            .and_then(|d| d.text)
            .filter(|t| !t.is_empty())
            .map(SseEvent::Delta),
        "message_stop" => Some(SseEvent::Done),
        "error" => Some(SseEvent::Error(
            payload
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown stream error".to_string()),
        )),
        _ => None,
    }
}

/// Splits a byte stream into lines and turns them into text deltas.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<String, LlmError>> {
        self.buffer.extend_from_slice(bytes);
        let mut items = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if self.finished {
                continue;
            }
            match parse_sse_line(&String::from_utf8_lossy(&line[..line.len() - 1])) {
                Some(SseEvent::Delta(text)) => items.push(Ok(text)),
                Some(SseEvent::Done) => self.finished = true,
                Some(SseEvent::Error(message)) => {
                    self.finished = true;
                    items.push(Err(LlmError::new(message)));
                }
                None => {}
            }
        }

        items
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct CreateMessageRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Serialize)]
struct ImageSource {
    r#type: &'static str,
    media_type: String,
    data: String,
}

#[derive(Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlockResponse>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlockResponse {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn extract_text_response(response: CreateMessageResponse) -> Result<String, LlmError> {
    let text: String = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ContentBlockResponse::Text { text } => Some(text),
            ContentBlockResponse::Other => None,
        })
        .collect();

    if text.is_empty() {
        return Err(LlmError::new("Claude API returned no text in the response content"));
    }
    Ok(text)
}

fn map_http_error(status: StatusCode, body: String) -> LlmError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);
    LlmError::http(status.as_u16(), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use debugmate_core::llm::{LLM_ERROR_PREFIX, LlmMessage};
    use serde_json::json;

    #[test]
    fn test_request_body_shape() {
        let client = ClaudeApiClient::new("key", "model-x");
        let request = LlmRequest {
            system: "You debug tests.".to_string(),
            messages: vec![LlmMessage::user("why?"), LlmMessage::assistant("because")],
            images: vec![ImageAttachment::png("aGVsbG8=")],
            max_tokens: Some(100),
            temperature: None,
        };

        let body = serde_json::to_value(client.build_body(&request, false)).unwrap();
        assert_eq!(body["model"], "model-x");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["system"], "You debug tests.");
        assert!(body.get("stream").is_none());
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(body["messages"][0]["content"][0], json!({"type": "text", "text": "why?"}));
        assert_eq!(
            body["messages"][2],
            json!({
                "role": "user",
                "content": [{
                    "type": "image",
                    "source": {"type": "base64", "media_type": "image/png", "data": "aGVsbG8="}
                }]
            })
        );
    }

    #[test]
    fn test_empty_system_is_omitted() {
        let client = ClaudeApiClient::new("key", "m");
        let body = serde_json::to_value(client.build_body(&LlmRequest::default(), true)).unwrap();
        assert!(body.get("system").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_parse_sse_lines() {
        assert_eq!(
            parse_sse_line(r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#),
            Some(SseEvent::Delta("Hi".to_string()))
        );
        assert_eq!(parse_sse_line("data: [DONE]"), Some(SseEvent::Done));
        assert_eq!(parse_sse_line(r#"data: {"type":"message_stop"}"#), Some(SseEvent::Done));
        assert_eq!(parse_sse_line("event: ping"), None);
        assert_eq!(parse_sse_line(r#"data: {"type":"ping"}"#), None);
        assert!(matches!(
            parse_sse_line(r#"data: {"type":"error","error":{"type":"overloaded_error","message":"busy"}}"#),
            Some(SseEvent::Error(m)) if m == "busy"
        ));
    }

    #[test]
    fn test_decoder_handles_split_chunks_and_stops_at_done() {
        let mut decoder = SseDecoder::default();
        let first = decoder.push(b"data: {\"type\":\"content_block_delta\",\"delta\":{\"te");
        assert!(first.is_empty());

        let rest = decoder.push(
            b"xt\":\"Hel\"}}\n\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"lo\"}}\ndata: [DONE]\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"late\"}}\n",
        );
        let texts: Vec<String> = rest.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["Hel".to_string(), "lo".to_string()]);
        assert!(decoder.finished);
    }

    fn body(chunks: &[&'static str]) -> impl Stream<Item = Result<&'static [u8], std::io::Error>> + Send + 'static {
        let chunks: Vec<Result<&'static [u8], std::io::Error>> = chunks.iter().map(|&c| Ok(c.as_bytes())).collect();
        stream::iter(chunks)
    }

    #[tokio::test]
    async fn test_stream_ending_without_stop_is_an_error() {
        let items: Vec<_> = decode_events(body(&[
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"Hel\"}}\n",
        ]))
        .collect()
        .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Hel");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_stream_ending_with_stop_is_complete() {
        let items: Vec<_> = decode_events(body(&[
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"Hel\"}}\n",
            "data: {\"type\":\"message_stop\"}\n",
        ]))
        .collect()
        .await;

        let texts: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["Hel".to_string()]);
    }

    #[test]
    fn test_http_error_uses_api_message_and_prefix() {
        let err = map_http_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#.to_string(),
        );
        assert!(err.retryable);
        assert_eq!(err.status, Some(429));
        assert!(err.to_string().starts_with(LLM_ERROR_PREFIX));
        assert!(err.to_string().contains("slow down"));
    }

    #[test]
    fn test_from_config_requires_key() {
        assert!(ClaudeApiClient::from_config(&LlmConfig::default()).is_err());

        let config = LlmConfig {
            api_key: Some("sk".to_string()),
            ..Default::default()
        };
        let client = ClaudeApiClient::from_config(&config).unwrap();
        assert_eq!(client.model(), DEFAULT_CLAUDE_MODEL);
    }

    #[test]
    fn test_text_blocks_are_concatenated() {
        let parsed: CreateMessageResponse = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "a"},
                {"type": "tool_use", "id": "x", "name": "n", "input": {}},
                {"type": "text", "text": "b"}
            ]
        }))
        .unwrap();
        assert_eq!(extract_text_response(parsed).unwrap(), "ab");
    }
}
