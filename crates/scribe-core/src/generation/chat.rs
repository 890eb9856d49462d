//! OpenAI-compatible `chat/completions` backend with strict JSON-schema
//! output.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{GenerationBackend, GenerationError, GenerationRequest};

/// Connection settings for [`ChatCompletionsBackend`].
#[derive(Clone)]
pub struct ChatCompletionsConfig {
    /// Base URL up to and including the API version, e.g.
    /// `https://api.openai.com/v1`.
    pub base_url: String,
    pub api_key: String,
    /// Transport-level timeout. Stage timeouts still apply on top.
    pub request_timeout: Duration,
}

impl ChatCompletionsConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for ChatCompletionsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// HTTP generation backend.
pub struct ChatCompletionsBackend {
    config: ChatCompletionsConfig,
    http_client: reqwest::Client,
}

impl ChatCompletionsBackend {
    pub fn new(config: ChatCompletionsConfig) -> Result<Self, GenerationError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("scribe/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl GenerationBackend for ChatCompletionsBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, GenerationError> {
        debug!(stage = %request.stage, model = %request.model, "requesting completion");

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request_body(request))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        completion_from_response(status, &text)
    }
}

/// Interpret a raw `chat/completions` HTTP response.
///
/// Any non-success status is a transport failure, whatever the body holds;
/// gateways in front of the API often answer with HTML.
pub fn completion_from_response(
    status: reqwest::StatusCode,
    text: &str,
) -> Result<Value, GenerationError> {
    if !status.is_success() {
        return Err(GenerationError::Transport(format!(
            "{status}: {}",
            error_message(text)
        )));
    }
    let body: Value = serde_json::from_str(text)
        .map_err(|e| GenerationError::Malformed(format!("response body is not JSON: {e}")))?;
    parse_completion(&body)
}

/// The API's `error.message`, or the start of the raw body.
fn error_message(text: &str) -> String {
    const LIMIT: usize = 200;
    if let Some(message) = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|body| body["error"]["message"].as_str().map(str::to_string))
    {
        return message;
    }
    let raw = text.trim();
    if raw.is_empty() {
        return "empty response body".to_string();
    }
    match raw.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}…", &raw[..cut]),
        None => raw.to_string(),
    }
}

/// Build the `chat/completions` payload for a request.
pub fn request_body(request: &GenerationRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": [
            { "role": "system", "content": request.instructions },
            { "role": "user", "content": request.prompt },
        ],
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": format!("{}_output", request.stage),
                "strict": true,
                "schema": request.schema,
            },
        },
    });
    if let Some(effort) = &request.reasoning_effort {
        body["reasoning_effort"] = json!(effort);
    }
    body
}

/// Extract the structured output from a `chat/completions` response body.
pub fn parse_completion(body: &Value) -> Result<Value, GenerationError> {
    let message = &body["choices"][0]["message"];
    if message.is_null() {
        return Err(GenerationError::Malformed(
            "completion has no choices".to_string(),
        ));
    }
    if let Some(refusal) = message["refusal"].as_str() {
        return Err(GenerationError::Refusal(refusal.to_string()));
    }
    let content = message["content"]
        .as_str()
        .ok_or_else(|| GenerationError::Malformed("completion has no content".to_string()))?;
    serde_json::from_str(content).map_err(|e| GenerationError::Malformed(e.to_string()))
}
