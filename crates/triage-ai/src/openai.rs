use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;

use crate::{
    retry::{
        is_retryable_http_error, new_request_id, parse_retry_after_ms, provider_retry_delay_ms,
        retry_budget_allows_delay, should_retry_status,
    },
    ChatRequest, ChatResponse, ChatUsage, EmbeddingClient, EmbeddingRequest, EmbeddingResponse,
    LlmClient, Message, MessageRole, TriageAiError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// How the API key is presented to the provider.
pub enum OpenAiAuthScheme {
    #[default]
    Bearer,
    /// Azure-style `api-key` header.
    ApiKeyHeader,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub organization: Option<String>,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_budget_ms: u64,
    pub retry_jitter: bool,
    pub auth_scheme: OpenAiAuthScheme,
}

#[derive(Debug, Clone)]
/// OpenAI-compatible client serving both chat completions and embeddings.
pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, TriageAiError> {
        if config.api_key.trim().is_empty() {
            return Err(TriageAiError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        match config.auth_scheme {
            OpenAiAuthScheme::Bearer => {
                let bearer = format!("Bearer {}", config.api_key.trim());
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&bearer).map_err(|e| {
                        TriageAiError::InvalidResponse(format!("invalid API key header: {e}"))
                    })?,
                );
            }
            OpenAiAuthScheme::ApiKeyHeader => {
                headers.insert(
                    "api-key",
                    HeaderValue::from_str(config.api_key.trim()).map_err(|e| {
                        TriageAiError::InvalidResponse(format!("invalid API key header: {e}"))
                    })?,
                );
            }
        }
        if let Some(org) = &config.organization {
            headers.insert(
                "OpenAI-Organization",
                HeaderValue::from_str(org).map_err(|e| {
                    TriageAiError::InvalidResponse(format!("invalid organization header: {e}"))
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn endpoint_url(&self, suffix: &str) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with(suffix) {
            return base.to_string();
        }
        format!("{base}{suffix}")
    }

    /// POSTs `body` and returns the raw success payload, retrying transient failures.
    async fn post_with_retries(&self, url: &str, body: &Value) -> Result<String, TriageAiError> {
        let started = std::time::Instant::now();
        let max_retries = self.config.max_retries;

        for attempt in 0..=max_retries {
            let response = self
                .client
                .post(url)
                .header("x-triage-request-id", new_request_id())
                .header("x-triage-retry-attempt", attempt.to_string())
                .json(body)
                .send()
                .await;

            let retry_after_ms = match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.text().await?);
                    }
                    let retry_after_ms = parse_retry_after_ms(response.headers());
                    let raw = response.text().await?;
                    if attempt >= max_retries || !should_retry_status(status.as_u16()) {
                        return Err(TriageAiError::HttpStatus {
                            status: status.as_u16(),
                            body: raw,
                        });
                    }
                    retry_after_ms
                }
                Err(error) => {
                    if attempt >= max_retries || !is_retryable_http_error(&error) {
                        return Err(TriageAiError::Http(error));
                    }
                    None
                }
            };

            let backoff_ms =
                provider_retry_delay_ms(attempt, self.config.retry_jitter, retry_after_ms);
            let elapsed_ms = started.elapsed().as_millis() as u64;
            if !retry_budget_allows_delay(elapsed_ms, backoff_ms, self.config.retry_budget_ms) {
                return Err(TriageAiError::InvalidResponse(format!(
                    "retry budget of {}ms exhausted after {} attempt(s)",
                    self.config.retry_budget_ms,
                    attempt + 1
                )));
            }
            tracing::debug!(attempt, backoff_ms, url, "retrying provider request");
            sleep(std::time::Duration::from_millis(backoff_ms)).await;
        }

        Err(TriageAiError::InvalidResponse(
            "request retry loop terminated unexpectedly".to_string(),
        ))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, TriageAiError> {
        let body = build_chat_request_body(&request);
        let raw = self
            .post_with_retries(&self.endpoint_url("/chat/completions"), &body)
            .await?;
        parse_chat_response(&raw)
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiClient {
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, TriageAiError> {
        if request.inputs.is_empty() {
            return Ok(EmbeddingResponse {
                vectors: Vec::new(),
                usage: ChatUsage::default(),
            });
        }
        let body = build_embedding_request_body(&request);
        let raw = self
            .post_with_retries(&self.endpoint_url("/embeddings"), &body)
            .await?;
        parse_embedding_response(&raw, request.inputs.len())
    }
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

fn build_chat_request_body(request: &ChatRequest) -> Value {
    let messages = request
        .messages
        .iter()
        .map(|message| {
            json!({
                "role": role_name(message.role),
                "content": message.content,
            })
        })
        .collect::<Vec<_>>();
    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });
    if request.json_mode {
        body["response_format"] = json!({ "type": "json_object" });
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    body
}

fn build_embedding_request_body(request: &EmbeddingRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "input": request.inputs,
    });
    if let Some(dimensions) = request.dimensions {
        body["dimensions"] = json!(dimensions);
    }
    body
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl From<OpenAiUsage> for ChatUsage {
    fn from(usage: OpenAiUsage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingItem>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f64>,
}

/// Flattens string or content-part payloads into plain text.
fn flatten_content(content: Option<Value>) -> String {
    match content {
        Some(Value::String(text)) => text,
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn parse_chat_response(raw: &str) -> Result<ChatResponse, TriageAiError> {
    let parsed: OpenAiChatResponse = serde_json::from_str(raw)?;
    let choice = parsed.choices.into_iter().next().ok_or_else(|| {
        TriageAiError::InvalidResponse("response contained no choices".to_string())
    })?;

    Ok(ChatResponse {
        message: Message::assistant_text(flatten_content(choice.message.content)),
        finish_reason: choice.finish_reason,
        usage: parsed.usage.map(ChatUsage::from).unwrap_or_default(),
    })
}

fn parse_embedding_response(
    raw: &str,
    expected_inputs: usize,
) -> Result<EmbeddingResponse, TriageAiError> {
    let parsed: OpenAiEmbeddingResponse = serde_json::from_str(raw)?;
    if parsed.data.len() != expected_inputs {
        return Err(TriageAiError::InvalidResponse(format!(
            "embedding response size mismatch: expected {expected_inputs}, got {}",
            parsed.data.len()
        )));
    }

    let mut items = parsed.data;
    items.sort_by_key(|item| item.index.unwrap_or(usize::MAX));
    let vectors = items
        .into_iter()
        .map(|item| {
            item.embedding
                .into_iter()
                .map(|component| component as f32)
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    Ok(EmbeddingResponse {
        vectors,
        usage: parsed.usage.map(ChatUsage::from).unwrap_or_default(),
    })
}
