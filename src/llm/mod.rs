//! OpenAI-compatible chat client over server-sent events.
//!
//! Only what the oracle needs is modelled: one system and one user message
//! per call, optional tools, optional JSON mode.

use std::{pin::Pin, time::Duration};

use anyhow::{Context, Result};
use async_stream::try_stream;
use futures_core::Stream;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::Config;

pub mod oracle;

pub use oracle::{Completion, Oracle, OracleRequest, ResponseFormat};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub r#type: String, // "function"
    pub function: FunctionSchema,
}

/// A requested action: function name plus its JSON-encoded arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: f32,
    pub tools: Option<Vec<ToolSchema>>,
    pub tool_choice: Option<String>,
    pub json_mode: bool,
}

impl ChatOptions {
    pub fn for_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
            temperature: 0.0,
            tools: None,
            tool_choice: None,
            json_mode: false,
        }
    }
}

#[derive(Serialize)]
struct JsonFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<JsonFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSchema]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
}

impl<'a> ChatRequest<'a> {
    fn new(messages: &'a [ChatMessage], opts: &'a ChatOptions) -> Self {
        Self {
            model: &opts.model,
            temperature: opts.temperature,
            messages,
            stream: true,
            response_format: opts.json_mode.then_some(JsonFormat { kind: "json_object" }),
            tools: opts.tools.as_deref(),
            tool_choice: opts.tools.as_ref().and(opts.tool_choice.as_deref()),
        }
    }
}

#[derive(Debug)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl LlmClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let timeout = cfg.get_u64("REQUEST_TIMEOUT").unwrap_or(120);
        let base_url = normalize_base_url(&cfg.get("API_BASE_URL").unwrap_or_else(|| "default".into()));
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            http,
            base_url,
            api_key: cfg.get("OPENAI_API_KEY"),
            model: cfg.get("DEFAULT_MODEL").unwrap_or_else(|| "gpt-4o".into()),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        if let Some(key) = &self.api_key {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
        }
        Ok(headers)
    }

    /// Stream one completion as it arrives. Always ends with [`StreamEvent::Done`]
    /// unless an error is yielded first.
    pub fn chat_stream(
        &self,
        messages: Vec<ChatMessage>,
        opts: ChatOptions,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>> {
        let http = self.http.clone();
        let url = format!("{}/chat/completions", self.base_url);
        let headers = self.headers();

        Box::pin(try_stream! {
            let body = serde_json::to_value(ChatRequest::new(&messages, &opts))?;
            tracing::debug!(%url, model = %opts.model, "sending chat request");

            let resp = http
                .post(url)
                .headers(headers?)
                .json(&body)
                .send()
                .await
                .context("failed to send chat request")?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                Err(anyhow::anyhow!("LLM error: {} {}", status, text))?;
                return;
            }

            use futures_util::StreamExt as _;
            let mut bytes = resp.bytes_stream();
            let mut pending = String::new();
            while let Some(chunk) = bytes.next().await {
                pending.push_str(&String::from_utf8_lossy(&chunk.context("stream error")?));
                while let Some(pos) = pending.find('\n') {
                    let line: String = pending.drain(..=pos).collect();
                    for event in decode_sse_line(&line) {
                        let done = matches!(event, StreamEvent::Done);
                        yield event;
                        if done {
                            return;
                        }
                    }
                }
            }
            for event in decode_sse_line(&pending) {
                yield event;
            }
            yield StreamEvent::Done;
        })
    }
}

/// `default` means the OpenAI endpoint; anything else gets a `/v1` suffix unless it has one.
fn normalize_base_url(configured: &str) -> String {
    if configured == "default" {
        return OPENAI_BASE_URL.to_string();
    }
    let trimmed = configured.trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{}/v1", trimmed)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Content(String),
    ToolCallDelta { index: usize, name: Option<String>, arguments: Option<String> },
    ToolCallsFinish,
    Done,
}

/// Events carried by one SSE line. Comments, blank lines and undecodable
/// payloads carry none.
fn decode_sse_line(line: &str) -> Vec<StreamEvent> {
    let line = line.trim();
    let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
        return Vec::new();
    };
    if payload == "[DONE]" {
        return vec![StreamEvent::Done];
    }
    let chunk: Chunk = match serde_json::from_str(payload) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!("ignoring malformed stream line: {}", e);
            return Vec::new();
        }
    };

    let mut events = Vec::new();
    for choice in chunk.choices {
        if let Some(delta) = choice.delta {
            if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                events.push(StreamEvent::Content(content));
            }
            for part in delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = match part.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                events.push(StreamEvent::ToolCallDelta { index: part.index.unwrap_or(0), name, arguments });
            }
        }
        if choice.finish_reason.as_deref() == Some("tool_calls") {
            events.push(StreamEvent::ToolCallsFinish);
        }
    }
    events
}

#[derive(Debug, Deserialize)]
struct Chunk {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    delta: Option<Delta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDeltaPart>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDeltaPart {
    index: Option<usize>,
    function: Option<FunctionDeltaPart>,
}

#[derive(Debug, Deserialize)]
struct FunctionDeltaPart {
    name: Option<String>,
    arguments: Option<String>,
}
