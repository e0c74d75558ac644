#![forbid(unsafe_code)]

//! HTTP provider speaking an OpenAI-compatible streaming completions
//! endpoint. SSE events are parsed from a buffer that survives chunk seams,
//! since one event can arrive split across reads.

use crate::error::GenerationError;
use crate::provider::{
    CancelHandle, Generation, GenerationOptions, GenerationProvider,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

/// Rough conversion from the advisory character budget to a token limit.
const CHARS_PER_TOKEN: usize = 4;
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct SseProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SseProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|err| GenerationError::Config(format!("http client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn build_headers(&self) -> Result<HeaderMap, GenerationError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = self.api_key.as_deref() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|err| GenerationError::Config(format!("invalid api key: {err}")))?,
            );
        }
        Ok(headers)
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[async_trait]
impl GenerationProvider for SseProvider {
    async fn stream_completion(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Generation, GenerationError> {
        let max_tokens = options
            .max_chars
            .map(|chars| (chars / CHARS_PER_TOKEN).max(1) as u32)
            .unwrap_or(DEFAULT_MAX_TOKENS);
        let body = CompletionBody {
            model: &options.model,
            prompt,
            stream: true,
            max_tokens,
            temperature: options.temperature,
        };

        tracing::debug!(model = %options.model, max_tokens, "starting completion request");
        let response = self
            .client
            .post(format!("{}/completions", self.base_url))
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|err| GenerationError::Network(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api { status, message });
        }

        let cancel = CancelHandle::new();
        let flag = cancel.clone();
        let stream = response
            .bytes_stream()
            .scan(String::new(), |buffer, result| {
                let deltas = match result {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        parse_sse_deltas_buffered(buffer)
                    }
                    Err(err) => vec![Err(GenerationError::Network(err.to_string()))],
                };
                futures::future::ready(Some(deltas))
            })
            .flat_map(futures::stream::iter)
            .take_while(move |_| futures::future::ready(!flag.is_cancelled()));

        Ok(Generation::new(Box::pin(stream), cancel))
    }

    fn name(&self) -> &str {
        "sse"
    }
}

/// Drain complete SSE events from `buffer`, leaving any trailing partial
/// event in place for the next chunk.
fn parse_sse_deltas_buffered(buffer: &mut String) -> Vec<Result<String, GenerationError>> {
    let mut deltas = Vec::new();

    while let Some(event_end) = event_boundary(buffer) {
        let event: String = buffer.drain(..event_end).collect();
        for line in event.lines() {
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() || data == "[DONE]" {
                continue;
            }
            match serde_json::from_str::<CompletionChunk>(data) {
                Ok(chunk) => {
                    if let Some(error) = chunk.error {
                        deltas.push(Err(GenerationError::Provider(error.message)));
                        continue;
                    }
                    for choice in chunk.choices {
                        if !choice.text.is_empty() {
                            deltas.push(Ok(choice.text));
                        }
                    }
                }
                Err(err) => deltas.push(Err(GenerationError::Provider(format!(
                    "malformed stream event: {err}"
                )))),
            }
        }
    }

    deltas
}

/// End offset of the first complete event: a line terminator followed
/// immediately by a blank line. Servers may frame with LF or CRLF.
fn event_boundary(buffer: &str) -> Option<usize> {
    let bytes = buffer.as_bytes();
    for (index, byte) in bytes.iter().enumerate() {
        if *byte != b'\n' {
            continue;
        }
        let rest = &bytes[index + 1..];
        if rest.first() == Some(&b'\n') {
            return Some(index + 2);
        }
        if rest.len() >= 2 && rest[0] == b'\r' && rest[1] == b'\n' {
            return Some(index + 3);
        }
    }
    None
}
