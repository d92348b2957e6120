//! OpenAI-compatible chat client with token streaming and a retry envelope
//! for transient failures.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use newsdesk_analysis::{ArticleSummary, EventSelector};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Single-shot chat completion. Connect and timeout failures retry up to
    /// three times with a 2s backoff.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };

        let mut last_error = anyhow!("max retries exceeded");
        for attempt in 0..MAX_ATTEMPTS {
            debug!(model = %self.model, attempt, "chat request");
            let result = self
                .http
                .post(&url)
                .headers(self.headers()?)
                .json(&request)
                .send()
                .await;

            match result {
                Ok(response) => {
                    if !response.status().is_success() {
                        let status = response.status();
                        let body = response.text().await.unwrap_or_default();
                        return Err(anyhow!("LLM API error ({status}): {body}"));
                    }
                    let parsed: ChatResponse = response.json().await?;
                    return parsed
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.message.content)
                        .ok_or_else(|| anyhow!("No content in LLM response"));
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    warn!(attempt = attempt + 1, error = %e, "LLM request failed, retrying");
                    last_error = e.into();
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_error)
    }

    /// Streaming chat completion: yields content deltas as they arrive on
    /// the SSE wire (`data: {json}` lines, `data: [DONE]` terminator).
    pub fn chat_stream(
        &self,
        messages: Vec<ChatMessage>,
    ) -> impl Stream<Item = Result<String>> + Send {
        let http = self.http.clone();
        let url = format!("{}/chat/completions", self.base_url);
        let headers = self.headers();
        let model = self.model.clone();

        async_stream::try_stream! {
            let headers = headers?;
            let body = serde_json::json!({
                "model": model,
                "messages": messages,
                "stream": true,
            });

            let response = http
                .post(&url)
                .headers(headers)
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                Err(anyhow!("LLM API error ({status}): {text}"))?;
                return;
            }

            let mut buffer = String::new();
            let mut byte_stream = response.bytes_stream();
            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);

                    let Some(payload) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if payload == "[DONE]" {
                        return;
                    }
                    match serde_json::from_str::<StreamChunk>(payload) {
                        Ok(parsed) => {
                            if let Some(delta) = parsed
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|c| c.delta.content)
                            {
                                if !delta.is_empty() {
                                    yield delta;
                                }
                            }
                        }
                        Err(e) => {
                            debug!(error = %e, "skipping unparseable stream line");
                        }
                    }
                }
            }
        }
    }
}

/// LLM-backed selection stage for the aggregator: asks the model to pick
/// the most significant events from scored candidates.
pub struct LlmEventSelector {
    client: LlmClient,
}

impl LlmEventSelector {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventSelector for LlmEventSelector {
    async fn select(
        &self,
        candidates: &[ArticleSummary],
        limit: usize,
    ) -> newsdesk_common::Result<Vec<i64>> {
        // Budgeted listing: the context builder drops trailing candidates
        // rather than overflowing the prompt.
        let rows: Vec<(i64, String, String, String)> = candidates
            .iter()
            .map(|c| (c.id, c.url.clone(), format!("id={} {}", c.id, c.title), c.summary.clone()))
            .collect();
        let listing = newsdesk_analysis::ContextBuilder::new(12_000).build_prompt_context(&rows);
        let system = "You are a senior news editor selecting the core events of the period. \
                      Prefer stories with broad social, political, or economic impact; avoid \
                      near-duplicates; prefer in-depth reporting.";
        let user = format!(
            "From the {total} articles below, select the {limit} most significant events.\n\
             Reply with the selected article ids only, comma-separated.\n\n{listing}",
            total = candidates.len(),
        );

        let reply = self
            .client
            .chat(&[ChatMessage::system(system), ChatMessage::user(user)])
            .await
            .map_err(|e| newsdesk_common::NewsdeskError::BackendUnavailable(e.to_string()))?;

        let ids = parse_id_list(&reply, limit);
        if ids.is_empty() {
            return Err(newsdesk_common::NewsdeskError::Parse(format!(
                "no ids in selector reply: {reply}"
            )));
        }
        Ok(ids)
    }
}

/// Pull integer ids out of a model reply, tolerating prose around them.
fn parse_id_list(reply: &str, limit: usize) -> Vec<i64> {
    let mut ids = Vec::new();
    let mut current = String::new();
    for c in reply.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_digit() {
            current.push(c);
        } else if !current.is_empty() {
            if let Ok(id) = current.parse::<i64>() {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            current.clear();
        }
    }
    ids.truncate(limit);
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_list_parsed_from_prose() {
        let ids = parse_id_list("The most important are: 12, 7, and 33.", 10);
        assert_eq!(ids, vec![12, 7, 33]);
    }

    #[test]
    fn id_list_deduplicates_and_caps() {
        let ids = parse_id_list("1, 2, 2, 3, 4", 3);
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn empty_reply_yields_no_ids() {
        assert!(parse_id_list("no ids here", 5).is_empty());
    }
}
