// src/providers/openai.rs
//
// Reasoning engine backed by an OpenAI-compatible chat completions API.
// `complete` optionally requests a json_schema response format so planner
// calls get a structured result; `complete_stream` consumes the SSE stream
// and yields content deltas as they arrive.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client};
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ReasoningEngine, TextStream};
use crate::error::ProviderError;

pub struct OpenAiClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_output_tokens: usize,
}

impl OpenAiClient {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        max_output_tokens: usize,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::Network)?;

        Ok(Self {
            http_client,
            base_url,
            api_key,
            model,
            max_output_tokens,
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }

    fn request_body(&self, prompt: &str, response_schema: Option<Value>, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": self.max_output_tokens,
            "temperature": 0.1,
            "stream": stream,
        });
        if let Some(schema) = response_schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "delve_structured_response",
                    "strict": true,
                    "schema": schema,
                }
            });
        }
        body
    }
}

/// Pull the content delta out of one SSE chunk, if any.
fn delta_from_chunk(chunk: &Value) -> Option<String> {
    chunk
        .get("choices")?
        .as_array()?
        .first()?
        .get("delta")?
        .get("content")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[async_trait]
impl ReasoningEngine for OpenAiClient {
    async fn complete(
        &self,
        prompt: &str,
        response_schema: Option<Value>,
    ) -> Result<String, ProviderError> {
        let body = self.request_body(prompt, response_schema, false);

        let response = self
            .http_client
            .post(self.completions_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "<no body>".into());
            return Err(match status.as_u16() {
                429 => ProviderError::RateLimited,
                401 | 403 => ProviderError::InvalidApiKey,
                _ => ProviderError::Api(format!("completions error {}: {}", status, body)),
            });
        }

        let parsed: Value = response.json().await?;
        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::Api("no content in completion response".into()))?;

        debug!(chars = content.len(), "completion received");
        Ok(content.to_string())
    }

    async fn complete_stream(&self, prompt: &str) -> Result<TextStream, ProviderError> {
        let body = self.request_body(prompt, None, true);

        let mut es = self
            .http_client
            .post(self.completions_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(header::ACCEPT, "text/event-stream")
            .json(&body)
            .eventsource()
            .map_err(|e| ProviderError::Stream(e.to_string()))?;

        let fragments = stream! {
            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(message)) => {
                        if message.data.trim() == "[DONE]" {
                            es.close();
                            break;
                        }
                        match serde_json::from_str::<Value>(&message.data) {
                            Ok(chunk) => {
                                if let Some(delta) = delta_from_chunk(&chunk) {
                                    yield Ok(delta);
                                }
                            }
                            Err(e) => {
                                warn!("unparseable SSE chunk: {}", e);
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => {
                        yield Err(ProviderError::Stream(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(fragments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_extraction() {
        let chunk: Value =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"hello"}}]}"#).unwrap();
        assert_eq!(delta_from_chunk(&chunk).as_deref(), Some("hello"));

        let chunk: Value = serde_json::from_str(r#"{"choices":[{"delta":{}}]}"#).unwrap();
        assert!(delta_from_chunk(&chunk).is_none());

        let chunk: Value =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":""}}]}"#).unwrap();
        assert!(delta_from_chunk(&chunk).is_none());
    }

    #[test]
    fn test_request_body_schema_wiring() {
        let client = OpenAiClient::new(
            "key".into(),
            "https://api.openai.com".into(),
            "gpt-4o-mini".into(),
            1024,
            Duration::from_secs(30),
        )
        .unwrap();

        let plain = client.request_body("hi", None, false);
        assert!(plain.get("response_format").is_none());
        assert_eq!(plain["stream"], false);

        let schema = json!({"type": "object"});
        let structured = client.request_body("hi", Some(schema), false);
        assert_eq!(structured["response_format"]["type"], "json_schema");
        assert_eq!(
            structured["response_format"]["json_schema"]["strict"],
            true
        );
    }
}
