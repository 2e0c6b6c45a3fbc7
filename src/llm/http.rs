//! HTTP completion client for Anthropic-messages-shaped endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::CompletionProvider;
use crate::types::RagError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Completion client speaking the Anthropic messages API shape.
///
/// The system instruction rides in the `system` field; the retrieval context
/// is delivered as a single user message. Temperature is pinned to zero since
/// the callers parse the output structurally.
#[derive(Clone)]
pub struct HttpCompletionProvider {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

impl HttpCompletionProvider {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RagError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key.trim())
                .map_err(|err| RagError::Completion(format!("invalid api key: {err}")))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            model: model.into(),
            max_tokens: 8192,
        })
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn complete(&self, system: &str, context: &str) -> Result<String, RagError> {
        let user_content = format!("### Context ###\n{context}");
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: &user_content,
            }],
            temperature: 0.0,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let parsed: MessagesResponse = response.json().await?;
        let joined = parsed
            .content
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(joined)
    }
}
