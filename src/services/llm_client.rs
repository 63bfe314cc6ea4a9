//! LLM client for enquiry extraction.
//!
//! Talks to any OpenAI-compatible chat completions endpoint (LM Studio
//! locally, hosted providers with an API key).

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, instrument};

use crate::domain::llm::{self, ParsedEnquiry};
use crate::error::ApiError;

/// Client for the chat completions API.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Low temperature keeps extraction output stable
const TEMPERATURE: f32 = 0.3;

impl LlmClient {
    /// Create a new LLM client.
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<&str>,
        timeout_seconds: u64,
        max_tokens: u32,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        info!(base_url = base_url, model = model, "LLM client initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.map(str::to_string),
            max_tokens,
        })
    }

    /// Send one system + user exchange and return the reply text.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        request_id: Option<&str>,
    ) -> Result<String, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: self.max_tokens,
        };

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(rid) = request_id {
            req = req.header("x-request-id", rid);
        }

        debug!(url = %url, model = %self.model, "LLM request");

        let response = req.send().await.map_err(|e| {
            error!(error = %e, "LLM request failed");
            ApiError::upstream(format!("LLM service unavailable: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "LLM service error");
            return Err(ApiError::upstream(format!(
                "LLM API returned {}: {}",
                status.as_u16(),
                text
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse LLM response");
            ApiError::upstream(format!("Invalid LLM response: {}", e))
        })?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    /// Extract structured enquiry fields from raw text.
    #[instrument(skip(self, raw_content), fields(content_len = raw_content.len()))]
    pub async fn parse_enquiry(
        &self,
        raw_content: &str,
        request_id: Option<&str>,
    ) -> Result<ParsedEnquiry, ApiError> {
        let content = self
            .complete(llm::SYSTEM_PROMPT, &llm::user_prompt(raw_content), request_id)
            .await?;

        let parsed = llm::parse_llm_content(&content, raw_content).map_err(|e| {
            error!(error = %e, "Could not interpret LLM output");
            ApiError::upstream(e.to_string())
        })?;

        info!(
            client_name = %parsed.client_name,
            deliverables = parsed.deliverables.len(),
            reference_links = parsed.reference_links.len(),
            "Enquiry parsed"
        );

        Ok(parsed)
    }

    /// Check whether the model server answers.
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/models", self.base_url);

        self.client
            .get(&url)
            .timeout(Duration::from_secs(3))
            .send()
            .await
            .context("LLM health check failed")?
            .error_for_status()
            .context("LLM service unhealthy")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_chat_completions_shape() {
        let body = ChatRequest {
            model: "qwen",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: TEMPERATURE,
            max_tokens: 700,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "qwen");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 700);
        assert!((json["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn response_without_choices_is_empty() {
        let resp: ChatResponse = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert!(resp.choices.is_empty());

        let resp: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"role": "assistant", "content": "{}"}}]}"#)
                .unwrap();
        assert_eq!(resp.choices[0].message.content.as_deref(), Some("{}"));
    }

    #[test]
    fn base_url_is_normalized() {
        let client = LlmClient::new("http://localhost:1234/v1/", "m", None, 5, 700).unwrap();
        assert_eq!(client.base_url, "http://localhost:1234/v1");
    }
}
