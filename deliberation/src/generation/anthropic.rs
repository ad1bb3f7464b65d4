//! Anthropic Messages API adapter.

use std::time::Duration;

use async_trait::async_trait;

use super::{GenerationError, GenerationRequest, GenerationResponse, TextGenerator, TokenUsage};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// Messages API adapter.
pub struct AnthropicMessages {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicMessages {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl TextGenerator for AnthropicMessages {
    fn provider(&self) -> &str {
        "anthropic"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let request_body = serde_json::json!({
            "model": model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "system": request.system_prompt,
            "messages": [{
                "role": "user",
                "content": request.user_prompt
            }]
        });

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(Duration::from_secs(120))
                } else {
                    GenerationError::Service(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Service(format!(
                "Anthropic API error ({}): {}",
                status, body
            )));
        }

        let resp_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;

        parse_messages_body(resp_json)
    }
}

pub(crate) fn parse_messages_body(
    resp_json: serde_json::Value,
) -> Result<GenerationResponse, GenerationError> {
    // Concatenate every text block; tool-use blocks are ignored.
    let content: String = resp_json["content"]
        .as_array()
        .ok_or_else(|| GenerationError::Parse("missing content array".to_string()))?
        .iter()
        .filter_map(|block| block["text"].as_str())
        .collect::<Vec<_>>()
        .join("");

    let usage = &resp_json["usage"];
    let prompt = usage["input_tokens"].as_u64().unwrap_or(0) as u32;
    let completion = usage["output_tokens"].as_u64().unwrap_or(0) as u32;

    Ok(GenerationResponse {
        content,
        token_usage: TokenUsage::new(prompt, completion),
        raw_response: resp_json,
    })
}
