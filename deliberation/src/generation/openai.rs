//! OpenAI-compatible chat completions adapter.
//!
//! Works against api.openai.com and any server exposing the same
//! `/v1/chat/completions` shape (vLLM, llama.cpp, proxies).

use std::time::Duration;

use async_trait::async_trait;

use super::{GenerationError, GenerationRequest, GenerationResponse, TextGenerator, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completions adapter.
pub struct OpenAiCompatible {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatible {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, GenerationError> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatible {
    fn provider(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let request_body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt}
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
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
                "OpenAI API error ({}): {}",
                status, body
            )));
        }

        let resp_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;

        parse_chat_completion(resp_json)
    }
}

/// Extract content and usage from a chat-completions body.
pub(crate) fn parse_chat_completion(
    resp_json: serde_json::Value,
) -> Result<GenerationResponse, GenerationError> {
    let content = resp_json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| GenerationError::Parse("missing choices[0].message.content".to_string()))?
        .to_string();

    let usage = &resp_json["usage"];
    let prompt = usage["prompt_tokens"].as_u64().unwrap_or(0) as u32;
    let completion = usage["completion_tokens"].as_u64().unwrap_or(0) as u32;

    Ok(GenerationResponse {
        content,
        token_usage: TokenUsage::new(prompt, completion),
        raw_response: resp_json,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_completion() {
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"winner\": \"A\"}"}}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}
        });
        let resp = parse_chat_completion(body).unwrap();
        assert_eq!(resp.content, "{\"winner\": \"A\"}");
        assert_eq!(resp.token_usage.total, 150);
    }

    #[test]
    fn test_parse_chat_completion_missing_content() {
        let body = serde_json::json!({"choices": []});
        assert!(matches!(
            parse_chat_completion(body),
            Err(GenerationError::Parse(_))
        ));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let adapter = OpenAiCompatible::with_base_url("k", "m", "http://localhost:8000/v1/").unwrap();
        assert_eq!(adapter.endpoint(), "http://localhost:8000/v1/chat/completions");
    }
}
