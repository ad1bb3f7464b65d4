//! Scripted generator for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{GenerationError, GenerationRequest, GenerationResponse, TextGenerator, TokenUsage};

type Handler = dyn Fn(&GenerationRequest) -> Result<String, GenerationError> + Send + Sync;

/// A [`TextGenerator`] that replays canned responses.
///
/// Responses are consumed in order; once the script runs out the fallback is
/// returned (or `Unavailable` if there is none). A handler, when set, takes
/// precedence and answers every request.
pub struct ScriptedGenerator {
    provider: String,
    script: Mutex<VecDeque<Result<String, GenerationError>>>,
    fallback: Option<String>,
    handler: Option<Box<Handler>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            handler: None,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `content`.
    pub fn constant(provider: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(provider).with_fallback(content)
    }

    /// Always fail with a service error.
    pub fn failing(provider: impl Into<String>) -> Self {
        let provider = provider.into();
        let message = format!("{provider} is down");
        Self::new(provider).with_handler(move |_| Err(GenerationError::Service(message.clone())))
    }

    pub fn then(self, content: impl Into<String>) -> Self {
        self.push(Ok(content.into()));
        self
    }

    pub fn then_error(self, error: GenerationError) -> Self {
        self.push(Err(error));
        self
    }

    pub fn with_fallback(mut self, content: impl Into<String>) -> Self {
        self.fallback = Some(content.into());
        self
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&GenerationRequest) -> Result<String, GenerationError> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Sleep before answering. Pairs with paused Tokio time in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of requests received so far.
    pub fn calls(&self) -> usize {
        self.requests().len()
    }

    /// Snapshot of received requests, in arrival order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        match self.requests.lock() {
            Ok(r) => r.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn push(&self, entry: Result<String, GenerationError>) {
        match self.script.lock() {
            Ok(mut s) => s.push_back(entry),
            Err(poisoned) => poisoned.into_inner().push_back(entry),
        }
    }

    fn next_scripted(&self) -> Option<Result<String, GenerationError>> {
        match self.script.lock() {
            Ok(mut s) => s.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        match self.requests.lock() {
            Ok(mut r) => r.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let content = if let Some(ref handler) = self.handler {
            handler(request)?
        } else if let Some(entry) = self.next_scripted() {
            entry?
        } else if let Some(ref fallback) = self.fallback {
            fallback.clone()
        } else {
            return Err(GenerationError::Unavailable(format!(
                "{} script exhausted",
                self.provider
            )));
        };

        let prompt_tokens = ((request.system_prompt.len() + request.user_prompt.len()) / 4) as u32;
        let completion_tokens = (content.len() / 4).max(1) as u32;
        Ok(GenerationResponse::text(content)
            .with_usage(TokenUsage::new(prompt_tokens, completion_tokens)))
    }
}
