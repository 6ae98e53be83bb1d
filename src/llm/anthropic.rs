//! Anthropic Messages API provider

use super::{build_prompt, ContextUsed, LlmProvider, LlmResponse, PromptContext, Usage};
use crate::config::LlmConfig;
use crate::error::{ContextError, Result};
use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";
const SYSTEM_PROMPT: &str = "You are a senior software engineer answering questions about a codebase. \
    Ground your answer in the supplied project context and say when it is insufficient.";

pub struct AnthropicProvider {
    client: Client,
    api_key: SecretString,
    api_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    max_retries: u32,
    backoff: Duration,
}

impl AnthropicProvider {
    pub fn new(config: &LlmConfig, api_key: SecretString) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ContextError::llm(PROVIDER, e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries.max(1),
            backoff: Duration::from_millis(200),
        })
    }

    /// Base delay doubled on every retry
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn delay(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0..=self.backoff.as_millis() as u64 / 2);
        self.backoff * 2u32.saturating_pow(attempt - 1) + Duration::from_millis(jitter)
    }

    async fn send(&self, request: &MessagesRequest<'_>) -> std::result::Result<MessagesResponse, Attempt> {
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| Attempt::Retry(format!("network error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("HTTP {status}: {body}");
            return Err(if is_retryable(status) {
                Attempt::Retry(message)
            } else {
                Attempt::Fatal(message)
            });
        }

        response
            .json::<MessagesResponse>()
            .await
            .map_err(|e| Attempt::Fatal(format!("failed to parse response: {e}")))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

enum Attempt {
    Retry(String),
    Fatal(String),
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn ask_question(&self, question: &str, context: &PromptContext<'_>) -> Result<LlmResponse> {
        let prompt = build_prompt(question, context);
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: &prompt,
            }],
        };

        let mut last_error = String::new();
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = self.delay(attempt);
                debug!("Retry attempt {} in {:?}", attempt, delay);
                tokio::time::sleep(delay).await;
            }

            match self.send(&request).await {
                Ok(response) => {
                    let content = response
                        .content
                        .iter()
                        .filter_map(|block| block.text.as_deref())
                        .collect::<Vec<_>>()
                        .join("");
                    return Ok(LlmResponse {
                        content,
                        context_used: ContextUsed::from_context(context),
                        usage: response.usage,
                    });
                }
                Err(Attempt::Fatal(message)) => return Err(ContextError::llm(PROVIDER, message)),
                Err(Attempt::Retry(message)) => last_error = message,
            }
        }

        warn!("Anthropic request failed after {} attempts", self.max_retries);
        Err(ContextError::llm(PROVIDER, last_error))
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OptimizedContext;

    fn provider(url: String) -> AnthropicProvider {
        let config = LlmConfig {
            provider: "anthropic".to_string(),
            api_url: url,
            max_retries: 3,
            ..LlmConfig::default()
        };
        AnthropicProvider::new(&config, SecretString::new("test-key".to_string()))
            .unwrap()
            .with_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_successful_answer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", API_VERSION)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"content":[{"type":"text","text":"Login lives in "},{"type":"text","text":"auth.ts"}],
                    "usage":{"input_tokens":120,"output_tokens":8}}"#,
            )
            .create_async()
            .await;

        let context = OptimizedContext::empty("/work/app", "where is login");
        let response = provider(format!("{}/v1/messages", server.url()))
            .ask_question("where is login", &PromptContext::new(&context))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "Login lives in auth.ts");
        assert_eq!(
            response.usage,
            Some(Usage {
                input_tokens: 120,
                output_tokens: 8
            })
        );
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .with_body("overloaded")
            .expect(3)
            .create_async()
            .await;

        let context = OptimizedContext::empty("/work/app", "q");
        let err = provider(format!("{}/v1/messages", server.url()))
            .ask_question("q", &PromptContext::new(&context))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(401)
            .with_body("invalid x-api-key")
            .expect(1)
            .create_async()
            .await;

        let context = OptimizedContext::empty("/work/app", "q");
        let result = provider(format!("{}/v1/messages", server.url()))
            .ask_question("q", &PromptContext::new(&context))
            .await;

        mock.assert_async().await;
        assert!(matches!(result, Err(ContextError::Llm { .. })));
    }
}
