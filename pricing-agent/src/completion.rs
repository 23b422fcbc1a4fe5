use std::time;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::CompletionError;

/// Completion length cap; we only ever want a number back.
pub const MAX_OUTPUT_TOKENS: u32 = 10;
pub const MAX_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// A general-purpose chat model answering a single turn.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, CompletionError>;
}

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiChat {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: time::Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionModel for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, CompletionError> {
        let body = ChatRequestBody {
            model: &self.model,
            messages,
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: MAX_TEMPERATURE,
        };

        let response = self
            .client
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("completion request got non-200 from openai: {}", status);
            return Err(CompletionError::StatusError { status, body });
        }

        let parsed: ChatResponseBody = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::MissingChoice)?;

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            usage: parsed.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn chat(server: &MockServer) -> OpenAiChat {
        OpenAiChat::new(
            &server.base_url(),
            "sk-test",
            "gpt-4o-mini",
            time::Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_complete_sends_fixed_sampling_settings() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .json_body(json!({
                        "model": "gpt-4o-mini",
                        "messages": [
                            {"role": "system", "content": "Respond with ONLY a number."},
                            {"role": "user", "content": "Estimate the price for this product:\nUSB cable"},
                            {"role": "assistant", "content": "Price is $"}
                        ],
                        "max_tokens": 10,
                        "temperature": 0.3
                    }));
                then.status(200).json_body(json!({
                    "id": "chatcmpl-1",
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "9.99"}, "finish_reason": "stop"}],
                    "usage": {"prompt_tokens": 30, "completion_tokens": 2, "total_tokens": 32}
                }));
            })
            .await;

        let completion = chat(&server)
            .complete(&[
                ChatMessage::system("Respond with ONLY a number."),
                ChatMessage::user("Estimate the price for this product:\nUSB cable"),
                ChatMessage::assistant("Price is $"),
            ])
            .await
            .unwrap();

        assert_eq!(completion.text, "9.99");
        assert_eq!(completion.usage.map(|u| u.total_tokens), Some(32));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_null_content_is_empty_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200)
                    .json_body(json!({"choices": [{"message": {"role": "assistant", "content": null}}]}));
            })
            .await;

        let completion = chat(&server)
            .complete(&[ChatMessage::user("anything")])
            .await
            .unwrap();

        assert_eq!(completion.text, "");
        assert_eq!(completion.usage, None);
    }

    #[tokio::test]
    async fn test_errors_are_surfaced() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        assert!(matches!(
            chat(&server).complete(&[ChatMessage::user("anything")]).await,
            Err(CompletionError::StatusError { .. })
        ));
    }
}
