use std::future::Future;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::config::CompletionSettings;
use crate::error::{ChatError, Result};

/// Anything that can turn a system message and a user message into a reply.
pub trait CompletionClient {
    fn complete(
        &self,
        system_message: &str,
        user_message: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

// Structures matching the OpenAI /chat/completions endpoint
#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize, Debug)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any OpenAI-compatible chat-completion API.
///
/// Does not derive Debug; the settings it holds carry the API key.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    settings: CompletionSettings,
}

impl OpenAiClient {
    pub fn new(settings: CompletionSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ChatError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, settings })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.api_base)
    }

    fn map_send_error(&self, e: reqwest::Error) -> ChatError {
        if e.is_timeout() {
            ChatError::Timeout(self.settings.timeout)
        } else {
            ChatError::Upstream(format!("failed to reach {}: {}", self.endpoint(), e))
        }
    }
}

impl CompletionClient for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.settings.model))]
    async fn complete(&self, system_message: &str, user_message: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage { role: "system", content: system_message },
                ChatMessage { role: "user", content: user_message },
            ],
        };
        debug!(
            system_len = system_message.len(),
            user_len = user_message.len(),
            "Sending chat completion request"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %error_body, "Chat completion request failed");
            return Err(ChatError::Upstream(format!(
                "API returned status {}: {}",
                status, error_body
            )));
        }

        let parsed = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChatError::Timeout(self.settings.timeout)
                } else {
                    ChatError::Upstream(format!("failed to parse completion response: {}", e))
                }
            })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Upstream("completion response contained no choices".to_string()))?;
        let reply = choice.message.content.unwrap_or_default().trim().to_string();

        debug!(reply_len = reply.len(), "Received chat completion");
        Ok(reply)
    }
}
