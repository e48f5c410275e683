use crate::{ClientBuildError, USER_AGENT};
use async_trait::async_trait;
use lens_core::error::InferenceError;
use lens_core::inference::{AnalysisRequest, InferenceClient};
use lens_core::types::AnalysisResult;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4-turbo";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, ClientBuildError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.filter(|key| !key.is_empty()),
            model: config.model,
        })
    }
}

fn provider(message: impl Into<String>) -> InferenceError {
    InferenceError::Provider {
        message: message.into(),
    }
}

#[async_trait]
impl InferenceClient for OpenAiClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, InferenceError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(InferenceError::AuthMissing);
        };
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
        };
        debug!(%url, model = %self.model, prompt_len = request.prompt.len(), "requesting analysis");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| provider(err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| provider(err.to_string()))?;
        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => provider(body.error.message),
                Err(_) => provider(format!("inference provider returned status {status}")),
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|err| provider(format!("malformed inference response: {err}")))?;
        let Some(choice) = parsed.choices.into_iter().next() else {
            return Err(provider("inference response contained no choices"));
        };
        Ok(AnalysisResult {
            text: choice.message.content.unwrap_or_default(),
            truncated: choice.finish_reason.as_deref() == Some("length"),
        })
    }
}
