//! `OpenAI`-compatible chat completions gateway

use super::{AgentGateway, GatewayError};
use crate::config::AgentConfig;
use crate::session::{Message, Role};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiGateway {
    client: Client,
    api_key: String,
    model: String,
    url: String,
    system_prompt: Option<String>,
}

impl OpenAiGateway {
    /// Build the gateway. Fails when the configuration cannot possibly work,
    /// which is fatal for the whole session.
    pub fn connect(config: &AgentConfig) -> Result<Self, GatewayError> {
        // A gateway may handle authentication itself
        let api_key = match (&config.api_key, &config.gateway) {
            (Some(key), _) => key.clone(),
            (None, Some(_)) => "implicit".to_string(),
            (None, None) => {
                return Err(GatewayError::Setup(
                    "No agent configured. Set OPENAI_API_KEY or LLM_GATEWAY.".to_string(),
                ))
            }
        };

        let url = match &config.gateway {
            Some(gw) => format!("{}/chat/completions", gw.trim_end_matches('/')),
            None => OPENAI_CHAT_URL.to_string(),
        };
        reqwest::Url::parse(&url)
            .map_err(|e| GatewayError::Setup(format!("Invalid gateway URL {url:?}: {e}")))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Setup(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            url,
            system_prompt: config.system_prompt.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn translate_request(&self, messages: &[Message]) -> ChatRequest {
        let system = self.system_prompt.iter().map(|prompt| ChatMessage {
            role: "system".to_string(),
            content: prompt.clone(),
        });
        let history = messages.iter().map(|m| ChatMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        });

        ChatRequest {
            model: self.model.clone(),
            messages: system.chain(history).collect(),
            stream: false,
        }
    }

    fn normalize_response(resp: ChatResponse) -> Result<Message, GatewayError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Protocol("no choices in response".to_string()))?;

        Ok(Message {
            role: Role::Assistant,
            content: choice.message.content.unwrap_or_default(),
        })
    }

    /// Map a non-success HTTP status to an error, keeping the body for the user
    fn classify_error(status: reqwest::StatusCode, body: &str) -> GatewayError {
        let body = body.to_string();
        match status.as_u16() {
            401 | 403 => GatewayError::Auth(body),
            429 => GatewayError::RateLimited(body),
            code @ 400..=499 => GatewayError::Rejected { status: code, body },
            code @ 500..=599 => GatewayError::Server { status: code, body },
            code => GatewayError::Protocol(format!("HTTP {code}: {body}")),
        }
    }
}

#[async_trait]
impl AgentGateway for OpenAiGateway {
    async fn invoke(&self, messages: &[Message]) -> Result<Message, GatewayError> {
        let request = self.translate_request(messages);

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    GatewayError::Network(format!("Connection failed: {e}"))
                } else {
                    GatewayError::Network(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::classify_error(status, &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            GatewayError::Protocol(format!("failed to parse response: {e} - body: {body}"))
        })?;

        Self::normalize_response(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Chat completions wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}
