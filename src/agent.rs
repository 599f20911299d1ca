//! Agent gateway abstraction
//!
//! The agent is opaque: it receives the whole transcript and eventually
//! returns one final assistant message, or fails.

mod error;
mod openai;

pub use error::GatewayError;
pub use openai::OpenAiGateway;

use crate::session::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for agent backends
#[async_trait]
pub trait AgentGateway: Send + Sync {
    /// Send the full transcript and wait for the final answer
    async fn invoke(&self, messages: &[Message]) -> Result<Message, GatewayError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: AgentGateway + ?Sized> AgentGateway for Arc<T> {
    async fn invoke(&self, messages: &[Message]) -> Result<Message, GatewayError> {
        (**self).invoke(messages).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// Logging wrapper for agent gateways
pub struct LoggingGateway {
    inner: Arc<dyn AgentGateway>,
    model_id: String,
}

impl LoggingGateway {
    pub fn new(inner: Arc<dyn AgentGateway>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl AgentGateway for LoggingGateway {
    async fn invoke(&self, messages: &[Message]) -> Result<Message, GatewayError> {
        let start = std::time::Instant::now();
        let result = self.inner.invoke(messages).await;
        let duration = start.elapsed();

        match &result {
            Ok(answer) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    history = messages.len(),
                    answer_chars = answer.content.chars().count(),
                    "Agent call completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e,
                    "Agent call failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
