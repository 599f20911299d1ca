//! Agent gateway errors
//!
//! Only `Setup` is fatal, and only at startup. Every other variant is
//! turned into an inline assistant message by the turn that hit it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway could not be constructed from configuration
    #[error("{0}")]
    Setup(String),
    /// Transport failure: connect, timeout, truncated body
    #[error("{0}")]
    Network(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// 4xx other than auth and rate limiting
    #[error("request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("agent server error ({status}): {body}")]
    Server { status: u16, body: String },
    /// The agent answered with something that is not a chat completion
    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Inline text shown in place of the assistant's answer
    pub fn to_marker(&self) -> String {
        format!("⚠️ Error: {self}")
    }
}
