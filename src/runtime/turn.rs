//! The body of a single turn
//!
//! Runs detached from the session state: everything it needs is in the
//! `TurnTicket`, and everything it produces is reported back to the caller.

use crate::agent::AgentGateway;
use crate::chart::{visualize, Visualization};
use crate::emitter::StreamEmitter;
use crate::session::{Message, TurnTicket};

/// Progress reported while a turn runs
#[derive(Debug, Clone, Copy)]
pub enum TurnProgress<'a> {
    /// Cumulative released text
    Fragment(&'a str),
    /// Every word was released; extraction is next
    Emitted,
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed {
        /// The agent's answer, verbatim
        answer: String,
        visualization: Visualization,
    },
    Cancelled {
        /// Released prefix plus the stop annotation
        text: String,
    },
    Failed {
        /// Inline error marker
        text: String,
    },
}

impl TurnOutcome {
    /// Assistant message to append to the transcript
    pub fn message(&self) -> Message {
        match self {
            TurnOutcome::Completed { answer, .. } => Message::assistant(answer.clone()),
            TurnOutcome::Cancelled { text } | TurnOutcome::Failed { text } => {
                Message::assistant(text.clone())
            }
        }
    }

    pub fn visualization(&self) -> Option<&Visualization> {
        match self {
            TurnOutcome::Completed { visualization, .. } => Some(visualization),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TurnOutcome::Cancelled { .. })
    }
}

/// Call the agent, replay its answer, then try to chart it.
///
/// Cancellation is observed only between released words: a request made
/// while the agent is still working takes effect on the first word.
/// Agent failures become an inline error message; they are never returned.
pub async fn run_turn<G, F>(
    ticket: &TurnTicket,
    gateway: &G,
    emitter: &StreamEmitter,
    mut on_progress: F,
) -> TurnOutcome
where
    G: AgentGateway + ?Sized,
    F: FnMut(TurnProgress<'_>) + Send,
{
    let answer = match gateway.invoke(&ticket.messages).await {
        Ok(message) => message.content,
        Err(e) => {
            tracing::warn!(epoch = ticket.epoch, error = %e, "Agent call failed, recording inline error");
            return TurnOutcome::Failed {
                text: e.to_marker(),
            };
        }
    };

    let emission = emitter
        .emit(
            &answer,
            || ticket.is_cancelled(),
            |fragment| on_progress(TurnProgress::Fragment(fragment)),
        )
        .await;

    if emission.cancelled {
        tracing::info!(
            epoch = ticket.epoch,
            released = emission.released,
            total = emission.total,
            "Turn cancelled"
        );
        return TurnOutcome::Cancelled {
            text: emission.text,
        };
    }

    on_progress(TurnProgress::Emitted);
    tracing::debug!(epoch = ticket.epoch, tokens = emission.total, "Answer fully released");
    let visualization = visualize(&answer);
    if let Visualization::NoTable(reason) = &visualization {
        tracing::debug!(epoch = ticket.epoch, %reason, "No chart for answer");
    }

    TurnOutcome::Completed {
        answer,
        visualization,
    }
}
