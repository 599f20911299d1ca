//! Session state and its transitions
//!
//! `SessionState` is the single owner of the transcript and the turn
//! flags. Every mutation goes through one of the transition methods
//! below; nothing else holds a mutable reference to it.

use super::message::{Message, MessageStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Where the current turn is
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// Ready for user input
    #[default]
    Idle,
    /// Waiting on the agent or streaming its answer
    Generating,
    /// User asked to stop, waiting for the turn task to notice
    Cancelling,
    /// Answer fully released, extraction and append pending
    Finalizing,
}

impl TurnPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnPhase::Idle => "idle",
            TurnPhase::Generating => "generating",
            TurnPhase::Cancelling => "cancelling",
            TurnPhase::Finalizing => "finalizing",
        }
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by session transitions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot {operation} while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: TurnPhase,
    },
    #[error("turn from epoch {turn_epoch} is stale (current epoch {current_epoch})")]
    StaleTurn { turn_epoch: u64, current_epoch: u64 },
    #[error("session controller has stopped")]
    ControllerStopped,
}

/// Everything a turn task needs, detached from the state that issued it
#[derive(Debug, Clone)]
pub struct TurnTicket {
    /// Reset cycle this turn belongs to
    pub epoch: u64,
    /// Transcript snapshot sent to the agent
    pub messages: Vec<Message>,
    /// Signalled by `request_cancel` and `reset_conversation`
    pub cancel: CancellationToken,
}

impl TurnTicket {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug)]
pub struct SessionState {
    messages: MessageStore,
    phase: TurnPhase,
    epoch: u64,
    greeting: String,
    /// Token of the turn task currently outstanding, if any
    in_flight: Option<CancellationToken>,
}

impl SessionState {
    pub fn new(greeting: impl Into<String>) -> Self {
        let greeting = greeting.into();
        Self {
            messages: MessageStore::with_greeting(greeting.clone()),
            phase: TurnPhase::Idle,
            epoch: 0,
            greeting,
            in_flight: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        self.messages.as_slice()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn generating(&self) -> bool {
        self.phase == TurnPhase::Generating
    }

    pub fn cancel_requested(&self) -> bool {
        self.phase == TurnPhase::Cancelling
    }

    pub fn has_turn_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Idle -> Generating, recording the user's message
    pub fn submit_user_input(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        if self.phase != TurnPhase::Idle {
            return Err(SessionError::InvalidState {
                operation: "submit input",
                phase: self.phase,
            });
        }
        self.messages.append(Message::user(text));
        self.phase = TurnPhase::Generating;
        Ok(())
    }

    /// Hand out the ticket for the turn that `submit_user_input` started.
    ///
    /// Only one ticket is outstanding at a time.
    pub fn begin_turn(&mut self) -> Result<TurnTicket, SessionError> {
        let startable = matches!(self.phase, TurnPhase::Generating | TurnPhase::Cancelling);
        if !startable || self.in_flight.is_some() {
            return Err(SessionError::InvalidState {
                operation: "begin a turn",
                phase: self.phase,
            });
        }

        let cancel = CancellationToken::new();
        if self.phase == TurnPhase::Cancelling {
            cancel.cancel();
        }
        self.in_flight = Some(cancel.clone());

        Ok(TurnTicket {
            epoch: self.epoch,
            messages: self.messages.as_slice().to_vec(),
            cancel,
        })
    }

    /// Ask the running turn to stop.
    ///
    /// Returns `Ok(true)` when this call moved the turn into `Cancelling`,
    /// `Ok(false)` when the turn was already stopping or finishing.
    pub fn request_cancel(&mut self) -> Result<bool, SessionError> {
        match self.phase {
            TurnPhase::Idle => Err(SessionError::InvalidState {
                operation: "cancel",
                phase: self.phase,
            }),
            TurnPhase::Generating => {
                self.phase = TurnPhase::Cancelling;
                if let Some(token) = &self.in_flight {
                    token.cancel();
                }
                Ok(true)
            }
            TurnPhase::Cancelling | TurnPhase::Finalizing => Ok(false),
        }
    }

    /// Generating -> Finalizing once every word has been released.
    ///
    /// Returns false for stale epochs or when the turn is being cancelled.
    pub fn mark_finalizing(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.phase != TurnPhase::Generating {
            return false;
        }
        self.phase = TurnPhase::Finalizing;
        true
    }

    /// Append the assistant's finalized message and return to Idle.
    ///
    /// A turn issued before the last reset is rejected and its message is
    /// never appended.
    pub fn finish_turn(&mut self, epoch: u64, message: Message) -> Result<&Message, SessionError> {
        if epoch != self.epoch || self.in_flight.is_none() {
            return Err(SessionError::StaleTurn {
                turn_epoch: epoch,
                current_epoch: self.epoch,
            });
        }
        self.in_flight = None;
        self.phase = TurnPhase::Idle;
        Ok(self.messages.append(message))
    }

    /// Valid in any phase. Invalidates the outstanding turn, if any.
    pub fn reset_conversation(&mut self) -> &Message {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
        self.epoch += 1;
        self.phase = TurnPhase::Idle;
        self.messages.restart(self.greeting.clone());
        &self.messages.as_slice()[0]
    }
}
