//! Runtime driving a conversation session
//!
//! One long-lived controller task owns the `SessionState`. Callers talk to
//! it through a cloneable `SessionHandle`; rendering surfaces subscribe to
//! its broadcast of `SessionEvent`s.

mod executor;
mod turn;

#[cfg(test)]
pub mod testing;

pub use executor::SessionController;

use crate::chart::ChartSpec;
use crate::session::{Message, SessionError, TurnPhase};
use tokio::sync::{broadcast, mpsc, oneshot};

/// Events sent to rendering surfaces
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChange {
        phase: TurnPhase,
    },
    /// Cumulative text released so far in the current turn
    Fragment {
        text: String,
    },
    /// The assistant message just appended, with its chart if one was derived
    Finalized {
        message: Message,
        chart: Option<ChartSpec>,
        cancelled: bool,
    },
    /// Non-fatal problem the user should see
    Warning {
        message: String,
    },
    Reset {
        greeting: Message,
    },
}

/// Requests handled by the controller loop
#[derive(Debug)]
pub(crate) enum Command {
    Submit {
        text: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Cancel {
        reply: oneshot::Sender<Result<bool, SessionError>>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Messages {
        reply: oneshot::Sender<Vec<Message>>,
    },
    #[cfg(test)]
    Phase {
        reply: oneshot::Sender<TurnPhase>,
    },
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<Command>,
    broadcast_tx: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub(crate) fn new(
        command_tx: mpsc::Sender<Command>,
        broadcast_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            command_tx,
            broadcast_tx,
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(make(reply))
            .await
            .map_err(|_| SessionError::ControllerStopped)?;
        rx.await.map_err(|_| SessionError::ControllerStopped)
    }

    /// Record the user's message and start a turn for it
    pub async fn submit_user_input(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let text = text.into();
        self.request(|reply| Command::Submit { text, reply }).await?
    }

    /// Ask the running turn to stop. `Ok(false)` means it was already stopping.
    pub async fn request_cancel(&self) -> Result<bool, SessionError> {
        self.request(|reply| Command::Cancel { reply }).await?
    }

    /// Clear the conversation back to the greeting, discarding any turn in flight
    pub async fn reset_conversation(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Reset { reply }).await
    }

    /// Snapshot of the transcript
    pub async fn messages(&self) -> Result<Vec<Message>, SessionError> {
        self.request(|reply| Command::Messages { reply }).await
    }

    #[cfg(test)]
    pub async fn phase(&self) -> Result<TurnPhase, SessionError> {
        self.request(|reply| Command::Phase { reply }).await
    }

    /// Subscribe to session updates
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.broadcast_tx.subscribe()
    }
}
