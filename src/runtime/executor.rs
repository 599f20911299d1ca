//! Session controller event loop

use super::turn::{run_turn, TurnOutcome, TurnProgress};
use super::{Command, SessionEvent, SessionHandle};

use crate::agent::AgentGateway;
use crate::chart::Visualization;
use crate::config::SessionConfig;
use crate::emitter::StreamEmitter;
use crate::session::{SessionError, SessionState, TurnTicket};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

const COMMAND_BUFFER: usize = 32;
const BROADCAST_BUFFER: usize = 256;

/// Reports from a turn task, tagged with the epoch of its ticket
#[derive(Debug)]
enum TurnEvent {
    Fragment { epoch: u64, text: String },
    Emitted { epoch: u64 },
    Finished { epoch: u64, outcome: TurnOutcome },
}

impl TurnEvent {
    fn epoch(&self) -> u64 {
        match self {
            TurnEvent::Fragment { epoch, .. }
            | TurnEvent::Emitted { epoch }
            | TurnEvent::Finished { epoch, .. } => *epoch,
        }
    }
}

/// Owns the session state and serializes every change to it
pub struct SessionController<G>
where
    G: AgentGateway + 'static,
{
    session_id: Uuid,
    state: SessionState,
    gateway: Arc<G>,
    emitter: StreamEmitter,
    command_rx: mpsc::Receiver<Command>,
    turn_tx: mpsc::UnboundedSender<TurnEvent>,
    turn_rx: mpsc::UnboundedReceiver<TurnEvent>,
    broadcast_tx: broadcast::Sender<SessionEvent>,
}

impl<G> SessionController<G>
where
    G: AgentGateway + 'static,
{
    /// Start a controller task and return the handle to drive it.
    ///
    /// The task stops once every handle has been dropped.
    pub fn spawn(config: &SessionConfig, gateway: G) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_BUFFER);
        let (turn_tx, turn_rx) = mpsc::unbounded_channel();

        let controller = Self {
            session_id: Uuid::new_v4(),
            state: SessionState::new(config.greeting.clone()),
            gateway: Arc::new(gateway),
            emitter: StreamEmitter::new(config.pacing),
            command_rx,
            turn_tx,
            turn_rx,
            broadcast_tx: broadcast_tx.clone(),
        };
        tokio::spawn(controller.run());

        SessionHandle::new(command_tx, broadcast_tx)
    }

    async fn run(mut self) {
        tracing::info!(
            session_id = %self.session_id,
            model = %self.gateway.model_id(),
            pacing_ms = %self.emitter.pacing().as_millis(),
            "Starting session controller"
        );

        loop {
            tokio::select! {
                Some(event) = self.turn_rx.recv() => self.handle_turn_event(event),
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }

        // Nobody is left to observe the turn
        let _ = self.state.reset_conversation();
        tracing::info!(session_id = %self.session_id, "Session controller stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit { text, reply } => {
                let _ = reply.send(self.submit(text));
            }
            Command::Cancel { reply } => {
                let result = self.state.request_cancel();
                if let Ok(true) = result {
                    tracing::info!(
                        session_id = %self.session_id,
                        epoch = self.state.epoch(),
                        "Cancellation requested"
                    );
                    self.notify_phase();
                }
                let _ = reply.send(result);
            }
            Command::Reset { reply } => {
                let discarded = self.state.has_turn_in_flight();
                let greeting = self.state.reset_conversation().clone();
                tracing::info!(
                    session_id = %self.session_id,
                    epoch = self.state.epoch(),
                    discarded_turn = discarded,
                    "Conversation reset"
                );
                let _ = self.broadcast_tx.send(SessionEvent::Reset { greeting });
                self.notify_phase();
                let _ = reply.send(());
            }
            Command::Messages { reply } => {
                let _ = reply.send(self.state.messages().to_vec());
            }
            #[cfg(test)]
            Command::Phase { reply } => {
                let _ = reply.send(self.state.phase());
            }
        }
    }

    fn submit(&mut self, text: String) -> Result<(), SessionError> {
        self.state.submit_user_input(text)?;
        let ticket = self.state.begin_turn()?;
        tracing::info!(
            session_id = %self.session_id,
            epoch = ticket.epoch,
            history = ticket.messages.len(),
            "Starting turn"
        );
        self.notify_phase();
        self.spawn_turn(ticket);
        Ok(())
    }

    fn spawn_turn(&self, ticket: TurnTicket) {
        let gateway = Arc::clone(&self.gateway);
        let emitter = self.emitter;
        let turn_tx = self.turn_tx.clone();
        let epoch = ticket.epoch;

        let progress_tx = turn_tx.clone();
        let task = tokio::spawn(async move {
            run_turn(&ticket, gateway.as_ref(), &emitter, |progress| {
                let event = match progress {
                    TurnProgress::Fragment(text) => TurnEvent::Fragment {
                        epoch,
                        text: text.to_string(),
                    },
                    TurnProgress::Emitted => TurnEvent::Emitted { epoch },
                };
                let _ = progress_tx.send(event);
            })
            .await
        });

        // A panicking turn still has to hand the session back to Idle
        tokio::spawn(async move {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(epoch, error = %e, "Turn task failed");
                    TurnOutcome::Failed {
                        text: format!("⚠️ Error: {e}"),
                    }
                }
            };
            let _ = turn_tx.send(TurnEvent::Finished { epoch, outcome });
        });
    }

    fn handle_turn_event(&mut self, event: TurnEvent) {
        if event.epoch() != self.state.epoch() {
            tracing::debug!(
                session_id = %self.session_id,
                turn_epoch = event.epoch(),
                current_epoch = self.state.epoch(),
                "Dropping event from stale turn"
            );
            return;
        }

        match event {
            TurnEvent::Fragment { text, .. } => {
                let _ = self.broadcast_tx.send(SessionEvent::Fragment { text });
            }
            TurnEvent::Emitted { epoch } => {
                if self.state.mark_finalizing(epoch) {
                    self.notify_phase();
                }
            }
            TurnEvent::Finished { epoch, outcome } => self.finish(epoch, outcome),
        }
    }

    fn finish(&mut self, epoch: u64, outcome: TurnOutcome) {
        let message = match self.state.finish_turn(epoch, outcome.message()) {
            Ok(message) => message.clone(),
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "Discarding turn result");
                return;
            }
        };

        let cancelled = outcome.is_cancelled();
        let visualization = outcome.visualization();
        if let Some(warning) = visualization.and_then(Visualization::warning) {
            tracing::warn!(session_id = %self.session_id, epoch, %warning, "Chart not rendered");
            let _ = self
                .broadcast_tx
                .send(SessionEvent::Warning { message: warning });
        }
        let chart = visualization.and_then(Visualization::chart).cloned();

        tracing::info!(
            session_id = %self.session_id,
            epoch,
            cancelled,
            chart = chart.is_some(),
            "Turn finished"
        );
        let _ = self.broadcast_tx.send(SessionEvent::Finalized {
            message,
            chart,
            cancelled,
        });
        self.notify_phase();
    }

    fn notify_phase(&self) {
        tracing::debug!(
            session_id = %self.session_id,
            phase = %self.state.phase(),
            generating = self.state.generating(),
            cancel_requested = self.state.cancel_requested(),
            "Phase changed"
        );
        let _ = self.broadcast_tx.send(SessionEvent::StateChange {
            phase: self.state.phase(),
        });
    }
}
