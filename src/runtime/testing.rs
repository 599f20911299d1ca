//! Mock gateways for testing
//!
//! These mocks let the controller run end to end without network I/O.

use crate::agent::{AgentGateway, GatewayError};
use crate::session::{Message, Role};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Semaphore};

use super::SessionEvent;

// ============================================================================
// Mock Gateway
// ============================================================================

/// Gateway that returns queued answers in order
pub struct MockGateway {
    responses: Mutex<VecDeque<Result<Message, GatewayError>>>,
    /// Record of every transcript sent
    pub requests: Mutex<Vec<Vec<Message>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_answer(&self, content: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(Message::assistant(content)));
    }

    pub fn queue_error(&self, error: GatewayError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentGateway for MockGateway {
    async fn invoke(&self, messages: &[Message]) -> Result<Message, GatewayError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Network("No mock answer queued".to_string())))
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Gated Gateway (for cancellation and reset testing)
// ============================================================================

/// Gateway that holds every call until the test releases it, then echoes
/// the last user message as `Echo: {text}`
pub struct GatedGateway {
    gate: Arc<Semaphore>,
    started_tx: mpsc::UnboundedSender<String>,
}

/// Test side of a `GatedGateway`
pub struct GateControl {
    gate: Arc<Semaphore>,
    started_rx: mpsc::UnboundedReceiver<String>,
}

impl GatedGateway {
    pub fn new() -> (Self, GateControl) {
        let gate = Arc::new(Semaphore::new(0));
        let (started_tx, started_rx) = mpsc::unbounded_channel();
        (
            Self {
                gate: Arc::clone(&gate),
                started_tx,
            },
            GateControl { gate, started_rx },
        )
    }
}

impl GateControl {
    /// Wait until a call reaches the gateway; returns the user text it carries
    pub async fn wait_started(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(2), self.started_rx.recv())
            .await
            .expect("gateway was never called")
            .expect("gateway dropped")
    }

    /// Let one waiting call through
    pub fn release_one(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl AgentGateway for GatedGateway {
    async fn invoke(&self, messages: &[Message]) -> Result<Message, GatewayError> {
        let question = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let _ = self.started_tx.send(question.clone());

        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| GatewayError::Network("gate closed".to_string()))?;
        permit.forget();

        Ok(Message::assistant(format!("Echo: {question}")))
    }

    fn model_id(&self) -> &str {
        "gated"
    }
}

// ============================================================================
// Panicking Gateway
// ============================================================================

/// Gateway whose every call panics
pub struct PanickingGateway;

#[async_trait]
impl AgentGateway for PanickingGateway {
    async fn invoke(&self, _messages: &[Message]) -> Result<Message, GatewayError> {
        panic!("gateway blew up");
    }

    fn model_id(&self) -> &str {
        "panicking"
    }
}

/// Receive events until `pick` returns something, failing after two seconds
pub async fn wait_for<T>(
    rx: &mut broadcast::Receiver<SessionEvent>,
    mut pick: impl FnMut(&SessionEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.expect("session event channel closed");
            if let Some(found) = pick(&event) {
                return found;
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{ChartPoint, ChartSpec};
    use crate::config::SessionConfig;
    use crate::runtime::{SessionController, SessionHandle};
    use crate::session::{SessionError, TurnPhase};

    const GREETING: &str = "hello";

    fn config() -> SessionConfig {
        SessionConfig {
            pacing: Duration::ZERO,
            greeting: GREETING.to_string(),
        }
    }

    /// (message, chart, cancelled) of the next finalized turn
    async fn next_finalized(
        rx: &mut broadcast::Receiver<SessionEvent>,
    ) -> (Message, Option<ChartSpec>, bool) {
        wait_for(rx, |event| match event {
            SessionEvent::Finalized {
                message,
                chart,
                cancelled,
            } => Some((message.clone(), chart.clone(), *cancelled)),
            _ => None,
        })
        .await
    }

    async fn gated_session() -> (SessionHandle, GateControl) {
        let (gateway, control) = GatedGateway::new();
        (SessionController::spawn(&config(), gateway), control)
    }

    #[tokio::test]
    async fn test_mock_gateway() {
        let mock = MockGateway::new();
        mock.queue_answer("Hello");

        let answer = mock.invoke(&[Message::user("Hi")]).await.unwrap();
        assert_eq!(answer, Message::assistant("Hello"));

        // Nothing left in the queue
        assert!(mock.invoke(&[]).await.is_err());
        assert_eq!(mock.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_sales_table_produces_chart() {
        let answer = "Here are the numbers:\n\n| Region | Sales |\n|---|---|\n| North | 1,200 |\n| South | 950 |";
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_answer(answer);

        let handle = SessionController::spawn(&config(), Arc::clone(&gateway));
        let mut rx = handle.subscribe();
        handle.submit_user_input("show sales").await.unwrap();

        let (message, chart, cancelled) = next_finalized(&mut rx).await;
        assert!(!cancelled);
        assert_eq!(message, Message::assistant(answer));
        assert_eq!(
            chart,
            Some(ChartSpec {
                category_field: "Region".to_string(),
                value_field: "Sales".to_string(),
                points: vec![
                    ChartPoint::new("North", 1200.0),
                    ChartPoint::new("South", 950.0),
                ],
            })
        );

        assert_eq!(
            handle.messages().await.unwrap(),
            vec![
                Message::assistant(GREETING),
                Message::user("show sales"),
                Message::assistant(answer),
            ]
        );
        assert_eq!(handle.phase().await.unwrap(), TurnPhase::Idle);
        assert_eq!(gateway.recorded_requests()[0].len(), 2);
    }

    #[tokio::test]
    async fn test_phases_and_cumulative_fragments() {
        let gateway = MockGateway::new();
        gateway.queue_answer("one  two\nthree");

        let handle = SessionController::spawn(&config(), gateway);
        let mut rx = handle.subscribe();
        handle.submit_user_input("count").await.unwrap();

        let mut fragments = Vec::new();
        let mut phases = Vec::new();
        wait_for(&mut rx, |event| match event {
            SessionEvent::Fragment { text } => {
                fragments.push(text.clone());
                None
            }
            SessionEvent::StateChange { phase } => {
                phases.push(*phase);
                (*phase == TurnPhase::Idle).then_some(())
            }
            _ => None,
        })
        .await;

        assert_eq!(fragments, vec!["one", "one two", "one two three"]);
        assert_eq!(
            phases,
            vec![TurnPhase::Generating, TurnPhase::Finalizing, TurnPhase::Idle]
        );
    }

    #[tokio::test]
    async fn test_gateway_failure_is_inline_and_recoverable() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_error(GatewayError::Network("connection refused".to_string()));
        gateway.queue_answer("back online");

        let handle = SessionController::spawn(&config(), Arc::clone(&gateway));
        let mut rx = handle.subscribe();

        handle.submit_user_input("first").await.unwrap();
        let (message, chart, cancelled) = next_finalized(&mut rx).await;
        assert_eq!(message.content, "⚠️ Error: connection refused");
        assert!(chart.is_none());
        assert!(!cancelled);
        assert_eq!(handle.phase().await.unwrap(), TurnPhase::Idle);

        handle.submit_user_input("second").await.unwrap();
        let (message, _, _) = next_finalized(&mut rx).await;
        assert_eq!(message.content, "back online");
        assert_eq!(handle.messages().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_table_without_numbers_has_no_chart() {
        let gateway = MockGateway::new();
        gateway.queue_answer("| Name | Role |\n| Ada | Engineer |");

        let handle = SessionController::spawn(&config(), gateway);
        let mut rx = handle.subscribe();
        handle.submit_user_input("team").await.unwrap();

        let (_, chart, _) = next_finalized(&mut rx).await;
        assert!(chart.is_none());
    }

    #[tokio::test]
    async fn test_submit_while_generating_is_rejected() {
        let (handle, mut control) = gated_session().await;
        let mut rx = handle.subscribe();

        handle.submit_user_input("q1").await.unwrap();
        assert_eq!(control.wait_started().await, "q1");

        assert_eq!(
            handle.submit_user_input("q2").await,
            Err(SessionError::InvalidState {
                operation: "submit input",
                phase: TurnPhase::Generating,
            })
        );

        control.release_one();
        let (message, _, _) = next_finalized(&mut rx).await;
        assert_eq!(message.content, "Echo: q1");
        assert_eq!(handle.messages().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_cancel_during_gateway_call_stops_at_first_word() {
        let (handle, mut control) = gated_session().await;
        let mut rx = handle.subscribe();

        handle.submit_user_input("a").await.unwrap();
        control.wait_started().await;
        assert_eq!(handle.request_cancel().await, Ok(true));
        assert_eq!(handle.phase().await.unwrap(), TurnPhase::Cancelling);

        control.release_one();
        let (message, chart, cancelled) = next_finalized(&mut rx).await;
        assert!(cancelled);
        assert!(chart.is_none());
        assert_eq!(
            message.content,
            "\n\n*[Generation stopped by user after 1/2 words]*"
        );
        assert_eq!(handle.phase().await.unwrap(), TurnPhase::Idle);
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_keeps_released_prefix() {
        let gateway = MockGateway::new();
        gateway.queue_answer("w1 w2 w3 w4 w5 w6 w7 w8 w9 w10");
        let config = SessionConfig {
            pacing: Duration::from_millis(20),
            ..config()
        };

        let handle = SessionController::spawn(&config, gateway);
        let mut rx = handle.subscribe();
        handle.submit_user_input("count").await.unwrap();

        wait_for(&mut rx, |event| {
            matches!(event, SessionEvent::Fragment { .. }).then_some(())
        })
        .await;
        assert_eq!(handle.request_cancel().await, Ok(true));

        let (message, chart, cancelled) = next_finalized(&mut rx).await;
        assert!(cancelled);
        assert!(chart.is_none());
        assert!(message.content.starts_with("w1"));
        assert!(message
            .content
            .contains("\n\n*[Generation stopped by user after "));
        assert!(message.content.ends_with("/10 words]*"));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (handle, mut control) = gated_session().await;
        let mut rx = handle.subscribe();

        handle.submit_user_input("a").await.unwrap();
        control.wait_started().await;
        assert_eq!(handle.request_cancel().await, Ok(true));
        assert_eq!(handle.request_cancel().await, Ok(false));

        control.release_one();
        let (_, _, cancelled) = next_finalized(&mut rx).await;
        assert!(cancelled);
        assert_eq!(handle.messages().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_rejected() {
        let handle = SessionController::spawn(&config(), MockGateway::new());
        assert_eq!(
            handle.request_cancel().await,
            Err(SessionError::InvalidState {
                operation: "cancel",
                phase: TurnPhase::Idle,
            })
        );
    }

    #[tokio::test]
    async fn test_reset_discards_in_flight_turn() {
        let (handle, mut control) = gated_session().await;
        let mut rx = handle.subscribe();

        handle.submit_user_input("q1").await.unwrap();
        assert_eq!(control.wait_started().await, "q1");

        handle.reset_conversation().await.unwrap();
        assert_eq!(
            handle.messages().await.unwrap(),
            vec![Message::assistant(GREETING)]
        );
        assert_eq!(handle.phase().await.unwrap(), TurnPhase::Idle);

        handle.submit_user_input("q2").await.unwrap();
        assert_eq!(control.wait_started().await, "q2");

        // Let both calls complete; only the current one may land
        control.release_one();
        control.release_one();
        let (message, _, _) = next_finalized(&mut rx).await;
        assert_eq!(message.content, "Echo: q2");

        assert_eq!(
            handle.messages().await.unwrap(),
            vec![
                Message::assistant(GREETING),
                Message::user("q2"),
                Message::assistant("Echo: q2"),
            ]
        );
    }

    #[tokio::test]
    async fn test_reset_after_turn_restores_greeting() {
        let gateway = MockGateway::new();
        gateway.queue_answer("done");

        let handle = SessionController::spawn(&config(), gateway);
        let mut rx = handle.subscribe();
        handle.submit_user_input("go").await.unwrap();
        next_finalized(&mut rx).await;

        handle.reset_conversation().await.unwrap();
        let greeting = wait_for(&mut rx, |event| match event {
            SessionEvent::Reset { greeting } => Some(greeting.clone()),
            _ => None,
        })
        .await;

        assert_eq!(greeting, Message::assistant(GREETING));
        assert_eq!(handle.messages().await.unwrap(), vec![greeting]);
    }

    #[tokio::test]
    async fn test_panicking_turn_returns_to_idle() {
        let handle = SessionController::spawn(&config(), PanickingGateway);
        let mut rx = handle.subscribe();

        handle.submit_user_input("boom").await.unwrap();
        let (message, chart, _) = next_finalized(&mut rx).await;

        assert!(message.content.starts_with("⚠️ Error:"));
        assert!(chart.is_none());
        assert_eq!(handle.phase().await.unwrap(), TurnPhase::Idle);
    }
}
