//! chatdeck - conversational agent session with streamed answers and table charts

mod agent;
mod chart;
mod config;
mod console;
mod emitter;
mod runtime;
mod session;
mod table;

use agent::{LoggingGateway, OpenAiGateway};
use config::Config;
use runtime::SessionController;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging; stdout belongs to the console
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatdeck=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = Config::from_env()?;

    // Without a usable agent no turn can run
    let gateway = match OpenAiGateway::connect(&config.agent) {
        Ok(gateway) => gateway,
        Err(e) => {
            tracing::error!(error = %e, "Agent gateway setup failed");
            return Err(e.into());
        }
    };
    tracing::info!(
        model = %config.agent.model,
        url = %gateway.url(),
        pacing_ms = %config.session.pacing.as_millis(),
        "Agent gateway ready"
    );

    let gateway = LoggingGateway::new(Arc::new(gateway));
    let handle = SessionController::spawn(&config.session, gateway);

    console::run(handle).await?;

    tracing::info!("Session ended");
    Ok(())
}
