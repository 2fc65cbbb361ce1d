//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful during development. The workspace's main `hqm-run` binary also loads `.env` and logs
//! the resolved configuration before serving the same router.

use api_rest::{AppState, ServerSettings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the HQM REST API server.
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the environment holds an invalid setting,
/// - the datastore cannot be opened,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("hqm_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = ServerSettings::from_env()?;
    let state = AppState::from_settings(&settings)?;

    tracing::info!("-- Starting HQM REST API on {}", settings.addr);
    let listener = tokio::net::TcpListener::bind(&settings.addr).await?;
    api_rest::serve(listener, state).await?;

    Ok(())
}
