//! HQM service entry point.
//!
//! Loads `.env`, resolves configuration once, opens the datastore and serves the REST API
//! (including the server-sent event stream of queue changes).

use api_rest::{AppState, ServerSettings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the HQM application.
///
/// # Environment Variables
/// - `HQM_REST_ADDR`: REST server address (default: "0.0.0.0:5001")
/// - `HQM_STORE`: `file` (default) or `memory`
/// - `QUEUE_DATA_DIR`: Directory for queue data storage (default: "queue_data")
/// - `HQM_AVG_CONSULTATION_MINUTES`: Minutes per consultation used for wait estimates (default: 10)
/// - `HQM_SERVING_POLICY`: `single` (default) or `multiple`
/// - `HQM_MAX_CONFLICT_RETRIES`: Retry bound for contended writes (default: 32)
/// - `HQM_STORE_TIMEOUT_MS`: Bound on each datastore call (default: 5000)
/// - `API_KEY`: API key required for staff operations; staff routes are refused without it
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hqm_run=info".parse()?)
                .add_directive("hqm_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = ServerSettings::from_env()?;
    if settings.api_key.is_none() {
        tracing::warn!("API_KEY is not set; staff operations will be refused");
    }

    tracing::info!(
        store = ?settings.store,
        data_dir = %settings.cfg.data_dir().display(),
        serving_policy = %settings.cfg.serving_policy(),
        average_consultation_minutes = settings.cfg.average_consultation_minutes(),
        "resolved configuration"
    );

    let state = AppState::from_settings(&settings)?;

    tracing::info!("++ Starting HQM REST on {}", settings.addr);
    let listener = tokio::net::TcpListener::bind(&settings.addr).await?;
    api_rest::serve(listener, state).await?;

    Ok(())
}
