use gotcha::Gotcha;
use tracing::{error, info};

use eventhub::api::{events, health_check, stream};
use eventhub::config::Settings;
use eventhub::state::AppState;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::DEBUG.into()),
        )
        .init();

    info!("Starting Event Hub");

    let settings = Settings::new().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Connecting event store...");
    let app_state = AppState::connect(settings.application.clone())
        .await
        .map_err(|e| {
            error!("Failed to initialize event store: {}", e);
            e
        })?;

    info!("Event bus, store and connection registry initialized");

    let addr = format!("{}:{}", &settings.basic.host, &settings.basic.port);
    info!("Starting server on http://{}", addr);

    let served = Gotcha::with_types::<AppState, Settings>()
        .state(app_state.clone())
        .config(settings)
        .get("/health", health_check)
        // Event routes
        .get("/api/events", events::list_events)
        .post("/api/events", events::emit_event)
        // Live event stream
        .get("/ws", stream::ws_events)
        .with_cors()
        .with_openapi()
        .listen(addr)
        .await;

    info!("Server stopped, closing event bus");
    app_state.shutdown().await;

    served?;
    Ok(())
}
