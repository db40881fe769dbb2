use gotcha::axum::extract::{Query, State};
use gotcha::{Json, Schematic};
use serde::Deserialize;
use tracing::debug;

use crate::api::error::ApiError;
use crate::event_bus::{DEFAULT_LIMIT, Event, EventFilter};
use crate::state::{Bus, Store};

// ============================================================================
// Query Parameters
// ============================================================================

#[derive(Debug, Deserialize, Schematic)]
pub struct EventQueryParams {
    /// Only events of this type
    #[serde(rename = "type")]
    pub event_type: Option<String>,

    /// Only events caused by this user
    pub user_id: Option<String>,

    /// Max events to return (default: 100, max: 1000)
    pub limit: Option<usize>,
}

impl EventQueryParams {
    pub fn to_filter(&self) -> EventFilter {
        EventFilter {
            event_type: self.event_type.clone().filter(|t| !t.is_empty()),
            user_id: self.user_id.clone().filter(|u| !u.is_empty()),
            limit: self.limit.unwrap_or(DEFAULT_LIMIT),
        }
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Schematic)]
pub struct EmitEventRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
    pub user_id: Option<String>,
    pub correlation_id: Option<String>,
}

impl EmitEventRequest {
    pub fn into_event(self) -> Result<Event, ApiError> {
        let event = Event::create(self.event_type, self.data, self.user_id, self.correlation_id);
        event.validate()?;
        Ok(event)
    }
}

// ============================================================================
// HTTP Handlers
// ============================================================================

/// GET /api/events
/// Query stored events, newest first
#[gotcha::api]
pub async fn list_events(
    State(store): State<Store>,
    Query(params): Query<EventQueryParams>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let events = store.get_events(&params.to_filter()).await?;
    Ok(Json(events))
}

/// POST /api/events
/// Create an event and publish it on the bus
#[gotcha::api]
pub async fn emit_event(
    State(bus): State<Bus>,
    Json(req): Json<EmitEventRequest>,
) -> Result<Json<Event>, ApiError> {
    let event = req.into_event()?;

    let report = bus.0.publish_detached(event.clone()).await;
    debug!(
        event_id = %event.id,
        event_type = %event.event_type,
        handled = report.handled,
        failed = report.failed,
        forwarded = report.forwarded,
        "event emitted"
    );

    Ok(Json(event))
}
