use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::DisplayDeparture;
use crate::sync::{BoardReader, BoardSource, LastUpdated};

/// A departure as rendered on the board
#[derive(Debug, Serialize, ToSchema)]
pub struct DepartureItem {
    /// Departure time, HH:MM in the board's timezone
    #[schema(example = "08:15")]
    pub time: String,
    pub destination: String,
    pub minutes_until: u16,
    /// "Now", "1 min" or "N mins"
    pub minutes_label: String,
    /// True when the time comes from real-time data
    pub is_live: bool,
    pub platform: String,
}

impl From<&DisplayDeparture> for DepartureItem {
    fn from(departure: &DisplayDeparture) -> Self {
        Self {
            time: departure.time.to_string(),
            destination: departure.destination.clone(),
            minutes_until: departure.minutes_until,
            minutes_label: departure.minutes_label(),
            is_live: departure.is_live,
            platform: departure.platform.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DepartureBoardResponse {
    /// Current time, HH:MM in the board's timezone
    #[schema(example = "08:03")]
    pub current_time: String,
    pub source: BoardSource,
    pub departures: Vec<DepartureItem>,
    /// A fetch is in progress
    pub loading: bool,
    /// Message from the most recent failed fetch
    pub error: Option<String>,
    /// Local time of the last successful fetch
    #[schema(example = "08:00:12")]
    pub last_updated: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub message: String,
}

fn format_last_updated(last_updated: LastUpdated, timezone: chrono_tz::Tz) -> String {
    let local = last_updated.at.with_timezone(&timezone).format("%H:%M:%S");
    if last_updated.empty {
        format!("{} (no data)", local)
    } else {
        local.to_string()
    }
}

/// Get the current board
#[utoipa::path(
    get,
    path = "/api/departures",
    responses(
        (status = 200, description = "Current board", body = DepartureBoardResponse)
    ),
    tag = "departures"
)]
pub async fn get_departures(State(reader): State<BoardReader>) -> Json<DepartureBoardResponse> {
    let snapshot = reader.snapshot();
    let status = reader.status();

    tracing::debug!(
        shown = snapshot.departures.len(),
        source = ?snapshot.source,
        loading = status.loading,
        "Returning departure board"
    );

    Json(DepartureBoardResponse {
        current_time: snapshot.current_time.to_string(),
        source: snapshot.source,
        departures: snapshot.departures.iter().map(DepartureItem::from).collect(),
        loading: status.loading,
        error: status.error,
        last_updated: status
            .last_updated
            .map(|u| format_last_updated(u, reader.timezone())),
    })
}

/// Request an immediate refresh of the departures data
#[utoipa::path(
    post,
    path = "/api/departures/refresh",
    responses(
        (status = 202, description = "Refresh scheduled", body = RefreshResponse)
    ),
    tag = "departures"
)]
pub async fn request_refresh(
    State(reader): State<BoardReader>,
) -> (StatusCode, Json<RefreshResponse>) {
    reader.request_refresh();
    (
        StatusCode::ACCEPTED,
        Json(RefreshResponse {
            message: "Refresh requested".to_string(),
        }),
    )
}
