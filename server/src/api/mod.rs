pub mod departures;

use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::sync::BoardReader;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Departure Board API",
        description = "Upcoming train departures for the kiosk display"
    ),
    tags((name = "departures", description = "Board contents and refresh control"))
)]
pub struct ApiDoc;

pub fn router(reader: BoardReader) -> OpenApiRouter {
    OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(departures::get_departures))
        .routes(routes!(departures::request_refresh))
        .with_state(reader)
}
