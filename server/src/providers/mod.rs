pub mod departures_api;

use std::future::Future;

use crate::models::RawDeparture;
use departures_api::FetchError;

/// Anything that can hand the board a fresh list of raw departures
pub trait DepartureSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<Vec<RawDeparture>, FetchError>> + Send;
}
