/// Departures API client
///
/// Fetches the departures list for the board's platform from the departures
/// gateway. The gateway is known to answer in three shapes, tried in order:
///
/// 1. `{"departures": [...]}`
/// 2. `{"body": "{\"departures\": [...]}"}` (a proxy passing through the
///    upstream response body as a string)
/// 3. `{"body": {"departures": [...]}}`
///
/// The first shape that matches wins. Anything else is rejected as a
/// format error rather than partially returned.
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::models::RawDeparture;
use crate::providers::DepartureSource;

#[derive(Debug, Clone)]
pub struct DepartureApiClient {
    client: reqwest::Client,
    url: String,
}

impl DepartureApiClient {
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Fetch the current departures list
    pub async fn fetch_departures(&self) -> Result<Vec<RawDeparture>, FetchError> {
        debug!(url = %self.url, "Fetching departures");

        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !status.is_success() {
            error!(status = %status, body_preview = %preview(&text), "Departures API error");
            return Err(FetchError::Transport {
                status: status.as_u16(),
                body: text,
            });
        }

        let data: Value = serde_json::from_str(&text).map_err(|e| {
            error!(
                error = %e,
                body_preview = %preview(&text),
                "Departures API returned invalid JSON"
            );
            FetchError::InvalidJson(e.to_string())
        })?;

        let departures = decode_envelope(&data)?;

        info!(count = departures.len(), "Retrieved departures");

        Ok(departures)
    }
}

impl DepartureSource for DepartureApiClient {
    async fn fetch(&self) -> Result<Vec<RawDeparture>, FetchError> {
        self.fetch_departures().await
    }
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

/// Response shapes the gateway is known to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    Direct,
    StringBody,
    ObjectBody,
}

#[derive(Deserialize)]
struct DeparturesEnvelope {
    departures: Vec<Value>,
}

#[derive(Deserialize)]
struct StringBodyEnvelope {
    body: String,
}

#[derive(Deserialize)]
struct ObjectBodyEnvelope {
    body: Value,
}

/// Deserialize `T` only from a JSON object; derived structs would otherwise
/// also accept arrays.
fn from_object<'a, T: Deserialize<'a>>(value: &'a Value) -> Option<T> {
    if !value.is_object() {
        return None;
    }
    T::deserialize(value).ok()
}

impl Envelope {
    /// Decoding order; the first match wins
    pub const ORDER: [Envelope; 3] = [Envelope::Direct, Envelope::StringBody, Envelope::ObjectBody];

    fn decode(self, data: &Value) -> Option<Vec<Value>> {
        match self {
            Envelope::Direct => {
                from_object::<DeparturesEnvelope>(data).map(|envelope| envelope.departures)
            }
            Envelope::StringBody => {
                let envelope = from_object::<StringBodyEnvelope>(data)?;
                let body: Value = match serde_json::from_str(&envelope.body) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(error = %e, "Failed to parse body string as JSON");
                        return None;
                    }
                };
                from_object::<DeparturesEnvelope>(&body).map(|inner| inner.departures)
            }
            Envelope::ObjectBody => {
                let envelope = from_object::<ObjectBodyEnvelope>(data)?;
                from_object::<DeparturesEnvelope>(&envelope.body).map(|inner| inner.departures)
            }
        }
    }
}

/// Extract the departures list from any supported response shape
pub fn decode_envelope(data: &Value) -> Result<Vec<RawDeparture>, FetchError> {
    for envelope in Envelope::ORDER {
        if let Some(items) = envelope.decode(data) {
            debug!(?envelope, count = items.len(), "Matched response envelope");
            return Ok(decode_records(items));
        }
    }

    error!(body_preview = %preview(&data.to_string()), "Invalid data format");
    Err(FetchError::Format)
}

/// Records that cannot be read are kept as empty records so the list length
/// still reflects what the gateway sent; they are dropped when formatting.
fn decode_records(items: Vec<Value>) -> Vec<RawDeparture> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item).unwrap_or_else(|e| {
                warn!(index, error = %e, "Unreadable departure record");
                RawDeparture::default()
            })
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error! status: {status}, message: {body}")]
    Transport { status: u16, body: String },
    #[error("Invalid data format received")]
    Format,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Response is not valid JSON: {0}")]
    InvalidJson(String),
}
