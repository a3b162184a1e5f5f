//! Test doubles for the departure source and the clock.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Australia::Melbourne;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::models::RawDeparture;
use crate::providers::departures_api::FetchError;
use crate::providers::DepartureSource;
use crate::sync::Clock;

/// The instant at which Melbourne's wall clock reads `hour:minute`
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Melbourne
        .with_ymd_and_hms(2026, 7, 15, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn scheduled(time: &str) -> RawDeparture {
    RawDeparture {
        scheduled_time: Some(time.to_string()),
        ..Default::default()
    }
}

#[derive(Debug, Clone)]
pub struct FixedClock(Arc<Mutex<DateTime<Utc>>>);

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Arc::new(Mutex::new(now)))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Returns the scripted results in order, then network errors
pub struct ScriptedSource {
    results: Mutex<VecDeque<Result<Vec<RawDeparture>, FetchError>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(results: Vec<Result<Vec<RawDeparture>, FetchError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl DepartureSource for ScriptedSource {
    async fn fetch(&self) -> Result<Vec<RawDeparture>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Network("script exhausted".to_string())))
    }
}

/// Blocks every fetch until released, to hold a refresh in flight
pub struct GatedSource {
    departures: Vec<RawDeparture>,
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl GatedSource {
    pub fn new(departures: Vec<RawDeparture>) -> Self {
        Self {
            departures,
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }

    pub fn started(&self) -> Arc<Notify> {
        self.started.clone()
    }

    pub fn release(&self) -> Arc<Notify> {
        self.release.clone()
    }
}

impl DepartureSource for GatedSource {
    async fn fetch(&self) -> Result<Vec<RawDeparture>, FetchError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(self.departures.clone())
    }
}
