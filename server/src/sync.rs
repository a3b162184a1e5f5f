use crate::models::{ClockTime, DisplayDeparture, RawDeparture};
use crate::providers::DepartureSource;
use crate::services::schedule::{self, ScheduleRules};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

/// Source of the current instant
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Where the departures on the board came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BoardSource {
    Live,
    Fallback,
}

/// The board as of one display tick
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    pub current_time: ClockTime,
    pub source: BoardSource,
    pub departures: Vec<DisplayDeparture>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastUpdated {
    pub at: DateTime<Utc>,
    /// The fetch succeeded but returned no departures
    pub empty: bool,
}

/// Loading / error / last-updated state of the fetch loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchStatus {
    pub loading: bool,
    pub error: Option<String>,
    pub last_updated: Option<LastUpdated>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated(usize),
    Empty,
    Failed,
    /// Another refresh was already running
    Skipped,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub rules: ScheduleRules,
    pub fetch_interval: Duration,
    pub display_interval: Duration,
}

/// Manages the two board loops: fetching departures and redrawing the board.
///
/// Each piece of shared state lives in its own single-slot watch cell with a
/// single writer: `raw` is written only by [`SyncManager::refresh`], `board`
/// only by [`SyncManager::render`].
pub struct SyncManager<S, C = SystemClock> {
    source: S,
    clock: C,
    settings: SyncSettings,
    raw: watch::Sender<Arc<Vec<RawDeparture>>>,
    board: watch::Sender<BoardSnapshot>,
    status: watch::Sender<FetchStatus>,
    in_flight: AtomicBool,
    refresh_requested: Arc<Notify>,
}

impl<S: DepartureSource, C: Clock> SyncManager<S, C> {
    pub fn new(source: S, clock: C, settings: SyncSettings) -> Self {
        let raw = Arc::new(Vec::new());
        let initial = Self::build_snapshot(&raw, clock.now(), &settings.rules);

        Self {
            source,
            clock,
            settings,
            raw: watch::channel(raw).0,
            board: watch::channel(initial).0,
            // Loading until the first fetch settles
            status: watch::channel(FetchStatus {
                loading: true,
                ..Default::default()
            })
            .0,
            in_flight: AtomicBool::new(false),
            refresh_requested: Arc::new(Notify::new()),
        }
    }

    /// Read-only view for API handlers
    pub fn reader(&self) -> BoardReader {
        BoardReader {
            board: self.board.subscribe(),
            status: self.status.subscribe(),
            refresh_requested: self.refresh_requested.clone(),
            timezone: self.settings.rules.timezone,
        }
    }

    /// Start the background loops
    pub fn start(self: Arc<Self>) -> SyncHandle {
        info!(
            fetch_interval_secs = self.settings.fetch_interval.as_secs(),
            display_interval_secs = self.settings.display_interval.as_secs(),
            "Starting sync manager"
        );

        // Fetch loop: immediately, then on every tick or manual request
        let fetch_self = self.clone();
        let fetch_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(fetch_self.settings.fetch_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = fetch_self.refresh_requested.notified() => {
                        debug!("Manual refresh requested");
                    }
                }
                match fetch_self.refresh().await {
                    RefreshOutcome::Updated(count) => debug!(count, "Fetch tick finished"),
                    outcome => debug!(?outcome, "Fetch tick finished"),
                }
            }
        });

        // Display loop: every tick, and right away when new departures arrive
        let display_self = self;
        let display_handle = tokio::spawn(async move {
            let mut raw_rx = display_self.raw.subscribe();
            let mut interval = tokio::time::interval(display_self.settings.display_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    changed = raw_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                display_self.render();
            }
        });

        SyncHandle {
            tasks: vec![fetch_handle, display_handle],
        }
    }

    /// Fetch departures once and publish them.
    ///
    /// On failure the previously published departures stay in place.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("Refresh already in flight, skipping");
            return RefreshOutcome::Skipped;
        };

        self.status.send_modify(|status| {
            status.loading = true;
            status.error = None;
        });

        let result = self.source.fetch().await;
        let now = self.clock.now();

        let outcome = match result {
            Ok(departures) if departures.is_empty() => {
                warn!("No departures found in data, showing fallback timetable");
                self.raw.send_replace(Arc::new(Vec::new()));
                self.status.send_modify(|status| {
                    status.last_updated = Some(LastUpdated { at: now, empty: true });
                });
                RefreshOutcome::Empty
            }
            Ok(departures) => {
                let count = departures.len();
                info!(count, "Updated departures");
                self.raw.send_replace(Arc::new(departures));
                self.status.send_modify(|status| {
                    status.last_updated = Some(LastUpdated { at: now, empty: false });
                });
                RefreshOutcome::Updated(count)
            }
            Err(e) => {
                let kept = self.raw.borrow().len();
                error!(error = %e, kept, "Failed to fetch departures, keeping existing data");
                self.status.send_modify(|status| {
                    status.error = Some(e.to_string());
                });
                RefreshOutcome::Failed
            }
        };

        self.status.send_modify(|status| status.loading = false);

        outcome
    }

    /// Recompute the board from the latest departures and the current time
    pub fn render(&self) -> BoardSnapshot {
        let raw = self.raw.borrow().clone();
        let snapshot = Self::build_snapshot(&raw, self.clock.now(), &self.settings.rules);

        debug!(
            current_time = %snapshot.current_time,
            source = ?snapshot.source,
            shown = snapshot.departures.len(),
            "Rendered board"
        );

        self.board.send_replace(snapshot.clone());
        snapshot
    }

    fn build_snapshot(
        raw: &[RawDeparture],
        now: DateTime<Utc>,
        rules: &ScheduleRules,
    ) -> BoardSnapshot {
        let current_time = schedule::local_clock_time(now, rules.timezone);

        BoardSnapshot {
            current_time,
            source: if raw.is_empty() {
                BoardSource::Fallback
            } else {
                BoardSource::Live
            },
            departures: schedule::format_departures(raw, now, rules),
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Cheap, cloneable read side of the board
#[derive(Debug, Clone)]
pub struct BoardReader {
    board: watch::Receiver<BoardSnapshot>,
    status: watch::Receiver<FetchStatus>,
    refresh_requested: Arc<Notify>,
    timezone: Tz,
}

impl BoardReader {
    pub fn snapshot(&self) -> BoardSnapshot {
        self.board.borrow().clone()
    }

    pub fn status(&self) -> FetchStatus {
        self.status.borrow().clone()
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Ask the fetch loop for an out-of-band refresh. Requests made while one
    /// is already pending collapse into a single fetch.
    pub fn request_refresh(&self) {
        self.refresh_requested.notify_one();
    }

    /// Wait until the board satisfies `predicate`
    #[cfg(test)]
    pub async fn wait_for_board(
        &mut self,
        predicate: impl FnMut(&BoardSnapshot) -> bool,
    ) -> Option<BoardSnapshot> {
        self.board.wait_for(predicate).await.ok().map(|b| b.clone())
    }
}

/// Handle to the running loops; dropping it stops them
pub struct SyncHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    /// Cancel both loops and wait for them to wind down
    pub async fn shutdown(mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        for task in &tasks {
            task.abort();
        }
        futures::future::join_all(tasks).await;
        info!("Sync manager stopped");
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
