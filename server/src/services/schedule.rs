/// Departure scheduling and formatting
///
/// Turns the latest raw departures (or the static fallback timetable when
/// there are none) into the short, sorted list shown on the board.
///
/// All times are `HH:MM` wall-clock times in the display timezone. A time is
/// shown when either of two independent conditions holds:
/// - it is later today (`time >= now`), or
/// - its minutes-until, wrapped past midnight, is under twelve hours.
///
/// The second clause admits tomorrow morning's first trains late in the
/// evening while hiding anything further away than half a day.
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::models::{ClockTime, DisplayDeparture, RawDeparture};

/// Maximum number of departures on the board
pub const MAX_DISPLAYED: usize = 5;

/// Wrapped departures at or beyond this many minutes away are hidden
pub const WRAP_HORIZON_MINUTES: u16 = 12 * 60;

#[derive(Debug, Clone)]
pub struct ScheduleRules {
    pub timezone: Tz,
    pub fallback: Vec<ClockTime>,
    pub default_destination: String,
    pub default_platform: String,
}

/// Current time of day in the display timezone, ignoring the host timezone.
pub fn local_clock_time(now: DateTime<Utc>, timezone: Tz) -> ClockTime {
    ClockTime::from(now.with_timezone(&timezone).time())
}

pub fn is_within_window(departure: ClockTime, now: ClockTime) -> bool {
    departure >= now || now.minutes_until(departure) < WRAP_HORIZON_MINUTES
}

/// Build the board for the instant `now`.
pub fn format_departures(
    raw: &[RawDeparture],
    now: DateTime<Utc>,
    rules: &ScheduleRules,
) -> Vec<DisplayDeparture> {
    format_at(raw, local_clock_time(now, rules.timezone), rules)
}

/// Build the board for a local time of day.
///
/// A non-empty `raw` list is used exclusively, even if every record in it
/// ends up filtered out. The fallback timetable is only consulted when `raw`
/// is empty.
pub fn format_at(
    raw: &[RawDeparture],
    now: ClockTime,
    rules: &ScheduleRules,
) -> Vec<DisplayDeparture> {
    let mut departures: Vec<DisplayDeparture> = if raw.is_empty() {
        rules
            .fallback
            .iter()
            .copied()
            .filter(|&time| is_within_window(time, now))
            .map(|time| DisplayDeparture {
                time,
                destination: rules.default_destination.clone(),
                minutes_until: now.minutes_until(time),
                is_live: false,
                platform: rules.default_platform.clone(),
            })
            .collect()
    } else {
        raw.iter()
            .filter_map(|departure| display_departure(departure, now, rules))
            .collect()
    };

    // Stable: equal countdowns keep their upstream order
    departures.sort_by_key(|d| d.minutes_until);
    departures.truncate(MAX_DISPLAYED);
    departures
}

fn display_departure(
    departure: &RawDeparture,
    now: ClockTime,
    rules: &ScheduleRules,
) -> Option<DisplayDeparture> {
    let raw_time = departure.departure_time()?;

    let time = match raw_time.parse::<ClockTime>() {
        Ok(time) => time,
        Err(e) => {
            warn!(error = %e, "Skipping departure with unreadable time");
            return None;
        }
    };

    if !is_within_window(time, now) {
        return None;
    }

    Some(DisplayDeparture {
        time,
        destination: departure
            .destination
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| rules.default_destination.clone()),
        minutes_until: now.minutes_until(time),
        is_live: departure.is_live(),
        platform: departure
            .platform
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| rules.default_platform.clone()),
    })
}
