use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Wall-clock time of day with minute precision, written as `HH:MM` (24h).
///
/// Ordering matches the lexicographic ordering of the `HH:MM` form, so
/// comparing two `ClockTime`s is the same as comparing their strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self((hour * 60 + minute) as u16))
        } else {
            None
        }
    }

    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    pub fn minute(self) -> u16 {
        self.0 % 60
    }

    pub fn minutes_of_day(self) -> u16 {
        self.0
    }

    /// Minutes from `self` until `departure`, wrapping past midnight.
    /// Always in `0..MINUTES_PER_DAY`.
    pub fn minutes_until(self, departure: ClockTime) -> u16 {
        let diff = departure.minutes_of_day() as i32 - self.minutes_of_day() as i32;
        if diff < 0 {
            (diff + MINUTES_PER_DAY as i32) as u16
        } else {
            diff as u16
        }
    }
}

impl From<NaiveTime> for ClockTime {
    fn from(time: NaiveTime) -> Self {
        Self((time.hour() * 60 + time.minute()) as u16)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ClockTime {
    type Err = ClockTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ClockTimeError(s.to_string());

        let bytes = s.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return Err(invalid());
        }
        let digits = [bytes[0], bytes[1], bytes[3], bytes[4]];
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(invalid());
        }

        let [h1, h0, m1, m0] = digits.map(|b| u32::from(b - b'0'));
        Self::from_hm(h1 * 10 + h0, m1 * 10 + m0).ok_or_else(invalid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid HH:MM time: {0:?}")]
pub struct ClockTimeError(pub String);

/// A departure as delivered by the upstream API. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawDeparture {
    #[serde(default)]
    pub live_time: Option<String>,
    #[serde(default)]
    pub estimated_time: Option<String>,
    #[serde(default)]
    pub scheduled_time: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub platform: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
}

impl RawDeparture {
    /// The best available time: live, then estimated, then scheduled.
    pub fn departure_time(&self) -> Option<&str> {
        [&self.live_time, &self.estimated_time, &self.scheduled_time]
            .into_iter()
            .find_map(|time| non_empty(time))
    }

    /// True if the record carries any real-time information.
    pub fn is_live(&self) -> bool {
        non_empty(&self.live_time).is_some() || non_empty(&self.estimated_time).is_some()
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Platforms come through as either `"2"` or `2` depending on the feed.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A departure ready to be shown on the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayDeparture {
    pub time: ClockTime,
    pub destination: String,
    pub minutes_until: u16,
    pub is_live: bool,
    pub platform: String,
}

impl DisplayDeparture {
    /// Countdown text as shown on the board: "Now", "1 min", "12 mins".
    pub fn minutes_label(&self) -> String {
        match self.minutes_until {
            0 => "Now".to_string(),
            1 => "1 min".to_string(),
            n => format!("{} mins", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn time(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    #[test]
    fn test_clock_time_parse_and_display() {
        assert_eq!(time("00:00").minutes_of_day(), 0);
        assert_eq!(time("06:15").minutes_of_day(), 375);
        assert_eq!(time("23:59").minutes_of_day(), 1439);
        assert_eq!(time("07:05").to_string(), "07:05");
    }

    #[test]
    fn test_clock_time_rejects_malformed() {
        for bad in ["", "7:05", "07:5", "24:00", "12:60", "ab:cd", "07-05", "07:05:00", " 7:05"] {
            assert!(bad.parse::<ClockTime>().is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn test_clock_time_order_matches_string_order() {
        let times = ["00:10", "05:00", "09:59", "10:00", "23:50"];
        for a in times {
            for b in times {
                assert_eq!(time(a).cmp(&time(b)), a.cmp(b), "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_minutes_until() {
        assert_eq!(time("05:00").minutes_until(time("06:15")), 75);
        assert_eq!(time("23:50").minutes_until(time("00:10")), 20);
        assert_eq!(time("08:00").minutes_until(time("08:00")), 0);
        assert_eq!(time("08:01").minutes_until(time("08:00")), 1439);
    }

    #[test]
    fn test_departure_time_priority() {
        let dep = RawDeparture {
            live_time: Some("08:00".into()),
            estimated_time: Some("07:58".into()),
            scheduled_time: Some("07:55".into()),
            ..Default::default()
        };
        assert_eq!(dep.departure_time(), Some("08:00"));
        assert!(dep.is_live());

        let dep = RawDeparture {
            live_time: Some(String::new()),
            estimated_time: Some("07:58".into()),
            scheduled_time: Some("07:55".into()),
            ..Default::default()
        };
        assert_eq!(dep.departure_time(), Some("07:58"));
        assert!(dep.is_live());

        let dep = RawDeparture {
            scheduled_time: Some("07:55".into()),
            ..Default::default()
        };
        assert_eq!(dep.departure_time(), Some("07:55"));
        assert!(!dep.is_live());

        assert_eq!(RawDeparture::default().departure_time(), None);
    }

    #[test]
    fn test_raw_departure_lenient_fields() {
        let dep: RawDeparture = serde_json::from_value(json!({
            "scheduled_time": "06:15",
            "live_time": null,
            "platform": 2,
            "destination": "Flinders Street",
            "disruptions": [],
            "at_platform": false
        }))
        .unwrap();

        assert_eq!(dep.live_time, None);
        assert_eq!(dep.platform.as_deref(), Some("2"));
        assert_eq!(dep.departure_time(), Some("06:15"));
    }

    #[test]
    fn test_minutes_label() {
        let mut dep = DisplayDeparture {
            time: time("08:00"),
            destination: "Flinders Street".into(),
            minutes_until: 0,
            is_live: false,
            platform: "1".into(),
        };
        assert_eq!(dep.minutes_label(), "Now");
        dep.minutes_until = 1;
        assert_eq!(dep.minutes_label(), "1 min");
        dep.minutes_until = 42;
        assert_eq!(dep.minutes_label(), "42 mins");
    }
}
