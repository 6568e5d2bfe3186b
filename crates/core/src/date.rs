// crates/core/src/date.rs
//! Calendar-day resolution in a user's timezone.
//!
//! Timezones are fixed UTC offsets. A session belongs to the day in which
//! its start time falls.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};

use crate::error::DateError;

/// A user's timezone, stored as a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserTimezone(FixedOffset);

impl UserTimezone {
    pub fn utc() -> Self {
        Self(Utc.fix())
    }

    /// Parse `UTC`, `Z`, `+HH:MM`, `-HH:MM` or `+HHMM`.
    pub fn parse(s: &str) -> Result<Self, DateError> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
            return Ok(Self::utc());
        }
        let invalid = || DateError::InvalidTimezone(s.to_string());

        let (sign, rest) = match trimmed.as_bytes().first() {
            Some(b'+') => (1, &trimmed[1..]),
            Some(b'-') => (-1, &trimmed[1..]),
            _ => return Err(invalid()),
        };
        // Two hour digits, an optional colon, two minute digits.
        let digits: [u8; 4] = match *rest.as_bytes() {
            [h1, h2, b':', m1, m2] | [h1, h2, m1, m2] => [h1, h2, m1, m2],
            _ => return Err(invalid()),
        };
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(invalid());
        }
        let value = |pair: &[u8]| i32::from(pair[0] - b'0') * 10 + i32::from(pair[1] - b'0');
        let hours = value(&digits[..2]);
        let minutes = value(&digits[2..]);
        if hours > 14 || minutes >= 60 {
            return Err(invalid());
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self)
            .ok_or_else(invalid)
    }

    pub fn offset(&self) -> FixedOffset {
        self.0
    }

    /// Today's date in this timezone as of `now`.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.0).date_naive()
    }
}

impl Default for UserTimezone {
    fn default() -> Self {
        Self::utc()
    }
}

impl std::fmt::Display for UserTimezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self.0.local_minus_utc();
        if secs == 0 {
            return f.write_str("UTC");
        }
        let sign = if secs < 0 { '-' } else { '+' };
        let abs = secs.abs();
        write!(f, "{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
    }
}

/// Half-open epoch-second window `[start, end)` covering one local day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub date: NaiveDate,
    pub start: i64,
    pub end: i64,
}

impl DayWindow {
    pub fn new(date: NaiveDate, tz: UserTimezone) -> Self {
        let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        // Fixed offsets have no gaps or folds, so the mapping is unique.
        let start = midnight.and_utc().timestamp() - i64::from(tz.offset().local_minus_utc());
        Self {
            date,
            start,
            end: start + Duration::days(1).num_seconds(),
        }
    }

    pub fn date_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    pub fn contains(&self, epoch_secs: i64) -> bool {
        (self.start..self.end).contains(&epoch_secs)
    }
}

/// Parse a strict `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, DateError> {
    if s.len() != 10 {
        return Err(DateError::Malformed(s.to_string()));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| DateError::Malformed(s.to_string()))
}

/// Resolve a requested day, rejecting anything that is not strictly before
/// today in the caller's timezone. Only past days are immutable.
pub fn resolve_past_day(
    s: &str,
    tz: UserTimezone,
    now: DateTime<Utc>,
) -> Result<DayWindow, DateError> {
    let date = parse_date(s)?;
    let today = tz.today(now);
    if date >= today {
        return Err(DateError::NotInPast {
            date: date.format("%Y-%m-%d").to_string(),
            today: today.format("%Y-%m-%d").to_string(),
        });
    }
    Ok(DayWindow::new(date, tz))
}
