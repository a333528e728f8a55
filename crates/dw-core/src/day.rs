//! Local-calendar day boundaries.
//!
//! Every aggregation works on a local day `[midnight, next midnight)`,
//! converted to a half-open UTC interval so stores can be queried by
//! timestamp.

use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Converts a local wall-clock time on `date` to UTC.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant. Times
/// inside a DST gap resolve to the first hour after the gap.
pub fn local_to_utc<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => {
            // Spring-forward gaps are at most an hour in practice
            let shifted = local + chrono::Duration::hours(1);
            match tz.from_local_datetime(&shifted) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
                LocalResult::None => shifted.and_utc(),
            }
        }
    }
}

/// Converts local midnight at the start of `date` to UTC.
pub fn local_midnight_to_utc<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    local_to_utc(tz, date.and_time(NaiveTime::MIN))
}

/// The UTC interval covering one local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub date: NaiveDate,
    /// Inclusive start (local midnight).
    pub start: DateTime<Utc>,
    /// Exclusive end (next local midnight).
    pub end: DateTime<Utc>,
}

impl DayWindow {
    /// Computes the window for `date` in the given time zone.
    pub fn for_date<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Self {
        let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
        Self {
            date,
            start: local_midnight_to_utc(tz, date),
            end: local_midnight_to_utc(tz, next),
        }
    }

    /// Returns true if `ts` falls within `[start, end)`.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Clamps `ts` into `[start, end]`.
    #[must_use]
    pub fn clamp(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        ts.clamp(self.start, self.end)
    }

    /// Length of the day in milliseconds (23, 24 or 25 hours).
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.end - self.start).num_milliseconds()
    }
}

/// Returns the local calendar date before the one containing `now`.
pub fn yesterday<Tz: TimeZone>(tz: &Tz, now: DateTime<Utc>) -> NaiveDate {
    let today = now.with_timezone(tz).date_naive();
    today.pred_opt().unwrap_or(today)
}

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a range; `start` and `end` are swapped if given backwards.
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// A single-day range.
    #[must_use]
    pub const fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// The `days` dates ending at `end` (inclusive).
    #[must_use]
    pub fn ending_at(end: NaiveDate, days: u32) -> Self {
        let span = u64::from(days.max(1) - 1);
        let start = end.checked_sub_days(Days::new(span)).unwrap_or(end);
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Every date in the range, ascending.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    /// Number of dates in the range.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::try_from((self.end - self.start).num_days() + 1).unwrap_or(0)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}
