//! Daily usage aggregation.
//!
//! Folds one local day of raw events into per-app totals, the reconstructed
//! foreground sessions and the day's unlock count.
//!
//! # Pairing Rules
//!
//! 1. Events are grouped by package and ordered by timestamp within each group.
//! 2. `open` starts a session; a second `open` while one is pending continues it.
//! 3. `close` ends the pending session.
//! 4. A session still open at day end is truncated at `end_of_day`.
//! 5. A leading `close` with no `open` is a session carried over from the previous
//!    day and starts at `start_of_day`.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::day::DayWindow;
use crate::event::{AppEventKind, UsageEvent};
use crate::types::PackageName;

/// A contiguous block of one app's foreground time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub package_name: PackageName,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.end - self.start).num_milliseconds()
    }
}

/// Per-app totals for one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDailySummary {
    pub date: NaiveDate,
    pub package_name: PackageName,
    pub total_duration_ms: i64,
    pub open_count: u32,
    /// `None` only when the app's sole activity was carried over from the previous day.
    pub last_opened_at: Option<DateTime<Utc>>,
}

/// Screen unlocks for one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUnlockSummary {
    pub date: NaiveDate,
    pub unlock_count: u32,
}

/// Everything derived from one day of raw events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayAggregate {
    pub window: DayWindow,
    /// Sorted by package name.
    pub app_summaries: Vec<AppDailySummary>,
    pub unlock_summary: DailyUnlockSummary,
    /// Sorted by start time, then package name.
    pub sessions: Vec<Session>,
}

impl DayAggregate {
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.window.date
    }

    /// Sum of all app durations.
    #[must_use]
    pub fn total_screen_time_ms(&self) -> i64 {
        self.app_summaries.iter().map(|s| s.total_duration_ms).sum()
    }

    /// Returns true if any app activity was recorded.
    #[must_use]
    pub fn has_activity(&self) -> bool {
        !self.app_summaries.is_empty()
    }

    /// Union of all session intervals, sorted and non-overlapping.
    #[must_use]
    pub fn usage_intervals(&self) -> Vec<Interval> {
        let intervals: Vec<Interval> = self
            .sessions
            .iter()
            .map(|s| Interval {
                start: s.start,
                end: s.end,
            })
            .collect();
        merge_intervals(&intervals)
    }
}

/// A half-open time interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.end - self.start).num_milliseconds()
    }

    /// Length of the overlap with `other`, zero if disjoint.
    #[must_use]
    pub fn overlap_ms(&self, other: &Self) -> i64 {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if end > start {
            (end - start).num_milliseconds()
        } else {
            0
        }
    }
}

/// Merges overlapping or touching intervals.
pub fn merge_intervals(intervals: &[Interval]) -> Vec<Interval> {
    let mut sorted: Vec<Interval> = intervals.iter().filter(|i| i.end > i.start).copied().collect();
    sorted.sort_by_key(|i| (i.start, i.end));

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        if let Some(last) = merged.last_mut() {
            if interval.start <= last.end {
                last.end = last.end.max(interval.end);
                continue;
            }
        }
        merged.push(interval);
    }
    merged
}

#[derive(Debug, Default)]
struct PackageState {
    pending_open: Option<DateTime<Utc>>,
    seen_any: bool,
    total_duration_ms: i64,
    open_count: u32,
    last_opened_at: Option<DateTime<Utc>>,
}

/// Aggregates one day of events.
///
/// Events and unlocks outside `window` are ignored. The result depends only
/// on the inputs, so re-running a date reproduces the same rows.
pub fn aggregate_day(
    window: DayWindow,
    app_events: &[UsageEvent],
    unlocks: &[DateTime<Utc>],
) -> DayAggregate {
    let mut by_package: BTreeMap<&PackageName, Vec<&UsageEvent>> = BTreeMap::new();
    for event in app_events.iter().filter(|e| window.contains(e.timestamp)) {
        by_package.entry(&event.package_name).or_default().push(event);
    }

    let mut app_summaries = Vec::with_capacity(by_package.len());
    let mut sessions = Vec::new();

    for (package_name, mut events) in by_package {
        // Stable, so same-timestamp events keep store order
        events.sort_by_key(|e| e.timestamp);

        let mut state = PackageState::default();
        let mut close_session = |start: DateTime<Utc>, end: DateTime<Utc>, state: &mut PackageState| {
            if end > start {
                state.total_duration_ms += (end - start).num_milliseconds();
                sessions.push(Session {
                    package_name: package_name.clone(),
                    start,
                    end,
                });
            }
        };

        for event in events {
            match event.kind {
                AppEventKind::Open => {
                    state.open_count = state.open_count.saturating_add(1);
                    state.last_opened_at = Some(event.timestamp);
                    if state.pending_open.is_none() {
                        state.pending_open = Some(event.timestamp);
                    }
                }
                AppEventKind::Close => {
                    if let Some(start) = state.pending_open.take() {
                        close_session(start, event.timestamp, &mut state);
                    } else if !state.seen_any {
                        close_session(window.start, event.timestamp, &mut state);
                    }
                }
            }
            state.seen_any = true;
        }

        if let Some(start) = state.pending_open.take() {
            close_session(start, window.end, &mut state);
        }

        app_summaries.push(AppDailySummary {
            date: window.date,
            package_name: package_name.clone(),
            total_duration_ms: state.total_duration_ms,
            open_count: state.open_count,
            last_opened_at: state.last_opened_at,
        });
    }

    sessions.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.package_name.cmp(&b.package_name))
    });

    let unlock_count = unlocks.iter().filter(|ts| window.contains(**ts)).count();
    let unlock_summary = DailyUnlockSummary {
        date: window.date,
        unlock_count: u32::try_from(unlock_count).unwrap_or(u32::MAX),
    };

    tracing::debug!(
        date = %window.date,
        apps = app_summaries.len(),
        sessions = sessions.len(),
        unlocks = unlock_summary.unlock_count,
        "aggregated day"
    );

    DayAggregate {
        window,
        app_summaries,
        unlock_summary,
        sessions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn window() -> DayWindow {
        DayWindow::for_date(&Utc, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    fn pkg(name: &str) -> PackageName {
        PackageName::new(name).unwrap()
    }

    fn open(name: &str, ts: DateTime<Utc>) -> UsageEvent {
        UsageEvent::new(pkg(name), AppEventKind::Open, ts)
    }

    fn close(name: &str, ts: DateTime<Utc>) -> UsageEvent {
        UsageEvent::new(pkg(name), AppEventKind::Close, ts)
    }

    #[test]
    fn two_app_morning_scenario() {
        let events = vec![
            open("A", at(8, 0)),
            close("A", at(8, 30)),
            open("B", at(8, 35)),
            close("B", at(9, 5)),
        ];
        let unlocks = vec![at(8, 0), at(8, 35)];

        let day = aggregate_day(window(), &events, &unlocks);

        assert_eq!(
            day.app_summaries,
            vec![
                AppDailySummary {
                    date: window().date,
                    package_name: pkg("A"),
                    total_duration_ms: 30 * 60_000,
                    open_count: 1,
                    last_opened_at: Some(at(8, 0)),
                },
                AppDailySummary {
                    date: window().date,
                    package_name: pkg("B"),
                    total_duration_ms: 30 * 60_000,
                    open_count: 1,
                    last_opened_at: Some(at(8, 35)),
                },
            ]
        );
        assert_eq!(day.unlock_summary.unlock_count, 2);
        assert_eq!(day.sessions.len(), 2);
        assert_eq!(day.total_screen_time_ms(), 60 * 60_000);
    }

    #[test]
    fn open_without_close_is_truncated_at_end_of_day() {
        let events = vec![open("A", at(23, 0))];
        let day = aggregate_day(window(), &events, &[]);
        let expected = (window().end - at(23, 0)).num_milliseconds();
        assert_eq!(day.app_summaries[0].total_duration_ms, expected);
        assert_eq!(day.sessions[0].end, window().end);
    }

    #[test]
    fn leading_close_is_carried_over_from_start_of_day() {
        let events = vec![close("A", at(0, 15)), close("A", at(0, 20))];
        let day = aggregate_day(window(), &events, &[]);
        let summary = &day.app_summaries[0];
        assert_eq!(summary.total_duration_ms, 15 * 60_000);
        assert_eq!(summary.open_count, 0);
        assert_eq!(summary.last_opened_at, None);
    }

    #[test]
    fn repeated_open_continues_session() {
        let events = vec![
            open("A", at(10, 0)),
            open("A", at(10, 10)),
            close("A", at(10, 30)),
        ];
        let day = aggregate_day(window(), &events, &[]);
        assert_eq!(day.sessions.len(), 1);
        assert_eq!(day.app_summaries[0].total_duration_ms, 30 * 60_000);
        assert_eq!(day.app_summaries[0].open_count, 2);
        assert_eq!(day.app_summaries[0].last_opened_at, Some(at(10, 10)));
    }

    #[test]
    fn events_outside_window_are_ignored() {
        let before = window().start - Duration::minutes(5);
        let events = vec![
            open("A", before),
            open("B", window().end),
            open("C", at(12, 0)),
            close("C", at(12, 1)),
        ];
        let unlocks = vec![before, at(12, 0), window().end];
        let day = aggregate_day(window(), &events, &unlocks);
        let names: Vec<&str> = day.app_summaries.iter().map(|s| s.package_name.as_str()).collect();
        assert_eq!(names, ["C"]);
        assert_eq!(day.unlock_summary.unlock_count, 1);
    }

    #[test]
    fn interleaved_packages_pair_independently() {
        let events = vec![
            open("A", at(9, 0)),
            open("B", at(9, 10)),
            close("A", at(9, 20)),
            close("B", at(9, 40)),
        ];
        let day = aggregate_day(window(), &events, &[]);
        assert_eq!(day.app_summaries[0].total_duration_ms, 20 * 60_000);
        assert_eq!(day.app_summaries[1].total_duration_ms, 30 * 60_000);
        let merged = day.usage_intervals();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].duration_ms(), 40 * 60_000);
    }

    #[test]
    fn per_package_events_are_ordered_before_pairing() {
        let events = vec![close("A", at(9, 30)), open("A", at(9, 0))];
        let day = aggregate_day(window(), &events, &[]);
        assert_eq!(day.app_summaries[0].total_duration_ms, 30 * 60_000);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let events = vec![
            open("B", at(7, 0)),
            close("B", at(7, 45)),
            open("A", at(8, 0)),
        ];
        let first = aggregate_day(window(), &events, &[at(7, 0)]);
        let second = aggregate_day(window(), &events, &[at(7, 0)]);
        assert_eq!(first, second);
    }

    #[test]
    fn merge_intervals_joins_touching() {
        let a = Interval {
            start: at(1, 0),
            end: at(2, 0),
        };
        let b = Interval {
            start: at(2, 0),
            end: at(3, 0),
        };
        let c = Interval {
            start: at(5, 0),
            end: at(6, 0),
        };
        let merged = merge_intervals(&[c, b, a]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].duration_ms(), 2 * 3_600_000);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        // Offsets reach past both ends of the day to exercise the window filter
        fn arbitrary_events() -> impl Strategy<Value = Vec<UsageEvent>> {
            let packages = prop_oneof![Just("A"), Just("B")];
            proptest::collection::vec((packages, any::<bool>(), -7_200_000i64..93_600_000), 0..40)
                .prop_map(|raw| {
                    raw.into_iter()
                        .map(|(name, is_open, offset_ms)| {
                            let kind = if is_open {
                                AppEventKind::Open
                            } else {
                                AppEventKind::Close
                            };
                            UsageEvent::new(pkg(name), kind, at(0, 0) + Duration::milliseconds(offset_ms))
                        })
                        .collect()
                })
        }

        proptest! {
            #[test]
            fn prop_sessions_stay_inside_the_day(events in arbitrary_events()) {
                let window = window();
                let day = aggregate_day(window, &events, &[]);

                for session in &day.sessions {
                    prop_assert!(session.start >= window.start);
                    prop_assert!(session.end <= window.end);
                    prop_assert!(session.duration_ms() > 0);
                }
                for summary in &day.app_summaries {
                    prop_assert!(summary.total_duration_ms <= window.duration_ms());
                    let session_total: i64 = day
                        .sessions
                        .iter()
                        .filter(|s| s.package_name == summary.package_name)
                        .map(Session::duration_ms)
                        .sum();
                    prop_assert_eq!(summary.total_duration_ms, session_total);
                }
            }

            #[test]
            fn prop_open_count_matches_opens_in_window(events in arbitrary_events()) {
                let window = window();
                let day = aggregate_day(window, &events, &[]);
                for summary in &day.app_summaries {
                    let opens = events
                        .iter()
                        .filter(|e| {
                            e.package_name == summary.package_name
                                && e.kind == AppEventKind::Open
                                && window.contains(e.timestamp)
                        })
                        .count();
                    prop_assert_eq!(summary.open_count as usize, opens);
                }
            }
        }
    }
}
