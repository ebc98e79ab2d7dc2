//! Virtual-instance expansion.
//!
//! A series is stored as one rule plus sparse exceptions; occurrences are
//! computed on demand by walking the raw candidate stream, truncating at
//! the terminator, intersecting with the requested window, and applying
//! exceptions. Nothing here persists state, so expansion is safe to run
//! concurrently for independent series and ranges.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::HashMap;

use crate::models::{DateRange, ExceptionKind, ExceptionRecord, Series, VirtualInstance};
use crate::rule::{weekday_rank, Frequency, RecurrenceRule, Terminator};

fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .map(|first| (first - Duration::days(1)).day())
        .unwrap_or(28)
}

/// Day-of-month target clamped to the last day of shorter months. This is
/// the documented policy for e.g. BYMONTHDAY=31 in February: the candidate
/// lands on the month's final day rather than skipping the month.
fn month_candidate(anchor: NaiveDate, months_ahead: i64, target_day: u32) -> Option<NaiveDate> {
    let zero_based = i64::from(anchor.year()) * 12 + i64::from(anchor.month()) - 1 + months_ahead;
    let year = i32::try_from(zero_based.div_euclid(12)).ok()?;
    let month = u32::try_from(zero_based.rem_euclid(12)).ok()? + 1;
    let day = target_day.min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
}

fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (i64::from(to.year()) - i64::from(from.year())) * 12
        + (i64::from(to.month()) - i64::from(from.month()))
}

enum Cursor {
    Daily { next: NaiveDate },
    Weekly { week_start: NaiveDate, slot: usize },
    Monthly { step: i64 },
}

/// Lazy raw-candidate stream for one rule anchored at a series start.
///
/// Candidates are strictly ascending. `Count` terminators are counted from
/// the series start regardless of any window the caller later applies, so
/// the iterator tracks how many candidates it has produced even across the
/// closed-form skip in [`Occurrences::starting_no_earlier_than`].
pub struct Occurrences<'r> {
    rule: &'r RecurrenceRule,
    series_start: NaiveDate,
    /// Weekday slots per interval-week, Monday-first (weekly only).
    days: Vec<Weekday>,
    /// Day-of-month target (monthly only).
    target_day: u32,
    emitted: u32,
    cursor: Cursor,
    done: bool,
}

impl<'r> Occurrences<'r> {
    pub fn new(rule: &'r RecurrenceRule, series_start: NaiveDate) -> Self {
        let days = match rule.frequency() {
            Frequency::Weekly => {
                if rule.by_weekday().is_empty() {
                    vec![series_start.weekday()]
                } else {
                    rule.by_weekday().to_vec()
                }
            }
            _ => Vec::new(),
        };
        let cursor = match rule.frequency() {
            Frequency::Daily => Cursor::Daily { next: series_start },
            Frequency::Weekly => Cursor::Weekly {
                week_start: monday_of(series_start),
                slot: 0,
            },
            Frequency::Monthly => Cursor::Monthly { step: 0 },
        };
        Self {
            rule,
            series_start,
            days,
            target_day: rule.by_month_day().unwrap_or_else(|| series_start.day()),
            emitted: 0,
            cursor,
            done: false,
        }
    }

    /// Positions the stream at the first candidate that could fall on or
    /// after `from`, advancing in closed form instead of enumerating every
    /// prior occurrence. Candidates already consumed by the skip still
    /// count toward a `Count` terminator.
    pub fn starting_no_earlier_than(
        rule: &'r RecurrenceRule,
        series_start: NaiveDate,
        from: NaiveDate,
    ) -> Self {
        let mut occ = Self::new(rule, series_start);
        if from <= series_start {
            return occ;
        }
        let interval = i64::from(rule.interval());
        match &mut occ.cursor {
            Cursor::Daily { next } => {
                let gap = (from - *next).num_days();
                if gap > 0 {
                    let steps = (gap + interval - 1) / interval;
                    *next += Duration::days(steps * interval);
                    occ.emitted = u32::try_from(steps).unwrap_or(u32::MAX);
                }
            }
            Cursor::Weekly { week_start, slot: _ } => {
                let stride = 7 * interval;
                let weeks_ahead = (from - *week_start).num_days() / stride;
                if weeks_ahead > 0 {
                    let dropped_in_anchor_week = occ
                        .days
                        .iter()
                        .filter(|d| {
                            *week_start + Duration::days(i64::from(weekday_rank(**d)))
                                < series_start
                        })
                        .count();
                    let skipped = weeks_ahead * occ.days.len() as i64
                        - dropped_in_anchor_week as i64;
                    *week_start += Duration::days(weeks_ahead * stride);
                    occ.emitted = u32::try_from(skipped.max(0)).unwrap_or(u32::MAX);
                }
            }
            Cursor::Monthly { step } => {
                let months = months_between(series_start, from);
                let steps = months / interval;
                if steps > 0 {
                    let dropped_first = match month_candidate(series_start, 0, occ.target_day) {
                        Some(candidate) if candidate < series_start => 1,
                        _ => 0,
                    };
                    *step = steps;
                    occ.emitted = u32::try_from(steps - dropped_first).unwrap_or(u32::MAX);
                }
            }
        }
        occ
    }

    /// Raw candidates produced so far, including any consumed by the
    /// closed-form skip. The index of the last yielded candidate is
    /// `emitted() - 1`.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    fn advance(&mut self) -> Option<NaiveDate> {
        match &mut self.cursor {
            Cursor::Daily { next } => {
                let candidate = *next;
                *next += Duration::days(i64::from(self.rule.interval()));
                Some(candidate)
            }
            Cursor::Weekly { week_start, slot } => {
                let day = self.days[*slot];
                let candidate = *week_start + Duration::days(i64::from(weekday_rank(day)));
                *slot += 1;
                if *slot == self.days.len() {
                    *slot = 0;
                    *week_start += Duration::days(7 * i64::from(self.rule.interval()));
                }
                Some(candidate)
            }
            Cursor::Monthly { step } => {
                let months = *step * i64::from(self.rule.interval());
                *step += 1;
                month_candidate(self.series_start, months, self.target_day)
            }
        }
    }
}

impl Iterator for Occurrences<'_> {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        if self.done {
            return None;
        }
        loop {
            let Some(candidate) = self.advance() else {
                self.done = true;
                return None;
            };
            // Candidates in the anchor week/month that precede the series
            // start are not occurrences and do not count.
            if candidate < self.series_start {
                continue;
            }
            match self.rule.terminator() {
                Terminator::Count(n) if self.emitted >= n => {
                    self.done = true;
                    return None;
                }
                Terminator::Until(until) if candidate > until => {
                    self.done = true;
                    return None;
                }
                _ => {}
            }
            self.emitted += 1;
            return Some(candidate);
        }
    }
}

/// Expands a series over `[range.start, range.end)` and applies exceptions:
/// `Deleted` removes the date, `Modified` patches the base payload, absent
/// dates inherit the base payload unchanged. Output is strictly ascending
/// with no duplicates.
pub fn expand(
    series: &Series,
    range: DateRange,
    exceptions: &[ExceptionRecord],
) -> Vec<VirtualInstance> {
    let by_date: HashMap<NaiveDate, &ExceptionRecord> =
        exceptions.iter().map(|e| (e.date, e)).collect();

    let mut instances = Vec::new();
    let occurrences =
        Occurrences::starting_no_earlier_than(&series.rule, series.start, range.start);
    for date in occurrences {
        if date >= range.end {
            break;
        }
        if date < range.start {
            continue;
        }
        match by_date.get(&date).map(|e| &e.kind) {
            Some(ExceptionKind::Deleted) => continue,
            Some(ExceptionKind::Modified(patch)) => instances.push(VirtualInstance {
                series_id: series.id,
                date,
                payload: series.payload.apply(patch),
                modified: true,
            }),
            None => instances.push(VirtualInstance {
                series_id: series.id,
                date,
                payload: series.payload.clone(),
                modified: false,
            }),
        }
    }
    instances
}

/// Whether `date` is a raw occurrence of the rule (exceptions not applied).
pub fn occurs_on(rule: &RecurrenceRule, series_start: NaiveDate, date: NaiveDate) -> bool {
    occurrence_index(rule, series_start, date).is_some()
}

/// Zero-based index of `date` in the raw candidate stream, or `None` when
/// the rule never lands on it. The index equals the number of occurrences
/// consumed strictly before `date`.
pub fn occurrence_index(
    rule: &RecurrenceRule,
    series_start: NaiveDate,
    date: NaiveDate,
) -> Option<u32> {
    let mut occurrences = Occurrences::starting_no_earlier_than(rule, series_start, date);
    while let Some(candidate) = occurrences.next() {
        if candidate == date {
            return Some(occurrences.emitted() - 1);
        }
        if candidate > date {
            return None;
        }
    }
    None
}

/// First non-deleted occurrence strictly after `after`, or `None` when the
/// series has ended.
pub fn next_occurrence_after(
    series: &Series,
    after: NaiveDate,
    exceptions: &[ExceptionRecord],
) -> Option<NaiveDate> {
    let deleted: Vec<NaiveDate> = exceptions
        .iter()
        .filter(|e| matches!(e.kind, ExceptionKind::Deleted))
        .map(|e| e.date)
        .collect();
    let from = after + Duration::days(1);
    Occurrences::starting_no_earlier_than(&series.rule, series.start, from)
        .find(|d| *d > after && !deleted.contains(d))
}

/// Bounded lookahead: up to `limit` visible instances from `from` onward.
pub fn preview(
    series: &Series,
    from: NaiveDate,
    limit: usize,
    exceptions: &[ExceptionRecord],
) -> Vec<VirtualInstance> {
    let by_date: HashMap<NaiveDate, &ExceptionRecord> =
        exceptions.iter().map(|e| (e.date, e)).collect();

    let mut instances = Vec::with_capacity(limit);
    let occurrences = Occurrences::starting_no_earlier_than(&series.rule, series.start, from);
    for date in occurrences {
        if instances.len() == limit {
            break;
        }
        if date < from {
            continue;
        }
        match by_date.get(&date).map(|e| &e.kind) {
            Some(ExceptionKind::Deleted) => continue,
            Some(ExceptionKind::Modified(patch)) => instances.push(VirtualInstance {
                series_id: series.id,
                date,
                payload: series.payload.apply(patch),
                modified: true,
            }),
            None => instances.push(VirtualInstance {
                series_id: series.id,
                date,
                payload: series.payload.clone(),
                modified: false,
            }),
        }
    }
    instances
}
