//! Day-estimate calculation.
//!
//! Turns a project's allocation records into a per-day time budget:
//! milestone-series occurrences and split-phase segments each become an
//! allocation unit, a unit's hours are spread evenly over its active days,
//! and hours already covered by actual recorded work are subtracted so
//! nothing is double counted. Everything here is a pure computation over
//! caller-supplied inputs; it produces no persistent state and can be
//! cancelled at any point.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::CoreError;
use crate::expand::expand;
use crate::models::{DateRange, DayEstimate, PhaseMode, SeriesKind};
use crate::store::{ActualWork, Store, WorkingCalendar};

/// Non-fatal signal that recorded work on a date exceeded the forecast
/// demand; the estimate is clamped at zero and the overshoot surfaced.
#[derive(Debug, Clone, PartialEq)]
pub struct OverAllocatedWarning {
    pub project_id: Uuid,
    pub date: NaiveDate,
    pub demanded: f64,
    pub actual: f64,
}

/// Result of one forecast run: estimates ordered by date (then by source
/// milestone for determinism) plus any over-allocation warnings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayForecast {
    pub estimates: Vec<DayEstimate>,
    pub warnings: Vec<OverAllocatedWarning>,
}

impl DayForecast {
    /// Total forecast hours on one date across all sources.
    pub fn hours_on(&self, date: NaiveDate) -> f64 {
        self.estimates
            .iter()
            .filter(|e| e.date == date)
            .map(|e| e.hours_needed)
            .sum()
    }
}

/// One allocation to spread: a milestone occurrence (single-day span) or a
/// split-phase segment (its own date span).
struct AllocationUnit {
    source: Uuid,
    span_start: NaiveDate,
    span_end: NaiveDate,
    hours: f64,
}

pub struct DayEstimateCalculator<S> {
    store: Arc<S>,
    actuals: Arc<dyn ActualWork>,
    calendar: Option<Arc<dyn WorkingCalendar>>,
}

impl<S> Clone for DayEstimateCalculator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            actuals: Arc::clone(&self.actuals),
            calendar: self.calendar.clone(),
        }
    }
}

impl<S: Store + 'static> DayEstimateCalculator<S> {
    pub fn new(store: Arc<S>, actuals: Arc<dyn ActualWork>) -> Self {
        Self {
            store,
            actuals,
            calendar: None,
        }
    }

    /// Supplies the working-day calendar; without one every day is active.
    pub fn with_calendar(mut self, calendar: Arc<dyn WorkingCalendar>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Forecast for one project over `[range.start, range.end)`.
    pub async fn day_estimates(
        &self,
        project_id: Uuid,
        range: DateRange,
        cancel: &CancellationToken,
    ) -> Result<DayForecast, CoreError> {
        let project = self
            .store
            .load_project(project_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("project {project_id}")))?;

        let mut units: Vec<AllocationUnit> = Vec::new();
        match project.mode {
            PhaseMode::NoExplicitPhases => {}
            PhaseMode::SplitPhases => {
                for segment in self.store.list_segments(project_id).await? {
                    if cancel.is_cancelled() {
                        return Err(CoreError::Cancelled);
                    }
                    units.push(AllocationUnit {
                        source: segment.id,
                        span_start: segment.starts_on,
                        span_end: segment.ends_on,
                        hours: segment.hours,
                    });
                }
            }
            PhaseMode::RecurringTemplate => {
                for series in self.store.series_for_project(project_id).await? {
                    if series.kind != SeriesKind::Milestone {
                        continue;
                    }
                    if cancel.is_cancelled() {
                        return Err(CoreError::Cancelled);
                    }
                    let exceptions =
                        self.store.load_exceptions(series.id, Some(range)).await?;
                    for instance in expand(&series, range, &exceptions) {
                        units.push(AllocationUnit {
                            source: series.id,
                            span_start: instance.date,
                            span_end: instance.date,
                            hours: instance.payload.hours.unwrap_or(0.0),
                        });
                    }
                }
            }
        }

        let actuals = self.actuals.completed_hours(project_id, range).await?;
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let forecast = spread_and_settle(
            project_id,
            &units,
            range,
            self.calendar.as_deref(),
            &actuals,
        );
        debug!(
            %project_id,
            estimates = forecast.estimates.len(),
            warnings = forecast.warnings.len(),
            "forecast computed"
        );
        Ok(forecast)
    }

    /// Forecasts many independent projects in parallel; expansion and
    /// settlement are pure, so fan-out is safe.
    pub async fn forecast_projects(
        &self,
        project_ids: Vec<Uuid>,
        range: DateRange,
        cancel: &CancellationToken,
    ) -> Result<HashMap<Uuid, DayForecast>, CoreError> {
        let mut tasks: JoinSet<Result<(Uuid, DayForecast), CoreError>> = JoinSet::new();
        for project_id in project_ids {
            let calculator = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let forecast = calculator
                    .day_estimates(project_id, range, &cancel)
                    .await?;
                Ok((project_id, forecast))
            });
        }

        let mut forecasts = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (project_id, forecast) = joined
                .map_err(|e| CoreError::Store(format!("forecast task panicked: {e}")))??;
            forecasts.insert(project_id, forecast);
        }
        Ok(forecasts)
    }
}

/// Active days of a span under the calendar; a span whose days are all
/// non-working falls back to its full span so hours are never lost.
fn active_days(
    span_start: NaiveDate,
    span_end: NaiveDate,
    calendar: Option<&dyn WorkingCalendar>,
) -> Vec<NaiveDate> {
    let all = DateRange::new(span_start, span_end + chrono::Duration::days(1));
    let active: Vec<NaiveDate> = match calendar {
        Some(cal) => all.iter_days().filter(|d| cal.is_working_day(*d)).collect(),
        None => all.iter_days().collect(),
    };
    if active.is_empty() {
        all.iter_days().collect()
    } else {
        active
    }
}

fn spread_and_settle(
    project_id: Uuid,
    units: &[AllocationUnit],
    range: DateRange,
    calendar: Option<&dyn WorkingCalendar>,
    actuals: &HashMap<NaiveDate, f64>,
) -> DayForecast {
    // (date, source) -> demanded hours
    let mut demand: HashMap<(NaiveDate, Uuid), f64> = HashMap::new();
    for unit in units {
        let days = active_days(unit.span_start, unit.span_end, calendar);
        let per_day = unit.hours / days.len() as f64;
        for day in days {
            if range.contains(day) {
                *demand.entry((day, unit.source)).or_insert(0.0) += per_day;
            }
        }
    }

    let mut keys: Vec<(NaiveDate, Uuid)> = demand.keys().copied().collect();
    keys.sort();

    let mut estimates = Vec::with_capacity(keys.len());
    let mut warnings = Vec::new();
    let mut dates: Vec<NaiveDate> = keys.iter().map(|(d, _)| *d).collect();
    dates.dedup();

    for date in dates {
        let day_keys: Vec<&(NaiveDate, Uuid)> =
            keys.iter().filter(|(d, _)| *d == date).collect();
        let demanded: f64 = day_keys.iter().map(|k| demand[*k]).sum();
        let actual = actuals.get(&date).copied().unwrap_or(0.0);
        if actual > demanded && demanded > 0.0 {
            warnings.push(OverAllocatedWarning {
                project_id,
                date,
                demanded,
                actual,
            });
        }

        // Subtract recorded work greedily across the date's sources, in
        // output order, clamping at zero.
        let mut remaining_actual = actual;
        for key in day_keys {
            let demanded_here = demand[key];
            let covered = remaining_actual.min(demanded_here);
            remaining_actual -= covered;
            estimates.push(DayEstimate {
                date,
                hours_needed: demanded_here - covered,
                milestone_id: key.1,
            });
        }
    }

    DayForecast {
        estimates,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PhaseSegment;
    use crate::store::WorkDays;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn unit(source: Uuid, start: NaiveDate, end: NaiveDate, hours: f64) -> AllocationUnit {
        AllocationUnit {
            source,
            span_start: start,
            span_end: end,
            hours,
        }
    }

    #[test]
    fn segment_hours_conserved_over_span() {
        let segment = PhaseSegment {
            id: Uuid::now_v7(),
            project_id: Uuid::now_v7(),
            title: "Design".to_string(),
            starts_on: date(2025, 3, 3),
            ends_on: date(2025, 3, 7),
            hours: 10.0,
            position: 0,
        };
        let units = vec![unit(segment.id, segment.starts_on, segment.ends_on, segment.hours)];
        let range = DateRange::new(date(2025, 3, 1), date(2025, 4, 1));
        let forecast =
            spread_and_settle(segment.project_id, &units, range, None, &HashMap::new());
        let total: f64 = forecast.estimates.iter().map(|e| e.hours_needed).sum();
        assert!((total - 10.0).abs() < 1e-9);
        assert!(forecast
            .estimates
            .iter()
            .all(|e| (e.hours_needed - 2.0).abs() < 1e-9));
    }

    #[test]
    fn non_working_days_are_excluded_from_the_spread() {
        let source = Uuid::now_v7();
        // Mon 2025-03-03 through Sun 2025-03-09: five working days.
        let units = vec![unit(source, date(2025, 3, 3), date(2025, 3, 9), 10.0)];
        let range = DateRange::new(date(2025, 3, 1), date(2025, 4, 1));
        let calendar = WorkDays::weekdays();
        let forecast = spread_and_settle(
            Uuid::now_v7(),
            &units,
            range,
            Some(&calendar),
            &HashMap::new(),
        );
        assert_eq!(forecast.estimates.len(), 5);
        assert!(forecast
            .estimates
            .iter()
            .all(|e| (e.hours_needed - 2.0).abs() < 1e-9));
        assert!(forecast.hours_on(date(2025, 3, 8)) == 0.0);
    }

    #[test]
    fn all_non_working_span_falls_back_to_full_span() {
        let source = Uuid::now_v7();
        // Sat+Sun only.
        let units = vec![unit(source, date(2025, 3, 8), date(2025, 3, 9), 4.0)];
        let range = DateRange::new(date(2025, 3, 1), date(2025, 4, 1));
        let calendar = WorkDays::weekdays();
        let forecast = spread_and_settle(
            Uuid::now_v7(),
            &units,
            range,
            Some(&calendar),
            &HashMap::new(),
        );
        let total: f64 = forecast.estimates.iter().map(|e| e.hours_needed).sum();
        assert!((total - 4.0).abs() < 1e-9);
    }

    #[test]
    fn actual_work_is_subtracted_and_clamped() {
        let source = Uuid::now_v7();
        let project_id = Uuid::now_v7();
        let units = vec![unit(source, date(2025, 3, 7), date(2025, 3, 7), 2.0)];
        let range = DateRange::new(date(2025, 3, 1), date(2025, 4, 1));

        let mut actuals = HashMap::new();
        actuals.insert(date(2025, 3, 7), 1.5);
        let forecast = spread_and_settle(project_id, &units, range, None, &actuals);
        assert!((forecast.hours_on(date(2025, 3, 7)) - 0.5).abs() < 1e-9);
        assert!(forecast.warnings.is_empty());

        actuals.insert(date(2025, 3, 7), 5.0);
        let forecast = spread_and_settle(project_id, &units, range, None, &actuals);
        assert_eq!(forecast.hours_on(date(2025, 3, 7)), 0.0);
        assert_eq!(forecast.warnings.len(), 1);
        assert_eq!(forecast.warnings[0].date, date(2025, 3, 7));
        assert!((forecast.warnings[0].actual - 5.0).abs() < 1e-9);
    }

    #[test]
    fn estimates_are_ordered_by_date() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let units = vec![
            unit(b, date(2025, 3, 10), date(2025, 3, 10), 1.0),
            unit(a, date(2025, 3, 4), date(2025, 3, 5), 2.0),
        ];
        let range = DateRange::new(date(2025, 3, 1), date(2025, 4, 1));
        let forecast =
            spread_and_settle(Uuid::now_v7(), &units, range, None, &HashMap::new());
        let dates: Vec<NaiveDate> = forecast.estimates.iter().map(|e| e.date).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
    }
}
