//! Persistence and read-only collaborator contracts.
//!
//! Every call is atomic at the single-record level only; multi-record
//! atomicity (series splits, bulk clears, mode transitions) belongs to the
//! editor and guard, which compensate explicitly on partial failure.

use async_trait::async_trait;
use chrono::{NaiveDate, Weekday};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{DateRange, ExceptionRecord, PhaseSegment, Project, Series};

pub mod memory;

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn load_project(&self, id: Uuid) -> Result<Option<Project>, CoreError>;
    async fn save_project(&self, project: Project) -> Result<(), CoreError>;
    /// Segments of a split-phase project, ordered by position.
    async fn list_segments(&self, project_id: Uuid) -> Result<Vec<PhaseSegment>, CoreError>;
    async fn insert_segment(&self, segment: PhaseSegment) -> Result<(), CoreError>;
    async fn delete_segment(&self, id: Uuid) -> Result<(), CoreError>;
}

#[async_trait]
pub trait SeriesStore: Send + Sync {
    async fn load_series(&self, id: Uuid) -> Result<Option<Series>, CoreError>;
    /// Insert-or-replace by id.
    async fn save_series(&self, series: Series) -> Result<(), CoreError>;
    /// Deletes the series and cascades its exception records.
    async fn delete_series(&self, id: Uuid) -> Result<(), CoreError>;
    async fn series_for_project(&self, project_id: Uuid) -> Result<Vec<Series>, CoreError>;
}

#[async_trait]
pub trait ExceptionStore: Send + Sync {
    /// Exceptions of a series, optionally limited to a window, ordered by
    /// date.
    async fn load_exceptions(
        &self,
        series_id: Uuid,
        range: Option<DateRange>,
    ) -> Result<Vec<ExceptionRecord>, CoreError>;
    /// Insert-or-replace by `(series_id, date)`.
    async fn upsert_exception(&self, record: ExceptionRecord) -> Result<(), CoreError>;
    /// Succeeds even when no record exists for the key.
    async fn delete_exception(&self, series_id: Uuid, date: NaiveDate) -> Result<(), CoreError>;
}

/// Composed store contract, the unit the editor, guard, and calculator are
/// generic over.
pub trait Store: ProjectStore + SeriesStore + ExceptionStore {}

impl<T: ProjectStore + SeriesStore + ExceptionStore> Store for T {}

/// Read-only collaborator supplying completed/actual hours per date for a
/// project, used by the day-estimate calculator to avoid double counting.
#[async_trait]
pub trait ActualWork: Send + Sync {
    async fn completed_hours(
        &self,
        project_id: Uuid,
        range: DateRange,
    ) -> Result<HashMap<NaiveDate, f64>, CoreError>;
}

/// Which civil dates count as working days when spreading hours.
pub trait WorkingCalendar: Send + Sync {
    fn is_working_day(&self, date: NaiveDate) -> bool;
}

/// Calendar with no non-working days.
#[derive(Debug, Clone, Copy, Default)]
pub struct EveryDay;

impl WorkingCalendar for EveryDay {
    fn is_working_day(&self, _date: NaiveDate) -> bool {
        true
    }
}

/// Calendar restricted to a fixed weekday set.
#[derive(Debug, Clone)]
pub struct WorkDays {
    days: Vec<Weekday>,
}

impl WorkDays {
    pub fn new(days: impl IntoIterator<Item = Weekday>) -> Self {
        Self {
            days: days.into_iter().collect(),
        }
    }

    /// Monday through Friday.
    pub fn weekdays() -> Self {
        Self::new([
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ])
    }
}

impl WorkingCalendar for WorkDays {
    fn is_working_day(&self, date: NaiveDate) -> bool {
        use chrono::Datelike;
        self.days.contains(&date.weekday())
    }
}
