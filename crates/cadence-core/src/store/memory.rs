//! In-memory reference store.
//!
//! Backs the CLI plan file and the test suites. Honors the collaborator
//! contract exactly: each call is atomic on its own, `delete_series`
//! cascades exceptions, and nothing here coordinates multi-record
//! mutations.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{DateRange, ExceptionRecord, PhaseSegment, Project, Series};
use crate::store::{ActualWork, ExceptionStore, ProjectStore, SeriesStore};

#[derive(Default)]
struct Tables {
    projects: HashMap<Uuid, Project>,
    series: HashMap<Uuid, Series>,
    exceptions: HashMap<(Uuid, NaiveDate), ExceptionRecord>,
    segments: HashMap<Uuid, PhaseSegment>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all_projects(&self) -> Vec<Project> {
        let tables = self.tables.read().await;
        let mut projects: Vec<Project> = tables.projects.values().cloned().collect();
        projects.sort_by_key(|p| p.id);
        projects
    }

    pub async fn all_series(&self) -> Vec<Series> {
        let tables = self.tables.read().await;
        let mut series: Vec<Series> = tables.series.values().cloned().collect();
        series.sort_by_key(|s| s.id);
        series
    }

    pub async fn all_exceptions(&self) -> Vec<ExceptionRecord> {
        let tables = self.tables.read().await;
        let mut exceptions: Vec<ExceptionRecord> =
            tables.exceptions.values().cloned().collect();
        exceptions.sort_by_key(|e| (e.series_id, e.date));
        exceptions
    }

    pub async fn all_segments(&self) -> Vec<PhaseSegment> {
        let tables = self.tables.read().await;
        let mut segments: Vec<PhaseSegment> = tables.segments.values().cloned().collect();
        segments.sort_by_key(|s| (s.project_id, s.position));
        segments
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn load_project(&self, id: Uuid) -> Result<Option<Project>, CoreError> {
        Ok(self.tables.read().await.projects.get(&id).cloned())
    }

    async fn save_project(&self, project: Project) -> Result<(), CoreError> {
        self.tables.write().await.projects.insert(project.id, project);
        Ok(())
    }

    async fn list_segments(&self, project_id: Uuid) -> Result<Vec<PhaseSegment>, CoreError> {
        let tables = self.tables.read().await;
        let mut segments: Vec<PhaseSegment> = tables
            .segments
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        segments.sort_by_key(|s| s.position);
        Ok(segments)
    }

    async fn insert_segment(&self, segment: PhaseSegment) -> Result<(), CoreError> {
        self.tables.write().await.segments.insert(segment.id, segment);
        Ok(())
    }

    async fn delete_segment(&self, id: Uuid) -> Result<(), CoreError> {
        self.tables.write().await.segments.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl SeriesStore for MemoryStore {
    async fn load_series(&self, id: Uuid) -> Result<Option<Series>, CoreError> {
        Ok(self.tables.read().await.series.get(&id).cloned())
    }

    async fn save_series(&self, series: Series) -> Result<(), CoreError> {
        self.tables.write().await.series.insert(series.id, series);
        Ok(())
    }

    async fn delete_series(&self, id: Uuid) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        if tables.series.remove(&id).is_none() {
            return Err(CoreError::NotFound(format!("series {id}")));
        }
        tables.exceptions.retain(|(series_id, _), _| *series_id != id);
        Ok(())
    }

    async fn series_for_project(&self, project_id: Uuid) -> Result<Vec<Series>, CoreError> {
        let tables = self.tables.read().await;
        let mut series: Vec<Series> = tables
            .series
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        series.sort_by_key(|s| s.id);
        Ok(series)
    }
}

#[async_trait]
impl ExceptionStore for MemoryStore {
    async fn load_exceptions(
        &self,
        series_id: Uuid,
        range: Option<DateRange>,
    ) -> Result<Vec<ExceptionRecord>, CoreError> {
        let tables = self.tables.read().await;
        let mut exceptions: Vec<ExceptionRecord> = tables
            .exceptions
            .values()
            .filter(|e| e.series_id == series_id)
            .filter(|e| range.map_or(true, |r| r.contains(e.date)))
            .cloned()
            .collect();
        exceptions.sort_by_key(|e| e.date);
        Ok(exceptions)
    }

    async fn upsert_exception(&self, record: ExceptionRecord) -> Result<(), CoreError> {
        self.tables
            .write()
            .await
            .exceptions
            .insert((record.series_id, record.date), record);
        Ok(())
    }

    async fn delete_exception(&self, series_id: Uuid, date: NaiveDate) -> Result<(), CoreError> {
        self.tables.write().await.exceptions.remove(&(series_id, date));
        Ok(())
    }
}

/// In-memory actual-work source keyed per project and date.
#[derive(Default)]
pub struct RecordedWork {
    entries: RwLock<HashMap<(Uuid, NaiveDate), f64>>,
}

impl RecordedWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, project_id: Uuid, date: NaiveDate, hours: f64) {
        let mut entries = self.entries.write().await;
        *entries.entry((project_id, date)).or_insert(0.0) += hours;
    }
}

#[async_trait]
impl ActualWork for RecordedWork {
    async fn completed_hours(
        &self,
        project_id: Uuid,
        range: DateRange,
    ) -> Result<HashMap<NaiveDate, f64>, CoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|((pid, date), _)| *pid == project_id && range.contains(*date))
            .map(|((_, date), hours)| (*date, *hours))
            .collect())
    }
}
