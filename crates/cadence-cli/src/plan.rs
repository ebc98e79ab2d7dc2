//! The JSON plan file: the CLI's whole world in one document.
//!
//! Commands load the plan into an in-memory store, run the real engine
//! against it, and write the result back. The file is meant to be edited
//! by hand too, so everything serializes to plain JSON with hyphenated
//! UUIDs and ISO dates.

use anyhow::{Context, Result};
use cadence_core::error::CoreError;
use cadence_core::models::{ExceptionRecord, PhaseSegment, Project, Series};
use cadence_core::store::memory::{MemoryStore, RecordedWork};
use cadence_core::store::{ExceptionStore, ProjectStore, SeriesStore};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Plan {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub segments: Vec<PhaseSegment>,
    #[serde(default)]
    pub exceptions: Vec<ExceptionRecord>,
    #[serde(default)]
    pub actuals: Vec<ActualEntry>,
}

/// One recorded chunk of completed work.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActualEntry {
    pub project_id: Uuid,
    pub date: NaiveDate,
    pub hours: f64,
}

impl Plan {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file '{}'", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Plan file '{}' is not valid", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write plan file '{}'", path.display()))
    }

    /// Loads the plan into a fresh store plus the recorded-work ledger.
    pub async fn seed(&self) -> Result<(Arc<MemoryStore>, Arc<RecordedWork>), CoreError> {
        let store = Arc::new(MemoryStore::new());
        for project in &self.projects {
            store.save_project(project.clone()).await?;
        }
        for series in &self.series {
            store.save_series(series.clone()).await?;
        }
        for segment in &self.segments {
            store.insert_segment(segment.clone()).await?;
        }
        for exception in &self.exceptions {
            store.upsert_exception(exception.clone()).await?;
        }

        let work = Arc::new(RecordedWork::new());
        for entry in &self.actuals {
            work.record(entry.project_id, entry.date, entry.hours).await;
        }
        Ok((store, work))
    }

    /// Rebuilds the plan from the store after a mutation. Actuals are not
    /// touched by any command, so the originals are carried through.
    pub async fn snapshot(store: &MemoryStore, actuals: Vec<ActualEntry>) -> Self {
        Self {
            projects: store.all_projects().await,
            series: store.all_series().await,
            segments: store.all_segments().await,
            exceptions: store.all_exceptions().await,
            actuals,
        }
    }
}
