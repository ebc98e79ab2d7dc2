//! Phase-mode exclusivity.
//!
//! A project plans its phases in exactly one way at a time: split segments,
//! a recurring template, or neither. The mode tag on [`Project`] is the
//! single source of truth; this module refuses transitions while records of
//! the other representation still exist and offers explicit compensated
//! clears instead of silent cleanup.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{ExceptionRecord, PhaseMode, Project, Series};
use crate::store::Store;

/// Read-only cross-check of a project's mode tag against its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanReport {
    pub project_id: Uuid,
    pub mode: PhaseMode,
    /// Series present while the mode is not `RecurringTemplate`.
    pub stray_series: Vec<Uuid>,
    /// Segments present while the mode is not `SplitPhases`.
    pub stray_segments: Vec<Uuid>,
}

impl OrphanReport {
    pub fn is_consistent(&self) -> bool {
        self.stray_series.is_empty() && self.stray_segments.is_empty()
    }
}

pub struct ExclusivityGuard<S> {
    store: Arc<S>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl<S: Store> ExclusivityGuard<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Mode mutations on one project serialize on this lock.
    async fn project_lock(&self, project_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        // An entry whose only handle is the registry's has no holder and no
        // waiters; evicting here keeps the map bounded by concurrent calls.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(project_id).or_default())
    }

    #[cfg(test)]
    async fn lock_count(&self) -> usize {
        self.locks.lock().await.len()
    }

    async fn require_project(&self, project_id: Uuid) -> Result<Project, CoreError> {
        self.store
            .load_project(project_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("project {project_id}")))
    }

    /// Retags the project, refusing while records of a different mode
    /// exist. Transitioning to the current mode is a no-op.
    pub async fn request_transition(
        &self,
        project_id: Uuid,
        target: PhaseMode,
    ) -> Result<Project, CoreError> {
        let lock = self.project_lock(project_id).await;
        let _guard = lock.lock().await;

        let mut project = self.require_project(project_id).await?;
        if project.mode == target {
            return Ok(project);
        }

        let series = self.store.series_for_project(project_id).await?;
        let segments = self.store.list_segments(project_id).await?;
        let blocking = match target {
            PhaseMode::SplitPhases if !series.is_empty() => {
                Some(format!("{} recurring-template series", series.len()))
            }
            PhaseMode::RecurringTemplate if !segments.is_empty() => {
                Some(format!("{} split-phase segments", segments.len()))
            }
            PhaseMode::NoExplicitPhases if !series.is_empty() || !segments.is_empty() => {
                Some(format!(
                    "{} series and {} segments",
                    series.len(),
                    segments.len()
                ))
            }
            _ => None,
        };
        if let Some(conflicting) = blocking {
            return Err(CoreError::ConflictingMode {
                project_id,
                conflicting,
            });
        }

        project.mode = target;
        self.store.save_project(project.clone()).await?;
        debug!(%project_id, mode = %target, "phase mode changed");
        Ok(project)
    }

    /// Deletes every split-phase segment of the project as one compensated
    /// batch. The mode tag is untouched.
    pub async fn clear_split_phases(&self, project_id: Uuid) -> Result<usize, CoreError> {
        let lock = self.project_lock(project_id).await;
        let _guard = lock.lock().await;

        self.require_project(project_id).await?;
        let segments = self.store.list_segments(project_id).await?;
        let mut removed = Vec::with_capacity(segments.len());
        for segment in &segments {
            if let Err(cause) = self.store.delete_segment(segment.id).await {
                return Err(self.roll_back_segments(project_id, &removed, cause).await);
            }
            removed.push(segment.clone());
        }
        Ok(removed.len())
    }

    /// Deletes every series of the project (exceptions cascade) as one
    /// compensated batch. The mode tag is untouched.
    pub async fn clear_recurring_template(&self, project_id: Uuid) -> Result<usize, CoreError> {
        let lock = self.project_lock(project_id).await;
        let _guard = lock.lock().await;

        self.require_project(project_id).await?;
        let series = self.store.series_for_project(project_id).await?;

        // Snapshot everything up front so a mid-batch failure can restore.
        let mut snapshots: Vec<(Series, Vec<ExceptionRecord>)> =
            Vec::with_capacity(series.len());
        for s in series {
            let exceptions = self.store.load_exceptions(s.id, None).await?;
            snapshots.push((s, exceptions));
        }

        let mut removed: Vec<&(Series, Vec<ExceptionRecord>)> = Vec::new();
        for snapshot in &snapshots {
            if let Err(cause) = self.store.delete_series(snapshot.0.id).await {
                return Err(self.roll_back_series(project_id, &removed, cause).await);
            }
            removed.push(snapshot);
        }
        Ok(removed.len())
    }

    /// Reports records that contradict the project's mode tag. Read-only.
    pub async fn detect_orphans(&self, project_id: Uuid) -> Result<OrphanReport, CoreError> {
        let project = self.require_project(project_id).await?;
        let series = self.store.series_for_project(project_id).await?;
        let segments = self.store.list_segments(project_id).await?;

        let stray_series = if project.mode == PhaseMode::RecurringTemplate {
            Vec::new()
        } else {
            series.iter().map(|s| s.id).collect()
        };
        let stray_segments = if project.mode == PhaseMode::SplitPhases {
            Vec::new()
        } else {
            segments.iter().map(|s| s.id).collect()
        };

        Ok(OrphanReport {
            project_id,
            mode: project.mode,
            stray_series,
            stray_segments,
        })
    }

    async fn roll_back_segments(
        &self,
        project_id: Uuid,
        removed: &[crate::models::PhaseSegment],
        cause: CoreError,
    ) -> CoreError {
        warn!(%project_id, %cause, "segment clear failed mid-batch, rolling back");
        let mut affected = Vec::new();
        for segment in removed {
            if self.store.insert_segment(segment.clone()).await.is_err() {
                affected.push(segment.id);
            }
        }
        if affected.is_empty() {
            CoreError::PartialMutation {
                entity_id: project_id,
                reason: format!("segment clear failed: {cause}"),
                rolled_back: true,
            }
        } else {
            CoreError::InconsistentState { affected }
        }
    }

    async fn roll_back_series(
        &self,
        project_id: Uuid,
        removed: &[&(Series, Vec<ExceptionRecord>)],
        cause: CoreError,
    ) -> CoreError {
        warn!(%project_id, %cause, "series clear failed mid-batch, rolling back");
        let mut affected = Vec::new();
        for (series, exceptions) in removed.iter().map(|r| (&r.0, &r.1)) {
            if self.store.save_series(series.clone()).await.is_err() {
                affected.push(series.id);
                continue;
            }
            for exception in exceptions {
                if self.store.upsert_exception(exception.clone()).await.is_err() {
                    affected.push(series.id);
                    break;
                }
            }
        }
        if affected.is_empty() {
            CoreError::PartialMutation {
                entity_id: project_id,
                reason: format!("series clear failed: {cause}"),
                rolled_back: true,
            }
        } else {
            CoreError::InconsistentState { affected }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OccurrencePayload, PhaseSegment, SeriesKind};
    use crate::rule::RuleBuilder;
    use crate::store::memory::MemoryStore;
    use crate::store::{ExceptionStore, ProjectStore, SeriesStore};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn project_with_mode(store: &MemoryStore, mode: PhaseMode) -> Project {
        let mut project = Project::new("Thesis");
        project.mode = mode;
        store.save_project(project.clone()).await.unwrap();
        project
    }

    fn segment_for(project_id: Uuid) -> PhaseSegment {
        PhaseSegment {
            id: Uuid::now_v7(),
            project_id,
            title: "Research".to_string(),
            starts_on: date(2025, 3, 3),
            ends_on: date(2025, 3, 14),
            hours: 20.0,
            position: 0,
        }
    }

    fn series_for(project_id: Uuid) -> Series {
        let rule = RuleBuilder::new(crate::rule::Frequency::Weekly)
            .build()
            .unwrap();
        Series::new(
            project_id,
            SeriesKind::Milestone,
            date(2025, 3, 7),
            rule,
            OccurrencePayload::milestone("Weekly check-in", 2.0),
        )
    }

    #[tokio::test]
    async fn transition_blocked_by_other_modes_records() {
        let store = Arc::new(MemoryStore::new());
        let guard = ExclusivityGuard::new(Arc::clone(&store));
        let project = project_with_mode(&store, PhaseMode::SplitPhases).await;
        store.insert_segment(segment_for(project.id)).await.unwrap();

        let err = guard
            .request_transition(project.id, PhaseMode::RecurringTemplate)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ConflictingMode { .. }));
    }

    #[tokio::test]
    async fn transition_to_none_requires_both_kinds_absent() {
        let store = Arc::new(MemoryStore::new());
        let guard = ExclusivityGuard::new(Arc::clone(&store));
        let project = project_with_mode(&store, PhaseMode::RecurringTemplate).await;
        store.save_series(series_for(project.id)).await.unwrap();

        let err = guard
            .request_transition(project.id, PhaseMode::NoExplicitPhases)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ConflictingMode { .. }));
    }

    #[tokio::test]
    async fn clear_then_transition_succeeds() {
        let store = Arc::new(MemoryStore::new());
        let guard = ExclusivityGuard::new(Arc::clone(&store));
        let project = project_with_mode(&store, PhaseMode::SplitPhases).await;
        store.insert_segment(segment_for(project.id)).await.unwrap();
        store.insert_segment(segment_for(project.id)).await.unwrap();

        let cleared = guard.clear_split_phases(project.id).await.unwrap();
        assert_eq!(cleared, 2);

        let updated = guard
            .request_transition(project.id, PhaseMode::RecurringTemplate)
            .await
            .unwrap();
        assert_eq!(updated.mode, PhaseMode::RecurringTemplate);
    }

    #[tokio::test]
    async fn clear_recurring_template_removes_series_and_exceptions() {
        let store = Arc::new(MemoryStore::new());
        let guard = ExclusivityGuard::new(Arc::clone(&store));
        let project = project_with_mode(&store, PhaseMode::RecurringTemplate).await;
        let series = series_for(project.id);
        store.save_series(series.clone()).await.unwrap();
        store
            .upsert_exception(ExceptionRecord::deleted(series.id, date(2025, 3, 14)))
            .await
            .unwrap();

        let cleared = guard.clear_recurring_template(project.id).await.unwrap();
        assert_eq!(cleared, 1);
        assert!(store.load_series(series.id).await.unwrap().is_none());
        assert!(store
            .load_exceptions(series.id, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn detect_orphans_reports_stray_records() {
        let store = Arc::new(MemoryStore::new());
        let guard = ExclusivityGuard::new(Arc::clone(&store));
        let project = project_with_mode(&store, PhaseMode::NoExplicitPhases).await;
        let segment = segment_for(project.id);
        store.insert_segment(segment.clone()).await.unwrap();

        let report = guard.detect_orphans(project.id).await.unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.stray_segments, vec![segment.id]);
        assert!(report.stray_series.is_empty());
    }

    #[tokio::test]
    async fn consistent_project_has_no_orphans() {
        let store = Arc::new(MemoryStore::new());
        let guard = ExclusivityGuard::new(Arc::clone(&store));
        let project = project_with_mode(&store, PhaseMode::RecurringTemplate).await;
        store.save_series(series_for(project.id)).await.unwrap();

        let report = guard.detect_orphans(project.id).await.unwrap();
        assert!(report.is_consistent());
    }

    #[tokio::test]
    async fn idle_project_locks_are_evicted() {
        let store = Arc::new(MemoryStore::new());
        let guard = ExclusivityGuard::new(Arc::clone(&store));

        for _ in 0..8 {
            let project = project_with_mode(&store, PhaseMode::NoExplicitPhases).await;
            guard
                .request_transition(project.id, PhaseMode::SplitPhases)
                .await
                .unwrap();
        }

        // Each acquisition purges the previous project's idle entry.
        assert_eq!(guard.lock_count().await, 1);
    }
}
