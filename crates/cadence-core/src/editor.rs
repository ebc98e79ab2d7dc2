//! Scoped series editing.
//!
//! The three scopes are a closed enum dispatched here; `ThisAndFuture` is
//! the series split. Splits, truncations, and whole-series deletes touch
//! several records, so every such operation runs under a per-series async
//! mutex and compensates explicitly when a step fails: the original series
//! is restored and displaced exceptions are put back. A half-split series
//! is never left persisted; if even the rollback fails, the error names
//! the affected record identifiers instead of failing silently.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::CoreError;
use crate::expand::{occurrence_index, Occurrences};
use crate::models::{DateRange, EditScope, ExceptionRecord, PayloadPatch, Series};
use crate::rule::{Frequency, RecurrenceRule, Terminator};
use crate::store::Store;

/// What an edit ended up doing, for callers that report back to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// A `Modified` exception was upserted for the target date.
    OccurrenceOverridden,
    /// The series was split; future occurrences live in the successor.
    Split { successor_id: Uuid },
    /// The series' base payload was updated in place.
    SeriesUpdated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// A `Deleted` exception was upserted for the target date.
    OccurrenceRemoved,
    /// The series was truncated before the target date.
    Truncated,
    /// The series and all its exceptions are gone.
    SeriesDeleted,
}

pub struct SeriesEditor<S> {
    store: Arc<S>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl<S: Store> SeriesEditor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Mutations against one series identity are serialized; the returned
    /// handle is held for the whole multi-step mutation.
    async fn series_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        // An entry whose only handle is the registry's has no holder and no
        // waiters; evicting here keeps the map bounded by concurrent edits.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    async fn lock_count(&self) -> usize {
        self.locks.lock().await.len()
    }

    async fn require_series(&self, id: Uuid) -> Result<Series, CoreError> {
        self.store
            .load_series(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("series {id}")))
    }

    /// Applies `patch` to the occurrence at `date` under the given scope.
    pub async fn edit_occurrence(
        &self,
        series_id: Uuid,
        date: NaiveDate,
        scope: EditScope,
        patch: PayloadPatch,
    ) -> Result<EditOutcome, CoreError> {
        let lock = self.series_lock(series_id).await;
        let _guard = lock.lock().await;

        let series = self.require_series(series_id).await?;
        debug!(%series_id, %date, %scope, "editing occurrence");

        match scope {
            EditScope::ThisOccurrence => {
                require_occurrence(&series, date)?;
                self.store
                    .upsert_exception(ExceptionRecord::modified(series_id, date, patch))
                    .await?;
                Ok(EditOutcome::OccurrenceOverridden)
            }
            EditScope::ThisAndFuture => {
                let index = require_split_target(&series, date)?;
                let successor_id = self.split(&series, date, index, &patch).await?;
                Ok(EditOutcome::Split { successor_id })
            }
            EditScope::AllOccurrences => {
                // Existing per-occurrence overrides are preserved; a
                // previously modified occurrence keeps its override.
                let mut updated = series;
                updated.payload = updated.payload.apply(&patch);
                updated.updated_at = Utc::now();
                self.store.save_series(updated).await?;
                Ok(EditOutcome::SeriesUpdated)
            }
        }
    }

    /// Removes the occurrence at `date` under the given scope.
    pub async fn delete_occurrence(
        &self,
        series_id: Uuid,
        date: NaiveDate,
        scope: EditScope,
    ) -> Result<DeleteOutcome, CoreError> {
        let lock = self.series_lock(series_id).await;
        let _guard = lock.lock().await;

        let series = self.require_series(series_id).await?;
        debug!(%series_id, %date, %scope, "deleting occurrence");

        match scope {
            EditScope::ThisOccurrence => {
                require_occurrence(&series, date)?;
                self.store
                    .upsert_exception(ExceptionRecord::deleted(series_id, date))
                    .await?;
                Ok(DeleteOutcome::OccurrenceRemoved)
            }
            EditScope::ThisAndFuture => {
                require_split_target(&series, date)?;
                self.truncate(&series, date).await?;
                Ok(DeleteOutcome::Truncated)
            }
            EditScope::AllOccurrences => {
                self.store.delete_series(series_id).await?;
                Ok(DeleteOutcome::SeriesDeleted)
            }
        }
    }

    /// The split: terminate the original the day before `target`, create a
    /// successor carrying the remaining pattern and the patched payload,
    /// and re-home exceptions at or after `target`.
    async fn split(
        &self,
        original: &Series,
        target: NaiveDate,
        target_index: u32,
        patch: &PayloadPatch,
    ) -> Result<Uuid, CoreError> {
        let truncated = truncate_series(original, target);
        let now = Utc::now();
        let successor = Series {
            id: Uuid::now_v7(),
            project_id: original.project_id,
            kind: original.kind,
            start: target,
            rule: remainder_rule(&original.rule, original.start, target_index),
            payload: original.payload.apply(patch),
            created_at: now,
            updated_at: now,
        };
        let successor_id = successor.id;

        let future = self
            .store
            .load_exceptions(original.id, Some(DateRange::new(target, NaiveDate::MAX)))
            .await?;

        // Step (a): terminate the original.
        self.store.save_series(truncated).await?;

        // Step (b): create the successor.
        if let Err(cause) = self.store.save_series(successor).await {
            return Err(self
                .roll_back_split(original, None, &[], cause)
                .await);
        }

        // Step (c): re-home future exceptions onto the successor.
        let mut removed: Vec<ExceptionRecord> = Vec::new();
        for exception in &future {
            let mut moved = exception.clone();
            moved.series_id = successor_id;
            if let Err(cause) = self.store.upsert_exception(moved).await {
                return Err(self
                    .roll_back_split(original, Some(successor_id), &removed, cause)
                    .await);
            }
        }
        for exception in &future {
            if let Err(cause) = self.store.delete_exception(original.id, exception.date).await {
                return Err(self
                    .roll_back_split(original, Some(successor_id), &removed, cause)
                    .await);
            }
            removed.push(exception.clone());
        }

        debug!(original = %original.id, successor = %successor_id, %target, "series split");
        Ok(successor_id)
    }

    /// This-and-future delete: terminating the rule is sufficient, and
    /// exceptions at or after the target are discarded.
    async fn truncate(&self, original: &Series, target: NaiveDate) -> Result<(), CoreError> {
        let future = self
            .store
            .load_exceptions(original.id, Some(DateRange::new(target, NaiveDate::MAX)))
            .await?;

        self.store.save_series(truncate_series(original, target)).await?;

        let mut removed: Vec<ExceptionRecord> = Vec::new();
        for exception in &future {
            if let Err(cause) = self.store.delete_exception(original.id, exception.date).await {
                return Err(self
                    .roll_back_split(original, None, &removed, cause)
                    .await);
            }
            removed.push(exception.clone());
        }
        Ok(())
    }

    /// Best-effort compensation for a failed split or truncation: restore
    /// the original series, drop the successor (cascading any exceptions
    /// already copied onto it), and put back exceptions already removed
    /// from the original. Returns the error to surface.
    async fn roll_back_split(
        &self,
        original: &Series,
        successor_id: Option<Uuid>,
        removed: &[ExceptionRecord],
        cause: CoreError,
    ) -> CoreError {
        warn!(series_id = %original.id, error = %cause, "split failed; rolling back");

        let mut affected: Vec<Uuid> = Vec::new();
        if self.store.save_series(original.clone()).await.is_err() {
            affected.push(original.id);
        }
        if let Some(id) = successor_id {
            if self.store.delete_series(id).await.is_err() {
                affected.push(id);
            }
        }
        for exception in removed {
            if self.store.upsert_exception(exception.clone()).await.is_err() {
                affected.push(exception.series_id);
            }
        }

        if affected.is_empty() {
            CoreError::PartialMutation {
                entity_id: original.id,
                reason: cause.to_string(),
                rolled_back: true,
            }
        } else {
            affected.dedup();
            CoreError::InconsistentState { affected }
        }
    }
}

fn require_occurrence(series: &Series, date: NaiveDate) -> Result<u32, CoreError> {
    occurrence_index(&series.rule, series.start, date).ok_or_else(|| {
        CoreError::InvalidOccurrence {
            series_id: series.id,
            date,
            reason: "the rule never lands on this date".to_string(),
        }
    })
}

fn require_split_target(series: &Series, date: NaiveDate) -> Result<u32, CoreError> {
    if date <= series.start {
        return Err(CoreError::InvalidOccurrence {
            series_id: series.id,
            date,
            reason: "at or before the series start; nothing to split".to_string(),
        });
    }
    require_occurrence(series, date)
}

fn truncate_series(original: &Series, target: NaiveDate) -> Series {
    // The new Until names the last occurrence strictly before the target;
    // a Count terminator is replaced outright, which is equivalent inside
    // the counted range. A split at the first occurrence leaves the
    // original empty, terminated the day before the target.
    let cutoff = Occurrences::new(&original.rule, original.start)
        .take_while(|d| *d < target)
        .last()
        .unwrap_or_else(|| target - Duration::days(1));
    let terminator = match original.rule.terminator() {
        Terminator::Until(until) if until <= cutoff => Terminator::Until(until),
        _ => Terminator::Until(cutoff),
    };
    let mut truncated = original.clone();
    truncated.rule = original.rule.with_terminator(terminator);
    truncated.updated_at = Utc::now();
    truncated
}

/// The successor's rule: same pattern, terminator translated relative to
/// the new start. `target_index` is the number of occurrences the original
/// has already consumed before the target.
fn remainder_rule(
    rule: &RecurrenceRule,
    original_start: NaiveDate,
    target_index: u32,
) -> RecurrenceRule {
    let mut remainder = match rule.terminator() {
        Terminator::Count(n) => {
            rule.with_terminator(Terminator::Count(n.saturating_sub(target_index)))
        }
        other => rule.with_terminator(other),
    };
    // A monthly rule without an explicit day follows its start's day; the
    // successor may start on a clamped date, so pin the original day.
    if rule.frequency() == Frequency::Monthly && rule.by_month_day().is_none() {
        remainder = remainder.with_month_day(original_start.day());
    }
    remainder
}
