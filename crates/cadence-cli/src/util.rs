use anyhow::{anyhow, Result};
use cadence_core::error::CoreError;
use cadence_core::expand::next_occurrence_after;
use cadence_core::store::memory::MemoryStore;
use cadence_core::store::{ExceptionStore, SeriesStore};
use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

pub async fn resolve_project_id(store: &MemoryStore, short_id: &str) -> Result<Uuid> {
    let candidates: Vec<(Uuid, String)> = store
        .all_projects()
        .await
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();
    resolve_id(short_id, candidates, "project")
}

pub async fn resolve_series_id(store: &MemoryStore, short_id: &str) -> Result<Uuid> {
    let candidates: Vec<(Uuid, String)> = store
        .all_series()
        .await
        .into_iter()
        .map(|s| (s.id, s.payload.title))
        .collect();
    resolve_id(short_id, candidates, "series")
}

fn resolve_id(short_id: &str, candidates: Vec<(Uuid, String)>, kind: &str) -> Result<Uuid> {
    if short_id.len() < 2 {
        return Err(anyhow!(CoreError::NotFound(
            "ID prefix must be at least 2 characters long".to_string()
        )));
    }
    let matches: Vec<&(Uuid, String)> = candidates
        .iter()
        .filter(|(id, _)| id.to_string().starts_with(short_id))
        .collect();
    match matches.as_slice() {
        [(id, _)] => Ok(*id),
        [] => Err(anyhow!(CoreError::NotFound(format!(
            "No {kind} found with ID prefix '{short_id}'"
        )))),
        many => {
            let listing: Vec<String> = many
                .iter()
                .map(|(id, name)| format!("  {id} ({name})"))
                .collect();
            Err(anyhow!(
                "Ambiguous {kind} ID '{short_id}'. Did you mean one of these?\n{}",
                listing.join("\n")
            ))
        }
    }
}

/// The next date the series actually lands on after `date`, for "did you
/// mean" hints when a requested date is not an occurrence.
pub async fn next_landing(
    store: &MemoryStore,
    series_id: Uuid,
    date: NaiveDate,
) -> Option<NaiveDate> {
    let series = store.load_series(series_id).await.ok().flatten()?;
    let exceptions = store.load_exceptions(series_id, None).await.ok()?;
    next_occurrence_after(&series, date, &exceptions)
}

/// Accepts '09:00' or '09:00:30'.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| anyhow!("Invalid time of day '{s}' (expected HH:MM)"))
}
