use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Malformed recurrence rule: {0}")]
    MalformedRule(String),

    #[error("Cannot convert legacy repeat config: {0}")]
    LegacyConversion(String),

    #[error("Date {date} is not an editable occurrence of series {series_id}: {reason}")]
    InvalidOccurrence {
        series_id: Uuid,
        date: NaiveDate,
        reason: String,
    },

    #[error("Project {project_id} already has {conflicting} records; clear them before switching mode")]
    ConflictingMode {
        project_id: Uuid,
        conflicting: String,
    },

    #[error("Multi-step mutation on {entity_id} failed mid-way ({reason}); rollback {}", if *rolled_back { "succeeded" } else { "FAILED" })]
    PartialMutation {
        entity_id: Uuid,
        reason: String,
        rolled_back: bool,
    },

    #[error("Inconsistent state after failed rollback; affected records: {affected:?}")]
    InconsistentState { affected: Vec<Uuid> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Computation cancelled by caller")]
    Cancelled,
}
