use anyhow::{anyhow, Result};
use cadence_core::editor::{DeleteOutcome, EditOutcome, SeriesEditor};
use cadence_core::error::CoreError;
use cadence_core::models::PayloadPatch;
use cadence_core::store::memory::MemoryStore;
use chrono::NaiveDate;
use owo_colors::OwoColorize;
use std::sync::Arc;
use uuid::Uuid;

use crate::cli::{DeleteCommand, EditCommand};
use crate::config::Config;
use crate::plan::Plan;
use crate::util::{next_landing, parse_time_of_day, resolve_series_id};

/// Prints a "did you mean" hint alongside invalid-occurrence errors.
async fn hint_on_miss(store: &MemoryStore, series_id: Uuid, date: NaiveDate, err: &CoreError) {
    if matches!(err, CoreError::InvalidOccurrence { .. }) {
        if let Some(next) = next_landing(store, series_id, date).await {
            eprintln!("The series next lands on {next}.");
        }
    }
}

pub async fn edit_command(config: &Config, command: EditCommand) -> Result<()> {
    let plan = Plan::load(&config.plan_file)?;
    let (store, _work) = plan.seed().await?;
    let series_id = resolve_series_id(&store, &command.series).await?;

    let patch = PayloadPatch {
        title: command.title,
        hours: command.hours,
        starts_at: command
            .starts_at
            .as_deref()
            .map(parse_time_of_day)
            .transpose()?,
        ends_at: command
            .ends_at
            .as_deref()
            .map(parse_time_of_day)
            .transpose()?,
    };
    if patch.is_empty() {
        return Err(anyhow!(
            "Nothing to change; pass at least one of --title, --hours, --starts-at, --ends-at"
        ));
    }

    let editor = SeriesEditor::new(Arc::clone(&store));
    let outcome = match editor
        .edit_occurrence(series_id, command.date, command.scope, patch)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            hint_on_miss(&store, series_id, command.date, &err).await;
            return Err(err.into());
        }
    };
    match outcome {
        EditOutcome::OccurrenceOverridden => {
            println!(
                "{} Occurrence on {} overridden.",
                "Edited:".green().bold(),
                command.date
            );
        }
        EditOutcome::Split { successor_id } => {
            println!(
                "{} Series split at {}; occurrences from then on live in {}.",
                "Edited:".green().bold(),
                command.date,
                successor_id.to_string().yellow()
            );
        }
        EditOutcome::SeriesUpdated => {
            println!("{} Whole series updated.", "Edited:".green().bold());
        }
    }

    Plan::snapshot(&store, plan.actuals)
        .await
        .save(&config.plan_file)
}

pub async fn delete_command(config: &Config, command: DeleteCommand) -> Result<()> {
    let plan = Plan::load(&config.plan_file)?;
    let (store, _work) = plan.seed().await?;
    let series_id = resolve_series_id(&store, &command.series).await?;

    let editor = SeriesEditor::new(Arc::clone(&store));
    let outcome = match editor
        .delete_occurrence(series_id, command.date, command.scope)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            hint_on_miss(&store, series_id, command.date, &err).await;
            return Err(err.into());
        }
    };
    match outcome {
        DeleteOutcome::OccurrenceRemoved => {
            println!(
                "{} Occurrence on {} removed.",
                "Deleted:".green().bold(),
                command.date
            );
        }
        DeleteOutcome::Truncated => {
            println!(
                "{} Series ends before {} now.",
                "Deleted:".green().bold(),
                command.date
            );
        }
        DeleteOutcome::SeriesDeleted => {
            println!("{} Whole series deleted.", "Deleted:".green().bold());
        }
    }

    Plan::snapshot(&store, plan.actuals)
        .await
        .save(&config.plan_file)
}
