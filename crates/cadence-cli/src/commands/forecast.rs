use anyhow::Result;
use cadence_core::estimate::{DayEstimateCalculator, DayForecast};
use cadence_core::models::DateRange;
use cadence_core::store::memory::MemoryStore;
use chrono::Duration;
use comfy_table::Table;
use owo_colors::OwoColorize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cli::ForecastCommand;
use crate::config::Config;
use crate::plan::Plan;
use crate::util::resolve_project_id;

pub async fn forecast_command(config: &Config, command: ForecastCommand) -> Result<()> {
    let plan = Plan::load(&config.plan_file)?;
    let (store, work) = plan.seed().await?;

    let from = command
        .from
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let days = command.days.unwrap_or(config.forecast.lookahead_days);
    let range = DateRange::new(from, from + Duration::days(i64::from(days)));

    let calculator = DayEstimateCalculator::new(Arc::clone(&store), work)
        .with_calendar(Arc::new(config.forecast.calendar()?));
    let cancel = CancellationToken::new();

    let forecasts: Vec<(Uuid, DayForecast)> = match command.project {
        Some(prefix) => {
            let project_id = resolve_project_id(&store, &prefix).await?;
            let forecast = calculator.day_estimates(project_id, range, &cancel).await?;
            vec![(project_id, forecast)]
        }
        None => {
            let ids: Vec<Uuid> = store.all_projects().await.into_iter().map(|p| p.id).collect();
            let mut all: Vec<(Uuid, DayForecast)> = calculator
                .forecast_projects(ids, range, &cancel)
                .await?
                .into_iter()
                .collect();
            all.sort_by_key(|(id, _)| *id);
            all
        }
    };

    let project_names: HashMap<Uuid, String> = store
        .all_projects()
        .await
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();
    let source_titles = source_titles(&store).await;

    for (project_id, forecast) in forecasts {
        let name = project_names
            .get(&project_id)
            .cloned()
            .unwrap_or_else(|| project_id.to_string());
        display_forecast(&name, &forecast, &source_titles);
    }
    Ok(())
}

/// Maps every milestone series and segment to its display title.
async fn source_titles(store: &MemoryStore) -> HashMap<Uuid, String> {
    let mut titles = HashMap::new();
    for series in store.all_series().await {
        titles.insert(series.id, series.payload.title);
    }
    for segment in store.all_segments().await {
        titles.insert(segment.id, segment.title);
    }
    titles
}

fn display_forecast(project: &str, forecast: &DayForecast, titles: &HashMap<Uuid, String>) {
    println!("{} {}", "Forecast for".blue().bold(), project.cyan());

    let rows: Vec<_> = forecast
        .estimates
        .iter()
        .filter(|e| e.hours_needed > 0.0)
        .collect();
    if rows.is_empty() {
        println!("Nothing to do in this window.");
        println!();
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Date", "Day", "Milestone", "Hours"]);
    for estimate in &rows {
        let title = titles
            .get(&estimate.milestone_id)
            .cloned()
            .unwrap_or_else(|| estimate.milestone_id.to_string());
        table.add_row(vec![
            estimate.date.to_string(),
            estimate.date.format("%a").to_string(),
            title,
            format!("{:.1}", estimate.hours_needed),
        ]);
    }
    println!("{table}");

    let total: f64 = rows.iter().map(|e| e.hours_needed).sum();
    println!("Total: {} hours", format!("{total:.1}").green().bold());

    for warning in &forecast.warnings {
        println!(
            "{} {} has {:.1}h of recorded work against {:.1}h forecast",
            "Warning:".yellow().bold(),
            warning.date,
            warning.actual,
            warning.demanded
        );
    }
    println!();
}
