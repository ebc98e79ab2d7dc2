use anyhow::Result;
use cadence_core::guard::ExclusivityGuard;
use owo_colors::OwoColorize;
use std::sync::Arc;

use crate::cli::{ModeClearCommand, ModeCommand, ModeSetCommand, ModeSubcommand};
use crate::config::Config;
use crate::plan::Plan;
use crate::util::resolve_project_id;

pub async fn mode_command(config: &Config, command: ModeCommand) -> Result<()> {
    match command.command {
        ModeSubcommand::Set(cmd) => set_command(config, cmd).await,
        ModeSubcommand::ClearSplit(cmd) => clear_split_command(config, cmd).await,
        ModeSubcommand::ClearRecurring(cmd) => clear_recurring_command(config, cmd).await,
        ModeSubcommand::Doctor(cmd) => doctor_command(config, cmd).await,
    }
}

async fn set_command(config: &Config, command: ModeSetCommand) -> Result<()> {
    let plan = Plan::load(&config.plan_file)?;
    let (store, _work) = plan.seed().await?;
    let project_id = resolve_project_id(&store, &command.project).await?;

    let guard = ExclusivityGuard::new(Arc::clone(&store));
    let project = guard.request_transition(project_id, command.mode).await?;
    println!(
        "{} {} is now in '{}' mode.",
        "Mode:".green().bold(),
        project.name.cyan(),
        project.mode
    );

    Plan::snapshot(&store, plan.actuals)
        .await
        .save(&config.plan_file)
}

async fn clear_split_command(config: &Config, command: ModeClearCommand) -> Result<()> {
    let plan = Plan::load(&config.plan_file)?;
    let (store, _work) = plan.seed().await?;
    let project_id = resolve_project_id(&store, &command.project).await?;

    let guard = ExclusivityGuard::new(Arc::clone(&store));
    let removed = guard.clear_split_phases(project_id).await?;
    println!("{} {removed} segments removed.", "Cleared:".green().bold());

    Plan::snapshot(&store, plan.actuals)
        .await
        .save(&config.plan_file)
}

async fn clear_recurring_command(config: &Config, command: ModeClearCommand) -> Result<()> {
    let plan = Plan::load(&config.plan_file)?;
    let (store, _work) = plan.seed().await?;
    let project_id = resolve_project_id(&store, &command.project).await?;

    let guard = ExclusivityGuard::new(Arc::clone(&store));
    let removed = guard.clear_recurring_template(project_id).await?;
    println!("{} {removed} series removed.", "Cleared:".green().bold());

    Plan::snapshot(&store, plan.actuals)
        .await
        .save(&config.plan_file)
}

async fn doctor_command(config: &Config, command: ModeClearCommand) -> Result<()> {
    let plan = Plan::load(&config.plan_file)?;
    let (store, _work) = plan.seed().await?;
    let project_id = resolve_project_id(&store, &command.project).await?;

    let guard = ExclusivityGuard::new(Arc::clone(&store));
    let report = guard.detect_orphans(project_id).await?;
    if report.is_consistent() {
        println!(
            "{} mode '{}' matches the stored records.",
            "Consistent:".green().bold(),
            report.mode
        );
        return Ok(());
    }

    println!(
        "{} mode is '{}' but stray records exist:",
        "Inconsistent:".red().bold(),
        report.mode
    );
    for id in &report.stray_series {
        println!("  series {}", id.to_string().yellow());
    }
    for id in &report.stray_segments {
        println!("  segment {}", id.to_string().yellow());
    }
    println!("Run 'cadence mode clear-split' or 'cadence mode clear-recurring' to fix.");
    Ok(())
}
