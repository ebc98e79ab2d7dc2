use anyhow::{anyhow, Result};
use cadence_core::expand::Occurrences;
use cadence_core::rule::{LegacyRepeatConfig, RecurrenceRule, Terminator};
use owo_colors::OwoColorize;

use crate::cli::{RuleCommand, RuleLegacyCommand, RuleParseCommand, RulePreviewCommand, RuleSubcommand};

pub fn rule_command(command: RuleCommand) -> Result<()> {
    match command.command {
        RuleSubcommand::Parse(cmd) => parse_command(cmd),
        RuleSubcommand::Preview(cmd) => preview_command(cmd),
        RuleSubcommand::Legacy(cmd) => legacy_command(cmd),
    }
}

fn parse_command(command: RuleParseCommand) -> Result<()> {
    let rule: RecurrenceRule = command.rule.parse().map_err(anyhow::Error::from)?;

    println!("{} {}", "Rule:".blue().bold(), rule.to_string().green());
    println!("Frequency: {}", rule.frequency());
    println!("Interval: every {}", rule.interval());
    if !rule.by_weekday().is_empty() {
        let days: Vec<String> = rule.by_weekday().iter().map(|d| d.to_string()).collect();
        println!("Weekdays: {}", days.join(", "));
    }
    if let Some(day) = rule.by_month_day() {
        println!("Day of month: {day}");
    }
    match rule.terminator() {
        Terminator::Count(n) => println!("Ends: after {n} occurrences"),
        Terminator::Until(date) => println!("Ends: on {date}"),
        Terminator::Never => println!("Ends: never"),
    }
    Ok(())
}

fn preview_command(command: RulePreviewCommand) -> Result<()> {
    let rule: RecurrenceRule = command.rule.parse().map_err(anyhow::Error::from)?;
    let dates: Vec<_> = Occurrences::new(&rule, command.start)
        .take(command.count)
        .collect();
    if dates.is_empty() {
        println!("The rule produces no occurrences from {}.", command.start);
        return Ok(());
    }

    println!(
        "{} (starting {})",
        "Upcoming occurrences".blue().bold(),
        command.start
    );
    for date in dates {
        println!("  {} ({})", date.to_string().green(), date.format("%A"));
    }
    Ok(())
}

fn legacy_command(command: RuleLegacyCommand) -> Result<()> {
    let legacy: LegacyRepeatConfig = serde_json::from_str(&command.json)
        .map_err(|e| anyhow!("Invalid legacy repeat config: {e}"))?;
    let rule = RecurrenceRule::from_legacy(&legacy)?;
    println!("{} {}", "Rule:".blue().bold(), rule.to_string().green());
    Ok(())
}
