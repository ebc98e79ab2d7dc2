use cadence_core::models::{EditScope, PhaseMode};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Recurrence and forecasting for project plans
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Inspect, preview, and convert recurrence rules
    Rule(RuleCommand),
    /// Per-day time forecast for one or all projects
    Forecast(ForecastCommand),
    /// Edit occurrences of a series
    Edit(EditCommand),
    /// Delete occurrences of a series
    Delete(DeleteCommand),
    /// Manage a project's phase mode
    Mode(ModeCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct RuleCommand {
    #[command(subcommand)]
    pub command: RuleSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RuleSubcommand {
    /// Parse a rule and print its normalized form and components
    Parse(RuleParseCommand),
    /// Preview the next occurrences a rule produces
    Preview(RulePreviewCommand),
    /// Convert a legacy repeat config (JSON) into a rule
    Legacy(RuleLegacyCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct RuleParseCommand {
    /// The rule, e.g. 'FREQ=WEEKLY;BYDAY=MO,FR;COUNT=10'
    pub rule: String,
}

#[derive(Parser, Debug, Clone)]
pub struct RulePreviewCommand {
    /// The rule to expand
    pub rule: String,
    /// First candidate date of the series
    #[clap(long)]
    pub start: NaiveDate,
    /// How many occurrences to show
    #[clap(long, default_value_t = 6)]
    pub count: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct RuleLegacyCommand {
    /// Legacy repeat config as JSON, e.g. '{"unit":"week","weekdays":[5]}'
    pub json: String,
}

#[derive(Parser, Debug, Clone)]
pub struct ForecastCommand {
    /// Project ID (or unique prefix); omit to forecast every project
    pub project: Option<String>,
    /// First day of the window (defaults to today)
    #[clap(long)]
    pub from: Option<NaiveDate>,
    /// Window length in days (defaults to the configured lookahead)
    #[clap(long)]
    pub days: Option<u32>,
}

#[derive(Parser, Debug, Clone)]
pub struct EditCommand {
    /// Series ID (or unique prefix)
    pub series: String,
    /// The occurrence date to edit
    pub date: NaiveDate,
    /// How far the edit reaches (occurrence|future|all)
    #[clap(long, default_value = "occurrence")]
    pub scope: EditScope,
    #[clap(long)]
    pub title: Option<String>,
    #[clap(long)]
    pub hours: Option<f64>,
    /// Start time of day, e.g. '09:00'
    #[clap(long)]
    pub starts_at: Option<String>,
    /// End time of day, e.g. '10:30'
    #[clap(long)]
    pub ends_at: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteCommand {
    /// Series ID (or unique prefix)
    pub series: String,
    /// The occurrence date to delete
    pub date: NaiveDate,
    /// How far the delete reaches (occurrence|future|all)
    #[clap(long, default_value = "occurrence")]
    pub scope: EditScope,
}

#[derive(Parser, Debug, Clone)]
pub struct ModeCommand {
    #[command(subcommand)]
    pub command: ModeSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ModeSubcommand {
    /// Change a project's phase mode (none|split|recurring)
    Set(ModeSetCommand),
    /// Delete every split-phase segment of a project
    ClearSplit(ModeClearCommand),
    /// Delete every series of a project, exceptions included
    ClearRecurring(ModeClearCommand),
    /// Cross-check a project's mode tag against its records
    Doctor(ModeClearCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct ModeSetCommand {
    /// Project ID (or unique prefix)
    pub project: String,
    /// Target mode
    pub mode: PhaseMode,
}

#[derive(Parser, Debug, Clone)]
pub struct ModeClearCommand {
    /// Project ID (or unique prefix)
    pub project: String,
}
