use anyhow::{anyhow, Result};
use cadence_core::store::WorkDays;
use chrono::Weekday;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Deserialize, Debug)]
pub struct Config {
    /// Path of the JSON plan file every command reads and writes.
    #[serde(default = "default_plan_file")]
    pub plan_file: PathBuf,
    #[serde(default)]
    pub forecast: ForecastConfig,
}

/// Forecast window and working-day defaults.
#[derive(Deserialize, Debug)]
pub struct ForecastConfig {
    /// Default window length in days
    pub lookahead_days: u32,
    /// Which weekdays count as working days
    pub work_days: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plan_file: default_plan_file(),
            forecast: ForecastConfig::default(),
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            lookahead_days: 30,
            work_days: ["mon", "tue", "wed", "thu", "fri"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

fn default_plan_file() -> PathBuf {
    PathBuf::from("plan.json")
}

impl Config {
    pub fn new() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("cadence.toml"))
            .merge(Env::prefixed("CADENCE_").split("__"))
            .extract()
    }
}

impl ForecastConfig {
    pub fn calendar(&self) -> Result<WorkDays> {
        let days: Vec<Weekday> = self
            .work_days
            .iter()
            .map(|name| {
                Weekday::from_str(name)
                    .map_err(|_| anyhow!("Invalid work day '{name}' in configuration"))
            })
            .collect::<Result<_>>()?;
        Ok(WorkDays::new(days))
    }
}
