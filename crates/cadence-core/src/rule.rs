//! Recurrence rule representation and its textual codec.
//!
//! The vocabulary is the `FREQ`/`INTERVAL`/`BYDAY`/`BYMONTHDAY`/`COUNT`/
//! `UNTIL` subset used by milestone and event recurrence, not full RFC 5545.
//! Rules are constructed through [`RuleBuilder`], which upholds the
//! invariants the expander relies on; for every rule the builder can
//! produce, `rule.to_string().parse()` returns the same rule.

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Daily => write!(f, "DAILY"),
            Frequency::Weekly => write!(f, "WEEKLY"),
            Frequency::Monthly => write!(f, "MONTHLY"),
        }
    }
}

impl FromStr for Frequency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            other => Err(CoreError::MalformedRule(format!(
                "unknown frequency '{other}'"
            ))),
        }
    }
}

/// When a series stops producing occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// Stop after the n-th raw candidate, counted from the series start.
    Count(u32),
    /// Drop candidates strictly after this date.
    Until(NaiveDate),
    Never,
}

const UNTIL_FORMAT: &str = "%Y%m%d";

/// Canonical in-memory recurrence rule.
///
/// Fields are private so that only [`RuleBuilder`] and the codec can
/// construct one; both enforce that `by_weekday` is empty unless the
/// frequency is weekly, `by_month_day` is absent unless monthly, the
/// interval is at least 1, and at most one of count/until is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    frequency: Frequency,
    interval: u32,
    by_weekday: Vec<Weekday>,
    by_month_day: Option<u32>,
    terminator: Terminator,
}

/// Monday-first rank, matching ISO weeks used by the expander.
pub(crate) fn weekday_rank(day: Weekday) -> u32 {
    day.num_days_from_monday()
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

fn weekday_from_code(code: &str) -> Result<Weekday, CoreError> {
    match code {
        "MO" => Ok(Weekday::Mon),
        "TU" => Ok(Weekday::Tue),
        "WE" => Ok(Weekday::Wed),
        "TH" => Ok(Weekday::Thu),
        "FR" => Ok(Weekday::Fri),
        "SA" => Ok(Weekday::Sat),
        "SU" => Ok(Weekday::Sun),
        other => Err(CoreError::MalformedRule(format!(
            "unknown weekday '{other}'"
        ))),
    }
}

impl RecurrenceRule {
    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Weekday set, sorted Monday-first. Empty unless the rule is weekly.
    pub fn by_weekday(&self) -> &[Weekday] {
        &self.by_weekday
    }

    pub fn by_month_day(&self) -> Option<u32> {
        self.by_month_day
    }

    pub fn terminator(&self) -> Terminator {
        self.terminator
    }

    /// Same pattern with a different terminator. Used by the series split.
    pub(crate) fn with_terminator(&self, terminator: Terminator) -> Self {
        Self {
            terminator,
            ..self.clone()
        }
    }

    /// Pins an explicit day-of-month onto a monthly rule that was relying
    /// on its series start. Used by the split so a successor anchored on a
    /// clamped date keeps the original day.
    pub(crate) fn with_month_day(&self, day: u32) -> Self {
        debug_assert_eq!(self.frequency, Frequency::Monthly);
        Self {
            by_month_day: Some(day),
            ..self.clone()
        }
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.interval < 1 {
            return Err(CoreError::MalformedRule(
                "interval must be at least 1".to_string(),
            ));
        }
        if !self.by_weekday.is_empty() && self.frequency != Frequency::Weekly {
            return Err(CoreError::MalformedRule(format!(
                "BYDAY only applies to weekly rules, not {}",
                self.frequency
            )));
        }
        if let Some(day) = self.by_month_day {
            if self.frequency != Frequency::Monthly {
                return Err(CoreError::MalformedRule(format!(
                    "BYMONTHDAY only applies to monthly rules, not {}",
                    self.frequency
                )));
            }
            if !(1..=31).contains(&day) {
                return Err(CoreError::MalformedRule(format!(
                    "BYMONTHDAY must be 1-31, got {day}"
                )));
            }
        }
        if let Terminator::Count(0) = self.terminator {
            return Err(CoreError::MalformedRule(
                "COUNT must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Converts a historical ad-hoc repeat config. Fields map positionally;
    /// shapes the rule vocabulary cannot express fail instead of degrading
    /// to a default rule.
    pub fn from_legacy(legacy: &LegacyRepeatConfig) -> Result<Self, CoreError> {
        let frequency = match legacy.unit.to_lowercase().as_str() {
            "day" | "days" | "daily" => Frequency::Daily,
            "week" | "weeks" | "weekly" => Frequency::Weekly,
            "month" | "months" | "monthly" => Frequency::Monthly,
            other => {
                return Err(CoreError::LegacyConversion(format!(
                    "unmappable repeat unit '{other}'"
                )))
            }
        };

        if legacy.every == 0 {
            return Err(CoreError::LegacyConversion(
                "repeat step 'every' must be positive".to_string(),
            ));
        }
        if legacy.times.is_some() && legacy.end_on.is_some() {
            return Err(CoreError::LegacyConversion(
                "legacy config sets both 'times' and 'end_on'".to_string(),
            ));
        }
        if !legacy.weekdays.is_empty() && frequency != Frequency::Weekly {
            return Err(CoreError::LegacyConversion(format!(
                "weekday list is meaningless for unit '{}'",
                legacy.unit
            )));
        }
        if legacy.month_day.is_some() && frequency != Frequency::Monthly {
            return Err(CoreError::LegacyConversion(format!(
                "month_day is meaningless for unit '{}'",
                legacy.unit
            )));
        }

        let mut builder = RuleBuilder::new(frequency).interval(legacy.every);
        if !legacy.weekdays.is_empty() {
            // Legacy weekday numbering is 0=Sunday through 6=Saturday.
            let mut days = Vec::with_capacity(legacy.weekdays.len());
            for &n in &legacy.weekdays {
                let day = match n {
                    0 => Weekday::Sun,
                    1 => Weekday::Mon,
                    2 => Weekday::Tue,
                    3 => Weekday::Wed,
                    4 => Weekday::Thu,
                    5 => Weekday::Fri,
                    6 => Weekday::Sat,
                    other => {
                        return Err(CoreError::LegacyConversion(format!(
                            "weekday index {other} out of range 0-6"
                        )))
                    }
                };
                days.push(day);
            }
            builder = builder.on_weekdays(days);
        }
        if let Some(day) = legacy.month_day {
            builder = builder.on_month_day(day);
        }
        if let Some(times) = legacy.times {
            builder = builder.count(times);
        }
        if let Some(end) = legacy.end_on {
            builder = builder.until(end);
        }

        builder
            .build()
            .map_err(|e| CoreError::LegacyConversion(e.to_string()))
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FREQ={}", self.frequency)?;
        if self.interval > 1 {
            write!(f, ";INTERVAL={}", self.interval)?;
        }
        if !self.by_weekday.is_empty() {
            let codes: Vec<&str> = self.by_weekday.iter().copied().map(weekday_code).collect();
            write!(f, ";BYDAY={}", codes.join(","))?;
        }
        if let Some(day) = self.by_month_day {
            write!(f, ";BYMONTHDAY={day}")?;
        }
        match self.terminator {
            Terminator::Count(n) => write!(f, ";COUNT={n}")?,
            Terminator::Until(date) => write!(f, ";UNTIL={}", date.format(UNTIL_FORMAT))?,
            Terminator::Never => {}
        }
        Ok(())
    }
}

impl FromStr for RecurrenceRule {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut frequency: Option<Frequency> = None;
        let mut interval: u32 = 1;
        let mut by_weekday: Vec<Weekday> = Vec::new();
        let mut by_month_day: Option<u32> = None;
        let mut count: Option<u32> = None;
        let mut until: Option<NaiveDate> = None;

        for part in s.split(';') {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                CoreError::MalformedRule(format!("expected KEY=VALUE, got '{part}'"))
            })?;
            match key {
                "FREQ" => frequency = Some(value.parse()?),
                "INTERVAL" => {
                    interval = value.parse().map_err(|_| {
                        CoreError::MalformedRule(format!("bad INTERVAL '{value}'"))
                    })?;
                    if interval == 0 {
                        return Err(CoreError::MalformedRule(
                            "interval must be at least 1".to_string(),
                        ));
                    }
                }
                "BYDAY" => {
                    for code in value.split(',') {
                        let day = weekday_from_code(code)?;
                        if !by_weekday.contains(&day) {
                            by_weekday.push(day);
                        }
                    }
                    by_weekday.sort_by_key(|d| weekday_rank(*d));
                }
                "BYMONTHDAY" => {
                    by_month_day = Some(value.parse().map_err(|_| {
                        CoreError::MalformedRule(format!("bad BYMONTHDAY '{value}'"))
                    })?);
                }
                "COUNT" => {
                    count = Some(value.parse().map_err(|_| {
                        CoreError::MalformedRule(format!("bad COUNT '{value}'"))
                    })?);
                }
                "UNTIL" => {
                    until = Some(
                        NaiveDate::parse_from_str(value, UNTIL_FORMAT).map_err(|_| {
                            CoreError::MalformedRule(format!("bad UNTIL '{value}'"))
                        })?,
                    );
                }
                other => {
                    return Err(CoreError::MalformedRule(format!(
                        "unknown rule component '{other}'"
                    )))
                }
            }
        }

        let frequency = frequency
            .ok_or_else(|| CoreError::MalformedRule("missing FREQ".to_string()))?;
        let terminator = match (count, until) {
            (Some(_), Some(_)) => {
                return Err(CoreError::MalformedRule(
                    "COUNT and UNTIL are mutually exclusive".to_string(),
                ))
            }
            (Some(n), None) => Terminator::Count(n),
            (None, Some(date)) => Terminator::Until(date),
            (None, None) => Terminator::Never,
        };

        let rule = RecurrenceRule {
            frequency,
            interval,
            by_weekday,
            by_month_day,
            terminator,
        };
        rule.validate()?;
        Ok(rule)
    }
}

impl Serialize for RecurrenceRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecurrenceRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Builder for [`RecurrenceRule`]; `build` rejects rules that violate the
/// representation invariants.
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    frequency: Frequency,
    interval: u32,
    by_weekday: Vec<Weekday>,
    by_month_day: Option<u32>,
    terminator: Terminator,
}

impl RuleBuilder {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: 1,
            by_weekday: Vec::new(),
            by_month_day: None,
            terminator: Terminator::Never,
        }
    }

    pub fn interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn on_weekdays(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        let mut days: Vec<Weekday> = days.into_iter().collect();
        days.sort_by_key(|d| weekday_rank(*d));
        days.dedup();
        self.by_weekday = days;
        self
    }

    pub fn on_month_day(mut self, day: u32) -> Self {
        self.by_month_day = Some(day);
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.terminator = Terminator::Count(count);
        self
    }

    pub fn until(mut self, date: NaiveDate) -> Self {
        self.terminator = Terminator::Until(date);
        self
    }

    pub fn build(self) -> Result<RecurrenceRule, CoreError> {
        let rule = RecurrenceRule {
            frequency: self.frequency,
            interval: self.interval,
            by_weekday: self.by_weekday,
            by_month_day: self.by_month_day,
            terminator: self.terminator,
        };
        rule.validate()?;
        Ok(rule)
    }
}

/// Shape of the historical ad-hoc repeat configs that predate rule strings.
/// Only consumed at the boundary, via [`RecurrenceRule::from_legacy`].
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyRepeatConfig {
    pub unit: String,
    #[serde(default = "default_every")]
    pub every: u32,
    /// 0=Sunday through 6=Saturday, the numbering the old configs used.
    #[serde(default)]
    pub weekdays: Vec<u8>,
    #[serde(default)]
    pub month_day: Option<u32>,
    #[serde(default)]
    pub times: Option<u32>,
    #[serde(default)]
    pub end_on: Option<NaiveDate>,
}

// `every` defaults to 1, matching the deserialization default; a derived
// zero would be rejected by `from_legacy`.
impl Default for LegacyRepeatConfig {
    fn default() -> Self {
        Self {
            unit: String::new(),
            every: default_every(),
            weekdays: Vec::new(),
            month_day: None,
            times: None,
            end_on: None,
        }
    }
}

fn default_every() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    mod codec_tests {
        use super::*;

        #[test]
        fn builds_canonical_strings() {
            let rule = RuleBuilder::new(Frequency::Weekly)
                .on_weekdays([Weekday::Fri, Weekday::Mon])
                .count(10)
                .build()
                .unwrap();
            assert_eq!(rule.to_string(), "FREQ=WEEKLY;BYDAY=MO,FR;COUNT=10");

            let rule = RuleBuilder::new(Frequency::Monthly)
                .interval(3)
                .on_month_day(31)
                .until(date(2026, 1, 1))
                .build()
                .unwrap();
            assert_eq!(
                rule.to_string(),
                "FREQ=MONTHLY;INTERVAL=3;BYMONTHDAY=31;UNTIL=20260101"
            );
        }

        #[test]
        fn parses_what_it_builds() {
            let rule = RuleBuilder::new(Frequency::Daily)
                .interval(2)
                .until(date(2025, 12, 31))
                .build()
                .unwrap();
            let reparsed: RecurrenceRule = rule.to_string().parse().unwrap();
            assert_eq!(reparsed, rule);
        }

        #[test]
        fn rejects_unknown_frequency() {
            let err = "FREQ=HOURLY".parse::<RecurrenceRule>().unwrap_err();
            assert!(matches!(err, CoreError::MalformedRule(_)));
        }

        #[test]
        fn rejects_count_and_until_together() {
            let err = "FREQ=DAILY;COUNT=3;UNTIL=20250601"
                .parse::<RecurrenceRule>()
                .unwrap_err();
            assert!(matches!(err, CoreError::MalformedRule(_)));
        }

        #[test]
        fn rejects_zero_interval() {
            let err = "FREQ=DAILY;INTERVAL=0".parse::<RecurrenceRule>().unwrap_err();
            assert!(matches!(err, CoreError::MalformedRule(_)));
        }

        #[test]
        fn rejects_byday_on_daily() {
            let err = "FREQ=DAILY;BYDAY=MO".parse::<RecurrenceRule>().unwrap_err();
            assert!(matches!(err, CoreError::MalformedRule(_)));
        }

        #[test]
        fn rejects_bymonthday_on_weekly() {
            let err = "FREQ=WEEKLY;BYMONTHDAY=15"
                .parse::<RecurrenceRule>()
                .unwrap_err();
            assert!(matches!(err, CoreError::MalformedRule(_)));
        }

        #[test]
        fn rejects_unknown_keys() {
            let err = "FREQ=DAILY;BYSETPOS=1".parse::<RecurrenceRule>().unwrap_err();
            assert!(matches!(err, CoreError::MalformedRule(_)));
        }

        #[test]
        fn weekday_set_is_sorted_and_deduped() {
            let rule: RecurrenceRule = "FREQ=WEEKLY;BYDAY=FR,MO,FR".parse().unwrap();
            assert_eq!(rule.by_weekday(), &[Weekday::Mon, Weekday::Fri]);
        }
    }

    mod legacy_tests {
        use super::*;

        #[test]
        fn converts_weekly_config() {
            let legacy = LegacyRepeatConfig {
                unit: "week".to_string(),
                every: 2,
                weekdays: vec![1, 5],
                ..Default::default()
            };
            let rule = RecurrenceRule::from_legacy(&legacy).unwrap();
            assert_eq!(rule.frequency(), Frequency::Weekly);
            assert_eq!(rule.interval(), 2);
            assert_eq!(rule.by_weekday(), &[Weekday::Mon, Weekday::Fri]);
        }

        #[test]
        fn converts_sunday_as_zero() {
            let legacy = LegacyRepeatConfig {
                unit: "weekly".to_string(),
                weekdays: vec![0],
                ..Default::default()
            };
            let rule = RecurrenceRule::from_legacy(&legacy).unwrap();
            assert_eq!(rule.by_weekday(), &[Weekday::Sun]);
        }

        #[test]
        fn rejects_unknown_unit() {
            let legacy = LegacyRepeatConfig {
                unit: "fortnight".to_string(),
                ..Default::default()
            };
            let err = RecurrenceRule::from_legacy(&legacy).unwrap_err();
            assert!(matches!(err, CoreError::LegacyConversion(_)));
        }

        #[test]
        fn default_config_starts_with_a_usable_step() {
            assert_eq!(LegacyRepeatConfig::default().every, 1);
        }

        #[test]
        fn rejects_zero_step() {
            let legacy = LegacyRepeatConfig {
                unit: "day".to_string(),
                every: 0,
                ..Default::default()
            };
            let err = RecurrenceRule::from_legacy(&legacy).unwrap_err();
            assert!(matches!(err, CoreError::LegacyConversion(_)));
        }

        #[test]
        fn rejects_conflicting_terminators() {
            let legacy = LegacyRepeatConfig {
                unit: "day".to_string(),
                every: 1,
                times: Some(5),
                end_on: Some(date(2025, 6, 1)),
                ..Default::default()
            };
            let err = RecurrenceRule::from_legacy(&legacy).unwrap_err();
            let message = err.to_string();
            assert!(matches!(err, CoreError::LegacyConversion(_)));
            assert!(message.contains("'times' and 'end_on'"));
        }

        #[test]
        fn rejects_weekdays_on_monthly() {
            let legacy = LegacyRepeatConfig {
                unit: "month".to_string(),
                every: 1,
                weekdays: vec![2],
                ..Default::default()
            };
            let err = RecurrenceRule::from_legacy(&legacy).unwrap_err();
            let message = err.to_string();
            assert!(matches!(err, CoreError::LegacyConversion(_)));
            assert!(message.contains("weekday list is meaningless"));
        }
    }

    prop_compose! {
        fn arb_rule()(
            freq in 0..3usize,
            interval in 1..50u32,
            weekday_mask in 1..128u8,
            month_day in 1..=31u32,
            use_month_day in any::<bool>(),
            term in 0..3usize,
            count in 1..500u32,
            until_offset in 0..3000i64,
        ) -> RecurrenceRule {
            let frequency = [Frequency::Daily, Frequency::Weekly, Frequency::Monthly][freq];
            let mut builder = RuleBuilder::new(frequency).interval(interval);
            if frequency == Frequency::Weekly {
                let all = [
                    Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu,
                    Weekday::Fri, Weekday::Sat, Weekday::Sun,
                ];
                let days = all.iter().enumerate()
                    .filter(|(i, _)| weekday_mask & (1 << i) != 0)
                    .map(|(_, d)| *d);
                builder = builder.on_weekdays(days);
            }
            if frequency == Frequency::Monthly && use_month_day {
                builder = builder.on_month_day(month_day);
            }
            builder = match term {
                0 => builder.count(count),
                1 => builder.until(
                    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
                        + chrono::Duration::days(until_offset),
                ),
                _ => builder,
            };
            builder.build().unwrap()
        }
    }

    proptest! {
        #[test]
        fn round_trip_law(rule in arb_rule()) {
            let encoded = rule.to_string();
            let decoded: RecurrenceRule = encoded.parse().unwrap();
            prop_assert_eq!(decoded, rule);
        }
    }
}
