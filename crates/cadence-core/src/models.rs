use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::rule::RecurrenceRule;

/// Half-open civil-date window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    /// All dates in the window, ascending.
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> {
        let mut current = self.start;
        let end = self.end;
        std::iter::from_fn(move || {
            if current >= end {
                return None;
            }
            let out = current;
            current += Duration::days(1);
            Some(out)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    /// Forecast template: occurrences feed the day-estimate calculator.
    Milestone,
    /// Actual-work template: occurrences are rendered on a calendar.
    Event,
}

/// Base payload a series stamps onto every occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrencePayload {
    pub title: String,
    /// Time budget per occurrence (milestones).
    #[serde(default)]
    pub hours: Option<f64>,
    /// Time-of-day span (events).
    #[serde(default)]
    pub starts_at: Option<NaiveTime>,
    #[serde(default)]
    pub ends_at: Option<NaiveTime>,
}

impl OccurrencePayload {
    pub fn milestone(title: impl Into<String>, hours: f64) -> Self {
        Self {
            title: title.into(),
            hours: Some(hours),
            starts_at: None,
            ends_at: None,
        }
    }

    /// Returns a copy with the patch's listed fields overriding this payload.
    pub fn apply(&self, patch: &PayloadPatch) -> Self {
        Self {
            title: patch.title.clone().unwrap_or_else(|| self.title.clone()),
            hours: patch.hours.or(self.hours),
            starts_at: patch.starts_at.or(self.starts_at),
            ends_at: patch.ends_at.or(self.ends_at),
        }
    }
}

/// Sparse per-occurrence override: `Some` fields replace the base payload,
/// `None` fields inherit from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<NaiveTime>,
}

impl PayloadPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.hours.is_none()
            && self.starts_at.is_none()
            && self.ends_at.is_none()
    }
}

/// Persisted master record for one recurring entity: the rule plus the base
/// payload every occurrence inherits. Occurrences themselves are never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: Uuid,
    pub project_id: Uuid,
    pub kind: SeriesKind,
    /// First candidate date; the rule expands forward from here.
    pub start: NaiveDate,
    pub rule: RecurrenceRule,
    pub payload: OccurrencePayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Series {
    pub fn new(
        project_id: Uuid,
        kind: SeriesKind,
        start: NaiveDate,
        rule: RecurrenceRule,
        payload: OccurrencePayload,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            project_id,
            kind,
            start,
            rule,
            payload,
            created_at: now,
            updated_at: now,
        }
    }
}

/// How a single occurrence deviates from its series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExceptionKind {
    /// The occurrence is removed from the expansion.
    Deleted,
    /// The listed fields replace the base payload for this occurrence.
    Modified(PayloadPatch),
}

/// Per-occurrence override, unique per `(series_id, date)`. Owned by its
/// series: deleting the series cascades its exceptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionRecord {
    pub series_id: Uuid,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub kind: ExceptionKind,
    pub created_at: DateTime<Utc>,
}

impl ExceptionRecord {
    pub fn deleted(series_id: Uuid, date: NaiveDate) -> Self {
        Self {
            series_id,
            date,
            kind: ExceptionKind::Deleted,
            created_at: Utc::now(),
        }
    }

    pub fn modified(series_id: Uuid, date: NaiveDate, patch: PayloadPatch) -> Self {
        Self {
            series_id,
            date,
            kind: ExceptionKind::Modified(patch),
            created_at: Utc::now(),
        }
    }
}

/// Computed materialization of one occurrence after exceptions are applied.
/// Never persisted; lives only as long as the expansion that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualInstance {
    pub series_id: Uuid,
    pub date: NaiveDate,
    pub payload: OccurrencePayload,
    /// True when a `Modified` exception shaped this instance.
    pub modified: bool,
}

/// Computed hours-needed for a single date; derived on demand, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct DayEstimate {
    pub date: NaiveDate,
    pub hours_needed: f64,
    pub milestone_id: Uuid,
}

/// Scope for edits and deletes targeting an occurrence of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditScope {
    /// Affect only the selected occurrence.
    ThisOccurrence,
    /// Split the series at the occurrence and change everything from it on.
    ThisAndFuture,
    /// Change or remove the whole series.
    AllOccurrences,
}

impl std::fmt::Display for EditScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditScope::ThisOccurrence => write!(f, "occurrence"),
            EditScope::ThisAndFuture => write!(f, "future"),
            EditScope::AllOccurrences => write!(f, "all"),
        }
    }
}

impl FromStr for EditScope {
    type Err = ParseEditScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "occurrence" | "this" => Ok(EditScope::ThisOccurrence),
            "future" | "this_and_future" => Ok(EditScope::ThisAndFuture),
            "all" | "series" => Ok(EditScope::AllOccurrences),
            _ => Err(ParseEditScopeError(s.to_string())),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid edit scope: {0}")]
pub struct ParseEditScopeError(String);

/// Per-project allocation mode. A project is in exactly one mode at any
/// time; the "both representations at once" state is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseMode {
    NoExplicitPhases,
    SplitPhases,
    RecurringTemplate,
}

impl std::fmt::Display for PhaseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseMode::NoExplicitPhases => write!(f, "none"),
            PhaseMode::SplitPhases => write!(f, "split"),
            PhaseMode::RecurringTemplate => write!(f, "recurring"),
        }
    }
}

impl FromStr for PhaseMode {
    type Err = ParsePhaseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(PhaseMode::NoExplicitPhases),
            "split" | "phases" => Ok(PhaseMode::SplitPhases),
            "recurring" | "template" => Ok(PhaseMode::RecurringTemplate),
            _ => Err(ParsePhaseModeError(s.to_string())),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid phase mode: {0}")]
pub struct ParsePhaseModeError(String);

/// One non-recurring allocation segment of a split-phase project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSegment {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub starts_on: NaiveDate,
    /// Inclusive end of the segment's span.
    pub ends_on: NaiveDate,
    pub hours: f64,
    /// Ordering within the project's phase sequence.
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub mode: PhaseMode,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            mode: PhaseMode::NoExplicitPhases,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn patch_overrides_only_listed_fields() {
        let base = OccurrencePayload::milestone("Sprint review", 2.0);
        let patch = PayloadPatch {
            hours: Some(3.0),
            ..Default::default()
        };
        let patched = base.apply(&patch);
        assert_eq!(patched.title, "Sprint review");
        assert_eq!(patched.hours, Some(3.0));
    }

    #[test]
    fn empty_patch_is_identity() {
        let base = OccurrencePayload::milestone("Standup", 0.5);
        assert_eq!(base.apply(&PayloadPatch::default()), base);
    }

    #[test]
    fn date_range_is_half_open() {
        let range = DateRange::new(date(2025, 3, 1), date(2025, 3, 4));
        assert!(range.contains(date(2025, 3, 1)));
        assert!(range.contains(date(2025, 3, 3)));
        assert!(!range.contains(date(2025, 3, 4)));
        assert_eq!(range.iter_days().count(), 3);
    }

    #[test]
    fn edit_scope_round_trips_through_display() {
        for scope in [
            EditScope::ThisOccurrence,
            EditScope::ThisAndFuture,
            EditScope::AllOccurrences,
        ] {
            assert_eq!(scope.to_string().parse::<EditScope>().unwrap(), scope);
        }
    }

    #[test]
    fn phase_mode_parses_aliases() {
        assert_eq!("phases".parse::<PhaseMode>().unwrap(), PhaseMode::SplitPhases);
        assert_eq!(
            "template".parse::<PhaseMode>().unwrap(),
            PhaseMode::RecurringTemplate
        );
        assert!("both".parse::<PhaseMode>().is_err());
    }

    mod serde_tests {
        use super::*;
        use crate::rule::{Frequency, RuleBuilder};
        use chrono::Weekday;
        use serde_json::json;
        use uuid::Uuid;

        #[test]
        fn exception_kind_tags_flatten_into_the_record() {
            let deleted = ExceptionRecord::deleted(Uuid::now_v7(), date(2025, 3, 14));
            let value = serde_json::to_value(&deleted).unwrap();
            assert_eq!(value["kind"], json!("deleted"));

            let patch = PayloadPatch {
                hours: Some(3.0),
                ..Default::default()
            };
            let modified =
                ExceptionRecord::modified(Uuid::now_v7(), date(2025, 3, 21), patch);
            let value = serde_json::to_value(&modified).unwrap();
            assert_eq!(value["kind"], json!("modified"));
            assert_eq!(value["hours"], json!(3.0));
            // Unset patch fields stay out of the output.
            assert!(value.get("title").is_none());
        }

        #[test]
        fn phase_mode_serializes_snake_case() {
            assert_eq!(
                serde_json::to_value(PhaseMode::NoExplicitPhases).unwrap(),
                json!("no_explicit_phases")
            );
            assert_eq!(
                serde_json::to_value(PhaseMode::SplitPhases).unwrap(),
                json!("split_phases")
            );
            assert_eq!(
                serde_json::to_value(PhaseMode::RecurringTemplate).unwrap(),
                json!("recurring_template")
            );
        }

        #[test]
        fn series_rule_travels_as_its_string_form() {
            let rule = RuleBuilder::new(Frequency::Weekly)
                .on_weekdays([Weekday::Fri])
                .build()
                .unwrap();
            let series = Series::new(
                Uuid::now_v7(),
                SeriesKind::Milestone,
                date(2025, 3, 1),
                rule,
                OccurrencePayload::milestone("Thesis chapter", 2.0),
            );
            let value = serde_json::to_value(&series).unwrap();
            assert_eq!(value["rule"], json!("FREQ=WEEKLY;BYDAY=FR"));
            assert_eq!(value["kind"], json!("milestone"));

            let back: Series = serde_json::from_value(value).unwrap();
            assert_eq!(back, series);
        }

        #[test]
        fn payload_tolerates_missing_optional_fields() {
            let payload: OccurrencePayload =
                serde_json::from_value(json!({ "title": "Kickoff" })).unwrap();
            assert_eq!(payload.title, "Kickoff");
            assert_eq!(payload.hours, None);
        }
    }
}
