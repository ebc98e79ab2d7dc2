//! # Cadence Core Library
//!
//! A recurrence and forecasting engine for project planning: recurring
//! series expand lazily into virtual occurrences, per-occurrence exceptions
//! patch them, and milestone allocations turn into per-day time estimates.
//!
//! ## Features
//!
//! - **Lazy Expansion**: Occurrences are computed on demand over a window,
//!   never stored; closed-form skip-ahead keeps far-future windows cheap
//! - **Exception Records**: Delete or modify single occurrences without
//!   touching the series master
//! - **Scoped Editing**: Edit or delete one occurrence, the whole series,
//!   or split it so only future occurrences change, with rollback on
//!   mid-flight failure
//! - **Day Estimates**: Milestone hours spread over active working days,
//!   with recorded actual work subtracted so nothing is double counted
//! - **Phase Exclusivity**: A project plans with split phases or a
//!   recurring template, never both at once
//!
//! ## Core Modules
//!
//! - [`models`]: Core data structures (series, exceptions, projects)
//! - [`rule`]: Recurrence rule model, text codec, and legacy conversion
//! - [`expand`]: Lazy window expansion and occurrence indexing
//! - [`editor`]: Scoped edits and deletes, including series splitting
//! - [`estimate`]: Per-day time forecasts with actual-work settlement
//! - [`guard`]: Phase-mode exclusivity and orphan detection
//! - [`store`]: Async persistence traits plus an in-memory reference store
//! - [`error`]: Error types with context
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cadence_core::{
//!     expand::preview,
//!     models::{OccurrencePayload, Series, SeriesKind},
//!     rule::RecurrenceRule,
//! };
//! use chrono::NaiveDate;
//! use uuid::Uuid;
//!
//! fn main() -> Result<(), cadence_core::error::CoreError> {
//!     let rule: RecurrenceRule = "FREQ=WEEKLY;BYDAY=FR".parse()?;
//!     let series = Series::new(
//!         Uuid::now_v7(),
//!         SeriesKind::Milestone,
//!         NaiveDate::from_ymd_opt(2025, 3, 7).unwrap(),
//!         rule,
//!         OccurrencePayload::milestone("Weekly deliverable", 2.0),
//!     );
//!
//!     for instance in preview(&series, series.start, 4, &[]) {
//!         println!("{}: {}", instance.date, instance.payload.title);
//!     }
//!     Ok(())
//! }
//! ```

pub mod editor;
pub mod error;
pub mod estimate;
pub mod expand;
pub mod guard;
pub mod models;
pub mod rule;
pub mod store;
