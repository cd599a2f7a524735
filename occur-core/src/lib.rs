//! Core engine for occur.
//!
//! This crate expands recurring master events into concrete occurrences for a
//! query window and layers per-occurrence overrides on top:
//! - `event` and `date_range` for the data model
//! - `date_math` for wall-clock safe calendar arithmetic
//! - `exception` and `cache` for override records and the expansion cache
//! - `evaluator` for the RRULE boundary (backed by the `rrule` crate)
//! - `recurrence` for the expansion algorithm
//! - `store` for the query façade and series lifecycle operations

pub mod cache;
pub mod change;
pub mod config;
pub mod date_math;
pub mod date_range;
pub mod error;
pub mod evaluator;
pub mod event;
pub mod exception;
pub mod recurrence;
pub mod store;

pub use change::{ChangeKind, ChangeObserver, ChangeSet};
pub use crate::config::EngineConfig;
pub use date_range::QueryWindow;
pub use error::{OccurError, OccurResult};
pub use evaluator::{RRuleEvaluator, RecurrenceEvaluator};
pub use event::{Event, EventMetadata, Frequency, RecurrencePattern};
pub use exception::RecurrenceException;
pub use store::EventStore;
