//! # Habits: Scope Hierarchy, Statistics, and Ordering
//!
//! Tasks live in one of four kinds of scope: a day, a month, a year, or a
//! user-defined project. Month and year tasks are roll-ups: their statistics
//! come from the day tasks of the same name inside their window.
//!
//! ## Module Structure
//!
//! - [`types`]: tasks, projects, scope and status codes, validation
//! - [`calendar`]: scope windows and partitions
//! - [`stats`]: completion, time, and streak aggregation plus its cache
//! - [`ordering`]: dense-position planners for insert, delete, swap, move
//! - [`project_stats`]: rolling-window activity for projects
//! - [`repair`]: detection and correction of ordering drift
//! - [`export`]: plain-text task log
//! - [`tracker`]: the facade the HTTP layer and CLI call into
//!
//! Everything except `repair` and `tracker` is pure and synchronous.

pub mod calendar;
pub mod export;
pub mod ordering;
pub mod project_stats;
pub mod repair;
pub mod stats;
pub mod tracker;
pub mod types;

pub use export::ExportFilter;
pub use ordering::Direction;
pub use repair::{repair_ordering, RepairReport};
pub use tracker::{DayTasks, MonthAndDays, Tracker};
pub use types::*;

#[cfg(test)]
mod tests;
