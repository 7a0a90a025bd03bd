//! Media-buying budget planner.
//!
//! The recalculation engine turns a plan (total budget, sell CPM, line items)
//! into per-line financials and a blended totals record, converting between
//! each line's native currency and the plan's display currency.

pub mod allocation;
pub mod cache;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod format;
pub mod fx;
pub mod line;
pub mod reference;
pub mod store;
pub mod types;
