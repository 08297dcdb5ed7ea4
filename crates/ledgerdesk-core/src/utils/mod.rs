//! Formatting helpers for console output.

pub mod format;

pub use format::{cmp_ignore_case, contains_ignore_case, format_amount, format_date, truncate};
