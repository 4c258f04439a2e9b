//! Utility functions for timestamps and display formatting.

pub mod format;

pub use format::{format_amount, iso_timestamp, local_timestamp};
