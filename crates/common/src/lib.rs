//! Common utilities and types shared across the allocator components.

#![warn(clippy::pedantic)]

/// Module for common data types
pub mod types;

/// Module for turning domain identifiers into metric path segments
pub mod metric_key;
