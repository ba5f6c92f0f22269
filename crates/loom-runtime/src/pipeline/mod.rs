//! Pipeline modules — JSON payload construction for event persistence.

pub mod persistence;
