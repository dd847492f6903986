//! Device Tuner common types and errors.
//!
//! Shared by the config and core crates:
//! - Error type with stable codes and categories
//! - Output format selection
//! - Sentinel strings for unavailable facts
//! - Schema versioning for emitted documents

pub mod error;
pub mod output;
pub mod schema;
pub mod sentinel;

pub use error::{Error, Result};
pub use output::OutputFormat;
pub use schema::{SchemaStamp, SCHEMA_VERSION};
