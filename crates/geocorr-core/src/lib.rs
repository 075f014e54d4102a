//! geocorr Core - Domain models, table schema, and configuration
//!
//! This crate contains the domain types shared by every geocorr crate: survey
//! lines, boreholes, lab records and the derived result tables, together with
//! the column mapper that turns raw uploaded tables into canonical ones.

pub mod classify;
pub mod config;
pub mod error;
pub mod models;
pub mod schema;
pub mod table;

pub use error::{GeocorrError, Result};
