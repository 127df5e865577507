//! StageOps - operational CLI around the datagate engine
//!
//! Loads CSV files into text staging tables, runs migrations, promotes staged
//! rows through dataset definitions and inspects the rejects they leave.

pub mod cli;
pub mod config;
pub mod datasets;
pub mod loader;
pub mod migrations;
pub mod people;
pub mod rejects_export;
