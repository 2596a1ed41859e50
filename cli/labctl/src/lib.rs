//! labctl - lab VM fleet reconciler CLI.
//!
//! Wires the reconciliation library to the marketplace API, GitHub
//! discovery and plain-text reports.

pub mod client;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod error;
pub mod output;
pub mod report;
