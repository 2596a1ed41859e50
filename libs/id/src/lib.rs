//! # labfleet-id
//!
//! Identifier types for the lab fleet.
//!
//! ## Design Principles
//!
//! - Identifiers come from external systems (GitHub logins, backend UUIDs)
//!   and are treated as opaque strings
//! - No case folding or normalization: `alice` and `Alice` are different
//!   students, and a typo in an owner field yields a distinct student
//! - Identifiers are typed to prevent mixing a student with an instance
//!
//! Examples:
//! - `StudentId`: `alice`, `eve-2020`
//! - `InstanceId`: `9f0c5e0b3c1a4d52b2d1a0e2c6f7a8b9`

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;
