//! Core types for the FuelOps ledger.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod status;

pub use id::*;
pub use status::*;

/// Volume in liters.
///
/// Decimal arithmetic keeps ledger sums exact, so conservation checks can
/// compare with `==` instead of an epsilon.
pub type Liters = rust_decimal::Decimal;
