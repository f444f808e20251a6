//! FuelOps Core - Domain types and ledger arithmetic.
//!
//! This crate provides the fuel inventory ledger used by every FuelOps
//! component:
//! - `server` - JSON request/response service over Postgres
//! - `cli` - Command-line tools for migrations and unit registration
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access. Writers load the rows they need under lock, apply the rules here,
//! and persist the result; readers project rows through the same rules.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, liters, and ledger enums
//! - [`error`] - Business-rule error taxonomy
//! - [`unit`] / [`driver`] - Registry records
//! - [`lot`] - Lot coding and the per-unit lot book (debit/credit arithmetic)
//! - [`trip`] - Trip lifecycle
//! - [`transfer`] - Sale/transfer/testing records and activity totals
//! - [`reconcile`] - Meter-vs-ledger reconciliation
//! - [`stock`] - Stock summary projection
//! - [`ops`] / [`readings`] - Day and trip views

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod driver;
pub mod error;
pub mod lot;
pub mod ops;
pub mod readings;
pub mod reconcile;
pub mod stock;
pub mod transfer;
pub mod trip;
pub mod types;
pub mod unit;

pub use error::LedgerError;
pub use types::*;
