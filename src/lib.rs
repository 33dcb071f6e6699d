//! ePayco payment gateway integration
//!
//! Verifies ePayco notifications against a shared-secret signature and moves
//! the matching payment transaction to `done`, `pending` or `cancelled`.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod payments;
