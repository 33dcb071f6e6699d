//! ePayco payment integration
//!
//! Signature engine, transaction locator and notification reconciler, plus the
//! provider module that builds checkout payloads and looks up gateway
//! references.

pub mod locator;
pub mod providers;
pub mod reconciler;
pub mod signature;
pub mod traits;
pub mod types;
