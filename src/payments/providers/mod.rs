//! Payment provider implementations
//!
//! Concrete implementations of the acquirer and lookup traits per provider.

pub mod epayco;

pub use epayco::{EpaycoAcquirer, EpaycoClient, EpaycoConfig};
