//! GATT discovery
//!
//! - [`transport`] - the attribute-level operations a platform stack provides
//! - [`retry`] - the reconnect-once / retry-once policy
//! - [`discovery`] - the phase-ordered discovery engine

pub mod discovery;
pub mod retry;
pub mod transport;

#[cfg(test)]
pub(crate) mod stub;

pub use discovery::{DiscoveryConfig, GattDiscovery};
pub use transport::{GattTransport, PairingAgent};
