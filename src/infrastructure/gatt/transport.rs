use crate::domain::address::{AddressKind, BdAddr};
use crate::domain::bt_uuid::BtUuid;
use crate::domain::error::TransportError;
use crate::domain::gatt::{CharProperties, HandleRange};
use async_trait::async_trait;
use std::time::Duration;

/// A primary service as reported by the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryService {
    pub start_handle: u16,
    /// Some stacks leave this out; it is then derived from the next service
    pub end_handle: Option<u16>,
    pub uuid: BtUuid,
}

/// A characteristic declaration as reported by the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicDeclaration {
    pub declaration_handle: u16,
    pub properties: CharProperties,
    pub value_handle: u16,
    pub uuid: BtUuid,
}

/// Attribute-level access to one peer.
///
/// Implemented by the platform Bluetooth stack. Calls may block for a long
/// time; the discovery engine puts its own timeout around each one.
#[async_trait]
pub trait GattTransport: Send {
    async fn connect(
        &mut self,
        addr: BdAddr,
        kind: AddressKind,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    async fn discover_primary_services(&mut self) -> Result<Vec<PrimaryService>, TransportError>;

    async fn discover_characteristics(
        &mut self,
        service: HandleRange,
    ) -> Result<Vec<CharacteristicDeclaration>, TransportError>;

    async fn read_attribute(&mut self, handle: u16) -> Result<Vec<u8>, TransportError>;

    /// Handle and type of every descriptor in `range`
    async fn discover_descriptors(
        &mut self,
        range: HandleRange,
    ) -> Result<Vec<(u16, BtUuid)>, TransportError>;

    /// Drop the link and connect again to the same peer
    async fn reconnect(&mut self) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Answers pairing requests the peer may raise during discovery
#[async_trait]
pub trait PairingAgent: Send {
    async fn register(&mut self, io_capability: &str) -> Result<(), TransportError>;
    async fn unregister(&mut self) -> Result<(), TransportError>;
}

/// For transports that need no agent
#[derive(Debug, Default)]
pub struct NoAgent;

#[async_trait]
impl PairingAgent for NoAgent {
    async fn register(&mut self, _io_capability: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn unregister(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}
