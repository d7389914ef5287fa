//! Error types shared by the scanning and discovery services

use crate::domain::address::BdAddr;
use crate::domain::gatt::{AttErrorCode, AttrError};
use std::path::PathBuf;

/// Failure reported by a GATT transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("operation timed out")]
    Timeout,
    /// The link dropped or could not be re-established
    #[error("link lost: {0}")]
    Link(String),
    #[error("ATT error {0}")]
    Attribute(AttErrorCode),
    #[error("{0}")]
    Other(String),
}

impl From<TransportError> for AttrError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout => AttrError::ReadTimeout,
            TransportError::Attribute(code) => AttrError::Att(code),
            other => AttrError::Transport(other.to_string()),
        }
    }
}

/// A GATT run that produced nothing usable
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: BdAddr,
        #[source]
        source: TransportError,
    },
    #[error("primary service discovery failed: {0}")]
    PrimaryServices(#[source] TransportError),
    #[error("discovery cancelled before any service was found")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("LE scan failed: {0}")]
    Provider(String),
    #[error("failed to determine the address type of {0}")]
    AddressTypeUnknown(BdAddr),
    #[error("scan cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum SnifferError {
    #[error("no advertising channel could be assigned to a capture peripheral")]
    NoChannels,
    #[error("invalid advertising channel {0}")]
    InvalidChannel(u8),
    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: tokio_serial::Error,
    },
    #[error("failed to list serial ports: {0}")]
    Enumerate(#[source] tokio_serial::Error),
    #[error("serial link error: {0}")]
    Io(#[from] std::io::Error),
}
