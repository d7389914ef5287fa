//! Bluetooth device addresses
//!
//! Addresses are kept in display order (most significant byte first). Over
//! the air they travel little-endian, so anything read from a PDU goes through
//! [`BdAddr::from_le_slice`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 48-bit Bluetooth device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    pub const LEN: usize = 6;

    /// Build an address from the little-endian wire representation.
    ///
    /// Returns `None` if fewer than six bytes are available.
    pub fn from_le_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 6] = bytes.get(..Self::LEN)?.try_into().ok()?;
        let mut addr = raw;
        addr.reverse();
        Some(Self(addr))
    }

    /// Bytes in the order they appear on the wire
    pub fn to_le_bytes(self) -> [u8; 6] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid Bluetooth address: {0}")]
pub struct ParseAddrError(pub String);

impl FromStr for BdAddr {
    type Err = ParseAddrError;

    /// Accepts `AA:BB:CC:DD:EE:FF` or `AA-BB-CC-DD-EE-FF`, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split([':', '-']).collect();
        if parts.len() != Self::LEN {
            return Err(ParseAddrError(s.to_string()));
        }

        let mut addr = [0u8; 6];
        for (byte, part) in addr.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(ParseAddrError(s.to_string()));
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| ParseAddrError(s.to_string()))?;
        }
        Ok(Self(addr))
    }
}

// Cached results store the canonical text form so the cache stays readable.
impl Serialize for BdAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BdAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Whether an address is a public (IEEE assigned) or random address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    #[default]
    Public,
    Random,
}

impl AddressKind {
    /// Interpret a TxAdd / RxAdd header bit
    pub fn from_bit(bit: bool) -> Self {
        if bit {
            Self::Random
        } else {
            Self::Public
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressKind {
    type Err = ParseAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "random" => Ok(Self::Random),
            _ => Err(ParseAddrError(s.to_string())),
        }
    }
}
