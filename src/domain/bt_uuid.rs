//! Bluetooth UUIDs
//!
//! Short (16/32-bit) UUIDs are aliases into the Bluetooth Base UUID
//! `00000000-0000-1000-8000-00805F9B34FB`. They are kept in their short form so
//! assigned-number lookups stay cheap.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const BASE_UUID_TAIL: [u8; 12] = [
    0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5F, 0x9B, 0x34, 0xFB,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BtUuid {
    Uuid16(u16),
    Uuid32(u32),
    Uuid128(Uuid),
}

impl BtUuid {
    /// Parse a little-endian UUID of 2, 4 or 16 bytes
    pub fn from_le_slice(bytes: &[u8]) -> Option<Self> {
        match bytes.len() {
            2 => Some(Self::Uuid16(u16::from_le_bytes([bytes[0], bytes[1]]))),
            4 => Some(Self::Uuid32(u32::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]))),
            16 => {
                let mut be = [0u8; 16];
                be.copy_from_slice(bytes);
                be.reverse();
                Some(Self::Uuid128(Uuid::from_bytes(be)))
            }
            _ => None,
        }
    }

    /// Expand to the full 128-bit form
    pub fn to_uuid(&self) -> Uuid {
        match *self {
            Self::Uuid16(short) => Self::expand(short as u32),
            Self::Uuid32(short) => Self::expand(short),
            Self::Uuid128(full) => full,
        }
    }

    /// The 16-bit alias, if this UUID is (or expands from) one
    pub fn as_u16(&self) -> Option<u16> {
        match *self {
            Self::Uuid16(short) => Some(short),
            Self::Uuid32(short) => u16::try_from(short).ok(),
            Self::Uuid128(full) => {
                let bytes = full.as_bytes();
                if bytes[..2] == [0, 0] && bytes[4..] == BASE_UUID_TAIL {
                    Some(u16::from_be_bytes([bytes[2], bytes[3]]))
                } else {
                    None
                }
            }
        }
    }

    fn expand(short: u32) -> Uuid {
        let mut bytes = [0u8; 16];
        bytes[..4].copy_from_slice(&short.to_be_bytes());
        bytes[4..].copy_from_slice(&BASE_UUID_TAIL);
        Uuid::from_bytes(bytes)
    }
}

impl From<u16> for BtUuid {
    fn from(short: u16) -> Self {
        Self::Uuid16(short)
    }
}

impl From<Uuid> for BtUuid {
    fn from(full: Uuid) -> Self {
        Self::Uuid128(full)
    }
}

impl fmt::Display for BtUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid16(short) => write!(f, "0x{:04X}", short),
            Self::Uuid32(short) => write!(f, "0x{:08X}", short),
            Self::Uuid128(full) => write!(f, "{}", full.hyphenated().to_string().to_uppercase()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_uuid_expands_into_base() {
        let uuid = BtUuid::Uuid16(0x180D);
        assert_eq!(
            uuid.to_uuid().to_string(),
            "0000180d-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(BtUuid::Uuid128(uuid.to_uuid()).as_u16(), Some(0x180D));
    }

    #[test]
    fn test_from_le_slice_widths() {
        assert_eq!(
            BtUuid::from_le_slice(&[0x0D, 0x18]),
            Some(BtUuid::Uuid16(0x180D))
        );
        assert_eq!(
            BtUuid::from_le_slice(&[0x78, 0x56, 0x34, 0x12]),
            Some(BtUuid::Uuid32(0x1234_5678))
        );
        assert!(BtUuid::from_le_slice(&[1, 2, 3]).is_none());

        let mut le = *Uuid::parse_str("4f63756c-7573-2054-6872-65656d6f7465")
            .unwrap()
            .as_bytes();
        le.reverse();
        let parsed = BtUuid::from_le_slice(&le).unwrap();
        assert_eq!(parsed.to_string(), "4F63756C-7573-2054-6872-65656D6F7465");
        assert_eq!(parsed.as_u16(), None);
    }
}
