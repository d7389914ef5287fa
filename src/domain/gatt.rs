//! GATT attribute model
//!
//! The tree produced by one discovery run:
//!
//! ```text
//! GattService (start..=end)
//!   └─ GattCharacteristic (declaration, declaration + 1 = value)
//!        └─ GattDescriptor (handles between this value and the next declaration)
//! ```

use crate::domain::assigned;
use crate::domain::bt_uuid::BtUuid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest handle an attribute table can contain
pub const MAX_HANDLE: u16 = 0xFFFF;

/// An inclusive range of attribute handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRange {
    pub start: u16,
    pub end: u16,
}

impl HandleRange {
    /// `None` when `start > end` (no handles in between)
    pub fn new(start: u16, end: u16) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn contains(&self, handle: u16) -> bool {
        (self.start..=self.end).contains(&handle)
    }
}

impl fmt::Display for HandleRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}..=0x{:04X}", self.start, self.end)
    }
}

/// Characteristic properties bitfield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CharProperties(pub u8);

impl CharProperties {
    pub const BROADCAST: u8 = 0x01;
    pub const READ: u8 = 0x02;
    pub const WRITE_WITHOUT_RESPONSE: u8 = 0x04;
    pub const WRITE: u8 = 0x08;
    pub const NOTIFY: u8 = 0x10;
    pub const INDICATE: u8 = 0x20;
    pub const AUTHENTICATED_SIGNED_WRITES: u8 = 0x40;
    pub const EXTENDED_PROPERTIES: u8 = 0x80;

    const NAMES: [(u8, &'static str); 8] = [
        (Self::BROADCAST, "BROADCAST"),
        (Self::READ, "READ"),
        (Self::WRITE_WITHOUT_RESPONSE, "WRITE NO RESPONSE"),
        (Self::WRITE, "WRITE"),
        (Self::NOTIFY, "NOTIFY"),
        (Self::INDICATE, "INDICATE"),
        (Self::AUTHENTICATED_SIGNED_WRITES, "SIGNED WRITE"),
        (Self::EXTENDED_PROPERTIES, "EXTENDED PROPERTIES"),
    ];

    pub fn contains(&self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn readable(&self) -> bool {
        self.contains(Self::READ)
    }

    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

/// An ATT Error Response code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttErrorCode(pub u8);

impl AttErrorCode {
    pub const READ_NOT_PERMITTED: AttErrorCode = AttErrorCode(0x02);
    pub const INSUFFICIENT_AUTHENTICATION: AttErrorCode = AttErrorCode(0x05);
    pub const ATTRIBUTE_NOT_FOUND: AttErrorCode = AttErrorCode(0x0A);

    pub fn name(&self) -> &'static str {
        assigned::att_error_name(self.0).unwrap_or("Reserved")
    }
}

impl fmt::Display for AttErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} ({})", self.0, self.name())
    }
}

/// Why an attribute has no value or no children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrError {
    /// Timed out, including after the reconnect-and-retry
    ReadTimeout,
    /// The peer answered with an ATT Error Response
    Att(AttErrorCode),
    /// Anything else the transport reported
    Transport(String),
}

impl fmt::Display for AttrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadTimeout => f.write_str("timed out"),
            Self::Att(code) => write!(f, "ATT error {}", code),
            Self::Transport(msg) => f.write_str(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattDescriptor {
    pub handle: u16,
    pub type_uuid: BtUuid,
    pub value: Option<Vec<u8>>,
    pub read_error: Option<AttrError>,
}

impl GattDescriptor {
    pub fn new(handle: u16, type_uuid: BtUuid) -> Self {
        Self {
            handle,
            type_uuid,
            value: None,
            read_error: None,
        }
    }

    pub fn name(&self) -> Option<&'static str> {
        self.type_uuid.as_u16().and_then(assigned::descriptor_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattCharacteristic {
    pub declaration_handle: u16,
    pub properties: CharProperties,
    pub value_handle: u16,
    pub value_uuid: BtUuid,
    pub value: Option<Vec<u8>>,
    pub value_error: Option<AttrError>,
    pub descriptors: Vec<GattDescriptor>,
    /// Set when descriptor discovery failed for this characteristic
    pub descriptor_error: Option<AttrError>,
}

impl GattCharacteristic {
    /// Build from a characteristic declaration.
    ///
    /// Returns `None` unless the value attribute directly follows the
    /// declaration (`declaration_handle + 1 == value_handle`).
    pub fn new(
        declaration_handle: u16,
        properties: CharProperties,
        value_handle: u16,
        value_uuid: BtUuid,
    ) -> Option<Self> {
        if declaration_handle.checked_add(1) != Some(value_handle) {
            return None;
        }
        Some(Self {
            declaration_handle,
            properties,
            value_handle,
            value_uuid,
            value: None,
            value_error: None,
            descriptors: Vec::new(),
            descriptor_error: None,
        })
    }

    pub fn name(&self) -> Option<&'static str> {
        self.value_uuid.as_u16().and_then(assigned::characteristic_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattService {
    pub start_handle: u16,
    pub end_handle: u16,
    pub declaration_uuid: BtUuid,
    pub characteristics: Vec<GattCharacteristic>,
    /// Set when characteristic discovery failed for this service
    pub discovery_error: Option<AttrError>,
}

impl GattService {
    /// `None` if the handle range is inverted
    pub fn new(start_handle: u16, end_handle: u16, declaration_uuid: BtUuid) -> Option<Self> {
        HandleRange::new(start_handle, end_handle)?;
        Some(Self {
            start_handle,
            end_handle,
            declaration_uuid,
            characteristics: Vec::new(),
            discovery_error: None,
        })
    }

    pub fn handle_range(&self) -> HandleRange {
        HandleRange {
            start: self.start_handle,
            end: self.end_handle,
        }
    }

    pub fn name(&self) -> Option<&'static str> {
        self.declaration_uuid.as_u16().and_then(assigned::service_name)
    }

    /// Handle ranges that may hold descriptors, one entry per characteristic.
    ///
    /// For every characteristic but the last the range runs from just after
    /// its value handle to just before the next declaration; the last one runs
    /// to the end of the service. Entries are `None` when there is no gap.
    pub fn descriptor_ranges(&self) -> Vec<Option<HandleRange>> {
        let chars = &self.characteristics;
        chars
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let start = c.value_handle.checked_add(1)?;
                let end = match chars.get(i + 1) {
                    Some(next) => next.declaration_handle.checked_sub(1)?,
                    None => self.end_handle,
                };
                HandleRange::new(start, end)
            })
            .collect()
    }
}

/// Resolve missing service end handles.
///
/// A service without a reported end handle ends right before the next
/// service starts, or at [`MAX_HANDLE`] if it is the last one.
pub fn resolve_end_handles(starts: &[(u16, Option<u16>)]) -> Vec<u16> {
    starts
        .iter()
        .enumerate()
        .map(|(i, (_, end))| {
            end.unwrap_or_else(|| match starts.get(i + 1) {
                Some((next_start, _)) => next_start.saturating_sub(1),
                None => MAX_HANDLE,
            })
        })
        .collect()
}
