//! GAP advertising data
//!
//! An advertising (or scan response) payload is a run of elements:
//!
//! ```text
//! [len: u8][type: u8][value: len - 1 bytes] [len][type][value] ... [0x00]
//! ```
//!
//! Payloads from third-party devices are often non-conformant, so decoding
//! is lenient: a zero length ends the run, and an element that claims more
//! bytes than remain ends it too. Whatever decoded before that point is kept.

use crate::domain::assigned::{self, ad_type};
use crate::domain::bt_uuid::BtUuid;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// GAP Flags AD type bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdFlags(pub u8);

impl AdFlags {
    pub const LE_LIMITED_DISCOVERABLE: u8 = 0x01;
    pub const LE_GENERAL_DISCOVERABLE: u8 = 0x02;
    pub const BR_EDR_NOT_SUPPORTED: u8 = 0x04;
    /// Bit 49 of the LMP feature mask (page 0)
    pub const SIMULTANEOUS_CONTROLLER: u8 = 0x08;
    /// Bit 66 of the LMP feature mask (page 1)
    pub const SIMULTANEOUS_HOST: u8 = 0x10;

    const NAMES: [(u8, &'static str); 5] = [
        (Self::LE_LIMITED_DISCOVERABLE, "LE Limited Discoverable Mode"),
        (Self::LE_GENERAL_DISCOVERABLE, "LE General Discoverable Mode"),
        (Self::BR_EDR_NOT_SUPPORTED, "BR/EDR Not Supported"),
        (
            Self::SIMULTANEOUS_CONTROLLER,
            "Simultaneous LE + BR/EDR to Same Device Capable (Controller)",
        ),
        (
            Self::SIMULTANEOUS_HOST,
            "Simultaneous LE + BR/EDR to Same Device Capable (Host)",
        ),
    ];

    pub fn contains(&self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn le_limited_discoverable(&self) -> bool {
        self.contains(Self::LE_LIMITED_DISCOVERABLE)
    }

    pub fn le_general_discoverable(&self) -> bool {
        self.contains(Self::LE_GENERAL_DISCOVERABLE)
    }

    pub fn br_edr_not_supported(&self) -> bool {
        self.contains(Self::BR_EDR_NOT_SUPPORTED)
    }

    /// Names of every flag that is set, lowest bit first
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

/// The decoded meaning of an AD element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdValue {
    Flags(AdFlags),
    ServiceUuids {
        complete: bool,
        uuids: Vec<BtUuid>,
    },
    ServiceData {
        uuid: BtUuid,
        data: Vec<u8>,
    },
    LocalName {
        complete: bool,
        name: String,
    },
    ManufacturerData {
        company_id: u16,
        data: Vec<u8>,
    },
    /// dBm
    TxPower(i8),
    Opaque,
}

/// One length-prefixed element of advertising data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdStruct {
    pub ad_type: u8,
    pub raw_value: Vec<u8>,
    pub value: AdValue,
}

impl AdStruct {
    pub fn new(ad_type: u8, raw_value: Vec<u8>) -> Self {
        let value = decode_value(ad_type, &raw_value);
        Self {
            ad_type,
            raw_value,
            value,
        }
    }

    pub fn type_name(&self) -> Option<&'static str> {
        assigned::ad_type_name(self.ad_type)
    }

    /// Company behind manufacturer specific data, if it is a known one
    pub fn company_name(&self) -> Option<&'static str> {
        match self.value {
            AdValue::ManufacturerData { company_id, .. } => assigned::company_name(company_id),
            _ => None,
        }
    }
}

/// Decode every element of an advertising payload, in order.
pub fn decode_all(raw: &[u8]) -> Vec<AdStruct> {
    let mut structs = Vec::new();
    let mut pos = 0;

    while pos < raw.len() {
        let len = raw[pos] as usize;
        if len == 0 {
            break;
        }
        if pos + 1 + len > raw.len() {
            debug!(
                "AD element at offset {} claims {} bytes, only {} remain; stopping",
                pos,
                len,
                raw.len() - pos - 1
            );
            break;
        }

        let ad_type = raw[pos + 1];
        let value = raw[pos + 2..pos + 1 + len].to_vec();
        structs.push(AdStruct::new(ad_type, value));

        pos += 1 + len;
    }

    structs
}

fn decode_value(kind: u8, value: &[u8]) -> AdValue {
    match kind {
        ad_type::FLAGS => match value.first() {
            Some(&bits) => AdValue::Flags(AdFlags(bits)),
            None => AdValue::Opaque,
        },
        ad_type::INCOMPLETE_16_BIT_UUIDS | ad_type::COMPLETE_16_BIT_UUIDS => {
            uuid_list(value, 2, kind == ad_type::COMPLETE_16_BIT_UUIDS)
        }
        ad_type::INCOMPLETE_32_BIT_UUIDS | ad_type::COMPLETE_32_BIT_UUIDS => {
            uuid_list(value, 4, kind == ad_type::COMPLETE_32_BIT_UUIDS)
        }
        ad_type::INCOMPLETE_128_BIT_UUIDS | ad_type::COMPLETE_128_BIT_UUIDS => {
            uuid_list(value, 16, kind == ad_type::COMPLETE_128_BIT_UUIDS)
        }
        ad_type::SHORTENED_LOCAL_NAME | ad_type::COMPLETE_LOCAL_NAME => AdValue::LocalName {
            complete: kind == ad_type::COMPLETE_LOCAL_NAME,
            name: String::from_utf8_lossy(value).into_owned(),
        },
        ad_type::TX_POWER_LEVEL => match value.first() {
            Some(&dbm) => AdValue::TxPower(dbm as i8),
            None => AdValue::Opaque,
        },
        ad_type::SERVICE_DATA_16_BIT_UUID => service_data(value, 2),
        ad_type::SERVICE_DATA_32_BIT_UUID => service_data(value, 4),
        ad_type::SERVICE_DATA_128_BIT_UUID => service_data(value, 16),
        ad_type::MANUFACTURER_SPECIFIC_DATA if value.len() >= 2 => AdValue::ManufacturerData {
            company_id: u16::from_le_bytes([value[0], value[1]]),
            data: value[2..].to_vec(),
        },
        _ => AdValue::Opaque,
    }
}

fn uuid_list(value: &[u8], width: usize, complete: bool) -> AdValue {
    let chunks = value.chunks_exact(width);
    if !chunks.remainder().is_empty() {
        debug!(
            "UUID list has {} trailing byte(s) after {}-byte entries",
            chunks.remainder().len(),
            width
        );
    }
    let uuids = chunks.filter_map(BtUuid::from_le_slice).collect();
    AdValue::ServiceUuids { complete, uuids }
}

fn service_data(value: &[u8], width: usize) -> AdValue {
    if value.len() < width {
        return AdValue::Opaque;
    }
    match BtUuid::from_le_slice(&value[..width]) {
        Some(uuid) => AdValue::ServiceData {
            uuid,
            data: value[width..].to_vec(),
        },
        None => AdValue::Opaque,
    }
}
