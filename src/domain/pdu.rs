//! Advertising physical channel PDUs
//!
//! Decodes link-layer packets captured on the primary advertising channels
//! (Core Specification Vol 6, Part B, 2.3).
//!
//! # Header (2 bytes)
//!
//! ```text
//! byte 0: bits 0-3  PDU type
//!         bit  4    RFU
//!         bit  5    ChSel
//!         bit  6    TxAdd (kind of the first address, 1 = random)
//!         bit  7    RxAdd (kind of the second address, 1 = random)
//! byte 1: payload length
//! ```
//!
//! # Payload
//!
//! ```text
//! ADV_IND / ADV_NONCONN_IND / ADV_SCAN_IND : AdvA(6) [AdvData]
//! ADV_DIRECT_IND                           : AdvA(6) TargetA(6)
//! SCAN_REQ                                 : ScanA(6) AdvA(6)
//! SCAN_RSP                                 : AdvA(6) [ScanRspData]
//! CONNECT_IND                              : InitA(6) AdvA(6) [LLData]
//! ADV_EXT_IND                              : opaque
//! ```

use crate::domain::ad_struct::{self, AdStruct};
use crate::domain::address::{AddressKind, BdAddr};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

pub const HEADER_LEN: usize = 2;
/// Largest PDU the capture firmware can hand over: header plus 255 payload bytes
pub const MAX_PDU_LEN: usize = HEADER_LEN + 255;

const PDU_TYPE_MASK: u8 = 0b0000_1111;
const CH_SEL_BIT: u8 = 1 << 5;
const TX_ADD_BIT: u8 = 1 << 6;
const RX_ADD_BIT: u8 = 1 << 7;

/// One of the three primary advertising channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AdvChannel {
    Ch37,
    Ch38,
    Ch39,
}

impl AdvChannel {
    pub const ALL: [AdvChannel; 3] = [Self::Ch37, Self::Ch38, Self::Ch39];

    pub fn index(&self) -> u8 {
        match self {
            Self::Ch37 => 37,
            Self::Ch38 => 38,
            Self::Ch39 => 39,
        }
    }
}

impl TryFrom<u8> for AdvChannel {
    type Error = u8;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        match index {
            37 => Ok(Self::Ch37),
            38 => Ok(Self::Ch38),
            39 => Ok(Self::Ch39),
            other => Err(other),
        }
    }
}

impl fmt::Display for AdvChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum PduKind {
    ADV_IND,
    ADV_DIRECT_IND,
    ADV_NONCONN_IND,
    SCAN_REQ,
    SCAN_RSP,
    CONNECT_IND,
    ADV_SCAN_IND,
    ADV_EXT_IND,
}

impl PduKind {
    pub fn from_type(pdu_type: u8) -> Option<Self> {
        match pdu_type {
            0b0000 => Some(Self::ADV_IND),
            0b0001 => Some(Self::ADV_DIRECT_IND),
            0b0010 => Some(Self::ADV_NONCONN_IND),
            0b0011 => Some(Self::SCAN_REQ),
            0b0100 => Some(Self::SCAN_RSP),
            0b0101 => Some(Self::CONNECT_IND),
            0b0110 => Some(Self::ADV_SCAN_IND),
            0b0111 => Some(Self::ADV_EXT_IND),
            _ => None,
        }
    }

    /// Address fields carried by this PDU, in payload order
    fn address_roles(&self) -> &'static [AddressRole] {
        use AddressRole::*;
        match self {
            Self::ADV_IND | Self::ADV_NONCONN_IND | Self::ADV_SCAN_IND | Self::SCAN_RSP => &[AdvA],
            Self::ADV_DIRECT_IND => &[AdvA, TargetA],
            Self::SCAN_REQ => &[ScanA, AdvA],
            Self::CONNECT_IND => &[InitA, AdvA],
            Self::ADV_EXT_IND => &[],
        }
    }

    /// Whether the bytes after the addresses are GAP advertising data
    pub fn carries_ad_structs(&self) -> bool {
        matches!(
            self,
            Self::ADV_IND | Self::ADV_NONCONN_IND | Self::ADV_SCAN_IND | Self::SCAN_RSP
        )
    }
}

impl fmt::Display for PduKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The field an address was carried in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressRole {
    AdvA,
    TargetA,
    ScanA,
    InitA,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PduAddress {
    pub role: AddressRole,
    pub bd_addr: BdAddr,
    pub kind: AddressKind,
}

/// The decoded first header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PduHeader {
    pub pdu_type: u8,
    pub ch_sel: bool,
    pub tx_add: bool,
    pub rx_add: bool,
    pub length: u8,
}

impl PduHeader {
    pub fn parse(header: [u8; 2]) -> Self {
        Self {
            pdu_type: header[0] & PDU_TYPE_MASK,
            ch_sel: header[0] & CH_SEL_BIT != 0,
            tx_add: header[0] & TX_ADD_BIT != 0,
            rx_add: header[0] & RX_ADD_BIT != 0,
            length: header[1],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PduError {
    #[error("PDU too short: need {needed} bytes, got {got}")]
    TooShort { needed: usize, got: usize },
    #[error("unknown PDU type 0x{0:02X}")]
    UnknownType(u8),
}

/// A decoded advertising physical channel PDU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisingPdu {
    pub kind: PduKind,
    pub addresses: Vec<PduAddress>,
    pub channel: AdvChannel,
    pub ch_sel: bool,
    /// AdvData, ScanRspData or LLData following the addresses
    pub data: Vec<u8>,
}

impl AdvertisingPdu {
    /// The advertiser's address, when the PDU carries one
    pub fn adv_a(&self) -> Option<&PduAddress> {
        self.addresses.iter().find(|a| a.role == AddressRole::AdvA)
    }

    /// AD structures of the advertising / scan response data
    pub fn ad_structs(&self) -> Vec<AdStruct> {
        if self.kind.carries_ad_structs() {
            ad_struct::decode_all(&self.data)
        } else {
            Vec::new()
        }
    }
}

/// Decode a raw PDU, reporting why it could not be decoded.
pub fn try_decode(pdu: &[u8], channel: AdvChannel) -> Result<AdvertisingPdu, PduError> {
    if pdu.len() < HEADER_LEN {
        return Err(PduError::TooShort {
            needed: HEADER_LEN,
            got: pdu.len(),
        });
    }

    let header = PduHeader::parse([pdu[0], pdu[1]]);
    let kind = PduKind::from_type(header.pdu_type).ok_or(PduError::UnknownType(header.pdu_type))?;

    // Trust the length byte, but never read past what was captured.
    let end = (HEADER_LEN + header.length as usize).min(pdu.len());
    let payload = &pdu[HEADER_LEN..end];

    let roles = kind.address_roles();
    let needed = roles.len() * BdAddr::LEN;
    if payload.len() < needed {
        return Err(PduError::TooShort {
            needed: HEADER_LEN + needed,
            got: HEADER_LEN + payload.len(),
        });
    }

    let addresses = roles
        .iter()
        .enumerate()
        .filter_map(|(i, role)| {
            let bd_addr = BdAddr::from_le_slice(&payload[i * BdAddr::LEN..])?;
            let kind_bit = if i == 0 { header.tx_add } else { header.rx_add };
            Some(PduAddress {
                role: *role,
                bd_addr,
                kind: AddressKind::from_bit(kind_bit),
            })
        })
        .collect();

    Ok(AdvertisingPdu {
        kind,
        addresses,
        channel,
        ch_sel: header.ch_sel,
        data: payload[needed..].to_vec(),
    })
}

/// Decode a raw PDU, logging and returning `None` if it cannot be decoded.
pub fn decode(pdu: &[u8], channel: AdvChannel) -> Option<AdvertisingPdu> {
    match try_decode(pdu, channel) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!("Dropping PDU on channel {}: {}", channel, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADV_A: [u8; 6] = [0x66, 0x55, 0x44, 0x33, 0x22, 0x11];
    const OTHER: [u8; 6] = [0x06, 0x05, 0x04, 0x03, 0x02, 0x01];

    fn pdu(header0: u8, payload: &[u8]) -> Vec<u8> {
        let mut raw = vec![header0, payload.len() as u8];
        raw.extend_from_slice(payload);
        raw
    }

    #[test]
    fn test_header_field_extraction() {
        let header = PduHeader::parse([0b1010_0101, 12]);
        assert_eq!(header.pdu_type, 5);
        assert!(header.ch_sel);
        assert!(!header.tx_add);
        assert!(header.rx_add);
        assert_eq!(PduKind::from_type(header.pdu_type), Some(PduKind::CONNECT_IND));
    }

    #[test]
    fn test_adv_ind_with_data() {
        let mut payload = ADV_A.to_vec();
        payload.extend_from_slice(&[0x02, 0x01, 0x06]);
        let decoded = decode(&pdu(0b0100_0000, &payload), AdvChannel::Ch37).unwrap();

        assert_eq!(decoded.kind, PduKind::ADV_IND);
        assert_eq!(decoded.addresses.len(), 1);
        let adv_a = decoded.adv_a().unwrap();
        assert_eq!(adv_a.bd_addr.to_string(), "11:22:33:44:55:66");
        assert_eq!(adv_a.kind, AddressKind::Random);
        assert_eq!(decoded.data, vec![0x02, 0x01, 0x06]);
        assert_eq!(decoded.ad_structs().len(), 1);
    }

    #[test]
    fn test_connect_ind_addresses_use_tx_then_rx_kind() {
        let mut payload = OTHER.to_vec();
        payload.extend_from_slice(&ADV_A);
        payload.extend_from_slice(&[0xAB; 22]);
        let decoded = decode(&pdu(0b1010_0101, &payload), AdvChannel::Ch38).unwrap();

        assert_eq!(decoded.kind, PduKind::CONNECT_IND);
        assert!(decoded.ch_sel);
        assert_eq!(decoded.addresses[0].role, AddressRole::InitA);
        assert_eq!(decoded.addresses[0].kind, AddressKind::Public);
        assert_eq!(decoded.addresses[0].bd_addr.to_string(), "01:02:03:04:05:06");
        assert_eq!(decoded.addresses[1].role, AddressRole::AdvA);
        assert_eq!(decoded.addresses[1].kind, AddressKind::Random);
        assert_eq!(decoded.data.len(), 22);
        assert!(decoded.ad_structs().is_empty());
    }

    #[test]
    fn test_scan_req_and_direct_ind_roles() {
        let mut payload = OTHER.to_vec();
        payload.extend_from_slice(&ADV_A);

        let scan_req = decode(&pdu(0x03, &payload), AdvChannel::Ch39).unwrap();
        assert_eq!(scan_req.addresses[0].role, AddressRole::ScanA);
        assert_eq!(scan_req.adv_a().unwrap().bd_addr.to_string(), "11:22:33:44:55:66");

        let direct = decode(&pdu(0x01, &payload), AdvChannel::Ch39).unwrap();
        assert_eq!(direct.addresses[0].role, AddressRole::AdvA);
        assert_eq!(direct.addresses[1].role, AddressRole::TargetA);
    }

    #[test]
    fn test_adv_ext_ind_has_no_addresses() {
        let decoded = decode(&pdu(0x07, &[0x01, 0x02, 0x03]), AdvChannel::Ch37).unwrap();
        assert_eq!(decoded.kind, PduKind::ADV_EXT_IND);
        assert!(decoded.addresses.is_empty());
        assert_eq!(decoded.data, vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_unknown_type_is_none() {
        for pdu_type in 8u8..=15 {
            assert_eq!(
                try_decode(&pdu(pdu_type, &ADV_A), AdvChannel::Ch37),
                Err(PduError::UnknownType(pdu_type))
            );
            assert!(decode(&pdu(pdu_type, &ADV_A), AdvChannel::Ch37).is_none());
        }
    }

    #[test]
    fn test_truncated_payload_is_none() {
        assert!(decode(&[0x00], AdvChannel::Ch37).is_none());
        // CONNECT_IND with only one address present
        assert!(matches!(
            try_decode(&pdu(0x05, &ADV_A), AdvChannel::Ch37),
            Err(PduError::TooShort { needed: 14, got: 8 })
        ));
        // length byte larger than what was captured
        let mut raw = vec![0x00, 0x20];
        raw.extend_from_slice(&ADV_A[..4]);
        assert!(decode(&raw, AdvChannel::Ch37).is_none());
    }

    #[test]
    fn test_decode_is_pure() {
        let mut payload = ADV_A.to_vec();
        payload.extend_from_slice(&[0x03, 0x09, b'h', b'i']);
        let raw = pdu(0x40, &payload);
        assert_eq!(
            decode(&raw, AdvChannel::Ch38),
            decode(&raw, AdvChannel::Ch38)
        );
    }

    #[test]
    fn test_channel_conversion() {
        assert_eq!(AdvChannel::try_from(38), Ok(AdvChannel::Ch38));
        assert_eq!(AdvChannel::try_from(12), Err(12));
        assert_eq!(AdvChannel::Ch39.index(), 39);
    }
}
