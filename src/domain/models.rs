use crate::domain::ad_struct::AdStruct;
use crate::domain::address::{AddressKind, BdAddr};
use crate::domain::gatt::{AttrError, GattService, HandleRange};
use crate::domain::bt_uuid::BtUuid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A top-level result a front-end can print and persist
pub trait ScanResult: Serialize {
    /// Human readable kind, e.g. "LE Devices" or "GATT"
    fn result_type(&self) -> &'static str;

    /// File stem used when the result is persisted
    fn store_key(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Sends SCAN_REQ; spoof the local address first
    #[default]
    Active,
    Passive,
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "passive" => Ok(Self::Passive),
            other => Err(format!("unknown scan mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Rssi,
    None,
}

/// One raw report from the LE scan provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingReport {
    pub addr: BdAddr,
    pub addr_kind: AddressKind,
    pub connectable: bool,
    pub rssi: i8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeDeviceInfo {
    pub addr: BdAddr,
    pub addr_kind: AddressKind,
    pub connectable: bool,
    pub rssi: i8,
    pub ad_structs: Vec<AdStruct>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LeDevicesScanResult {
    pub devices: Vec<LeDeviceInfo>,
}

impl LeDevicesScanResult {
    pub fn push(&mut self, info: LeDeviceInfo) {
        self.devices.push(info);
    }

    /// Strongest signal first; devices with equal RSSI keep scan order
    pub fn sort_by_rssi(&mut self) {
        self.devices.sort_by(|a, b| b.rssi.cmp(&a.rssi));
    }

    pub fn find(&self, addr: &BdAddr) -> Option<&LeDeviceInfo> {
        self.devices.iter().find(|d| d.addr == *addr)
    }
}

impl ScanResult for LeDevicesScanResult {
    fn result_type(&self) -> &'static str {
        "LE Devices"
    }

    fn store_key(&self) -> &'static str {
        LE_DEVICES_STORE_KEY
    }
}

pub const LE_DEVICES_STORE_KEY: &str = "le_devs_scan_result";
pub const GATT_STORE_KEY: &str = "gatt_scan_result";

/// Ordered phases of a GATT discovery run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiscoveryPhase {
    Connect,
    PrimaryServices,
    Characteristics,
    CharacteristicValues,
    Reconnect,
    Descriptors,
    DescriptorValues,
    Cleanup,
}

impl fmt::Display for DiscoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::PrimaryServices => "primary service discovery",
            Self::Characteristics => "characteristic discovery",
            Self::CharacteristicValues => "characteristic value read",
            Self::Reconnect => "reconnect",
            Self::Descriptors => "descriptor discovery",
            Self::DescriptorValues => "descriptor value read",
            Self::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// A non-fatal failure recorded during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryIssue {
    pub phase: DiscoveryPhase,
    /// The service start, value or descriptor handle the failure belongs to
    pub handle: Option<u16>,
    pub error: AttrError,
}

/// Why a run stopped before finishing every phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interruption {
    Cancelled { phase: DiscoveryPhase },
    LinkLost { phase: DiscoveryPhase, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattScanResult {
    pub peer: BdAddr,
    pub addr_kind: AddressKind,
    pub services: Vec<GattService>,
    pub issues: Vec<DiscoveryIssue>,
    /// `Some` means the tree may be incomplete
    pub interrupted: Option<Interruption>,
}

impl GattScanResult {
    pub fn new(peer: BdAddr, addr_kind: AddressKind) -> Self {
        Self {
            peer,
            addr_kind,
            services: Vec::new(),
            issues: Vec::new(),
            interrupted: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.interrupted.is_none()
    }
}

impl ScanResult for GattScanResult {
    fn result_type(&self) -> &'static str {
        "GATT"
    }

    fn store_key(&self) -> &'static str {
        GATT_STORE_KEY
    }
}

/// Progress reported while a GATT run is in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Connected {
        peer: BdAddr,
    },
    ServiceFound {
        range: HandleRange,
        uuid: BtUuid,
    },
    CharacteristicFound {
        service_start: u16,
        value_handle: u16,
        uuid: BtUuid,
    },
    CharacteristicValue {
        value_handle: u16,
        value: Result<Vec<u8>, AttrError>,
    },
    DescriptorFound {
        handle: u16,
        uuid: BtUuid,
    },
    DescriptorValue {
        handle: u16,
        value: Result<Vec<u8>, AttrError>,
    },
    Issue(DiscoveryIssue),
}
