//! Bluetooth LE reconnaissance core
//!
//! - advertising PDU sniffing through serial capture peripherals
//! - LE device scanning with an address-type cache
//! - GATT attribute tree discovery

pub mod domain;
pub mod infrastructure;
