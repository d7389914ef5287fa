//! Domain types: wire decoders, the GATT attribute model and settings.

pub mod ad_struct;
pub mod address;
pub mod assigned;
pub mod bt_uuid;
pub mod error;
pub mod gatt;
pub mod models;
pub mod pdu;
pub mod settings;
