pub mod cache;
pub mod gatt;
pub mod logging;
pub mod scanner;
pub mod sniffer;
