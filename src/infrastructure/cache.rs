//! On-disk store for scan results
//!
//! Each result type lives in one JSON file named after its store key. The
//! most recent LE device scan doubles as the address-type cache.

use crate::domain::address::{AddressKind, BdAddr};
use crate::domain::models::{LeDevicesScanResult, ScanResult, LE_DEVICES_STORE_KEY};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Replace whatever was stored for this result type
    pub fn store<T: ScanResult>(&self, result: &T) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(result.store_key());
        let json = serde_json::to_string_pretty(result)?;
        fs::write(&path, json)?;
        debug!("Stored {} result in {}", result.result_type(), path.display());
        Ok(())
    }

    /// `Ok(None)` when nothing has been stored under `key` yet
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Address kind of `addr` as seen by the last cached LE scan.
    ///
    /// An unreadable cache counts as a miss.
    pub fn lookup_addr_kind(&self, addr: &BdAddr) -> Option<AddressKind> {
        match self.load::<LeDevicesScanResult>(LE_DEVICES_STORE_KEY) {
            Ok(cached) => cached?.find(addr).map(|d| d.addr_kind),
            Err(e) => {
                warn!("Ignoring unreadable address-type cache: {}", e);
                None
            }
        }
    }
}
