//! LE device scanner
//!
//! Drives a platform scan provider, decodes each report's advertising data and
//! keeps the address-type cache up to date.

use crate::domain::ad_struct;
use crate::domain::address::{AddressKind, BdAddr};
use crate::domain::error::ScanError;
use crate::domain::models::{
    AdvertisingReport, LeDeviceInfo, LeDevicesScanResult, ScanMode, SortOrder,
};
use crate::domain::settings::ScanSettings;
use crate::infrastructure::cache::ResultStore;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Platform primitive that listens for advertisements
#[async_trait]
pub trait LeScanProvider: Send {
    /// Scan for `duration`, sending one report per device as it is seen.
    ///
    /// Scan response data should already be merged into the report.
    async fn scan(
        &mut self,
        duration: Duration,
        mode: ScanMode,
        reports: mpsc::UnboundedSender<AdvertisingReport>,
    ) -> Result<(), ScanError>;

    /// Stop an in-flight scan and leave the controller idle
    async fn cancel(&mut self) -> Result<(), ScanError>;
}

pub struct LeScanner<P> {
    provider: P,
    settings: ScanSettings,
    events: Option<mpsc::UnboundedSender<LeDeviceInfo>>,
}

impl<P: LeScanProvider> LeScanner<P> {
    pub fn new(provider: P, settings: ScanSettings) -> Self {
        Self {
            provider,
            settings,
            events: None,
        }
    }

    /// Report every device as soon as it is decoded
    pub fn with_events(mut self, events: mpsc::UnboundedSender<LeDeviceInfo>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn into_provider(self) -> P {
        self.provider
    }

    /// Scan with the configured timeout, mode and order
    pub async fn scan_default(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<LeDevicesScanResult, ScanError> {
        let ScanSettings { mode, sort, .. } = self.settings;
        self.scan(self.settings.timeout(), mode, sort, cancel).await
    }

    pub async fn scan(
        &mut self,
        timeout: Duration,
        mode: ScanMode,
        sort: SortOrder,
        cancel: &CancellationToken,
    ) -> Result<LeDevicesScanResult, ScanError> {
        if mode == ScanMode::Active {
            warn!("Active scanning sends SCAN_REQ from the local address; spoof it before scanning");
        }
        info!("LE scan for {:?} ({:?})", timeout, mode);

        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let mut result = LeDevicesScanResult::default();
        let events = &self.events;

        let outcome = {
            let scan = self.provider.scan(timeout, mode, report_tx);
            tokio::pin!(scan);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break Err(ScanError::Cancelled),
                    outcome = &mut scan => break outcome,
                    Some(report) = report_rx.recv() => accept(report, events, &mut result),
                }
            }
        };

        if let Err(ScanError::Cancelled) = outcome {
            info!("LE scan cancelled, stopping provider");
            if let Err(e) = self.provider.cancel().await {
                warn!("Failed to stop LE scan: {}", e);
            }
            return Err(ScanError::Cancelled);
        }
        outcome?;

        while let Ok(report) = report_rx.try_recv() {
            accept(report, &self.events, &mut result);
        }

        if sort == SortOrder::Rssi {
            result.sort_by_rssi();
        }
        info!("LE scan found {} device(s)", result.devices.len());
        Ok(result)
    }

    /// Resolve whether `addr` is public or random.
    ///
    /// Checks the cached scan first; on a miss runs a passive scan, caches
    /// it and looks again.
    pub async fn determine_addr_type(
        &mut self,
        store: &ResultStore,
        addr: &BdAddr,
        cancel: &CancellationToken,
    ) -> Result<AddressKind, ScanError> {
        if let Some(kind) = store.lookup_addr_kind(addr) {
            debug!("{} is {} (cached)", addr, kind);
            return Ok(kind);
        }

        info!("{} not in the address-type cache, scanning passively", addr);
        let result = self
            .scan(self.settings.timeout(), ScanMode::Passive, SortOrder::None, cancel)
            .await?;
        if let Err(e) = store.store(&result) {
            warn!("Failed to update the address-type cache: {}", e);
        }

        result
            .find(addr)
            .map(|d| d.addr_kind)
            .ok_or(ScanError::AddressTypeUnknown(*addr))
    }
}

fn accept(
    report: AdvertisingReport,
    events: &Option<mpsc::UnboundedSender<LeDeviceInfo>>,
    result: &mut LeDevicesScanResult,
) {
    let info = LeDeviceInfo {
        addr: report.addr,
        addr_kind: report.addr_kind,
        connectable: report.connectable,
        rssi: report.rssi,
        ad_structs: ad_struct::decode_all(&report.data),
    };
    if let Some(sender) = events {
        let _ = sender.send(info.clone());
    }
    result.push(info);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ad_struct::AdValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn report(last: u8, addr_kind: AddressKind, rssi: i8) -> AdvertisingReport {
        AdvertisingReport {
            addr: BdAddr([0xC0, 0, 0, 0, 0, last]),
            addr_kind,
            connectable: true,
            rssi,
            data: vec![0x02, 0x01, 0x06],
        }
    }

    #[derive(Default)]
    struct StubProvider {
        reports: Vec<AdvertisingReport>,
        /// Keep scanning after the reports are sent, until cancelled
        hang: bool,
        scans: Vec<ScanMode>,
        cancels: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LeScanProvider for StubProvider {
        async fn scan(
            &mut self,
            _duration: Duration,
            mode: ScanMode,
            reports: mpsc::UnboundedSender<AdvertisingReport>,
        ) -> Result<(), ScanError> {
            self.scans.push(mode);
            for report in &self.reports {
                let _ = reports.send(report.clone());
            }
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn cancel(&mut self) -> Result<(), ScanError> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_scan_decodes_and_sorts() {
        let provider = StubProvider {
            reports: vec![
                report(1, AddressKind::Public, -70),
                report(2, AddressKind::Random, -30),
                report(3, AddressKind::Public, -50),
            ],
            ..Default::default()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scanner = LeScanner::new(provider, ScanSettings::default()).with_events(tx);

        let result = scanner
            .scan(
                Duration::from_secs(1),
                ScanMode::Passive,
                SortOrder::Rssi,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let rssi: Vec<i8> = result.devices.iter().map(|d| d.rssi).collect();
        assert_eq!(rssi, vec![-30, -50, -70]);
        assert!(matches!(result.devices[0].ad_structs[0].value, AdValue::Flags(_)));

        // Events arrive in scan order, before sorting
        let mut streamed = Vec::new();
        while let Ok(info) = rx.try_recv() {
            streamed.push(info.rssi);
        }
        assert_eq!(streamed, vec![-70, -30, -50]);
    }

    #[tokio::test]
    async fn test_unsorted_scan_keeps_order() {
        let provider = StubProvider {
            reports: vec![report(1, AddressKind::Public, -70), report(2, AddressKind::Public, -30)],
            ..Default::default()
        };
        let mut scanner = LeScanner::new(provider, ScanSettings::default());
        let result = scanner
            .scan(
                Duration::from_secs(1),
                ScanMode::Active,
                SortOrder::None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.devices[0].rssi, -70);
        assert_eq!(scanner.into_provider().scans, vec![ScanMode::Active]);
    }

    #[tokio::test]
    async fn test_cancel_stops_provider() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let provider = StubProvider {
            reports: vec![report(1, AddressKind::Public, -70)],
            hang: true,
            cancels: cancels.clone(),
            ..Default::default()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scanner = LeScanner::new(provider, ScanSettings::default()).with_events(tx);
        let cancel = CancellationToken::new();

        let (result, _) = tokio::join!(
            scanner.scan(Duration::from_secs(60), ScanMode::Passive, SortOrder::Rssi, &cancel),
            async {
                rx.recv().await;
                cancel.cancel();
            }
        );

        assert!(matches!(result, Err(ScanError::Cancelled)));
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scan_default_follows_settings() {
        let provider = StubProvider {
            reports: vec![report(1, AddressKind::Public, -70), report(2, AddressKind::Public, -30)],
            ..Default::default()
        };
        let settings = ScanSettings {
            timeout_secs: 1,
            mode: ScanMode::Active,
            sort: SortOrder::None,
        };
        let mut scanner = LeScanner::new(provider, settings);
        let result = scanner.scan_default(&CancellationToken::new()).await.unwrap();

        assert_eq!(result.devices[0].rssi, -70);
        assert_eq!(scanner.into_provider().scans, vec![ScanMode::Active]);
    }

    #[tokio::test]
    async fn test_determine_addr_type_uses_cache_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let target = BdAddr([0xC0, 0, 0, 0, 0, 2]);
        let provider = StubProvider {
            reports: vec![report(1, AddressKind::Public, -70), report(2, AddressKind::Random, -30)],
            ..Default::default()
        };
        let mut scanner = LeScanner::new(provider, ScanSettings::default());
        let cancel = CancellationToken::new();

        let kind = scanner.determine_addr_type(&store, &target, &cancel).await.unwrap();
        assert_eq!(kind, AddressKind::Random);
        assert_eq!(store.lookup_addr_kind(&target), Some(AddressKind::Random));

        // Second lookup is served from the cache
        let kind = scanner.determine_addr_type(&store, &target, &cancel).await.unwrap();
        assert_eq!(kind, AddressKind::Random);
        assert_eq!(scanner.into_provider().scans, vec![ScanMode::Passive]);
    }

    #[tokio::test]
    async fn test_determine_addr_type_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let mut scanner = LeScanner::new(StubProvider::default(), ScanSettings::default());
        let missing = BdAddr([1, 2, 3, 4, 5, 6]);

        let err = scanner
            .determine_addr_type(&store, &missing, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::AddressTypeUnknown(addr) if addr == missing));
    }
}
