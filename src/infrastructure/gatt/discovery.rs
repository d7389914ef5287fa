//! GATT discovery engine
//!
//! Walks a peer's attribute table in a fixed order:
//!
//! 1. connect
//! 2. primary services
//! 3. characteristics of each service
//! 4. values of readable characteristics
//! 5. reconnect (optional)
//! 6. descriptors between characteristics
//! 7. descriptor values
//! 8. cleanup
//!
//! Every transport call in phases 2-7 goes through [`with_one_retry`]. Only
//! phases 1 and 2 can fail the run; later failures are recorded on the node
//! they belong to, and a lost link or cancellation returns what was built so
//! far with [`GattScanResult::interrupted`] set.

use crate::domain::address::{AddressKind, BdAddr};
use crate::domain::error::{DiscoveryError, TransportError};
use crate::domain::gatt::{
    resolve_end_handles, AttErrorCode, AttrError, GattCharacteristic, GattDescriptor, GattService,
};
use crate::domain::models::{
    DiscoveryEvent, DiscoveryIssue, DiscoveryPhase, GattScanResult, Interruption,
};
use crate::domain::settings::GattSettings;
use crate::infrastructure::gatt::retry::{timed, with_one_retry, RetryLimits, TransportFuture};
use crate::infrastructure::gatt::transport::{GattTransport, NoAgent, PairingAgent};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Upper bound for connecting and for every reconnect
    pub connect_timeout: Duration,
    /// Upper bound for each attempt of every other transport call
    pub op_timeout: Duration,
    /// Reconnect between reading values and discovering descriptors. Works
    /// around stacks that answer the next request with a malformed response.
    pub reconnect_before_descriptors: bool,
    pub io_capability: String,
}

impl From<&GattSettings> for DiscoveryConfig {
    fn from(settings: &GattSettings) -> Self {
        Self {
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            op_timeout: Duration::from_millis(settings.op_timeout_ms),
            reconnect_before_descriptors: settings.reconnect_before_descriptors,
            io_capability: settings.io_capability.clone(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::from(&GattSettings::default())
    }
}

pub struct GattDiscovery<T> {
    transport: T,
    config: DiscoveryConfig,
    agent: Box<dyn PairingAgent>,
    events: Option<mpsc::UnboundedSender<DiscoveryEvent>>,
    connected: bool,
}

impl<T: GattTransport> GattDiscovery<T> {
    pub fn new(transport: T, config: DiscoveryConfig) -> Self {
        Self {
            transport,
            config,
            agent: Box::new(NoAgent),
            events: None,
            connected: false,
        }
    }

    pub fn with_agent(mut self, agent: impl PairingAgent + 'static) -> Self {
        self.agent = Box::new(agent);
        self
    }

    /// Report every node as soon as it is discovered or read
    pub fn with_events(mut self, events: mpsc::UnboundedSender<DiscoveryEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Discover the attribute tree of `addr`.
    ///
    /// Cleanup (closing the session and unregistering the pairing agent)
    /// runs however the run ends.
    pub async fn run(
        &mut self,
        addr: BdAddr,
        kind: AddressKind,
        cancel: &CancellationToken,
    ) -> Result<GattScanResult, DiscoveryError> {
        info!("GATT discovery of {} ({})", addr, kind);
        if let Err(e) = self.agent.register(&self.config.io_capability).await {
            warn!("Pairing agent registration failed, continuing without: {}", e);
        }

        let outcome = self.discover(addr, kind, cancel).await;
        self.cleanup().await;

        match &outcome {
            Ok(result) => info!(
                "GATT discovery of {} finished: {} service(s), {} issue(s){}",
                addr,
                result.services.len(),
                result.issues.len(),
                if result.is_complete() { "" } else { ", incomplete" }
            ),
            Err(e) => warn!("GATT discovery of {} failed: {}", addr, e),
        }
        outcome
    }

    async fn discover(
        &mut self,
        addr: BdAddr,
        kind: AddressKind,
        cancel: &CancellationToken,
    ) -> Result<GattScanResult, DiscoveryError> {
        self.connect(addr, kind, cancel).await?;

        let mut result = GattScanResult::new(addr, kind);
        result.services = self.primary_services(cancel).await?;

        if let Err(stop) = self.populate(&mut result, cancel).await {
            warn!("Discovery stopped early: {:?}", stop);
            result.interrupted = Some(stop);
        }
        Ok(result)
    }

    async fn populate(
        &mut self,
        result: &mut GattScanResult,
        cancel: &CancellationToken,
    ) -> Result<(), Interruption> {
        self.characteristics(result, cancel).await?;
        self.characteristic_values(result, cancel).await?;
        if self.config.reconnect_before_descriptors {
            self.reconnect(cancel).await?;
        }
        self.descriptors(result, cancel).await?;
        self.descriptor_values(result, cancel).await
    }

    async fn connect(
        &mut self,
        addr: BdAddr,
        kind: AddressKind,
        cancel: &CancellationToken,
    ) -> Result<(), DiscoveryError> {
        let limit = self.config.connect_timeout;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
            outcome = timed(self.transport.connect(addr, kind, limit), limit) => outcome,
        };
        outcome.map_err(|source| DiscoveryError::Connect { addr, source })?;

        self.connected = true;
        debug!("Connected to {}", addr);
        self.emit(DiscoveryEvent::Connected { peer: addr });
        Ok(())
    }

    async fn primary_services(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Vec<GattService>, DiscoveryError> {
        let reported = match self
            .attempt(DiscoveryPhase::PrimaryServices, "primary service discovery", cancel, |t| {
                t.discover_primary_services()
            })
            .await
        {
            Ok(Ok(reported)) => reported,
            Ok(Err(e)) => return Err(DiscoveryError::PrimaryServices(e)),
            Err(Interruption::Cancelled { .. }) => return Err(DiscoveryError::Cancelled),
            Err(Interruption::LinkLost { reason, .. }) => {
                return Err(DiscoveryError::PrimaryServices(TransportError::Link(reason)))
            }
        };

        let bounds: Vec<(u16, Option<u16>)> = reported
            .iter()
            .map(|s| (s.start_handle, s.end_handle))
            .collect();
        let ends = resolve_end_handles(&bounds);

        let mut services = Vec::with_capacity(reported.len());
        for (reported, end) in reported.into_iter().zip(ends) {
            match GattService::new(reported.start_handle, end, reported.uuid) {
                Some(service) => {
                    self.emit(DiscoveryEvent::ServiceFound {
                        range: service.handle_range(),
                        uuid: service.declaration_uuid,
                    });
                    services.push(service);
                }
                None => warn!(
                    "Skipping service {} with inverted handles 0x{:04X}..0x{:04X}",
                    reported.uuid, reported.start_handle, end
                ),
            }
        }
        info!("Found {} primary service(s)", services.len());
        Ok(services)
    }

    async fn characteristics(
        &mut self,
        result: &mut GattScanResult,
        cancel: &CancellationToken,
    ) -> Result<(), Interruption> {
        let phase = DiscoveryPhase::Characteristics;
        for service in result.services.iter_mut() {
            let range = service.handle_range();
            let what = format!("characteristic discovery in {}", range);
            let declarations = match self
                .attempt(phase, &what, cancel, move |t| t.discover_characteristics(range))
                .await?
            {
                Ok(declarations) => declarations,
                Err(e) => {
                    let error = AttrError::from(e);
                    service.discovery_error = Some(error.clone());
                    self.record(&mut result.issues, phase, Some(range.start), error);
                    continue;
                }
            };

            for decl in declarations {
                let characteristic = GattCharacteristic::new(
                    decl.declaration_handle,
                    decl.properties,
                    decl.value_handle,
                    decl.uuid,
                )
                .filter(|_| range.contains(decl.declaration_handle));

                match characteristic {
                    Some(characteristic) => {
                        self.emit(DiscoveryEvent::CharacteristicFound {
                            service_start: range.start,
                            value_handle: characteristic.value_handle,
                            uuid: characteristic.value_uuid,
                        });
                        service.characteristics.push(characteristic);
                    }
                    None => {
                        let reason = format!(
                            "malformed declaration 0x{:04X} (value handle 0x{:04X}) in {}",
                            decl.declaration_handle, decl.value_handle, range
                        );
                        self.record(
                            &mut result.issues,
                            phase,
                            Some(decl.declaration_handle),
                            AttrError::Transport(reason),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    async fn characteristic_values(
        &mut self,
        result: &mut GattScanResult,
        cancel: &CancellationToken,
    ) -> Result<(), Interruption> {
        let phase = DiscoveryPhase::CharacteristicValues;
        for service in result.services.iter_mut() {
            for characteristic in service.characteristics.iter_mut() {
                if !characteristic.properties.readable() {
                    continue;
                }
                let handle = characteristic.value_handle;
                let what = format!("read of characteristic value 0x{:04X}", handle);
                let value = self
                    .attempt(phase, &what, cancel, move |t| t.read_attribute(handle))
                    .await?
                    .map_err(AttrError::from);

                match &value {
                    Ok(bytes) => characteristic.value = Some(bytes.clone()),
                    Err(error) => {
                        characteristic.value_error = Some(error.clone());
                        self.record(&mut result.issues, phase, Some(handle), error.clone());
                    }
                }
                self.emit(DiscoveryEvent::CharacteristicValue {
                    value_handle: handle,
                    value,
                });
            }
        }
        Ok(())
    }

    async fn reconnect(&mut self, cancel: &CancellationToken) -> Result<(), Interruption> {
        let phase = DiscoveryPhase::Reconnect;
        debug!("Reconnecting before descriptor discovery");
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Interruption::Cancelled { phase }),
            outcome = timed(self.transport.reconnect(), self.config.connect_timeout) => outcome,
        };
        outcome.map_err(|e| Interruption::LinkLost {
            phase,
            reason: e.to_string(),
        })
    }

    async fn descriptors(
        &mut self,
        result: &mut GattScanResult,
        cancel: &CancellationToken,
    ) -> Result<(), Interruption> {
        let phase = DiscoveryPhase::Descriptors;
        for service in result.services.iter_mut() {
            let ranges = service.descriptor_ranges();
            for (characteristic, range) in service.characteristics.iter_mut().zip(ranges) {
                let Some(range) = range else {
                    continue;
                };
                let what = format!("descriptor discovery in {}", range);
                let found = match self
                    .attempt(phase, &what, cancel, move |t| t.discover_descriptors(range))
                    .await?
                {
                    Ok(found) => found,
                    // The usual answer for a gap without descriptors
                    Err(TransportError::Attribute(AttErrorCode::ATTRIBUTE_NOT_FOUND)) => {
                        debug!("No descriptors in {}", range);
                        continue;
                    }
                    Err(e) => {
                        let error = AttrError::from(e);
                        characteristic.descriptor_error = Some(error.clone());
                        let handle = Some(characteristic.value_handle);
                        self.record(&mut result.issues, phase, handle, error);
                        continue;
                    }
                };

                for (handle, uuid) in found {
                    if !range.contains(handle) {
                        debug!("Ignoring descriptor 0x{:04X} outside {}", handle, range);
                        continue;
                    }
                    self.emit(DiscoveryEvent::DescriptorFound { handle, uuid });
                    characteristic.descriptors.push(GattDescriptor::new(handle, uuid));
                }
            }
        }
        Ok(())
    }

    async fn descriptor_values(
        &mut self,
        result: &mut GattScanResult,
        cancel: &CancellationToken,
    ) -> Result<(), Interruption> {
        let phase = DiscoveryPhase::DescriptorValues;
        for service in result.services.iter_mut() {
            for characteristic in service.characteristics.iter_mut() {
                for descriptor in characteristic.descriptors.iter_mut() {
                    let handle = descriptor.handle;
                    let what = format!("read of descriptor 0x{:04X}", handle);
                    let value = self
                        .attempt(phase, &what, cancel, move |t| t.read_attribute(handle))
                        .await?
                        .map_err(AttrError::from);

                    match &value {
                        Ok(bytes) => descriptor.value = Some(bytes.clone()),
                        Err(error) => {
                            descriptor.read_error = Some(error.clone());
                            self.record(&mut result.issues, phase, Some(handle), error.clone());
                        }
                    }
                    self.emit(DiscoveryEvent::DescriptorValue { handle, value });
                }
            }
        }
        Ok(())
    }

    async fn cleanup(&mut self) {
        if self.connected {
            match timed(self.transport.close(), self.config.op_timeout).await {
                Ok(()) => debug!("GATT session closed"),
                Err(e) => warn!("Failed to close GATT session: {}", e),
            }
            self.connected = false;
        }
        if let Err(e) = self.agent.unregister().await {
            warn!("Failed to unregister pairing agent: {}", e);
        }
    }

    /// One transport call under the retry policy.
    ///
    /// The outer `Err` means the run has to stop: cancelled, or the link is
    /// gone. The inner result is the call's own outcome.
    async fn attempt<R, F>(
        &mut self,
        phase: DiscoveryPhase,
        what: &str,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<Result<R, TransportError>, Interruption>
    where
        F: for<'a> FnMut(&'a mut T) -> TransportFuture<'a, R>,
    {
        let limits = RetryLimits {
            op: self.config.op_timeout,
            reconnect: self.config.connect_timeout,
        };
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Interruption::Cancelled { phase }),
            outcome = with_one_retry(&mut self.transport, limits, what, op) => outcome,
        };
        match outcome {
            Err(TransportError::Link(reason)) => Err(Interruption::LinkLost { phase, reason }),
            other => Ok(other),
        }
    }

    fn record(
        &self,
        issues: &mut Vec<DiscoveryIssue>,
        phase: DiscoveryPhase,
        handle: Option<u16>,
        error: AttrError,
    ) {
        match handle {
            Some(handle) => warn!("{} failed at 0x{:04X}: {}", phase, handle, error),
            None => warn!("{} failed: {}", phase, error),
        }
        let issue = DiscoveryIssue {
            phase,
            handle,
            error,
        };
        self.emit(DiscoveryEvent::Issue(issue.clone()));
        issues.push(issue);
    }

    fn emit(&self, event: DiscoveryEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }
}
