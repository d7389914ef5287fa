//! Scriptable in-memory transport for the discovery tests

use crate::domain::address::{AddressKind, BdAddr};
use crate::domain::bt_uuid::BtUuid;
use crate::domain::error::TransportError;
use crate::domain::gatt::{AttErrorCode, CharProperties, HandleRange};
use crate::infrastructure::gatt::transport::{
    CharacteristicDeclaration, GattTransport, PairingAgent, PrimaryService,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Connect,
    Services,
    /// Keyed by service start handle
    Characteristics(u16),
    Read(u16),
    /// Keyed by range start handle
    Descriptors(u16),
    Reconnect,
    Close,
}

#[derive(Default)]
pub struct StubTransport {
    pub services: Vec<PrimaryService>,
    pub characteristics: HashMap<u16, Vec<CharacteristicDeclaration>>,
    pub values: HashMap<u16, Vec<u8>>,
    pub descriptors: Vec<(u16, BtUuid)>,
    pub calls: Vec<Op>,
    pub connected: bool,
    failures: HashMap<Op, VecDeque<TransportError>>,
    hangs: HashMap<Op, usize>,
    delays: HashMap<Op, Duration>,
}

fn declaration(decl: u16, properties: u8, uuid: u16) -> CharacteristicDeclaration {
    CharacteristicDeclaration {
        declaration_handle: decl,
        properties: CharProperties(properties),
        value_handle: decl + 1,
        uuid: BtUuid::Uuid16(uuid),
    }
}

impl StubTransport {
    /// Two services:
    ///
    /// ```text
    /// 0x0001..=0x0007 GAP
    ///   0x0002/0x0003 Device Name (READ)          "bluing"
    ///   0x0004/0x0005 Appearance (READ | NOTIFY)  00 00
    ///     0x0006 CCCD, 0x0007 user description
    /// 0x0010..        Battery (no end handle reported)
    ///   0x0011/0x0012 Battery Level (NOTIFY)
    ///   0x0013/0x0014 0x2A3F (READ | WRITE)       read not permitted
    ///     0x0015 CCCD
    /// ```
    pub fn with_standard_tree() -> Self {
        let mut stub = Self {
            services: vec![
                PrimaryService {
                    start_handle: 0x0001,
                    end_handle: Some(0x0007),
                    uuid: BtUuid::Uuid16(0x1800),
                },
                PrimaryService {
                    start_handle: 0x0010,
                    end_handle: None,
                    uuid: BtUuid::Uuid16(0x180F),
                },
            ],
            descriptors: vec![
                (0x0006, BtUuid::Uuid16(0x2902)),
                (0x0007, BtUuid::Uuid16(0x2901)),
                (0x0015, BtUuid::Uuid16(0x2902)),
            ],
            ..Default::default()
        };
        stub.characteristics.insert(
            0x0001,
            vec![
                declaration(0x0002, CharProperties::READ, 0x2A00),
                declaration(0x0004, CharProperties::READ | CharProperties::NOTIFY, 0x2A01),
            ],
        );
        stub.characteristics.insert(
            0x0010,
            vec![
                declaration(0x0011, CharProperties::NOTIFY, 0x2A19),
                declaration(0x0013, CharProperties::READ | CharProperties::WRITE, 0x2A3F),
            ],
        );
        stub.values.insert(0x0003, b"bluing".to_vec());
        stub.values.insert(0x0005, vec![0x00, 0x00]);
        stub.values.insert(0x0006, vec![0x01, 0x00]);
        stub.values.insert(0x0007, b"Appearance".to_vec());
        stub.values.insert(0x0015, vec![0x00, 0x00]);
        stub
    }

    /// Make the next calls of `op` fail, in order
    pub fn fail(&mut self, op: Op, errors: impl IntoIterator<Item = TransportError>) {
        self.failures.entry(op).or_default().extend(errors);
    }

    /// Make the next `times` calls of `op` never complete
    pub fn hang(&mut self, op: Op, times: usize) {
        *self.hangs.entry(op).or_default() += times;
    }

    /// Make every call of `op` take `by` before answering
    pub fn delay(&mut self, op: Op, by: Duration) {
        self.delays.insert(op, by);
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls.iter().filter(|c| **c == op).count()
    }

    async fn script(&mut self, op: Op) -> Result<(), TransportError> {
        self.calls.push(op);
        if let Some(remaining) = self.hangs.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                std::future::pending::<()>().await;
            }
        }
        if let Some(by) = self.delays.get(&op) {
            tokio::time::sleep(*by).await;
        }
        match self.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl GattTransport for StubTransport {
    async fn connect(
        &mut self,
        _addr: BdAddr,
        _kind: AddressKind,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        self.script(Op::Connect).await?;
        self.connected = true;
        Ok(())
    }

    async fn discover_primary_services(&mut self) -> Result<Vec<PrimaryService>, TransportError> {
        self.script(Op::Services).await?;
        Ok(self.services.clone())
    }

    async fn discover_characteristics(
        &mut self,
        service: HandleRange,
    ) -> Result<Vec<CharacteristicDeclaration>, TransportError> {
        self.script(Op::Characteristics(service.start)).await?;
        Ok(self
            .characteristics
            .get(&service.start)
            .cloned()
            .unwrap_or_default())
    }

    async fn read_attribute(&mut self, handle: u16) -> Result<Vec<u8>, TransportError> {
        self.script(Op::Read(handle)).await?;
        self.values
            .get(&handle)
            .cloned()
            .ok_or(TransportError::Attribute(AttErrorCode::READ_NOT_PERMITTED))
    }

    async fn discover_descriptors(
        &mut self,
        range: HandleRange,
    ) -> Result<Vec<(u16, BtUuid)>, TransportError> {
        self.script(Op::Descriptors(range.start)).await?;
        Ok(self
            .descriptors
            .iter()
            .filter(|(handle, _)| range.contains(*handle))
            .cloned()
            .collect())
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        self.script(Op::Reconnect).await?;
        self.connected = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.script(Op::Close).await?;
        self.connected = false;
        Ok(())
    }
}

/// Records agent calls in a log shared with the test
#[derive(Default, Clone)]
pub struct RecordingAgent {
    pub log: Arc<Mutex<Vec<String>>>,
    pub fail_register: bool,
}

impl RecordingAgent {
    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl PairingAgent for RecordingAgent {
    async fn register(&mut self, io_capability: &str) -> Result<(), TransportError> {
        self.log.lock().unwrap().push(format!("register {}", io_capability));
        if self.fail_register {
            return Err(TransportError::Other("agent rejected".into()));
        }
        Ok(())
    }

    async fn unregister(&mut self) -> Result<(), TransportError> {
        self.log.lock().unwrap().push("unregister".to_string());
        Ok(())
    }
}
