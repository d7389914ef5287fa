//! Advertising sniffer
//!
//! Drives up to three serial-attached capture peripherals, each locked to one
//! primary advertising channel.
//!
//! ```text
//!  /dev/ttyACM0 ──► ChannelWorker(37) ─┐
//!  /dev/ttyACM1 ──► ChannelWorker(38) ─┼─► SeenPduSet ─► mpsc ─► SniffSession::recv
//!  /dev/ttyACM2 ──► ChannelWorker(39) ─┘
//! ```
//!
//! - [`protocol`] - serial framing and opcodes
//! - [`seen`] - session-wide duplicate filter
//! - [`worker`] - per-channel receive loop

pub mod protocol;
pub mod seen;
pub mod worker;

use crate::domain::error::SnifferError;
use crate::domain::pdu::{AdvChannel, AdvertisingPdu};
use crate::domain::settings::SnifferSettings;
use seen::SeenPduSet;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialPortType};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use worker::ChannelWorker;

/// Only three primary advertising channels exist
pub const MAX_WORKERS: usize = 3;

/// Pair capture peripherals with advertising channels.
///
/// Requests that cannot be satisfied are truncated, never rejected: at most
/// `min(devices, channels, 3)` pairs are returned, in the order given.
pub fn assign_channels(
    devices: &[String],
    channels: &[u8],
) -> Result<Vec<(String, AdvChannel)>, SnifferError> {
    let mut wanted: Vec<AdvChannel> = Vec::with_capacity(channels.len());
    for &index in channels {
        let channel = AdvChannel::try_from(index).map_err(SnifferError::InvalidChannel)?;
        if wanted.contains(&channel) {
            warn!("Channel {} requested more than once", channel);
            continue;
        }
        wanted.push(channel);
    }

    let count = devices.len().min(wanted.len()).min(MAX_WORKERS);
    if wanted.len() > count {
        let dropped: Vec<String> = wanted[count..].iter().map(|c| c.to_string()).collect();
        info!(
            "{} capture peripheral(s) available, not sniffing channel(s) {}",
            devices.len(),
            dropped.join(", ")
        );
    }
    if devices.len() > count {
        info!(
            "Leaving {} capture peripheral(s) unused: {}",
            devices.len() - count,
            devices[count..].join(", ")
        );
    }
    if count == 0 {
        return Err(SnifferError::NoChannels);
    }

    Ok(devices
        .iter()
        .cloned()
        .zip(wanted)
        .take(count)
        .collect())
}

fn is_capture_peripheral(vid: u16, pid: u16, product: Option<&str>, want: (u16, u16)) -> bool {
    (vid, pid) == want || product.is_some_and(|p| p.contains("DAPLink"))
}

/// List serial devices that look like micro:bit capture peripherals
pub fn find_sniffer_ports(usb_vid: u16, usb_pid: u16) -> Result<Vec<String>, SnifferError> {
    let ports = tokio_serial::available_ports().map_err(SnifferError::Enumerate)?;
    let found: Vec<String> = ports
        .into_iter()
        .filter(|port| match &port.port_type {
            SerialPortType::UsbPort(usb) => {
                is_capture_peripheral(usb.vid, usb.pid, usb.product.as_deref(), (usb_vid, usb_pid))
            }
            _ => false,
        })
        .map(|port| port.port_name)
        .collect();
    info!("Found {} capture peripheral(s)", found.len());
    Ok(found)
}

/// A running sniff: one worker per assigned channel feeding one queue
pub struct SniffSession {
    cancel: CancellationToken,
    workers: Vec<(AdvChannel, JoinHandle<Result<(), SnifferError>>)>,
    seen: SeenPduSet,
    pdus: mpsc::UnboundedReceiver<AdvertisingPdu>,
}

impl SniffSession {
    /// Start one worker per `(label, channel, link)`
    pub fn spawn<S>(links: Vec<(String, AdvChannel, S)>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let seen = SeenPduSet::new();
        let (pdu_sender, pdus) = mpsc::unbounded_channel();

        let workers = links
            .into_iter()
            .map(|(label, channel, link)| {
                let worker = ChannelWorker::new(label, link, channel, seen.clone(), pdu_sender.clone());
                (channel, tokio::spawn(worker.run(cancel.child_token())))
            })
            .collect();

        Self {
            cancel,
            workers,
            seen,
            pdus,
        }
    }

    /// Next new PDU from any channel; `None` once every worker has stopped
    pub async fn recv(&mut self) -> Option<AdvertisingPdu> {
        self.pdus.recv().await
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn channels(&self) -> Vec<AdvChannel> {
        self.workers.iter().map(|(channel, _)| *channel).collect()
    }

    /// Cancel every worker and wait for them to reset their peripherals.
    ///
    /// Returns how many distinct PDUs the session saw.
    pub async fn stop(mut self) -> usize {
        self.cancel.cancel();
        for (channel, handle) in std::mem::take(&mut self.workers) {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Channel {} worker failed: {}", channel, e),
                Err(e) => warn!("Channel {} worker panicked: {}", channel, e),
            }
        }
        let seen = self.seen.len();
        info!("Sniff session stopped, {} distinct PDU(s) seen", seen);
        seen
    }
}

/// Dropping a session without [`SniffSession::stop`] still cancels the
/// workers; they reset their peripherals in the background.
impl Drop for SniffSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Opens capture peripherals and starts sniffing
pub struct AdvSniffer {
    settings: SnifferSettings,
}

impl AdvSniffer {
    pub fn new(settings: SnifferSettings) -> Self {
        Self { settings }
    }

    /// Device paths from the settings, or every detected peripheral
    pub fn device_paths(&self) -> Result<Vec<String>, SnifferError> {
        if !self.settings.device_paths.is_empty() {
            return Ok(self.settings.device_paths.clone());
        }
        find_sniffer_ports(self.settings.usb_vid, self.settings.usb_pid)
    }

    pub fn start(&self, devices: &[String]) -> Result<SniffSession, SnifferError> {
        let assignment = assign_channels(devices, &self.settings.channels)?;

        let mut links = Vec::with_capacity(assignment.len());
        for (path, channel) in assignment {
            let port = tokio_serial::new(&path, self.settings.baud_rate)
                .open_native_async()
                .map_err(|source| SnifferError::Open {
                    path: path.clone().into(),
                    source,
                })?;
            if let Err(e) = port.clear(ClearBuffer::All) {
                warn!("{}: could not clear serial buffers: {}", path, e);
            }
            info!("{} -> channel {}", path, channel);
            links.push((path, channel, port));
        }

        Ok(SniffSession::spawn(links))
    }
}
