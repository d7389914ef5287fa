//! One capture peripheral locked to one advertising channel

use crate::domain::error::SnifferError;
use crate::domain::pdu::{self, AdvChannel, AdvertisingPdu};
use crate::infrastructure::sniffer::protocol::{SerialCommand, SerialEvent, SnifferCodec};
use crate::infrastructure::sniffer::seen::SeenPduSet;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub struct ChannelWorker<S> {
    label: String,
    channel: AdvChannel,
    framed: Framed<S, SnifferCodec>,
    seen: SeenPduSet,
    pdu_sender: mpsc::UnboundedSender<AdvertisingPdu>,
}

impl<S> ChannelWorker<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// `label` names the link in log lines, usually the device path
    pub fn new(
        label: impl Into<String>,
        link: S,
        channel: AdvChannel,
        seen: SeenPduSet,
        pdu_sender: mpsc::UnboundedSender<AdvertisingPdu>,
    ) -> Self {
        Self {
            label: label.into(),
            channel,
            framed: Framed::new(link, SnifferCodec),
            seen,
            pdu_sender,
        }
    }

    /// Sniff until cancelled, the link closes or the consumer goes away.
    ///
    /// The peripheral is sent `RESET` on every exit path before the link is
    /// dropped.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), SnifferError> {
        info!("{}: sniffing channel {}", self.label, self.channel);
        let result = self.sniff(&cancel).await;

        if let Err(e) = self.framed.send(SerialCommand::Reset).await {
            debug!("{}: could not reset peripheral: {}", self.label, e);
        }
        info!("{}: released (channel {})", self.label, self.channel);
        result
    }

    async fn sniff(&mut self, cancel: &CancellationToken) -> Result<(), SnifferError> {
        self.framed.send(SerialCommand::Reset).await?;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("{}: cancelled", self.label);
                    return Ok(());
                }
                event = self.framed.next() => event,
            };

            match event {
                Some(Ok(event)) => {
                    if !self.handle(event).await? {
                        debug!("{}: PDU consumer dropped", self.label);
                        return Ok(());
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    warn!("{}: serial link closed", self.label);
                    return Ok(());
                }
            }
        }
    }

    /// Returns `false` once nobody is listening for PDUs anymore
    async fn handle(&mut self, event: SerialEvent) -> Result<bool, SnifferError> {
        match event {
            SerialEvent::Ready => {
                debug!("{}: peripheral ready", self.label);
                self.framed.send(SerialCommand::SniffAdv(self.channel)).await?;
            }
            SerialEvent::NewAdv(raw) => {
                if !self.seen.insert_if_absent(&raw) {
                    trace!("{}: duplicate PDU", self.label);
                    return Ok(true);
                }
                if let Some(decoded) = pdu::decode(&raw, self.channel) {
                    return Ok(self.pdu_sender.send(decoded).is_ok());
                }
            }
            SerialEvent::Error(payload) => {
                warn!("{}: peripheral error {:02X?}", self.label, payload.as_ref());
            }
            SerialEvent::Ack(_) => debug!("{}: ack", self.label),
            SerialEvent::Debug(payload) => {
                trace!("{}: {}", self.label, String::from_utf8_lossy(&payload));
            }
            SerialEvent::Unknown { opcode, .. } => {
                debug!("{}: ignoring event 0x{:02X}", self.label, opcode);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pdu::PduKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn new_adv(pdu: &[u8]) -> Vec<u8> {
        let mut frame = vec![0x0B];
        frame.extend_from_slice(&(pdu.len() as u16).to_be_bytes());
        frame.extend_from_slice(pdu);
        frame
    }

    fn adv_ind(last: u8) -> Vec<u8> {
        vec![0x40, 0x06, last, 0x22, 0x33, 0x44, 0x55, 0x66]
    }

    async fn read_frame(peer: &mut DuplexStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        peer.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_ready_then_sniff_then_reset_on_cancel() {
        let (link, mut peer) = tokio::io::duplex(1024);
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = ChannelWorker::new("test", link, AdvChannel::Ch38, SeenPduSet::new(), tx);
        let handle = tokio::spawn(worker.run(cancel.clone()));

        assert_eq!(read_frame(&mut peer, 3).await, vec![0x00, 0x00, 0x00]);
        peer.write_all(&[0x00, 0x00, 0x00]).await.unwrap();
        assert_eq!(read_frame(&mut peer, 4).await, vec![0x0B, 0x00, 0x01, 38]);

        cancel.cancel();
        assert_eq!(read_frame(&mut peer, 3).await, vec![0x00, 0x00, 0x00]);
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_duplicates_are_decoded_once() {
        let (link, mut peer) = tokio::io::duplex(4096);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let seen = SeenPduSet::new();
        let worker = ChannelWorker::new("test", link, AdvChannel::Ch37, seen.clone(), tx);
        let handle = tokio::spawn(worker.run(CancellationToken::new()));

        read_frame(&mut peer, 3).await;
        let unknown_type = vec![0x0F, 0x00];
        for pdu in [
            adv_ind(1),
            adv_ind(2),
            adv_ind(1),
            unknown_type.clone(),
            adv_ind(1),
            adv_ind(3),
            unknown_type,
            adv_ind(2),
        ] {
            peer.write_all(&new_adv(&pdu)).await.unwrap();
        }
        drop(peer);

        assert!(handle.await.unwrap().is_ok());
        let mut received = Vec::new();
        while let Some(pdu) = rx.recv().await {
            received.push(pdu);
        }

        // Four distinct payloads, one of which does not decode
        assert_eq!(seen.len(), 4);
        assert_eq!(received.len(), 3);
        assert!(received.iter().all(|p| p.kind == PduKind::ADV_IND));
        assert!(received.iter().all(|p| p.channel == AdvChannel::Ch37));
        let firsts: Vec<u8> = received
            .iter()
            .map(|p| p.adv_a().unwrap().bd_addr.0[5])
            .collect();
        assert_eq!(firsts, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_seen_set_is_shared_across_channels() {
        let seen = SeenPduSet::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handles = Vec::new();
        let mut peers = Vec::new();
        for channel in [AdvChannel::Ch37, AdvChannel::Ch39] {
            let (link, peer) = tokio::io::duplex(1024);
            let worker = ChannelWorker::new(channel.to_string(), link, channel, seen.clone(), tx.clone());
            handles.push(tokio::spawn(worker.run(CancellationToken::new())));
            peers.push(peer);
        }
        drop(tx);

        for mut peer in peers {
            read_frame(&mut peer, 3).await;
            peer.write_all(&new_adv(&adv_ind(9))).await.unwrap();
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }
}
