//! Host side of the capture firmware's serial protocol
//!
//! Every message in both directions is framed the same way:
//!
//! ```text
//! opcode:u8  length:u16 (big-endian)  payload:length bytes
//! ```

use crate::domain::pdu::{AdvChannel, MAX_PDU_LEN};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

pub const FRAME_HEADER_LEN: usize = 3;

/// Host to peripheral opcodes
pub mod command {
    pub const RESET: u8 = 0x00;
    pub const ACK: u8 = 0x02;
    pub const SNIFF_ADV: u8 = 0x0B;
}

/// Peripheral to host opcodes
pub mod event {
    pub const READY: u8 = 0x00;
    pub const ERROR: u8 = 0x01;
    pub const ACK: u8 = 0x02;
    pub const NEW_ADV: u8 = 0x0B;
    pub const DEBUG: u8 = 0xFF;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialCommand {
    Reset,
    Ack,
    /// Lock the radio onto one advertising channel
    SniffAdv(AdvChannel),
}

impl SerialCommand {
    pub fn opcode(&self) -> u8 {
        match self {
            Self::Reset => command::RESET,
            Self::Ack => command::ACK,
            Self::SniffAdv(_) => command::SNIFF_ADV,
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            Self::Reset | Self::Ack => Vec::new(),
            Self::SniffAdv(channel) => vec![channel.index()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEvent {
    /// The peripheral finished booting and waits for a command
    Ready,
    Error(Bytes),
    Ack(Bytes),
    /// A raw advertising PDU (header + payload)
    NewAdv(Bytes),
    Debug(Bytes),
    Unknown { opcode: u8, payload: Bytes },
}

impl SerialEvent {
    fn from_frame(opcode: u8, payload: Bytes) -> Self {
        match opcode {
            event::READY => Self::Ready,
            event::ERROR => Self::Error(payload),
            event::ACK => Self::Ack(payload),
            event::NEW_ADV => Self::NewAdv(payload),
            event::DEBUG => Self::Debug(payload),
            opcode => Self::Unknown { opcode, payload },
        }
    }
}

/// Frames [`SerialCommand`]s out and [`SerialEvent`]s in.
///
/// Frames whose payload exceeds the largest possible PDU are skipped.
#[derive(Debug, Default)]
pub struct SnifferCodec;

impl Decoder for SnifferCodec {
    type Item = SerialEvent;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < FRAME_HEADER_LEN {
                return Ok(None);
            }

            let opcode = src[0];
            let length = u16::from_be_bytes([src[1], src[2]]) as usize;
            let frame_len = FRAME_HEADER_LEN + length;
            if src.len() < frame_len {
                src.reserve(frame_len - src.len());
                return Ok(None);
            }

            let mut frame = src.split_to(frame_len);
            frame.advance(FRAME_HEADER_LEN);

            if length > MAX_PDU_LEN {
                warn!(
                    "Discarding serial event 0x{:02X}: payload of {} bytes exceeds {}",
                    opcode, length, MAX_PDU_LEN
                );
                continue;
            }

            return Ok(Some(SerialEvent::from_frame(opcode, frame.freeze())));
        }
    }
}

impl Encoder<SerialCommand> for SnifferCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: SerialCommand, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.payload();
        dst.reserve(FRAME_HEADER_LEN + payload.len());
        dst.put_u8(item.opcode());
        dst.put_u16(payload.len() as u16);
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(cmd: SerialCommand) -> Vec<u8> {
        let mut buf = BytesMut::new();
        SnifferCodec.encode(cmd, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn test_command_framing() {
        assert_eq!(encode(SerialCommand::Reset), vec![0x00, 0x00, 0x00]);
        assert_eq!(encode(SerialCommand::Ack), vec![0x02, 0x00, 0x00]);
        assert_eq!(
            encode(SerialCommand::SniffAdv(AdvChannel::Ch38)),
            vec![0x0B, 0x00, 0x01, 38]
        );
    }

    #[test]
    fn test_partial_frame_waits_for_more_bytes() {
        let mut codec = SnifferCodec;
        let mut buf = BytesMut::from(&[0x0B, 0x00, 0x04, 0xAA, 0xBB][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(&[0xCC, 0xDD, 0x00]);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(SerialEvent::NewAdv(Bytes::from_static(&[0xAA, 0xBB, 0xCC, 0xDD])))
        );
        // Trailing byte is the start of the next frame
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_event_opcodes() {
        let mut codec = SnifferCodec;
        let mut buf = BytesMut::from(
            &[
                0x00, 0x00, 0x00, // READY
                0x01, 0x00, 0x01, 0x07, // ERROR
                0xFF, 0x00, 0x02, b'h', b'i', // DEBUG
                0x42, 0x00, 0x00, // unknown
            ][..],
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(SerialEvent::Ready));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(SerialEvent::Error(Bytes::from_static(&[0x07])))
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(SerialEvent::Debug(Bytes::from_static(b"hi")))
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(SerialEvent::Unknown {
                opcode: 0x42,
                payload: Bytes::new()
            })
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_oversized_payload_is_skipped() {
        let mut codec = SnifferCodec;
        let oversized = MAX_PDU_LEN + 1;
        let mut buf = BytesMut::new();
        buf.put_u8(event::NEW_ADV);
        buf.put_u16(oversized as u16);
        buf.put_slice(&vec![0u8; oversized]);
        buf.put_slice(&[0x00, 0x00, 0x00]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(SerialEvent::Ready));
        assert!(buf.is_empty());
    }
}
