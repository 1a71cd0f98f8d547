//! Wire-format definitions for protocol segments.
//!
//! Every datagram exchanged between sender and receiver is a [`Packet`]:
//! a fixed 16-byte header followed by at most [`DATA_SIZE`] payload bytes.
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All fields are 32-bit **little-endian** unsigned integers, matching the
//! in-memory header layout of the peer implementation on x86 hosts.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Control Flags                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload Length                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! A data segment with `payload_len == 0` marks the end of the stream.

use thiserror::Error;

/// Values of the `flags` header field.
pub mod flags {
    /// Sender → receiver data segment (or end-of-stream marker).
    pub const DATA: u32 = 0;
    /// Receiver → sender cumulative acknowledgment.
    pub const ACK: u32 = 1;
}

/// Largest datagram either side will put on the wire, IP and UDP headers included.
pub const MSS_SIZE: usize = 1500;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 16;

const UDP_HDR_SIZE: usize = 8;
const IP_HDR_SIZE: usize = 20;

/// Maximum payload carried by one segment.
pub const DATA_SIZE: usize = MSS_SIZE - HEADER_LEN - UDP_HDR_SIZE - IP_HDR_SIZE;

const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_FLAGS: usize = 8;
const OFF_PAYLOAD_LEN: usize = 12;

/// Fixed-size protocol header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Byte offset of the first payload byte (data), or the echoed sequence
    /// number of the segment being acknowledged (ack).
    pub seq: u32,
    /// Cumulative receive base. Only meaningful on acknowledgments.
    pub ack: u32,
    /// One of the [`flags`] constants.
    pub flags: u32,
    /// Length of the payload in bytes.
    ///
    /// Recomputed from the payload on encode; validated on decode.
    pub payload_len: u32,
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Data segment carrying `payload` at byte offset `seq`.
    pub fn data(seq: u32, payload: Vec<u8>) -> Self {
        Packet {
            header: Header {
                seq,
                ack: 0,
                flags: flags::DATA,
                payload_len: payload.len() as u32,
            },
            payload,
        }
    }

    /// Cumulative acknowledgment of everything before `ack`, echoing the
    /// sequence number of the segment that triggered it.
    pub fn ack(echo_seq: u32, ack: u32) -> Self {
        Packet {
            header: Header {
                seq: echo_seq,
                ack,
                flags: flags::ACK,
                payload_len: 0,
            },
            payload: Vec::new(),
        }
    }

    /// Zero-length data segment signalling end of stream at `seq`.
    pub fn end_of_stream(seq: u32) -> Self {
        Self::data(seq, Vec::new())
    }

    pub fn is_ack(&self) -> bool {
        self.header.flags == flags::ACK
    }

    pub fn is_end_of_stream(&self) -> bool {
        !self.is_ack() && self.payload.is_empty()
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// `header.payload_len` is taken from the actual payload length.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let payload_len = self.payload.len();
        if payload_len > DATA_SIZE {
            return Err(PacketError::PayloadTooLarge(payload_len));
        }
        let mut buf = vec![0u8; HEADER_LEN + payload_len];

        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.header.seq.to_le_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.header.ack.to_le_bytes());
        buf[OFF_FLAGS..OFF_FLAGS + 4].copy_from_slice(&self.header.flags.to_le_bytes());
        buf[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 4]
            .copy_from_slice(&(payload_len as u32).to_le_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        Ok(buf)
    }

    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`],
    /// - the `payload_len` field exceeds [`DATA_SIZE`], or
    /// - the `payload_len` field disagrees with `buf.len()`.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort);
        }

        let seq = read_u32(buf, OFF_SEQ);
        let ack = read_u32(buf, OFF_ACK);
        let flags = read_u32(buf, OFF_FLAGS);
        let payload_len = read_u32(buf, OFF_PAYLOAD_LEN);

        if payload_len as usize > DATA_SIZE {
            return Err(PacketError::PayloadTooLarge(payload_len as usize));
        }
        if buf.len() != HEADER_LEN + payload_len as usize {
            return Err(PacketError::LengthMismatch);
        }

        Ok(Packet {
            header: Header {
                seq,
                ack,
                flags,
                payload_len,
            },
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Errors that can arise when encoding or parsing a datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("buffer too short to contain a header")]
    BufferTooShort,
    #[error("payload_len field does not match remaining bytes")]
    LengthMismatch,
    #[error("payload of {0} bytes exceeds the segment payload limit")]
    PayloadTooLarge(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_size_fits_mss() {
        assert_eq!(DATA_SIZE, 1456);
        assert!(HEADER_LEN + DATA_SIZE + UDP_HDR_SIZE + IP_HDR_SIZE <= MSS_SIZE);
    }

    #[test]
    fn encode_decode_data_segment() {
        let pkt = Packet::data(2912, b"hello".to_vec());
        let decoded = Packet::decode(&pkt.encode().unwrap()).unwrap();
        assert_eq!(decoded.header.seq, 2912);
        assert_eq!(decoded.header.flags, flags::DATA);
        assert_eq!(decoded.header.payload_len, 5);
        assert_eq!(decoded.payload, b"hello");
        assert!(!decoded.is_ack());
        assert!(!decoded.is_end_of_stream());
    }

    #[test]
    fn ack_echoes_sequence_number() {
        let decoded = Packet::decode(&Packet::ack(1456, 0).encode().unwrap()).unwrap();
        assert!(decoded.is_ack());
        assert_eq!(decoded.header.seq, 1456);
        assert_eq!(decoded.header.ack, 0);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn end_of_stream_is_header_only() {
        let bytes = Packet::end_of_stream(10_000).encode().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        let decoded = Packet::decode(&bytes).unwrap();
        assert!(decoded.is_end_of_stream());
        assert_eq!(decoded.header.seq, 10_000);
    }

    #[test]
    fn fields_little_endian_on_wire() {
        let bytes = Packet::ack(0x0102_0304, 0x0506_0708).encode().unwrap();
        assert_eq!(&bytes[OFF_SEQ..OFF_SEQ + 4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[OFF_ACK..OFF_ACK + 4], &[0x08, 0x07, 0x06, 0x05]);
        assert_eq!(&bytes[OFF_FLAGS..OFF_FLAGS + 4], &[1, 0, 0, 0]);
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let pkt = Packet::data(0, vec![0u8; DATA_SIZE + 1]);
        assert_eq!(pkt.encode(), Err(PacketError::PayloadTooLarge(DATA_SIZE + 1)));
    }

    #[test]
    fn full_payload_accepted() {
        let pkt = Packet::data(0, vec![7u8; DATA_SIZE]);
        let bytes = pkt.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + DATA_SIZE);
        assert_eq!(Packet::decode(&bytes).unwrap(), pkt);
    }

    #[test]
    fn decode_short_header_returns_error() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::BufferTooShort));
        assert_eq!(
            Packet::decode(&[0u8; HEADER_LEN - 1]),
            Err(PacketError::BufferTooShort)
        );
    }

    #[test]
    fn decode_truncated_payload_returns_error() {
        let mut bytes = Packet::data(0, b"data".to_vec()).encode().unwrap();
        bytes.pop();
        assert_eq!(Packet::decode(&bytes), Err(PacketError::LengthMismatch));
    }

    #[test]
    fn decode_rejects_length_field_beyond_limit() {
        let mut bytes = Packet::end_of_stream(0).encode().unwrap();
        bytes[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 4]
            .copy_from_slice(&((DATA_SIZE as u32) + 1).to_le_bytes());
        assert_eq!(
            Packet::decode(&bytes),
            Err(PacketError::PayloadTooLarge(DATA_SIZE + 1))
        );
    }
}
