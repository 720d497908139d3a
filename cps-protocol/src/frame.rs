//! Length-prefixed frames for the binary transport.
//!
//! Frame layout (8 bytes header + payload):
//!
//! ```text
//! +--------+--------+----------+--------------------+
//! | marker | zeroes |  length  |      payload       |
//! | 2 bytes| 2 bytes| 4 bytes  |   length bytes     |
//! | 09 09  | 00 00  | u32 (LE) | field-encoded body |
//! +--------+--------+----------+--------------------+
//! ```
//!
//! The declared length is the exact byte count of the payload, no padding.

use crate::error::ProtocolError;
use crate::MAX_PAYLOAD_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Fixed marker bytes opening every frame header.
pub const FRAME_MARKER: [u8; 2] = [0x09, 0x09];

/// Size of the frame header in bytes (2 + 2 + 4 = 8).
pub const FRAME_HEADER_SIZE: usize = 8;

/// Builds a frame header declaring `length` payload bytes.
pub fn make_header(length: u32) -> [u8; FRAME_HEADER_SIZE] {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    header[..2].copy_from_slice(&FRAME_MARKER);
    header[4..].copy_from_slice(&length.to_le_bytes());
    header
}

/// Validates a frame header and returns the declared payload length.
pub fn parse_header(header: &[u8]) -> Result<u32, ProtocolError> {
    if header.len() < FRAME_HEADER_SIZE {
        return Err(ProtocolError::IncompleteFrame {
            needed: FRAME_HEADER_SIZE - header.len(),
        });
    }

    let prefix: [u8; 4] = [header[0], header[1], header[2], header[3]];
    if prefix[..2] != FRAME_MARKER || prefix[2] != 0 || prefix[3] != 0 {
        return Err(ProtocolError::InvalidMarker(prefix));
    }

    Ok(u32::from_le_bytes([header[4], header[5], header[6], header[7]]))
}

/// A binary transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Field-encoded message body.
    pub payload: Bytes,
}

impl Frame {
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Encodes header and payload into one contiguous buffer.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let size = u32::try_from(self.payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
            size: u32::MAX,
            max: MAX_PAYLOAD_SIZE,
        })?;
        if size > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        buf.put_slice(&make_header(size));
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a frame from the front of `buf`.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let payload_len = parse_header(&buf[..FRAME_HEADER_SIZE])?;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let total_len = FRAME_HEADER_SIZE + payload_len as usize;
        if buf.len() < total_len {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let payload = buf.split_to(payload_len as usize).freeze();

        Ok(Some(Self { payload }))
    }
}
