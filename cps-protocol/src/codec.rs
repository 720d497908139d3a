//! Encoder and decoder for binary transport messages.
//!
//! A request body carries the envelope markup in field 1 and the storage
//! name in field 2; a response body carries the reply envelope in field 1.

use crate::error::ProtocolError;
use crate::field::{decode_fields, encode_bytes_field, varint_len};
use crate::frame::Frame;
use crate::AUTODETECT_STORAGE;
use bytes::{Bytes, BytesMut};

/// Field id of the envelope markup.
pub const ENVELOPE_FIELD: u32 = 1;

/// Field id of the storage name in requests.
pub const STORAGE_FIELD: u32 = 2;

/// Builds the field-encoded body of a request.
///
/// A missing or empty storage name is sent as the autodetect sentinel.
pub fn encode_body(envelope: &[u8], storage: Option<&str>) -> Bytes {
    let storage = storage
        .filter(|s| !s.is_empty())
        .unwrap_or(AUTODETECT_STORAGE);

    let capacity = 2 * (1 + 10) + envelope.len() + storage.len();
    let mut buf = BytesMut::with_capacity(capacity);
    encode_bytes_field(ENVELOPE_FIELD, envelope, &mut buf);
    encode_bytes_field(STORAGE_FIELD, storage.as_bytes(), &mut buf);
    buf.freeze()
}

/// Extracts the envelope bytes from a field-encoded body.
pub fn decode_body(body: &[u8]) -> Result<Bytes, ProtocolError> {
    let mut fields = decode_fields(body)?;
    match fields.remove(&ENVELOPE_FIELD) {
        Some(value) => value
            .as_bytes()
            .cloned()
            .ok_or(ProtocolError::MissingField(ENVELOPE_FIELD)),
        None => Err(ProtocolError::MissingField(ENVELOPE_FIELD)),
    }
}

/// Encodes requests into frames.
pub struct Encoder;

impl Encoder {
    /// Encodes an envelope and storage name into one framed message.
    pub fn encode_request(envelope: &str, storage: Option<&str>) -> Result<BytesMut, ProtocolError> {
        Frame::new(encode_body(envelope.as_bytes(), storage)).encode()
    }

    /// Encodes a reply envelope into a frame, as a server would send it.
    pub fn encode_reply(envelope: &str) -> Result<BytesMut, ProtocolError> {
        let mut body = BytesMut::with_capacity(1 + varint_len(envelope.len() as u64) + envelope.len());
        encode_bytes_field(ENVELOPE_FIELD, envelope.as_bytes(), &mut body);
        Frame::new(body.freeze()).encode()
    }
}

/// Accumulates received bytes and decodes framed messages.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.buffer)
    }

    /// Attempts to decode the next reply and returns its envelope bytes.
    pub fn decode_reply(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        match self.decode_frame()? {
            Some(frame) => decode_body(&frame.payload).map(Some),
            None => Ok(None),
        }
    }

    /// Attempts to decode the next request, returning envelope and storage name.
    pub fn decode_request(&mut self) -> Result<Option<(Bytes, String)>, ProtocolError> {
        let frame = match self.decode_frame()? {
            Some(frame) => frame,
            None => return Ok(None),
        };

        let mut fields = decode_fields(&frame.payload)?;
        let envelope = fields
            .remove(&ENVELOPE_FIELD)
            .and_then(|v| v.as_bytes().cloned())
            .ok_or(ProtocolError::MissingField(ENVELOPE_FIELD))?;
        let storage = fields
            .remove(&STORAGE_FIELD)
            .and_then(|v| v.as_bytes().cloned())
            .ok_or(ProtocolError::MissingField(STORAGE_FIELD))?;
        let storage = String::from_utf8(storage.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)?;

        Ok(Some((envelope, storage)))
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
