//! Protocol error types and server-reported error blocks.

use std::fmt;
use thiserror::Error;

/// Errors raised while encoding, framing, or interpreting protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid frame header: expected marker 09 09 00 00, got {0:02x?}")]
    InvalidMarker([u8; 4]),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("incomplete frame: need {needed} more bytes")]
    IncompleteFrame { needed: usize },

    #[error("unsupported wire type {wire_type} at offset {offset}")]
    UnsupportedWireType { wire_type: u8, offset: usize },

    #[error("truncated varint at offset {offset}")]
    TruncatedVarint { offset: usize },

    #[error("varint at offset {offset} overflows 64 bits")]
    VarintOverflow { offset: usize },

    #[error("truncated field {field}: need {needed} bytes, {available} available")]
    TruncatedField {
        field: u32,
        needed: usize,
        available: usize,
    },

    #[error("missing required field {0} in message body")]
    MissingField(u32),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    #[error("malformed response envelope ({reason}): {raw}")]
    MalformedEnvelope { reason: String, raw: String },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("server error: {0}")]
    Server(Box<ServerError>),

    #[error("unexpected reply type for command '{0}'")]
    UnexpectedReply(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Builds an envelope fault carrying the offending raw bytes.
    pub fn malformed(reason: impl Into<String>, raw: &[u8]) -> Self {
        ProtocolError::MalformedEnvelope {
            reason: reason.into(),
            raw: String::from_utf8_lossy(raw).into_owned(),
        }
    }

    /// Returns the taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::MalformedEnvelope { .. } | ProtocolError::UnexpectedReply(_) => {
                ErrorKind::Envelope
            }
            ProtocolError::InvalidParameter(_) => ErrorKind::Parameter,
            ProtocolError::Server(_) => ErrorKind::Server,
            _ => ErrorKind::Protocol,
        }
    }
}

/// Coarse error classification shared by the protocol and client layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The transport could not be opened or maintained.
    Connection,
    /// Malformed frame header, unsupported wire type, or corrupt field encoding.
    Protocol,
    /// Response bytes do not parse as the expected markup.
    Envelope,
    /// The server reported an error with a fatal severity.
    Server,
    /// A caller-supplied argument violates a documented constraint.
    Parameter,
}

/// Severity level of a server-reported error block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Severity {
    Rejected,
    Failed,
    Error,
    Fatal,
    Warning,
    Notice,
    Other(String),
}

impl Severity {
    /// Parses a level string, ignoring case and surrounding whitespace.
    pub fn parse(level: &str) -> Self {
        let level = level.trim();
        match level.to_ascii_lowercase().as_str() {
            "rejected" => Severity::Rejected,
            "failed" => Severity::Failed,
            "error" => Severity::Error,
            "fatal" => Severity::Fatal,
            "warning" => Severity::Warning,
            "notice" => Severity::Notice,
            _ => Severity::Other(level.to_string()),
        }
    }

    /// Returns whether this severity aborts the call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Severity::Rejected | Severity::Failed | Severity::Error | Severity::Fatal
        )
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Rejected => write!(f, "REJECTED"),
            Severity::Failed => write!(f, "FAILED"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Notice => write!(f, "NOTICE"),
            Severity::Other(level) => write!(f, "{}", level.to_ascii_uppercase()),
        }
    }
}

/// An error block as reported by the server inside a response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerError {
    /// Numeric error code (0 when the server sent none or a non-numeric one).
    pub code: i64,
    /// Short error text.
    pub text: String,
    /// Severity level.
    pub level: Severity,
    /// Subsystem in which the error occurred.
    pub source: String,
    /// Longer error message.
    pub message: String,
    /// Identifiers of the documents the error refers to, if any.
    pub document_ids: Vec<String>,
}

impl ServerError {
    pub fn is_fatal(&self) -> bool {
        self.level.is_fatal()
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.level, self.text, self.code)?;
        if !self.message.is_empty() && self.message != self.text {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}
