//! Client error types.

use cps_protocol::{ErrorKind, ProtocolError, ServerError};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Every substrate fault while opening or using a transport ends up here.
    #[error("connection error: {reason}")]
    Connection { reason: String },

    #[error("not connected")]
    NotConnected,

    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    #[error("malformed response ({reason}): {raw}")]
    Envelope { reason: String, raw: String },

    #[error("server error: {0}")]
    Server(Box<ServerError>),

    #[error("invalid parameter: {0}")]
    Parameter(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub(crate) fn connection(reason: impl std::fmt::Display) -> Self {
        ClientError::Connection {
            reason: reason.to_string(),
        }
    }

    /// Returns the taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Connection { .. } | ClientError::NotConnected => ErrorKind::Connection,
            ClientError::Protocol(_) => ErrorKind::Protocol,
            ClientError::Envelope { .. } => ErrorKind::Envelope,
            ClientError::Server(_) => ErrorKind::Server,
            ClientError::Parameter(_) | ClientError::Config(_) => ErrorKind::Parameter,
        }
    }

    /// The server error block, if the server rejected the request.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            ClientError::Server(error) => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MalformedEnvelope { reason, raw } => ClientError::Envelope { reason, raw },
            ProtocolError::UnexpectedReply(command) => ClientError::Envelope {
                reason: format!("unexpected reply shape for '{command}'"),
                raw: String::new(),
            },
            ProtocolError::Server(error) => ClientError::Server(error),
            ProtocolError::InvalidParameter(reason) => ClientError::Parameter(reason),
            ProtocolError::Io(e) => ClientError::connection(e),
            other => ClientError::Protocol(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cps_protocol::Severity;

    #[test]
    fn test_protocol_errors_routed_by_kind() {
        let err: ClientError = ProtocolError::malformed("eof", b"<x").into();
        assert!(matches!(err, ClientError::Envelope { ref raw, .. } if raw == "<x"));
        assert_eq!(err.kind(), ErrorKind::Envelope);

        let err: ClientError = ProtocolError::InvalidParameter("depth".into()).into();
        assert_eq!(err.kind(), ErrorKind::Parameter);

        let err: ClientError = ProtocolError::InvalidMarker(*b"HTTP").into();
        assert_eq!(err.kind(), ErrorKind::Protocol);

        let err: ClientError =
            ProtocolError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).into();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn test_server_error_preserved() {
        let server = ServerError {
            code: 1,
            text: "denied".into(),
            level: Severity::Rejected,
            source: "auth".into(),
            message: String::new(),
            document_ids: Vec::new(),
        };
        let err: ClientError = ProtocolError::Server(Box::new(server.clone())).into();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.server_error(), Some(&server));
        assert!(err.to_string().contains("denied"));
    }
}
